use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::detection::domain::annotator::Annotator;
use crate::detection::domain::detection::{Detection, DetectionMetadata, NewDetection};
use crate::detection::domain::detector::{DetectorError, DetectorSet, InferenceResult, RawObject};
use crate::detection::domain::detector_registry::DetectorRegistry;
use crate::detection::domain::finding::{BoundingBox, Finding};
use crate::detection::domain::summary::{classification_summary, error_summary, object_summary};
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::detector_type::{DetectorKind, DetectorType};
use crate::pipeline::job_executor::panic_message;
use crate::shared::marker::MarkerFile;
use crate::storage::domain::blob_store::BlobStore;
use crate::storage::domain::detection_repository::DetectionRepository;

/// Whether a file can be handed to the detectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Ready,
    Unsupported,
    Missing,
}

/// Runs detectors over one marker file and persists the results.
///
/// Detector failures become error detections; nothing here returns an error
/// to the caller.
pub struct ImageProcessor {
    registry: Arc<DetectorRegistry>,
    detectors: DetectorSet,
    media: Arc<dyn BlobStore>,
    results: Arc<dyn BlobStore>,
    repository: Arc<dyn DetectionRepository>,
    annotator: Arc<dyn Annotator>,
}

impl ImageProcessor {
    pub fn new(
        registry: Arc<DetectorRegistry>,
        detectors: DetectorSet,
        media: Arc<dyn BlobStore>,
        results: Arc<dyn BlobStore>,
        repository: Arc<dyn DetectionRepository>,
        annotator: Arc<dyn Annotator>,
    ) -> Self {
        Self {
            registry,
            detectors,
            media,
            results,
            repository,
            annotator,
        }
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    pub fn repository(&self) -> &dyn DetectionRepository {
        self.repository.as_ref()
    }

    pub fn eligibility(&self, file: &MarkerFile) -> Eligibility {
        if !self.media.exists(&file.path) {
            Eligibility::Missing
        } else if !is_supported_image(&file.path) {
            Eligibility::Unsupported
        } else {
            Eligibility::Ready
        }
    }

    /// Runs each requested detector type over `file`, in declared order,
    /// replacing any earlier detection for the same pair. Returns the new
    /// detections; ineligible files produce none.
    pub fn process_file(&self, file: &MarkerFile, detector_types: &[DetectorType]) -> Vec<Detection> {
        match self.eligibility(file) {
            Eligibility::Ready => {}
            Eligibility::Missing => {
                log::warn!("File {} not found in media storage: {}", file.id, file.path.display());
                return Vec::new();
            }
            Eligibility::Unsupported => {
                log::info!("Skipping file {}: unsupported format {}", file.id, file.path.display());
                return Vec::new();
            }
        }

        let image = self.media.locate(&file.path);
        DetectorType::ordered(detector_types)
            .into_iter()
            .map(|detector_type| {
                let detection = self.run_detector(file, &image, detector_type);
                self.repository.replace(detection)
            })
            .collect()
    }

    fn run_detector(&self, file: &MarkerFile, image: &Path, detector_type: DetectorType) -> NewDetection {
        let config = match self.registry.resolve(detector_type) {
            Ok(config) => config,
            Err(e) => {
                log::error!("File {}: {e}", file.id);
                return failed(file, detector_type, String::new(), None, &e);
            }
        };

        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.detectors.infer(image, config)))
            .unwrap_or_else(|panic| {
                Err(DetectorError::InferenceFailure(format!(
                    "detector panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        let inference_ms = started.elapsed().as_secs_f64() * 1000.0;

        let findings = match result {
            Ok(result) => build_findings(result),
            Err(e) => {
                log::error!("{detector_type} failed on file {}: {e}", file.id);
                let metadata = DetectionMetadata {
                    inference_ms,
                    finding_count: 0,
                };
                return failed(file, detector_type, config.model_name.clone(), Some(metadata), &e);
            }
        };

        let summary = match detector_type.kind() {
            DetectorKind::Object => object_summary(&findings),
            DetectorKind::Classification => match findings.first() {
                Some(primary) => classification_summary(primary.label(), primary.confidence()),
                None => "No classification produced".to_string(),
            },
        };
        log::info!("{detector_type} on file {}: {summary}", file.id);

        let image_path = self.annotate(file, detector_type, &findings);
        NewDetection {
            file_id: file.id,
            detector_type,
            model_name: config.model_name.clone(),
            summary,
            image_path,
            metadata: Some(DetectionMetadata {
                inference_ms,
                finding_count: findings.len(),
            }),
            error: None,
            findings,
        }
    }

    /// Renders and stores the annotated image. Failures are logged only.
    fn annotate(&self, file: &MarkerFile, detector_type: DetectorType, findings: &[Finding]) -> Option<PathBuf> {
        let key = annotated_key(&file.path, detector_type);
        let rendered = self
            .media
            .read(&file.path)
            .map_err(|e| e.to_string())
            .and_then(|source| {
                self.annotator
                    .annotate(&source, detector_type, findings)
                    .map_err(|e| e.to_string())
            })
            .and_then(|bytes| self.results.write(&key, &bytes).map_err(|e| e.to_string()));

        match rendered {
            Ok(()) => Some(key),
            Err(e) => {
                log::warn!("Could not write annotated image for file {}: {e}", file.id);
                None
            }
        }
    }
}

/// `{detector_type}/{file_stem}_{detector_type}.jpg`
pub fn annotated_key(source: &Path, detector_type: DetectorType) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    PathBuf::from(detector_type.as_str()).join(format!("{stem}_{detector_type}.jpg"))
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn failed(
    file: &MarkerFile,
    detector_type: DetectorType,
    model_name: String,
    metadata: Option<DetectionMetadata>,
    error: &dyn std::fmt::Display,
) -> NewDetection {
    NewDetection {
        file_id: file.id,
        detector_type,
        model_name,
        summary: error_summary(error),
        image_path: None,
        metadata,
        error: Some(error.to_string()),
        findings: Vec::new(),
    }
}

fn build_findings(result: InferenceResult) -> Vec<Finding> {
    match result {
        InferenceResult::Objects(objects) => objects.into_iter().filter_map(object_finding).collect(),
        InferenceResult::Classes {
            primary_label,
            primary_confidence,
            all_scores,
        } => {
            let mut rest: Vec<(String, f32)> = all_scores
                .into_iter()
                .filter(|(label, _)| *label != primary_label)
                .collect();
            rest.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            std::iter::once(Finding::classification(primary_label, primary_confidence))
                .chain(rest.into_iter().map(|(label, c)| Finding::classification(label, c)))
                .collect()
        }
    }
}

fn object_finding(raw: RawObject) -> Option<Finding> {
    let [xmin, ymin, xmax, ymax] = raw.bbox;
    match BoundingBox::new(xmin, ymin, xmax, ymax) {
        Some(bbox) => Some(Finding::object(raw.label, raw.confidence, bbox)),
        None => {
            log::warn!("Dropping {} with invalid box {:?}", raw.label, raw.bbox);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detector::{Detector, DetectorError};
    use crate::detection::domain::detector_registry::DetectorConfig;
    use crate::shared::ids::{FileId, MarkerId};
    use crate::shared::marker::Marker;
    use crate::storage::infrastructure::in_memory_detection_repository::InMemoryDetectionRepository;
    use crate::storage::infrastructure::memory_blob_store::MemoryBlobStore;
    use approx::assert_relative_eq;
    use rstest::rstest;

    struct StubDetector(Result<InferenceResult, DetectorError>);

    impl Detector for StubDetector {
        fn infer(&self, _image: &Path, _config: &DetectorConfig) -> Result<InferenceResult, DetectorError> {
            self.0.clone()
        }
    }

    /// Echoes the source bytes so tests can check what was written.
    struct EchoAnnotator;

    impl Annotator for EchoAnnotator {
        fn annotate(
            &self,
            source: &[u8],
            _detector_type: DetectorType,
            _findings: &[Finding],
        ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
            Ok(source.to_vec())
        }
    }

    struct FailingAnnotator;

    impl Annotator for FailingAnnotator {
        fn annotate(
            &self,
            _source: &[u8],
            _detector_type: DetectorType,
            _findings: &[Finding],
        ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
            Err("encoder exploded".into())
        }
    }

    fn people_and_car() -> InferenceResult {
        InferenceResult::Objects(vec![
            RawObject { label: "person".into(), confidence: 0.9, bbox: [0.0, 0.0, 10.0, 10.0] },
            RawObject { label: "person".into(), confidence: 0.8, bbox: [5.0, 5.0, 20.0, 20.0] },
            RawObject { label: "car".into(), confidence: 0.95, bbox: [30.0, 30.0, 60.0, 50.0] },
        ])
    }

    fn damage_scores() -> InferenceResult {
        InferenceResult::Classes {
            primary_label: "major_damage".into(),
            primary_confidence: 0.6,
            all_scores: vec![
                ("no_damage".into(), 0.1),
                ("minor_damage".into(), 0.15),
                ("major_damage".into(), 0.6),
                ("destroyed".into(), 0.15),
            ],
        }
    }

    struct Fixture {
        processor: ImageProcessor,
        results: Arc<MemoryBlobStore>,
        repository: Arc<InMemoryDetectionRepository>,
    }

    fn fixture(detectors: DetectorSet, annotator: Arc<dyn Annotator>) -> Fixture {
        let media = Arc::new(
            MemoryBlobStore::new()
                .with("markers/1/photo.JPG", b"img".to_vec())
                .with("markers/1/notes.pdf", b"pdf".to_vec()),
        );
        let results = Arc::new(MemoryBlobStore::new());
        let repository = Arc::new(InMemoryDetectionRepository::new());
        let processor = ImageProcessor::new(
            Arc::new(DetectorRegistry::default()),
            detectors,
            media,
            results.clone(),
            repository.clone(),
            annotator,
        );
        Fixture {
            processor,
            results,
            repository,
        }
    }

    fn file(path: &str) -> MarkerFile {
        Marker::new(MarkerId(1)).with_file(FileId(10), path).files.remove(0)
    }

    fn all_detectors() -> DetectorSet {
        DetectorSet::new()
            .with(DetectorType::ObjectDetection, Arc::new(StubDetector(Ok(people_and_car()))))
            .with(DetectorType::DamageAssessment, Arc::new(StubDetector(Ok(damage_scores()))))
    }

    #[test]
    fn test_object_detection_builds_findings_summary_and_image() {
        let fx = fixture(all_detectors(), Arc::new(EchoAnnotator));
        let detections = fx
            .processor
            .process_file(&file("markers/1/photo.JPG"), &[DetectorType::ObjectDetection]);

        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.summary, "Found 3 objects: 2 persons, 1 car");
        assert_eq!(d.model_name, "yolo11m");
        assert_eq!(d.findings.len(), 3);
        assert_eq!(d.metadata.as_ref().unwrap().finding_count, 3);
        let key = PathBuf::from("object_detection/photo_object_detection.jpg");
        assert_eq!(d.image_path.as_deref(), Some(key.as_path()));
        assert_eq!(fx.results.read(&key).unwrap(), b"img");
    }

    #[test]
    fn test_classification_findings_primary_first_then_by_confidence() {
        let fx = fixture(all_detectors(), Arc::new(EchoAnnotator));
        let detections = fx
            .processor
            .process_file(&file("markers/1/photo.JPG"), &[DetectorType::DamageAssessment]);

        let d = &detections[0];
        assert_eq!(d.summary, "Classified as major_damage with 0.60 confidence");
        let labels: Vec<_> = d.findings.iter().map(|f| f.label()).collect();
        assert_eq!(labels, vec!["major_damage", "destroyed", "minor_damage", "no_damage"]);
        assert_relative_eq!(d.findings[0].confidence(), 0.6);
    }

    #[test]
    fn test_types_processed_in_declared_order_once() {
        let fx = fixture(all_detectors(), Arc::new(EchoAnnotator));
        let detections = fx.processor.process_file(
            &file("markers/1/photo.JPG"),
            &[
                DetectorType::DamageAssessment,
                DetectorType::ObjectDetection,
                DetectorType::DamageAssessment,
            ],
        );
        let types: Vec<_> = detections.iter().map(|d| d.detector_type).collect();
        assert_eq!(types, vec![DetectorType::ObjectDetection, DetectorType::DamageAssessment]);
    }

    #[test]
    fn test_detector_failure_becomes_error_detection() {
        let detectors = DetectorSet::new().with(
            DetectorType::ObjectDetection,
            Arc::new(StubDetector(Err(DetectorError::InferenceFailure("corrupt image".into())))),
        );
        let fx = fixture(detectors, Arc::new(EchoAnnotator));
        let detections = fx
            .processor
            .process_file(&file("markers/1/photo.JPG"), &[DetectorType::ObjectDetection]);

        let d = &detections[0];
        assert!(d.is_error());
        assert!(d.findings.is_empty());
        assert!(d.image_path.is_none());
        assert_eq!(d.summary, "Error processing image: inference failed: corrupt image");
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn infer(&self, _image: &Path, _config: &DetectorConfig) -> Result<InferenceResult, DetectorError> {
            panic!("tensor shape mismatch")
        }
    }

    #[test]
    fn test_detector_panic_becomes_error_detection() {
        let detectors = all_detectors().with(DetectorType::ObjectDetection, Arc::new(PanickingDetector));
        let fx = fixture(detectors, Arc::new(EchoAnnotator));
        let detections = fx.processor.process_file(
            &file("markers/1/photo.JPG"),
            &[DetectorType::ObjectDetection, DetectorType::DamageAssessment],
        );

        assert_eq!(detections.len(), 2);
        assert_eq!(
            detections[0].error.as_deref(),
            Some("inference failed: detector panicked: tensor shape mismatch")
        );
        assert!(!detections[1].is_error());
        assert_eq!(fx.repository.for_file(FileId(10)).len(), 2);
    }

    #[test]
    fn test_unregistered_detector_is_error_detection_not_panic() {
        let fx = fixture(DetectorSet::new(), Arc::new(EchoAnnotator));
        let detections = fx
            .processor
            .process_file(&file("markers/1/photo.JPG"), &[DetectorType::EmergencyRecognition]);
        assert_eq!(detections.len(), 1);
        assert!(detections[0].error.as_deref().unwrap().contains("model unavailable"));
    }

    #[test]
    fn test_annotation_failure_keeps_detection() {
        let fx = fixture(all_detectors(), Arc::new(FailingAnnotator));
        let detections = fx
            .processor
            .process_file(&file("markers/1/photo.JPG"), &[DetectorType::ObjectDetection]);

        assert_eq!(detections.len(), 1);
        assert!(!detections[0].is_error());
        assert!(detections[0].image_path.is_none());
        assert!(fx.results.keys().is_empty());
    }

    #[test]
    fn test_invalid_boxes_dropped() {
        let detectors = DetectorSet::new().with(
            DetectorType::ObjectDetection,
            Arc::new(StubDetector(Ok(InferenceResult::Objects(vec![
                RawObject { label: "car".into(), confidence: 0.9, bbox: [10.0, 10.0, 5.0, 20.0] },
                RawObject { label: "truck".into(), confidence: 0.9, bbox: [0.0, 0.0, 5.0, 5.0] },
            ])))),
        );
        let fx = fixture(detectors, Arc::new(EchoAnnotator));
        let detections = fx
            .processor
            .process_file(&file("markers/1/photo.JPG"), &[DetectorType::ObjectDetection]);
        assert_eq!(detections[0].summary, "Found 1 objects: 1 truck");
    }

    #[test]
    fn test_reprocessing_replaces_previous_detection() {
        let fx = fixture(all_detectors(), Arc::new(EchoAnnotator));
        let f = file("markers/1/photo.JPG");
        let types = [DetectorType::ObjectDetection, DetectorType::DamageAssessment];

        let first = fx.processor.process_file(&f, &types);
        let second = fx.processor.process_file(&f, &types);

        let live = fx.repository.for_file(f.id);
        assert_eq!(live.len(), 2);
        assert_eq!(
            live.iter().map(|d| d.id).collect::<Vec<_>>(),
            second.iter().map(|d| d.id).collect::<Vec<_>>()
        );
        assert!(first.iter().all(|d| !live.iter().any(|l| l.id == d.id)));
    }

    #[rstest]
    #[case("markers/1/photo.JPG", Eligibility::Ready)]
    #[case("markers/1/notes.pdf", Eligibility::Unsupported)]
    #[case("markers/1/gone.jpg", Eligibility::Missing)]
    fn test_eligibility(#[case] path: &str, #[case] expected: Eligibility) {
        let fx = fixture(all_detectors(), Arc::new(EchoAnnotator));
        assert_eq!(fx.processor.eligibility(&file(path)), expected);
    }

    #[test]
    fn test_ineligible_files_produce_nothing() {
        let fx = fixture(all_detectors(), Arc::new(EchoAnnotator));
        for path in ["markers/1/notes.pdf", "markers/1/gone.jpg"] {
            assert!(fx
                .processor
                .process_file(&file(path), &[DetectorType::ObjectDetection])
                .is_empty());
        }
        assert!(fx.repository.is_empty());
    }

    #[rstest]
    #[case("a/b/photo.jpeg", true)]
    #[case("photo.TIFF", true)]
    #[case("photo.webp", true)]
    #[case("photo.gif", false)]
    #[case("photo", false)]
    fn test_supported_extensions(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_supported_image(Path::new(path)), expected);
    }

    #[test]
    fn test_annotated_key() {
        assert_eq!(
            annotated_key(Path::new("markers/7/IMG_001.png"), DetectorType::MilitaryDetection),
            PathBuf::from("military_detection/IMG_001_military_detection.jpg")
        );
    }
}
