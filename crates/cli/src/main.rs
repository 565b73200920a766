use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use wartrace_detection_core::detection::domain::detector::DetectorSet;
use wartrace_detection_core::detection::domain::detector_registry::{
    DetectorConfig, DetectorRegistry,
};
use wartrace_detection_core::detection::infrastructure::annotator::JpegAnnotator;
use wartrace_detection_core::detection::infrastructure::model_resolver::{
    self, ModelLocations,
};
use wartrace_detection_core::detection::infrastructure::onnx_classifier::OnnxClassifier;
use wartrace_detection_core::detection::infrastructure::onnx_object_detector::OnnxObjectDetector;
use wartrace_detection_core::detection::infrastructure::onnx_session::SessionCache;
use wartrace_detection_core::pipeline::image_processor::ImageProcessor;
use wartrace_detection_core::pipeline::infrastructure::threaded_worker_pool::ThreadedWorkerPool;
use wartrace_detection_core::pipeline::job_status_store::{JobStatus, JobStatusStore};
use wartrace_detection_core::pipeline::marker_processing_coordinator::MarkerProcessingCoordinator;
use wartrace_detection_core::shared::constants::DETECTIONS_FILE;
use wartrace_detection_core::shared::detector_type::{DetectorKind, DetectorType};
use wartrace_detection_core::shared::ids::{FileId, MarkerId};
use wartrace_detection_core::shared::settings::DetectionSettings;
use wartrace_detection_core::storage::infrastructure::fs_blob_store::FsBlobStore;
use wartrace_detection_core::storage::infrastructure::in_memory_detection_repository::InMemoryDetectionRepository;
use wartrace_detection_core::storage::infrastructure::in_memory_marker_source::InMemoryMarkerSource;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Run WarTrace marker detectors over uploaded images.
#[derive(Parser)]
#[command(name = "wartrace-detect")]
struct Cli {
    /// Settings file (defaults to the per-user config).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the model weights.
    #[arg(long, global = true)]
    models_root: Option<PathBuf>,

    /// Root of the uploaded marker files.
    #[arg(long, global = true)]
    media_root: Option<PathBuf>,

    /// Root for annotated images and stored detections.
    #[arg(long, global = true)]
    results_root: Option<PathBuf>,

    /// Number of background workers.
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every file of a marker in the background and print the summary.
    Process {
        /// Marker manifest: {"markers": [...]}.
        manifest: PathBuf,
        marker_id: u64,
    },
    /// Process one file synchronously.
    ProcessFile {
        manifest: PathBuf,
        file_id: u64,
        /// Detector types to run (comma-separated). Defaults to the marker's.
        #[arg(long, value_delimiter = ',')]
        types: Option<Vec<DetectorType>>,
    },
    /// Print the stored detections of a marker.
    Results { manifest: PathBuf, marker_id: u64 },
    /// Print the configured detectors.
    Models,
}

#[derive(Serialize)]
struct ModelEntry<'a> {
    #[serde(flatten)]
    config: &'a DetectorConfig,
    display_name: &'static str,
    kind: &'static str,
    weights: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    validate(&settings)?;

    match cli.command {
        Command::Process {
            manifest,
            marker_id,
        } => run_process(&settings, &manifest, MarkerId(marker_id)),
        Command::ProcessFile {
            manifest,
            file_id,
            types,
        } => run_process_file(&settings, &manifest, FileId(file_id), types),
        Command::Results {
            manifest,
            marker_id,
        } => run_results(&settings, &manifest, MarkerId(marker_id)),
        Command::Models => run_models(&settings),
    }
}

fn run_process(
    settings: &DetectionSettings,
    manifest: &Path,
    marker_id: MarkerId,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = Service::open(settings, manifest)?;
    let handle = service.coordinator.submit(marker_id)?;

    let status = loop {
        if let Some(status) = handle.wait_timeout(POLL_INTERVAL) {
            break status;
        }
        eprint!(
            "\rProcessing marker {marker_id}... {}%",
            service.coordinator.status(marker_id).progress()
        );
    };
    eprintln!();
    service.save()?;

    match status {
        JobStatus::Completed { result, .. } => print_json(&result),
        JobStatus::Error { message, .. } => Err(message.into()),
        other => Err(format!("job ended in unexpected state {other:?}").into()),
    }
}

fn run_process_file(
    settings: &DetectionSettings,
    manifest: &Path,
    file_id: FileId,
    types: Option<Vec<DetectorType>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = Service::open(settings, manifest)?;
    let summary = service.coordinator.process_file(file_id, types)?;
    service.save()?;
    print_json(&summary)
}

fn run_results(
    settings: &DetectionSettings,
    manifest: &Path,
    marker_id: MarkerId,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = Service::open(settings, manifest)?;
    print_json(&service.coordinator.results(marker_id)?)
}

fn run_models(settings: &DetectionSettings) -> Result<(), Box<dyn std::error::Error>> {
    let registry = DetectorRegistry::from_settings(settings);
    let locations = model_locations(settings);
    let entries: Vec<_> = registry
        .configs()
        .map(|config| ModelEntry {
            config,
            display_name: config.detector_type.display_name(),
            kind: match config.detector_type.kind() {
                DetectorKind::Object => "object",
                DetectorKind::Classification => "classification",
            },
            weights: locate_weights(&config.model_file, &locations),
        })
        .collect();
    print_json(&entries)
}

/// Everything a subcommand needs, wired from settings.
struct Service {
    coordinator: MarkerProcessingCoordinator,
    repository: Arc<InMemoryDetectionRepository>,
    snapshot: PathBuf,
}

impl Service {
    fn open(settings: &DetectionSettings, manifest: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let markers = Arc::new(InMemoryMarkerSource::from_manifest(manifest)?);
        let snapshot = settings.results_root.join(DETECTIONS_FILE);
        let repository = Arc::new(InMemoryDetectionRepository::load_json(&snapshot)?);

        let registry = Arc::new(DetectorRegistry::from_settings(settings));
        let processor = ImageProcessor::new(
            registry,
            build_detectors(settings),
            Arc::new(FsBlobStore::new(&settings.media_root)),
            Arc::new(FsBlobStore::new(&settings.results_root)),
            repository.clone(),
            Arc::new(JpegAnnotator::new()),
        );
        let pool = ThreadedWorkerPool::new(settings.workers, settings.queue_capacity)?;
        let coordinator = MarkerProcessingCoordinator::new(
            processor,
            markers,
            Arc::new(JobStatusStore::new()),
            Arc::new(pool),
        );

        Ok(Self {
            coordinator,
            repository,
            snapshot,
        })
    }

    fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.repository.save_json(&self.snapshot)?;
        log::debug!(
            "Saved {} detections to {}",
            self.repository.len(),
            self.snapshot.display()
        );
        Ok(())
    }
}

fn build_detectors(settings: &DetectionSettings) -> DetectorSet {
    let sessions = Arc::new(SessionCache::new());
    let locations = model_locations(settings);
    let objects = Arc::new(OnnxObjectDetector::new(sessions.clone(), locations.clone()));
    let classes = Arc::new(OnnxClassifier::new(sessions, locations));

    DetectorType::ALL
        .into_iter()
        .fold(DetectorSet::new(), |set, detector_type| match detector_type.kind() {
            DetectorKind::Object => set.with(detector_type, objects.clone()),
            DetectorKind::Classification => set.with(detector_type, classes.clone()),
        })
}

fn model_locations(settings: &DetectionSettings) -> ModelLocations {
    let mut locations = ModelLocations::new(&settings.models_root);
    locations.base_url = settings.model_base_url.clone();
    locations
}

/// Weights already on disk; never downloads.
fn locate_weights(model_file: &str, locations: &ModelLocations) -> Option<PathBuf> {
    let offline = ModelLocations {
        base_url: None,
        ..locations.clone()
    };
    model_resolver::resolve(model_file, &offline, None).ok()
}

fn load_settings(cli: &Cli) -> Result<DetectionSettings, Box<dyn std::error::Error>> {
    let mut settings = match cli.config {
        Some(ref path) => DetectionSettings::load_from(path)?,
        None => DetectionSettings::load(),
    };
    if let Some(ref dir) = cli.models_root {
        settings.models_root = dir.clone();
    }
    if let Some(ref dir) = cli.media_root {
        settings.media_root = dir.clone();
    }
    if let Some(ref dir) = cli.results_root {
        settings.results_root = dir.clone();
    }
    if let Some(workers) = cli.workers {
        settings.workers = workers;
    }
    Ok(settings)
}

fn validate(settings: &DetectionSettings) -> Result<(), Box<dyn std::error::Error>> {
    if settings.workers == 0 {
        return Err("Workers must be at least 1".into());
    }
    if settings.queue_capacity == 0 {
        return Err("Queue capacity must be at least 1".into());
    }
    for o in &settings.overrides {
        if let Some(t) = o.threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(format!(
                    "Threshold for {} must be between 0.0 and 1.0, got {t}",
                    o.detector_type
                )
                .into());
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
