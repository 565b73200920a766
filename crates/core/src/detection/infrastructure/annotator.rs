use image::{Rgb, RgbImage};

use crate::detection::domain::annotator::Annotator;
use crate::detection::domain::finding::{BoundingBox, Finding};
use crate::shared::detector_type::{DetectorKind, DetectorType};

const JPEG_QUALITY: u8 = 90;
const BOX_THICKNESS: u32 = 2;
const FILL_ALPHA: f32 = 0.3;
const BAR_BACKGROUND: Rgb<u8> = Rgb([100, 100, 100]);
const DEFAULT_COLOR: Rgb<u8> = Rgb([200, 200, 200]);

/// Draws findings with the `image` crate and encodes the result as JPEG.
///
/// Object findings get a translucent fill plus an outline in the label's
/// colour. Classifications get a border coloured by the primary class and a
/// confidence bar along the bottom edge.
pub struct JpegAnnotator;

impl JpegAnnotator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JpegAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator for JpegAnnotator {
    fn annotate(
        &self,
        source: &[u8],
        detector_type: DetectorType,
        findings: &[Finding],
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut img = image::load_from_memory(source)?.to_rgb8();

        match detector_type.kind() {
            DetectorKind::Object => draw_objects(&mut img, findings),
            DetectorKind::Classification => {
                if let Some(primary) = findings.first() {
                    draw_classification(&mut img, detector_type, primary);
                }
            }
        }

        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
            .encode_image(&img)?;
        Ok(buf)
    }
}

fn draw_objects(img: &mut RgbImage, findings: &[Finding]) {
    for finding in findings {
        let Some(bbox) = finding.bbox() else {
            continue;
        };
        let color = object_color(finding.label());
        let rect = PixelRect::from_bbox(bbox, img);
        blend_rect(img, rect, color, FILL_ALPHA);
        outline_rect(img, rect, color, BOX_THICKNESS);
    }
}

fn draw_classification(img: &mut RgbImage, detector_type: DetectorType, primary: &Finding) {
    let (w, h) = img.dimensions();
    let color = class_color(detector_type, primary.label());

    let border = (w.min(h) / 20).max(2);
    outline_rect(img, PixelRect::new(0, 0, w, h), color, border);

    // Confidence bar just inside the bottom border.
    let bar_h = (h / 20).max(2);
    let bar_y = h.saturating_sub(border + bar_h + border / 2);
    let bar_x0 = border * 2;
    let bar_x1 = w.saturating_sub(border * 2);
    if bar_x1 <= bar_x0 {
        return;
    }
    fill_rect(img, PixelRect::new(bar_x0, bar_y, bar_x1, bar_y + bar_h), BAR_BACKGROUND);
    let filled = ((bar_x1 - bar_x0) as f32 * primary.confidence()).round() as u32;
    fill_rect(
        img,
        PixelRect::new(bar_x0, bar_y, bar_x0 + filled, bar_y + bar_h),
        color,
    );
}

fn object_color(label: &str) -> Rgb<u8> {
    match label.to_lowercase().as_str() {
        "tank" => Rgb([200, 30, 30]),
        "military_vehicle" => Rgb([220, 100, 30]),
        "soldier" => Rgb([120, 100, 20]),
        "helicopter" => Rgb([255, 140, 0]),
        "airplane" => Rgb([255, 200, 0]),
        "weapon" => Rgb([180, 20, 20]),
        "armored_vehicle" => Rgb([220, 50, 50]),
        "person" => Rgb([0, 200, 0]),
        "car" => Rgb([0, 100, 200]),
        "truck" => Rgb([0, 150, 200]),
        "building" => Rgb([128, 0, 128]),
        "tree" => Rgb([0, 128, 0]),
        "road" => Rgb([100, 100, 100]),
        "water" => Rgb([0, 0, 255]),
        "bridge" => Rgb([0, 180, 180]),
        "damage" => Rgb([200, 0, 0]),
        _ => DEFAULT_COLOR,
    }
}

fn class_color(detector_type: DetectorType, label: &str) -> Rgb<u8> {
    match (detector_type, label) {
        (DetectorType::DamageAssessment, "no_damage") => Rgb([0, 255, 0]),
        (DetectorType::DamageAssessment, "minor_damage") => Rgb([255, 255, 0]),
        (DetectorType::DamageAssessment, "major_damage") => Rgb([255, 128, 0]),
        (DetectorType::DamageAssessment, _) => Rgb([255, 0, 0]),
        (_, "normal") => Rgb([0, 255, 0]),
        (_, "fire") => Rgb([255, 0, 0]),
        (_, "flood") => Rgb([0, 0, 255]),
        (_, "explosion") => Rgb([180, 0, 0]),
        _ => Rgb([128, 0, 128]),
    }
}

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)`, clipped to the image.
#[derive(Clone, Copy, Debug, PartialEq)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PixelRect {
    fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    fn from_bbox(bbox: &BoundingBox, img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let x = |v: f32| (v.max(0.0).round() as u32).min(w);
        let y = |v: f32| (v.max(0.0).round() as u32).min(h);
        Self::new(x(bbox.xmin), y(bbox.ymin), x(bbox.xmax), y(bbox.ymax))
    }

    fn clip(self, img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        Self::new(self.x0.min(w), self.y0.min(h), self.x1.min(w), self.y1.min(h))
    }
}

fn fill_rect(img: &mut RgbImage, rect: PixelRect, color: Rgb<u8>) {
    let r = rect.clip(img);
    for y in r.y0..r.y1 {
        for x in r.x0..r.x1 {
            img.put_pixel(x, y, color);
        }
    }
}

fn blend_rect(img: &mut RgbImage, rect: PixelRect, color: Rgb<u8>, alpha: f32) {
    let r = rect.clip(img);
    for y in r.y0..r.y1 {
        for x in r.x0..r.x1 {
            let px = img.get_pixel_mut(x, y);
            for c in 0..3 {
                px[c] = (px[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha).round() as u8;
            }
        }
    }
}

fn outline_rect(img: &mut RgbImage, rect: PixelRect, color: Rgb<u8>, thickness: u32) {
    let PixelRect { x0, y0, x1, y1 } = rect.clip(img);
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let t = thickness.min((x1 - x0).div_ceil(2)).min((y1 - y0).div_ceil(2));
    fill_rect(img, PixelRect::new(x0, y0, x1, y0 + t), color);
    fill_rect(img, PixelRect::new(x0, y1 - t, x1, y1), color);
    fill_rect(img, PixelRect::new(x0, y0, x0 + t, y1), color);
    fill_rect(img, PixelRect::new(x1 - t, y0, x1, y1), color);
}
