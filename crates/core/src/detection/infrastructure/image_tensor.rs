use std::path::Path;

use image::RgbImage;
use ndarray::Array4;

use crate::detection::domain::detector::DetectorError;

/// Geometry needed to map letterboxed model coordinates back to the source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

pub fn load_rgb(path: &Path) -> Result<RgbImage, DetectorError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| DetectorError::InferenceFailure(format!("{}: {e}", path.display())))
}

/// Letterbox-resize to `target` × `target`, NCHW float32 in [0, 1].
pub fn letterbox(img: &RgbImage, target: u32) -> (Array4<f32>, Letterbox) {
    let (w, h) = (img.width().max(1) as f32, img.height().max(1) as f32);
    let target_f = target as f32;

    let scale = (target_f / w).min(target_f / h);
    let new_w = ((w * scale).round() as u32).clamp(1, target);
    let new_h = ((h * scale).round() as u32).clamp(1, target);
    let pad_x = (target - new_w) / 2;
    let pad_y = (target - new_h) / 2;

    // YOLO pads with 114 gray.
    let gray = 114.0f32 / 255.0;
    let mut tensor = Array4::<f32>::from_elem((1, 3, target as usize, target as usize), gray);

    let src_w = img.width() as usize;
    let src_h = img.height() as usize;
    if src_w == 0 || src_h == 0 {
        return (tensor, Letterbox { scale, pad_x, pad_y });
    }

    for y in 0..new_h as usize {
        let src_y = ((y as f32 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f32 / scale) as usize).min(src_w - 1);
            let pixel = img.get_pixel(src_x as u32, src_y as u32);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Stretch-resize to `target` × `target` (no aspect preservation), NHWC in [0, 1].
///
/// Matches the Keras-style preprocessing the classifiers were trained with.
pub fn square_nhwc(img: &RgbImage, target: u32) -> Array4<f32> {
    let resized = image::imageops::resize(img, target, target, image::imageops::FilterType::Triangle);
    let size = target as usize;
    Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
        resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}
