pub mod annotator;
mod image_tensor;
pub mod model_cache;
pub mod model_resolver;
pub mod onnx_classifier;
pub mod onnx_object_detector;
pub mod onnx_session;
