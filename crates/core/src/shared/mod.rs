pub mod constants;
pub mod detector_type;
pub mod ids;
pub mod marker;
pub mod settings;
