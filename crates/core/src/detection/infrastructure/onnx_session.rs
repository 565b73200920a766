use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::Array4;

use crate::detection::domain::detector::DetectorError;
use crate::detection::domain::detector_registry::DetectorConfig;
use crate::detection::infrastructure::model_cache::{ModelCache, ModelKey};
use crate::detection::infrastructure::model_resolver::{self, ModelLocations};

/// Flat copy of the first model output.
pub struct ModelOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// A loaded ONNX Runtime session. `run` needs exclusive access, so the
/// session sits behind a mutex and is shared across workers through the
/// model cache.
pub struct OnnxSession {
    session: Mutex<ort::session::Session>,
}

pub type SessionCache = ModelCache<OnnxSession>;

impl OnnxSession {
    pub fn load(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    pub fn run(&self, input: Array4<f32>) -> Result<ModelOutput, Box<dyn std::error::Error>> {
        let input_value = ort::value::Tensor::from_array(input)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        Ok(ModelOutput {
            shape: tensor.shape().to_vec(),
            data: tensor.iter().copied().collect(),
        })
    }
}

/// Fetches the session for `config` from the cache, resolving and loading
/// the weights on first use.
pub fn cached_session(
    cache: &SessionCache,
    locations: &ModelLocations,
    config: &DetectorConfig,
) -> Result<Arc<OnnxSession>, DetectorError> {
    let key = ModelKey::new(config.detector_type, config.model_name.clone());
    cache.get_or_load(&key, || {
        let path = model_resolver::resolve(&config.model_file, locations, None)
            .map_err(|e| DetectorError::ModelUnavailable(e.to_string()))?;
        let session = OnnxSession::load(&path).map_err(|e| {
            DetectorError::ModelUnavailable(format!("{}: {e}", path.display()))
        })?;
        log::info!("Loaded {} from {}", config.model_name, path.display());
        Ok(session)
    })
}

/// Preferred ONNX execution providers for the current platform.
///
/// ONNX Runtime falls back to CPU when the provider is unavailable.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}
