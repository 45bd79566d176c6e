//! Shared application state: loaded classifiers and request guards.

use std::sync::Arc;
use std::time::Instant;

use mastitis_inference::{
    decode_upload, detect_hybrid, detect_image, detect_symptoms, CachedSymptomModel, Detection,
    DetectionMode, ImageClassifier, InferenceError, ModelInfo, OnnxImageModel, OnnxSymptomModel,
    SymptomClassifier,
};

use crate::config::AppConfig;
use crate::rate_limit::RateLimiter;
use crate::upload::DetectionInput;

pub struct AppState {
    pub image_model: Arc<dyn ImageClassifier>,
    pub symptom_model: Arc<dyn SymptomClassifier>,
    pub model_info: ModelInfo,
    pub limiter: RateLimiter,
    pub api_keys: Vec<String>,
    pub max_upload_bytes: usize,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        image_model: Arc<dyn ImageClassifier>,
        symptom_model: Arc<dyn SymptomClassifier>,
        model_info: ModelInfo,
    ) -> Self {
        let defaults = AppConfig::default();
        AppState {
            image_model,
            symptom_model,
            model_info,
            limiter: RateLimiter::per_minute(defaults.rate_limit_per_minute),
            api_keys: defaults.api_keys,
            max_upload_bytes: defaults.max_upload_bytes,
            started_at: Instant::now(),
        }
    }

    /// Load both ONNX models named in the configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, InferenceError> {
        let image = OnnxImageModel::load(
            &config.image_model_path,
            config.image_shape,
            config.image_output,
        )?;
        let symptoms = OnnxSymptomModel::load(&config.symptom_model_path, config.symptom_output)?;
        let info = ModelInfo::new(&image, &symptoms);

        let symptoms = CachedSymptomModel::new(symptoms);

        Ok(AppState::new(Arc::new(image), Arc::new(symptoms), info)
            .with_rate_limit(config.rate_limit_per_minute)
            .with_api_keys(config.api_keys.clone())
            .with_max_upload_bytes(config.max_upload_bytes))
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.limiter = RateLimiter::per_minute(per_minute);
        self
    }

    pub fn with_api_keys(mut self, keys: Vec<String>) -> Self {
        self.api_keys = keys;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn is_authorized(&self, api_key: Option<&str>) -> bool {
        match api_key {
            Some(key) => self.api_keys.iter().any(|k| k == key),
            None => false,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Run one detection. Blocking; call from the blocking pool.
    ///
    /// Symptoms are checked before the upload is decoded so that a request
    /// missing inputs is refused with a warning rather than a decode error.
    pub fn detect(
        &self,
        mode: DetectionMode,
        input: &DetectionInput,
    ) -> Result<Detection, InferenceError> {
        match mode {
            DetectionMode::Symptoms => detect_symptoms(self.symptom_model.as_ref(), &input.observation),
            DetectionMode::Image => {
                let image = input.image.as_deref().map(decode_upload).transpose()?;
                detect_image(self.image_model.as_ref(), image.as_ref())
            }
            DetectionMode::Hybrid => {
                let image = if input.observation.any() {
                    input.image.as_deref().map(decode_upload).transpose()?
                } else {
                    None
                };
                detect_hybrid(
                    self.image_model.as_ref(),
                    self.symptom_model.as_ref(),
                    image.as_ref(),
                    &input.observation,
                )
            }
        }
    }
}
