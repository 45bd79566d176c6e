//! Server configuration read from the environment.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use mastitis_inference::{ImageShape, OutputActivation};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub image_model_path: PathBuf,
    pub symptom_model_path: PathBuf,
    pub image_shape: ImageShape,
    pub image_output: OutputActivation,
    pub symptom_output: OutputActivation,
    pub max_upload_bytes: usize,
    /// Requests per client per minute on prediction routes; 0 disables the limit
    pub rate_limit_per_minute: u32,
    /// Keys accepted in `X-API-Key` for admin routes; empty disables them
    pub api_keys: Vec<String>,
    pub static_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: num_cpus::get(),
            image_model_path: PathBuf::from("models/final_cnn_model1.onnx"),
            symptom_model_path: PathBuf::from("models/symptom1_model.onnx"),
            image_shape: ImageShape::default(),
            image_output: OutputActivation::Probability,
            symptom_output: OutputActivation::Probability,
            max_upload_bytes: 10 * 1024 * 1024,
            rate_limit_per_minute: 100,
            api_keys: Vec::new(),
            static_dir: PathBuf::from("./static"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let height = parse_var(&lookup, "IMAGE_HEIGHT", defaults.image_shape.height)?;
        let width = parse_var(&lookup, "IMAGE_WIDTH", defaults.image_shape.width)?;
        let channels = parse_var(&lookup, "IMAGE_CHANNELS", defaults.image_shape.channels)?;
        if height == 0 || width == 0 {
            return Err(ConfigError::Invalid {
                key: "IMAGE_HEIGHT/IMAGE_WIDTH".to_string(),
                value: format!("{}x{}", height, width),
                reason: "dimensions must be positive".to_string(),
            });
        }
        if channels != 1 && channels != 3 {
            return Err(ConfigError::Invalid {
                key: "IMAGE_CHANNELS".to_string(),
                value: channels.to_string(),
                reason: "Unsupported channels, expected 1 or 3".to_string(),
            });
        }

        let workers = parse_var(&lookup, "WORKERS", defaults.workers)?.max(1);
        let max_upload_mb: usize = parse_var(&lookup, "MAX_UPLOAD_MB", 10)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::Invalid {
                key: "MAX_UPLOAD_MB".to_string(),
                value: max_upload_mb.to_string(),
                reason: "too large".to_string(),
            })?;

        let api_keys = lookup("API_KEYS")
            .map(|keys| {
                keys.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(AppConfig {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            workers,
            image_model_path: lookup("IMAGE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.image_model_path),
            symptom_model_path: lookup("SYMPTOM_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.symptom_model_path),
            image_shape: ImageShape::new(height, width, channels),
            image_output: parse_var(&lookup, "IMAGE_MODEL_OUTPUT", defaults.image_output)?,
            symptom_output: parse_var(&lookup, "SYMPTOM_MODEL_OUTPUT", defaults.symptom_output)?,
            max_upload_bytes,
            rate_limit_per_minute: parse_var(
                &lookup,
                "RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute,
            )?,
            api_keys,
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}
