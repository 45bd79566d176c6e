//! Multipart form handling for detection requests.

use actix_multipart::{Multipart, MultipartError};
use futures_util::StreamExt;
use mastitis_inference::{Observation, Symptom};
use thiserror::Error;

/// Image field name in detection forms
pub const IMAGE_FIELD: &str = "image";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Malformed upload: {0}")]
    Multipart(String),

    #[error("Upload exceeds the {0} byte limit")]
    TooLarge(usize),
}

/// Raw inputs of one detection request
#[derive(Debug, Clone, Default)]
pub struct DetectionInput {
    pub image: Option<Vec<u8>>,
    pub observation: Observation,
}

impl DetectionInput {
    pub fn from_observation(observation: Observation) -> Self {
        DetectionInput {
            image: None,
            observation,
        }
    }
}

/// A form that could not be used, with the checkboxes read from it
#[derive(Debug)]
pub struct RejectedForm {
    pub error: UploadError,
    pub observation: Observation,
}

/// Read the `image` file field and symptom checkboxes from a multipart form.
///
/// An empty file field counts as no upload; unknown fields are ignored. An
/// oversized field is drained and dropped so later checkboxes are still read.
pub async fn read_detection_form(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<DetectionInput, RejectedForm> {
    let mut input = DetectionInput::default();
    let mut too_large = false;

    while let Some(item) = payload.next().await {
        let reject = |e: MultipartError, observation: Observation| RejectedForm {
            error: UploadError::Multipart(e.to_string()),
            observation,
        };
        let mut field = item.map_err(|e| reject(e, input.observation))?;
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();

        let mut data = Vec::new();
        let mut oversized = false;
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| reject(e, input.observation))?;
            if oversized || data.len() + chunk.len() > max_bytes {
                oversized = true;
                data.clear();
                continue;
            }
            data.extend_from_slice(&chunk);
        }

        if oversized {
            log::debug!("Dropped oversized form field '{}'", name);
            too_large = true;
        } else if name == IMAGE_FIELD {
            if !data.is_empty() {
                input.image = Some(data);
            }
        } else if let Some(symptom) = Symptom::from_key(&name) {
            input.observation.set(symptom, is_checked(&data));
        } else {
            log::debug!("Ignoring form field '{}'", name);
        }
    }

    if too_large {
        return Err(RejectedForm {
            error: UploadError::TooLarge(max_bytes),
            observation: input.observation,
        });
    }
    Ok(input)
}

/// Checkbox value sent by browsers ("on") or API clients
fn is_checked(value: &[u8]) -> bool {
    let value = String::from_utf8_lossy(value);
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}
