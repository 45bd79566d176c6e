use std::time::Instant;

use mastitis_inference::{Detection, DetectionMode, Verdict};
use serde::Serialize;

#[derive(Debug, Serialize, Clone)]
pub struct PredictionResult {
    pub mode: DetectionMode,
    pub result: String,
    pub verdict: Verdict,
    pub probability: f32,
    pub confidence: f32,
    pub image_probability: Option<f32>,
    pub symptom_probability: Option<f32>,
    pub observed_symptoms: Vec<String>,
    pub explanation: String,
    pub recommendation: String,
    pub report_filename: String,
    pub timestamp: String,
}

impl From<&Detection> for PredictionResult {
    fn from(detection: &Detection) -> Self {
        PredictionResult {
            mode: detection.mode,
            result: detection.label().to_string(),
            verdict: detection.prediction.verdict,
            probability: detection.prediction.probability,
            confidence: detection.prediction.confidence(),
            image_probability: detection.image.map(|p| p.probability),
            symptom_probability: detection.symptoms.map(|p| p.probability),
            observed_symptoms: detection
                .observed_labels()
                .into_iter()
                .map(String::from)
                .collect(),
            explanation: detection.explanation().to_string(),
            recommendation: detection.recommendation().to_string(),
            report_filename: detection.mode.report_filename().to_string(),
            timestamp: detection.timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct HealthInfo {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: String,
    pub execution_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            execution_time_ms: None,
        }
    }

    pub fn error(message: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            execution_time_ms: None,
        }
    }

    pub fn timed(mut self, start: Instant) -> Self {
        self.execution_time_ms = Some(start.elapsed().as_millis() as u64);
        self
    }
}
