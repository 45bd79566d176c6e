//! # Mastitis inference
//!
//! Image and symptom classifiers for bovine mastitis, plus the hybrid score
//! that averages both.
//!
//! - `preprocess`: decoding uploads and shaping pixels for the image model
//! - `inference`: classifier traits and their ONNX implementations (tract)
//! - `detection`: image, symptom and hybrid workflows
//! - `types`: observations, predictions and verdicts

pub mod detection;
pub mod error;
pub mod inference;
pub mod preprocess;
pub mod types;

pub use detection::{combine, detect_hybrid, detect_image, detect_symptoms};
pub use error::{InferenceError, Result};
pub use inference::{
    get_stats, CachedSymptomModel, ImageClassifier, InferenceStats, ModelInfo, OnnxImageModel,
    OnnxSymptomModel, OutputActivation, SymptomClassifier,
};
pub use preprocess::{decode_upload, preprocess, ImageShape, ImageTensor};
pub use types::{
    Detection, DetectionMode, Observation, Prediction, Symptom, Verdict, SYMPTOM_COUNT, THRESHOLD,
};
