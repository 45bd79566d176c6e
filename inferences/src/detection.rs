//! Detection workflows: validate inputs, run the classifiers, combine.
//!
//! Each workflow refuses with [`InferenceError::MissingInput`] before touching
//! a model when its required inputs are absent.

use chrono::Local;
use image::DynamicImage;

use crate::error::{InferenceError, Result};
use crate::inference::{ImageClassifier, SymptomClassifier};
use crate::preprocess::preprocess;
use crate::types::{Detection, DetectionMode, Observation, Prediction};

pub const MISSING_IMAGE: &str = "Please upload an image first.";
pub const MISSING_SYMPTOMS: &str = "Please select at least one symptom to check for Mastitis.";
pub const MISSING_HYBRID_INPUT: &str =
    "Hybrid prediction requires BOTH an uploaded image and at least one selected symptom.";

/// Arithmetic mean of the image and symptom probabilities
pub fn combine(image_probability: f32, symptom_probability: f32) -> f32 {
    (image_probability + symptom_probability) / 2.0
}

/// Image-only detection
pub fn detect_image(
    model: &dyn ImageClassifier,
    image: Option<&DynamicImage>,
) -> Result<Detection> {
    let image = image.ok_or_else(|| InferenceError::MissingInput(MISSING_IMAGE.to_string()))?;

    let prediction = predict_image(model, image)?;
    log::info!(
        "Image prediction: p={:.3} verdict={:?}",
        prediction.probability,
        prediction.verdict
    );

    Ok(Detection {
        mode: DetectionMode::Image,
        prediction,
        image: Some(prediction),
        symptoms: None,
        observed: Vec::new(),
        created_at: Local::now(),
    })
}

/// Symptom-only detection; at least one symptom must be selected
pub fn detect_symptoms(
    model: &dyn SymptomClassifier,
    observation: &Observation,
) -> Result<Detection> {
    if !observation.any() {
        return Err(InferenceError::MissingInput(MISSING_SYMPTOMS.to_string()));
    }

    let prediction = Prediction::new(model.predict(observation)?);
    log::info!(
        "Symptom prediction: p={:.3} symptoms={:?}",
        prediction.probability,
        observation.selected()
    );

    Ok(Detection {
        mode: DetectionMode::Symptoms,
        prediction,
        image: None,
        symptoms: Some(prediction),
        observed: observation.selected(),
        created_at: Local::now(),
    })
}

/// Hybrid detection averaging both classifiers
pub fn detect_hybrid(
    image_model: &dyn ImageClassifier,
    symptom_model: &dyn SymptomClassifier,
    image: Option<&DynamicImage>,
    observation: &Observation,
) -> Result<Detection> {
    let image = match image {
        Some(image) if observation.any() => image,
        _ => return Err(InferenceError::MissingInput(MISSING_HYBRID_INPUT.to_string())),
    };

    let image_prediction = predict_image(image_model, image)?;
    let symptom_prediction = Prediction::new(symptom_model.predict(observation)?);
    let prediction = Prediction::new(combine(
        image_prediction.probability,
        symptom_prediction.probability,
    ));

    log::info!(
        "Hybrid prediction: image={:.3} symptoms={:.3} final={:.3}",
        image_prediction.probability,
        symptom_prediction.probability,
        prediction.probability
    );

    Ok(Detection {
        mode: DetectionMode::Hybrid,
        prediction,
        image: Some(image_prediction),
        symptoms: Some(symptom_prediction),
        observed: observation.selected(),
        created_at: Local::now(),
    })
}

fn predict_image(model: &dyn ImageClassifier, image: &DynamicImage) -> Result<Prediction> {
    let tensor = preprocess(image, model.input_shape())?;
    Ok(Prediction::new(model.predict(&tensor)?))
}
