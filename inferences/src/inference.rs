use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::Serialize;
use tract_onnx::prelude::*;

use crate::error::{InferenceError, Result};
use crate::preprocess::{ImageShape, ImageTensor};
use crate::types::{Observation, Symptom, SYMPTOM_COUNT, THRESHOLD};

/// Classifier over preprocessed udder images
pub trait ImageClassifier: Send + Sync {
    fn input_shape(&self) -> ImageShape;

    /// P(mastitis) for one image
    fn predict(&self, input: &ImageTensor) -> Result<f32>;
}

/// Classifier over the six symptom flags
pub trait SymptomClassifier: Send + Sync {
    /// P(mastitis) for one observation
    fn predict(&self, observation: &Observation) -> Result<f32>;

    /// Drop any memoized predictions, returning how many were dropped
    fn clear_cache(&self) -> usize {
        0
    }
}

/// How to turn the raw model output into a probability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Model already ends in a sigmoid
    #[default]
    Probability,
    /// Model emits a logit
    Logit,
}

impl OutputActivation {
    fn apply(&self, raw: f32) -> f32 {
        match self {
            OutputActivation::Probability => raw,
            OutputActivation::Logit => 1.0 / (1.0 + (-raw).exp()),
        }
    }
}

impl FromStr for OutputActivation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "probability" | "sigmoid" => Ok(OutputActivation::Probability),
            "logit" | "logits" => Ok(OutputActivation::Logit),
            other => Err(format!("unknown model output '{}'", other)),
        }
    }
}

/// An optimized ONNX graph with a fixed single-input shape
pub struct OnnxModel {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    input_dims: Vec<usize>,
    activation: OutputActivation,
    path: PathBuf,
}

impl OnnxModel {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        input_dims: &[usize],
        activation: OutputActivation,
    ) -> Result<Self> {
        let path = model_path.as_ref().to_path_buf();
        let load_err = |e: TractError| InferenceError::ModelLoad(path.clone(), format!("{:#}", e));

        let shape: TVec<usize> = input_dims.iter().copied().collect();
        let model = tract_onnx::onnx()
            .model_for_path(&path)
            .map_err(load_err)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        log::info!("Loaded ONNX model {:?} with input {:?}", path, input_dims);

        Ok(Self {
            model,
            input_dims: input_dims.to_vec(),
            activation,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn input_dims(&self) -> &[usize] {
        &self.input_dims
    }

    pub fn activation(&self) -> OutputActivation {
        self.activation
    }

    /// Run the graph on `data` and read the first output scalar as a probability
    pub fn run(&self, data: &[f32]) -> Result<f32> {
        let input = Tensor::from_shape(&self.input_dims, data)
            .map_err(|e| InferenceError::Model(format!("{:#}", e)))?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Model(format!("{:#}", e)))?;

        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::InvalidOutput("model returned no outputs".to_string()))?;
        let raw: f32 = *output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::InvalidOutput(format!("{:#}", e)))?
            .iter()
            .next()
            .ok_or_else(|| InferenceError::InvalidOutput("empty output tensor".to_string()))?;

        to_probability(self.activation.apply(raw))
    }
}

/// Reject non-finite values and clamp into [0, 1]
pub fn to_probability(value: f32) -> Result<f32> {
    if !value.is_finite() {
        return Err(InferenceError::InvalidOutput(format!(
            "non-finite probability {}",
            value
        )));
    }
    Ok(value.clamp(0.0, 1.0))
}

/// CNN over udder images
pub struct OnnxImageModel {
    onnx: OnnxModel,
    shape: ImageShape,
}

impl OnnxImageModel {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        shape: ImageShape,
        activation: OutputActivation,
    ) -> Result<Self> {
        let onnx = OnnxModel::load(model_path, &shape.batch_dims(), activation)?;
        Ok(Self { onnx, shape })
    }

    pub fn onnx(&self) -> &OnnxModel {
        &self.onnx
    }
}

impl ImageClassifier for OnnxImageModel {
    fn input_shape(&self) -> ImageShape {
        self.shape
    }

    fn predict(&self, input: &ImageTensor) -> Result<f32> {
        if input.shape() != self.shape {
            return Err(InferenceError::Model(format!(
                "input shape {:?} does not match model shape {:?}",
                input.batch_dims(),
                self.shape.batch_dims()
            )));
        }

        let start = Instant::now();
        let result = self.onnx.run(input.data());
        STATS.record(ModelKind::Image, &result, start);
        result
    }
}

/// Dense network over the symptom flags
pub struct OnnxSymptomModel {
    onnx: OnnxModel,
}

impl OnnxSymptomModel {
    pub fn load<P: AsRef<Path>>(model_path: P, activation: OutputActivation) -> Result<Self> {
        let onnx = OnnxModel::load(model_path, &[1, SYMPTOM_COUNT], activation)?;
        Ok(Self { onnx })
    }

    pub fn onnx(&self) -> &OnnxModel {
        &self.onnx
    }
}

impl SymptomClassifier for OnnxSymptomModel {
    fn predict(&self, observation: &Observation) -> Result<f32> {
        let row = observation.to_array().map(|flag| flag as f32);
        self.onnx.run(&row)
    }
}

/// Memoizes a symptom classifier by flag mask and counts its runs.
///
/// Only six flags exist, so the cache never holds more than 64 entries.
pub struct CachedSymptomModel<C> {
    inner: C,
    cache: DashMap<u8, f32>,
}

impl<C: SymptomClassifier> CachedSymptomModel<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: SymptomClassifier> SymptomClassifier for CachedSymptomModel<C> {
    fn predict(&self, observation: &Observation) -> Result<f32> {
        let mask = observation.mask();
        if let Some(hit) = self.cache.get(&mask) {
            STATS.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*hit);
        }

        let start = Instant::now();
        let result = self.inner.predict(observation);
        STATS.record(ModelKind::Symptoms, &result, start);

        let probability = result?;
        self.cache.insert(mask, probability);
        Ok(probability)
    }

    fn clear_cache(&self) -> usize {
        let cleared = self.cache.len();
        self.cache.clear();
        log::debug!("Cleared {} cached symptom predictions", cleared);
        cleared
    }
}

#[derive(Debug, Clone, Copy)]
enum ModelKind {
    Image,
    Symptoms,
}

/// Process-wide inference counters
#[derive(Default)]
struct Stats {
    image_predictions: AtomicU64,
    symptom_predictions: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
    total_inference_us: AtomicU64,
}

impl Stats {
    fn record(&self, kind: ModelKind, result: &Result<f32>, start: Instant) {
        let elapsed = start.elapsed().as_micros() as u64;
        self.total_inference_us.fetch_add(elapsed, Ordering::Relaxed);
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match kind {
            ModelKind::Image => self.image_predictions.fetch_add(1, Ordering::Relaxed),
            ModelKind::Symptoms => self.symptom_predictions.fetch_add(1, Ordering::Relaxed),
        };
    }
}

static STATS: Lazy<Stats> = Lazy::new(Stats::default);

/// Snapshot of the inference counters
#[derive(Debug, Clone, Serialize)]
pub struct InferenceStats {
    pub image_predictions: u64,
    pub symptom_predictions: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub total_inference_ms: f64,
    pub avg_inference_ms: f64,
}

pub fn get_stats() -> InferenceStats {
    let image_predictions = STATS.image_predictions.load(Ordering::Relaxed);
    let symptom_predictions = STATS.symptom_predictions.load(Ordering::Relaxed);
    let failures = STATS.failures.load(Ordering::Relaxed);
    let total_inference_ms = STATS.total_inference_us.load(Ordering::Relaxed) as f64 / 1000.0;
    let runs = image_predictions + symptom_predictions + failures;

    InferenceStats {
        image_predictions,
        symptom_predictions,
        cache_hits: STATS.cache_hits.load(Ordering::Relaxed),
        failures,
        total_inference_ms,
        avg_inference_ms: if runs == 0 {
            0.0
        } else {
            total_inference_ms / runs as f64
        },
    }
}

/// Description of the loaded models
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub image_model: Option<PathBuf>,
    pub image_input_shape: Vec<usize>,
    pub image_output: OutputActivation,
    pub symptom_model: Option<PathBuf>,
    pub symptom_input_shape: Vec<usize>,
    pub symptom_output: OutputActivation,
    pub threshold: f32,
    pub symptoms: Vec<String>,
    pub version: String,
}

impl ModelInfo {
    pub fn new(image: &OnnxImageModel, symptoms: &OnnxSymptomModel) -> Self {
        ModelInfo {
            image_model: Some(image.onnx().path().to_path_buf()),
            image_input_shape: image.onnx().input_dims().to_vec(),
            image_output: image.onnx().activation(),
            symptom_model: Some(symptoms.onnx().path().to_path_buf()),
            symptom_input_shape: symptoms.onnx().input_dims().to_vec(),
            symptom_output: symptoms.onnx().activation(),
            ..ModelInfo::for_shape(image.input_shape())
        }
    }

    /// Info for classifiers that are not backed by model files
    pub fn for_shape(shape: ImageShape) -> Self {
        ModelInfo {
            image_model: None,
            image_input_shape: shape.batch_dims().to_vec(),
            image_output: OutputActivation::Probability,
            symptom_model: None,
            symptom_input_shape: vec![1, SYMPTOM_COUNT],
            symptom_output: OutputActivation::Probability,
            threshold: THRESHOLD,
            symptoms: Symptom::ALL.iter().map(|s| s.label().to_string()).collect(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
