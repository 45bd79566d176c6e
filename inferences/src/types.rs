use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Probability above which a prediction is classified as mastitis.
/// The comparison is strict: exactly 0.5 is healthy.
pub const THRESHOLD: f32 = 0.5;

pub const SYMPTOM_COUNT: usize = 6;

/// Observable clinical signs, in the order the symptom model expects them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symptom {
    Redness,
    Swelling,
    Hardness,
    Fever,
    LowMilkYield,
    ClotsInMilk,
}

impl Symptom {
    pub const ALL: [Symptom; SYMPTOM_COUNT] = [
        Symptom::Redness,
        Symptom::Swelling,
        Symptom::Hardness,
        Symptom::Fever,
        Symptom::LowMilkYield,
        Symptom::ClotsInMilk,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Symptom::Redness => "Redness in Udder",
            Symptom::Swelling => "Swelling",
            Symptom::Hardness => "Hardness",
            Symptom::Fever => "Fever",
            Symptom::LowMilkYield => "Low Milk Yield",
            Symptom::ClotsInMilk => "Clots in Milk",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Symptom::Redness => "redness",
            Symptom::Swelling => "swelling",
            Symptom::Hardness => "hardness",
            Symptom::Fever => "fever",
            Symptom::LowMilkYield => "low_milk_yield",
            Symptom::ClotsInMilk => "clots_in_milk",
        }
    }

    pub fn from_key(key: &str) -> Option<Symptom> {
        Symptom::ALL.into_iter().find(|s| s.key() == key)
    }

    pub fn index(&self) -> usize {
        Symptom::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    pub redness: bool,
    pub swelling: bool,
    pub hardness: bool,
    pub fever: bool,
    pub low_milk_yield: bool,
    pub clots_in_milk: bool,
}

impl Observation {
    pub fn from_flags(flags: [bool; SYMPTOM_COUNT]) -> Self {
        Observation {
            redness: flags[0],
            swelling: flags[1],
            hardness: flags[2],
            fever: flags[3],
            low_milk_yield: flags[4],
            clots_in_milk: flags[5],
        }
    }

    pub fn from_symptoms<I: IntoIterator<Item = Symptom>>(symptoms: I) -> Self {
        let mut flags = [false; SYMPTOM_COUNT];
        for symptom in symptoms {
            flags[symptom.index()] = true;
        }
        Self::from_flags(flags)
    }

    pub fn flags(&self) -> [bool; SYMPTOM_COUNT] {
        [
            self.redness,
            self.swelling,
            self.hardness,
            self.fever,
            self.low_milk_yield,
            self.clots_in_milk,
        ]
    }

    pub fn set(&mut self, symptom: Symptom, value: bool) {
        let mut flags = self.flags();
        flags[symptom.index()] = value;
        *self = Self::from_flags(flags);
    }

    /// The 1x6 integer row fed to the symptom model
    pub fn to_array(&self) -> [i32; SYMPTOM_COUNT] {
        self.flags().map(i32::from)
    }

    /// Bit `i` set when symptom `i` is present
    pub fn mask(&self) -> u8 {
        self.flags()
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &on)| if on { acc | (1 << i) } else { acc })
    }

    pub fn any(&self) -> bool {
        self.flags().iter().any(|&on| on)
    }

    pub fn selected(&self) -> Vec<Symptom> {
        Symptom::ALL
            .into_iter()
            .zip(self.flags())
            .filter_map(|(symptom, on)| on.then_some(symptom))
            .collect()
    }

    pub fn selected_labels(&self) -> Vec<String> {
        self.selected()
            .iter()
            .map(|s| s.label().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Mastitis,
    Healthy,
}

impl Verdict {
    pub fn from_probability(probability: f32) -> Self {
        if probability > THRESHOLD {
            Verdict::Mastitis
        } else {
            Verdict::Healthy
        }
    }

    pub fn is_mastitis(&self) -> bool {
        matches!(self, Verdict::Mastitis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability: f32,
    pub verdict: Verdict,
}

impl Prediction {
    pub fn new(probability: f32) -> Self {
        Prediction {
            probability,
            verdict: Verdict::from_probability(probability),
        }
    }

    /// Probability of the chosen class, as a percentage
    pub fn confidence(&self) -> f32 {
        match self.verdict {
            Verdict::Mastitis => self.probability * 100.0,
            Verdict::Healthy => (1.0 - self.probability) * 100.0,
        }
    }

    pub fn percent(&self) -> f32 {
        self.probability * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Image,
    Symptoms,
    Hybrid,
}

impl DetectionMode {
    pub fn label(&self, verdict: Verdict) -> &'static str {
        match (self, verdict) {
            (_, Verdict::Mastitis) => "Mastitis Detected",
            (DetectionMode::Image, Verdict::Healthy) => "Healthy Udder",
            (_, Verdict::Healthy) => "Healthy Cow",
        }
    }

    pub fn explanation(&self, verdict: Verdict) -> &'static str {
        match (self, verdict) {
            (DetectionMode::Image, Verdict::Mastitis) => {
                "The model detected visual patterns associated with mastitis such as \
                 inflammation and texture abnormalities in the udder region."
            }
            (DetectionMode::Image, Verdict::Healthy) => {
                "No visible symptoms of mastitis were detected in the uploaded image."
            }
            (_, Verdict::Mastitis) => "Immediate veterinary consultation is advised.",
            (_, Verdict::Healthy) => "Continue regular monitoring of the cow's health.",
        }
    }

    pub fn recommendation(&self, verdict: Verdict) -> &'static str {
        match (self, verdict) {
            (DetectionMode::Image, Verdict::Mastitis) => {
                "Immediate veterinary consultation is advised."
            }
            (DetectionMode::Image, Verdict::Healthy) => "Regular monitoring is recommended.",
            (_, verdict) => self.explanation(verdict),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DetectionMode::Image => "Image-Based Mastitis Detection",
            DetectionMode::Symptoms => "Symptom-Based Mastitis Detection",
            DetectionMode::Hybrid => "Hybrid Mastitis Detection",
        }
    }

    pub fn report_filename(&self) -> &'static str {
        match self {
            DetectionMode::Hybrid => "hybrid_mastitis_report.pdf",
            _ => "mastitis_detection_report.pdf",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub mode: DetectionMode,
    /// Final prediction; for hybrid mode the averaged one
    pub prediction: Prediction,
    pub image: Option<Prediction>,
    pub symptoms: Option<Prediction>,
    pub observed: Vec<Symptom>,
    pub created_at: DateTime<Local>,
}

impl Detection {
    pub fn label(&self) -> &'static str {
        self.mode.label(self.prediction.verdict)
    }

    pub fn explanation(&self) -> &'static str {
        self.mode.explanation(self.prediction.verdict)
    }

    pub fn recommendation(&self) -> &'static str {
        self.mode.recommendation(self.prediction.verdict)
    }

    pub fn observed_labels(&self) -> Vec<&'static str> {
        self.observed.iter().map(|s| s.label()).collect()
    }

    pub fn timestamp(&self) -> String {
        self.created_at.format("%d-%m-%Y %H:%M:%S").to_string()
    }
}
