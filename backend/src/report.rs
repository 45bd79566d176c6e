//! PDF reports for completed detections.
//!
//! A report is first laid out as a list of [`ReportLine`]s, then drawn on a
//! single A4 page with the built-in Helvetica fonts.

use mastitis_inference::{Detection, DetectionMode};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use thiserror::Error;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const CONSULT_VET: &str =
    "Please consult a veterinary professional for confirmation and treatment.";

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const TITLE_SIZE: f32 = 22.0;
const BODY_SIZE: f32 = 12.0;
const LINE_HEIGHT_MM: f32 = 7.0;
const SPACER_MM: f32 = 5.0;
const WRAP_CHARS: usize = 85;
const PT_TO_MM: f32 = 0.3528;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to render PDF: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportLine {
    Title(String),
    /// Bold label followed by a value
    Field(String, String),
    Text(String),
    Bullet(String),
    Spacer,
}

fn field(label: &str, value: impl Into<String>) -> ReportLine {
    ReportLine::Field(label.to_string(), value.into())
}

fn percent(value: f32) -> String {
    format!("{:.2}%", value)
}

/// Logical content of the report for a detection
pub fn report_lines(detection: &Detection) -> Vec<ReportLine> {
    let mut lines = Vec::new();
    let result = detection.label();
    let confidence = percent(detection.prediction.confidence());

    match detection.mode {
        DetectionMode::Image => {
            lines.push(ReportLine::Title("Mastitis Detection Report".to_string()));
            lines.push(ReportLine::Spacer);
            lines.push(field("Detection Type", "Image-Based Detection"));
            lines.push(field("Prediction Result", result));
            lines.push(field("Confidence", confidence));
            lines.push(field("Recommendation", CONSULT_VET));
            lines.push(field("Date & Time", detection.timestamp()));
        }
        DetectionMode::Symptoms => {
            lines.push(ReportLine::Title("Mastitis Detection Report".to_string()));
            lines.push(ReportLine::Spacer);
            lines.push(field("Date & Time", detection.timestamp()));
            lines.push(field("Result", result));
            lines.push(field("Confidence", confidence));
            lines.push(field("Message", detection.explanation()));
            push_symptoms(&mut lines, detection, "Symptoms Observed");
        }
        DetectionMode::Hybrid => {
            lines.push(ReportLine::Title("Hybrid Mastitis Detection Report".to_string()));
            lines.push(ReportLine::Spacer);
            if let Some(image) = detection.image {
                lines.push(field("Image-Based Prediction", percent(image.percent())));
            }
            if let Some(symptoms) = detection.symptoms {
                lines.push(field("Symptoms-Based Prediction", percent(symptoms.percent())));
            }
            lines.push(field(
                "Hybrid Prediction",
                percent(detection.prediction.percent()),
            ));
            lines.push(ReportLine::Spacer);
            lines.push(field("Final Result", result));
            lines.push(field("Recommendation", detection.recommendation()));
            lines.push(ReportLine::Spacer);
            push_symptoms(&mut lines, detection, "Observed Symptoms");
            lines.push(ReportLine::Spacer);
            lines.push(field("Date & Time", detection.timestamp()));
        }
    }

    lines
}

fn push_symptoms(lines: &mut Vec<ReportLine>, detection: &Detection, heading: &str) {
    let observed = detection.observed_labels();
    if observed.is_empty() {
        lines.push(field(heading, "None"));
    } else {
        lines.push(ReportLine::Text(format!("{}:", heading)));
        lines.extend(observed.into_iter().map(|s| ReportLine::Bullet(s.to_string())));
    }
}

/// Render the report to PDF bytes
pub fn render_pdf(detection: &Detection) -> Result<Vec<u8>, ReportError> {
    let lines = report_lines(detection);
    let title = match lines.first() {
        Some(ReportLine::Title(title)) => title.clone(),
        _ => "Mastitis Detection Report".to_string(),
    };

    let (doc, page, layer) =
        PdfDocument::new(title.as_str(), Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Report");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Pdf(format!("{:?}", e)))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Pdf(format!("{:?}", e)))?;

    let canvas = Canvas {
        layer: doc.get_page(page).get_layer(layer),
        regular,
        bold,
    };

    let mut y = PAGE_HEIGHT_MM - MARGIN_MM - 5.0;
    for line in &lines {
        y = canvas.draw(line, y);
    }
    drop(canvas);

    doc.save_to_bytes()
        .map_err(|e| ReportError::Pdf(format!("{:?}", e)))
}

struct Canvas {
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Canvas {
    /// Draw one line with its top at `y`, returning the next baseline
    fn draw(&self, line: &ReportLine, y: f32) -> f32 {
        match line {
            ReportLine::Title(text) => {
                let x = ((PAGE_WIDTH_MM - text_width_mm(text, TITLE_SIZE)) / 2.0).max(MARGIN_MM);
                self.layer.use_text(text.as_str(), TITLE_SIZE, Mm(x), Mm(y), &self.bold);
                y - 12.0
            }
            ReportLine::Field(label, value) => {
                let label = format!("{}: ", label);
                let indent = text_width_mm(&label, BODY_SIZE);
                self.layer
                    .use_text(label.as_str(), BODY_SIZE, Mm(MARGIN_MM), Mm(y), &self.bold);

                let first_width = WRAP_CHARS.saturating_sub(label.len()).max(20);
                let mut y = y;
                for (i, chunk) in wrap(value, first_width, WRAP_CHARS).iter().enumerate() {
                    let x = if i == 0 { MARGIN_MM + indent } else { MARGIN_MM };
                    self.layer
                        .use_text(chunk.as_str(), BODY_SIZE, Mm(x), Mm(y), &self.regular);
                    y -= LINE_HEIGHT_MM;
                }
                y
            }
            ReportLine::Text(text) => {
                let mut y = y;
                for chunk in wrap(text, WRAP_CHARS, WRAP_CHARS) {
                    self.layer
                        .use_text(chunk, BODY_SIZE, Mm(MARGIN_MM), Mm(y), &self.bold);
                    y -= LINE_HEIGHT_MM;
                }
                y
            }
            ReportLine::Bullet(text) => {
                self.layer.use_text(
                    format!("- {}", text),
                    BODY_SIZE,
                    Mm(MARGIN_MM + 7.0),
                    Mm(y),
                    &self.regular,
                );
                y - LINE_HEIGHT_MM
            }
            ReportLine::Spacer => y - SPACER_MM,
        }
    }
}

/// Rough Helvetica width; builtin fonts carry no metrics here
fn text_width_mm(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5 * PT_TO_MM
}

/// Greedy word wrap; the first line may be narrower than the rest
fn wrap(text: &str, first_width: usize, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let limit = if lines.is_empty() { first_width } else { width };
        if !current.is_empty() && current.len() + 1 + word.len() > limit {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
