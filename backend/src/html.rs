//! Server-rendered pages.

use base64::Engine;
use mastitis_inference::{Detection, DetectionMode, Observation, Symptom};

use crate::report::PDF_CONTENT_TYPE;

#[derive(Debug, Clone)]
pub enum Outcome {
    /// Required input missing; nothing was computed
    Warning(String),
    Failure(String),
    Completed {
        detection: Detection,
        report: Option<Vec<u8>>,
    },
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<main class="app">
{body}
</main>
</body>
</html>"#,
        title = escape(title),
        body = body
    )
}

fn home_link() -> &'static str {
    r#"<div class="back"><a class="button" href="/">&#11013; Home</a></div>"#
}

pub fn home() -> String {
    let cards = [
        ("/image", "&#128444;&#65039; Image Detection", "Upload images of cattle to detect diseases"),
        ("/symptoms", "&#129658; Symptoms Detection", "Enter observed symptoms to predict disease"),
        ("/hybrid", "&#128256; Hybrid Detection", "Upload Image and Enter the symptoms"),
    ]
    .iter()
    .map(|(href, title, text)| {
        format!(
            r#"<a class="card" href="{}"><strong>{}</strong><span>{}</span></a>"#,
            href, title, text
        )
    })
    .collect::<Vec<_>>()
    .join("\n");

    let body = format!(
        r#"<nav class="navbar">
<span class="brand">&#128004; Cattle Care</span>
<div><a href="/">Home</a><a href="/about">About</a><a href="/contact">Contact</a></div>
</nav>
<header class="header">
<h1>CATTLE DISEASE DETECTION SYSTEM</h1>
<p>Detect diseases in cattle using images, symptoms, or a hybrid approach.</p>
</header>
<section class="cards">
{}
</section>"#,
        cards
    );

    layout("CATTLE DISEASE DETECTION SYSTEM", &body)
}

pub fn about(show_details: bool) -> String {
    let details = if show_details {
        r#"<section class="info-box">
<h2>About This App</h2>
<p>This application estimates the likelihood of mastitis in dairy cattle.</p>
<ul>
<li>Image detection runs a convolutional network on a photo of the udder.</li>
<li>Symptom detection scores six observed clinical signs.</li>
<li>Hybrid detection averages both scores into one result.</li>
</ul>
<p>Every result can be downloaded as a PDF report. Always confirm with a veterinarian.</p>
</section>"#
    } else {
        ""
    };

    let body = format!(
        r#"<h1 class="title-text">Welcome to Mastitis Detection</h1>
<form method="get" action="/about"><input type="hidden" name="show" value="true">
<button type="submit">About</button></form>
{}
{}"#,
        details,
        home_link()
    );

    layout("About", &body)
}

pub fn contact() -> String {
    let body = format!(
        r#"<h1 class="title-text">Contact Us</h1>
<p>Get in touch with us through the following details:</p>
<dl class="info-box">
<dt>Company Name</dt><dd>Cattle Care Diagnostics</dd>
<dt>Address</dt><dd>123, Demo Street, City, Country</dd>
<dt>Email</dt><dd><a href="mailto:contact@demoapp.com">contact@demoapp.com</a></dd>
<dt>Phone</dt><dd>+91 12345 67890</dd>
</dl>
{}"#,
        home_link()
    );

    layout("Contact Us", &body)
}

fn subtitle(mode: DetectionMode) -> &'static str {
    match mode {
        DetectionMode::Image => "Detect mastitis from udder images using CNN model",
        DetectionMode::Symptoms => "Select the symptoms observed in the cow",
        DetectionMode::Hybrid => "Detect mastitis using both image and symptom inputs",
    }
}

pub fn form_action(mode: DetectionMode) -> &'static str {
    match mode {
        DetectionMode::Image => "/image",
        DetectionMode::Symptoms => "/symptoms",
        DetectionMode::Hybrid => "/hybrid",
    }
}

fn symptom_checkboxes(observation: &Observation) -> String {
    let boxes = Symptom::ALL
        .iter()
        .zip(observation.flags())
        .map(|(symptom, checked)| {
            format!(
                r#"<label class="symptom"><input type="checkbox" name="{}"{}><span>{}</span></label>"#,
                symptom.key(),
                if checked { " checked" } else { "" },
                symptom.label()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "<h2>&#10004; Select Observed Symptoms</h2>\n<div class=\"symptoms\">\n{}\n</div>",
        boxes
    )
}

pub fn detection_page(
    mode: DetectionMode,
    observation: &Observation,
    outcome: Option<&Outcome>,
) -> String {
    let mut form = String::new();
    if mode != DetectionMode::Symptoms {
        form.push_str(
            r#"<label class="upload">&#128228; Upload Udder Image
<input type="file" name="image" accept=".jpg,.jpeg,.png,image/jpeg,image/png"></label>"#,
        );
    }
    if mode != DetectionMode::Image {
        form.push_str(&symptom_checkboxes(observation));
    }

    let body = format!(
        r#"{back}
<h1 class="title-text">{title}</h1>
<p class="subtitle">{subtitle}</p>
<form method="post" action="{action}" enctype="multipart/form-data">
{form}
<button type="submit">&#128269; Predict</button>
</form>
{outcome}"#,
        back = home_link(),
        title = mode.title(),
        subtitle = subtitle(mode),
        action = form_action(mode),
        form = form,
        outcome = outcome.map(render_outcome).unwrap_or_default()
    );

    layout(mode.title(), &body)
}

fn render_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Warning(message) => {
            format!(r#"<div class="alert warning">&#9888; {}</div>"#, escape(message))
        }
        Outcome::Failure(message) => format!(
            r#"<div class="alert error">Prediction failed: {}</div>"#,
            escape(message)
        ),
        Outcome::Completed { detection, report } => {
            let mut html = render_detection(detection);
            if let Some(bytes) = report {
                html.push_str(&download_link(detection.mode.report_filename(), bytes));
            }
            html
        }
    }
}

fn render_detection(detection: &Detection) -> String {
    let verdict_class = if detection.prediction.verdict.is_mastitis() {
        "error"
    } else {
        "success"
    };
    let icon = if detection.prediction.verdict.is_mastitis() {
        "&#9888;"
    } else {
        "&#9989;"
    };
    let confidence = detection.prediction.confidence();

    let mut html = String::new();
    match detection.mode {
        DetectionMode::Hybrid => {
            html.push_str("<h3>&#128270; Prediction Probabilities</h3>\n<ul class=\"probabilities\">");
            if let Some(image) = detection.image {
                html.push_str(&format!("<li>Image-based: {:.2}%</li>", image.percent()));
            }
            if let Some(symptoms) = detection.symptoms {
                html.push_str(&format!("<li>Symptoms-based: {:.2}%</li>", symptoms.percent()));
            }
            html.push_str(&format!(
                "<li>Hybrid: {:.2}%</li></ul>\n",
                detection.prediction.percent()
            ));
            html.push_str(&format!(
                r#"<div class="alert {}">{} {} (Hybrid Result)</div>"#,
                verdict_class,
                icon,
                detection.label()
            ));
        }
        _ => {
            html.push_str(&format!(
                r#"<h3>&#128270; Prediction Confidence</h3>
<div class="progress"><div style="width: {:.0}%"></div></div>
<div class="alert {}">{} {}<br>Confidence: {:.2}%</div>"#,
                confidence.clamp(0.0, 100.0),
                verdict_class,
                icon,
                detection.label(),
                confidence
            ));
        }
    }

    html.push_str(&format!(
        r#"
<div class="info-box"><b>Explanation:</b><br>{}"#,
        escape(detection.explanation())
    ));
    if detection.mode == DetectionMode::Image {
        let heading = if detection.prediction.verdict.is_mastitis() {
            "Recommended Action"
        } else {
            "Note"
        };
        html.push_str(&format!(
            "<br><br><b>{}:</b><br>{}",
            heading,
            escape(detection.recommendation())
        ));
    }
    html.push_str("</div>\n");
    html
}

/// Download link carrying the PDF inline, so nothing is kept server side
pub fn download_link(filename: &str, pdf: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(pdf);
    format!(
        r#"<a class="button download" download="{}" href="data:{};base64,{}">&#128196; Download Report</a>"#,
        filename, PDF_CONTENT_TYPE, encoded
    )
}

pub fn rate_limited() -> String {
    layout(
        "Too many requests",
        &format!(
            r#"<div class="alert warning">Too many requests. Please wait a minute and try again.</div>{}"#,
            home_link()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use mastitis_inference::Prediction;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_about_toggle() {
        assert!(!about(false).contains("About This App"));
        assert!(about(true).contains("About This App"));
    }

    #[test]
    fn test_symptom_page_keeps_checked_boxes() {
        let obs = Observation::from_symptoms([Symptom::Fever]);
        let html = detection_page(DetectionMode::Symptoms, &obs, None);

        assert!(html.contains(r#"name="fever" checked"#));
        assert!(html.contains(r#"name="redness">"#));
        assert!(!html.contains(r#"type="file""#));
    }

    #[test]
    fn test_image_page_has_no_checkboxes() {
        let html = detection_page(DetectionMode::Image, &Observation::default(), None);
        assert!(html.contains(r#"type="file" name="image""#));
        assert!(!html.contains("symptom"));
    }

    #[test]
    fn test_completed_outcome_links_report() {
        let detection = Detection {
            mode: DetectionMode::Image,
            prediction: Prediction::new(0.9),
            image: Some(Prediction::new(0.9)),
            symptoms: None,
            observed: vec![],
            created_at: Local::now(),
        };
        let outcome = Outcome::Completed {
            detection,
            report: Some(b"%PDF-1.3".to_vec()),
        };
        let html = detection_page(DetectionMode::Image, &Observation::default(), Some(&outcome));

        assert!(html.contains("Mastitis Detected"));
        assert!(html.contains("Confidence: 90.00%"));
        assert!(html.contains(r#"download="mastitis_detection_report.pdf""#));
        assert!(html.contains("data:application/pdf;base64,JVBERi0xLjM="));
    }

    #[test]
    fn test_failure_is_escaped() {
        let outcome = Outcome::Failure("<script>".to_string());
        let html = detection_page(DetectionMode::Hybrid, &Observation::default(), Some(&outcome));
        assert!(html.contains("Prediction failed: &lt;script&gt;"));
    }
}
