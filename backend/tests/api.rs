use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::http::header::CONTENT_TYPE;
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use serde_json::{json, Value};

use mastitis_inference::{
    CachedSymptomModel, ImageClassifier, ImageShape, ImageTensor, ModelInfo, Observation,
    SymptomClassifier,
};
use mastitis_web::routes;
use mastitis_web::AppState;

const BOUNDARY: &str = "----mastitis-test-boundary";

struct StubImage {
    probability: f32,
    calls: Arc<AtomicUsize>,
}

impl ImageClassifier for StubImage {
    fn input_shape(&self) -> ImageShape {
        ImageShape::new(16, 16, 3)
    }

    fn predict(&self, input: &ImageTensor) -> mastitis_inference::Result<f32> {
        assert_eq!(input.data().len(), 16 * 16 * 3);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probability)
    }
}

struct StubSymptoms {
    probability: f32,
    calls: Arc<AtomicUsize>,
}

impl SymptomClassifier for StubSymptoms {
    fn predict(&self, _observation: &Observation) -> mastitis_inference::Result<f32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probability)
    }
}

struct Harness {
    state: web::Data<AppState>,
    image_calls: Arc<AtomicUsize>,
    symptom_calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new(image_p: f32, symptom_p: f32) -> Self {
        Self::with_state(image_p, symptom_p, |s| s)
    }

    fn with_state(image_p: f32, symptom_p: f32, tweak: impl FnOnce(AppState) -> AppState) -> Self {
        let image_calls = Arc::new(AtomicUsize::new(0));
        let symptom_calls = Arc::new(AtomicUsize::new(0));
        let state = AppState::new(
            Arc::new(StubImage {
                probability: image_p,
                calls: image_calls.clone(),
            }),
            Arc::new(CachedSymptomModel::new(StubSymptoms {
                probability: symptom_p,
                calls: symptom_calls.clone(),
            })),
            ModelInfo::for_shape(ImageShape::new(16, 16, 3)),
        );

        Harness {
            state: web::Data::new(tweak(state)),
            image_calls,
            symptom_calls,
        }
    }

    fn model_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst) + self.symptom_calls.load(Ordering::SeqCst)
    }
}

macro_rules! app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data($harness.state.clone())
                .configure(routes::configure)
                .default_service(web::route().to(routes::not_found)),
        )
        .await
    };
}

fn png() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([200, 80, 90])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
    buf.into_inner()
}

enum Part<'a> {
    File(&'a str, Vec<u8>),
    Text(&'a str, &'a str),
}

fn multipart(parts: Vec<Part>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"udder.png\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&data);
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

fn multipart_request(uri: &str, parts: Vec<Part>) -> test::TestRequest {
    let (content_type, body) = multipart(parts);
    test::TestRequest::post()
        .uri(uri)
        .insert_header((CONTENT_TYPE, content_type))
        .set_payload(body)
}

fn approx(value: &Value, expected: f64) -> bool {
    value.as_f64().map(|v| (v - expected).abs() < 1e-4).unwrap_or(false)
}

#[actix_web::test]
async fn test_home_page() {
    let harness = Harness::new(0.5, 0.5);
    let app = app!(harness);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = test::read_body(resp).await;
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("CATTLE DISEASE DETECTION SYSTEM"));
    assert!(html.contains(r#"href="/hybrid""#));
}

#[actix_web::test]
async fn test_about_details_toggle() {
    let harness = Harness::new(0.5, 0.5);
    let app = app!(harness);

    let hidden = test::call_and_read_body(&app, test::TestRequest::get().uri("/about").to_request()).await;
    assert!(!String::from_utf8_lossy(&hidden).contains("About This App"));

    let shown = test::call_and_read_body(
        &app,
        test::TestRequest::get().uri("/about?show=true").to_request(),
    )
    .await;
    assert!(String::from_utf8_lossy(&shown).contains("About This App"));
}

#[actix_web::test]
async fn test_predict_symptoms() {
    let harness = Harness::new(0.9, 0.4);
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/predict/symptoms")
        .set_json(json!({"redness": true, "fever": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["result"], "Healthy Cow");
    assert_eq!(body["data"]["mode"], "symptoms");
    assert!(approx(&body["data"]["probability"], 0.4));
    assert!(approx(&body["data"]["confidence"], 60.0));
    assert_eq!(body["data"]["observed_symptoms"], json!(["Redness in Udder", "Fever"]));
    assert_eq!(harness.symptom_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.image_calls.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn test_predict_symptoms_requires_a_symptom() {
    let harness = Harness::new(0.9, 0.9);
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/predict/symptoms")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("at least one symptom"));
    assert_eq!(harness.model_calls(), 0);
}

#[actix_web::test]
async fn test_predict_hybrid_averages() {
    let harness = Harness::new(0.8, 0.4);
    let app = app!(harness);

    let req = multipart_request(
        "/api/predict/hybrid",
        vec![Part::File("image", png()), Part::Text("swelling", "on")],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["result"], "Mastitis Detected");
    assert!(approx(&body["data"]["probability"], 0.6));
    assert!(approx(&body["data"]["image_probability"], 0.8));
    assert!(approx(&body["data"]["symptom_probability"], 0.4));
    assert_eq!(body["data"]["observed_symptoms"], json!(["Swelling"]));
}

#[actix_web::test]
async fn test_predict_hybrid_refuses_without_inputs() {
    let harness = Harness::new(0.8, 0.4);
    let app = app!(harness);

    for parts in [
        vec![Part::Text("note", "nothing selected")],
        vec![Part::Text("fever", "on")],
        vec![Part::File("image", png())],
    ] {
        let resp = test::call_service(&app, multipart_request("/api/predict/hybrid", parts).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("BOTH"));
    }

    assert_eq!(harness.model_calls(), 0);
}

#[actix_web::test]
async fn test_predict_image_rejects_non_image() {
    let harness = Harness::new(0.8, 0.4);
    let app = app!(harness);

    let req = multipart_request(
        "/api/predict/image",
        vec![Part::File("image", b"plain text, not an image".to_vec())],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(harness.model_calls(), 0);
}

#[actix_web::test]
async fn test_upload_limit() {
    let harness = Harness::with_state(0.8, 0.4, |s| s.with_max_upload_bytes(16));
    let app = app!(harness);

    let req = multipart_request("/api/predict/image", vec![Part::File("image", png())]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[actix_web::test]
async fn test_page_keeps_symptoms_when_upload_too_large() {
    let harness = Harness::with_state(0.8, 0.4, |s| s.with_max_upload_bytes(16));
    let app = app!(harness);

    let req = multipart_request(
        "/hybrid",
        vec![Part::File("image", png()), Part::Text("redness", "on")],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let html = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
    assert!(html.contains("Upload exceeds the 16 byte limit"));
    assert!(html.contains(r#"name="redness" checked"#));
    assert_eq!(harness.model_calls(), 0);
}

#[actix_web::test]
async fn test_report_endpoints_return_pdf() {
    let harness = Harness::new(0.8, 0.4);
    let app = app!(harness);

    let requests = vec![
        (
            multipart_request(
                "/api/report/hybrid",
                vec![Part::File("image", png()), Part::Text("hardness", "on")],
            ),
            "hybrid_mastitis_report.pdf",
        ),
        (
            multipart_request("/api/report/image", vec![Part::File("image", png())]),
            "mastitis_detection_report.pdf",
        ),
        (
            test::TestRequest::post()
                .uri("/api/report/symptoms")
                .set_json(json!({"clots_in_milk": true})),
            "mastitis_detection_report.pdf",
        ),
    ];

    for (req, filename) in requests {
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/pdf");

        let disposition = resp
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("attachment"));
        assert!(disposition.contains(filename));

        let body = test::read_body(resp).await;
        assert!(!body.is_empty());
        assert!(body.starts_with(b"%PDF"));
    }
}

#[actix_web::test]
async fn test_hybrid_page_warns_on_missing_input() {
    let harness = Harness::new(0.8, 0.4);
    let app = app!(harness);

    let req = multipart_request("/hybrid", vec![Part::Text("redness", "on")]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let html = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
    assert!(html.contains("Hybrid prediction requires BOTH"));
    assert!(html.contains(r#"name="redness" checked"#));
    assert!(!html.contains("Download Report"));
    assert_eq!(harness.model_calls(), 0);
}

#[actix_web::test]
async fn test_image_page_offers_report() {
    let harness = Harness::new(0.2, 0.4);
    let app = app!(harness);

    let req = multipart_request("/image", vec![Part::File("image", png())]).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let html = String::from_utf8_lossy(&test::read_body(resp).await).to_string();
    assert!(html.contains("Healthy Udder"));
    assert!(html.contains("Confidence: 80.00%"));
    assert!(html.contains(r#"download="mastitis_detection_report.pdf""#));
    assert!(html.contains("data:application/pdf;base64,JVBER"));
}

#[actix_web::test]
async fn test_clear_cache_requires_key() {
    let harness = Harness::with_state(0.5, 0.5, |s| s.with_api_keys(vec!["secret".to_string()]));
    let app = app!(harness);

    for observation in [json!({"fever": true}), json!({"swelling": true}), json!({"fever": true})] {
        let req = test::TestRequest::post()
            .uri("/api/predict/symptoms")
            .set_json(observation)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
    assert_eq!(harness.symptom_calls.load(Ordering::SeqCst), 2);

    let resp = test::call_service(&app, test::TestRequest::post().uri("/api/clear-cache").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/clear-cache")
        .insert_header(("X-API-Key", "wrong"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/clear-cache")
        .insert_header(("X-API-Key", "secret"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"], "Cache cleared: 2 entries");
}

#[actix_web::test]
async fn test_rate_limit_per_client() {
    let harness = Harness::with_state(0.5, 0.7, |s| s.with_rate_limit(1));
    let app = app!(harness);
    let client: SocketAddr = "10.1.2.3:5000".parse().unwrap();

    let request = || {
        test::TestRequest::post()
            .uri("/api/predict/symptoms")
            .peer_addr(client)
            .set_json(json!({"fever": true}))
            .to_request()
    };

    assert_eq!(test::call_service(&app, request()).await.status(), StatusCode::OK);
    assert_eq!(
        test::call_service(&app, request()).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(harness.symptom_calls.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn test_metadata_endpoints() {
    let harness = Harness::new(0.5, 0.5);
    let app = app!(harness);

    let health: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
    assert_eq!(health["data"]["status"], "ok");

    let info: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/api/model-info").to_request(),
    )
    .await;
    assert_eq!(info["data"]["image_input_shape"], json!([1, 16, 16, 3]));
    assert_eq!(info["data"]["symptoms"].as_array().unwrap().len(), 6);

    let stats: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/stats").to_request()).await;
    assert_eq!(stats["success"], true);
    for key in ["image_predictions", "symptom_predictions", "cache_hits", "failures", "avg_inference_ms"] {
        assert!(stats["data"].get(key).is_some(), "missing {}", key);
    }

    let missing = test::call_service(&app, test::TestRequest::get().uri("/api/nope").to_request()).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_malformed_json_gets_envelope() {
    let harness = Harness::new(0.5, 0.5);
    let app = app!(harness);

    for uri in ["/api/predict/symptoms", "/api/report/symptoms"] {
        let req = test::TestRequest::post()
            .uri(uri)
            .set_json(json!({"redness": "yes"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json");

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    assert_eq!(harness.model_calls(), 0);
}
