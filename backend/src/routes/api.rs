//! JSON API for the three detections, their PDF reports and model metadata.

use std::time::Instant;

use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use mastitis_inference::{get_stats, DetectionMode, Observation};

use crate::models::{ApiResponse, HealthInfo, PredictionResult};
use crate::report::PDF_CONTENT_TYPE;
use crate::routes::{run_detection, within_rate_limit, Failure};
use crate::state::AppState;
use crate::upload::{read_detection_form, DetectionInput};

pub const API_KEY_HEADER: &str = "X-API-Key";

pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success(HealthInfo {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    }))
}

pub async fn model_info(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success(state.model_info.clone()))
}

pub async fn stats() -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success(get_stats()))
}

fn rate_limited(start: Instant) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .json(ApiResponse::<()>::error("Rate limit exceeded").timed(start))
}

async fn predict(
    state: web::Data<AppState>,
    mode: DetectionMode,
    input: DetectionInput,
    start: Instant,
) -> HttpResponse {
    match run_detection(state, mode, input, false).await {
        Ok((detection, _)) => {
            let result = PredictionResult::from(&detection);
            HttpResponse::Ok().json(ApiResponse::success(result).timed(start))
        }
        Err(failure) => {
            failure.log(mode);
            failure.into_response(start)
        }
    }
}

async fn report(
    state: web::Data<AppState>,
    mode: DetectionMode,
    input: DetectionInput,
    start: Instant,
) -> HttpResponse {
    match run_detection(state, mode, input, true).await {
        Ok((detection, Some(pdf))) => {
            log::info!(
                "Rendered {} ({} bytes) in {} ms",
                mode.report_filename(),
                pdf.len(),
                start.elapsed().as_millis()
            );
            HttpResponse::Ok()
                .content_type(PDF_CONTENT_TYPE)
                .insert_header(ContentDisposition {
                    disposition: DispositionType::Attachment,
                    parameters: vec![DispositionParam::Filename(
                        detection.mode.report_filename().to_string(),
                    )],
                })
                .body(pdf)
        }
        Ok((_, None)) => Failure::Blocking("report was not rendered".to_string()).into_response(start),
        Err(failure) => {
            failure.log(mode);
            failure.into_response(start)
        }
    }
}

async fn read_form(
    state: &AppState,
    payload: Multipart,
    mode: DetectionMode,
    start: Instant,
) -> Result<DetectionInput, HttpResponse> {
    read_detection_form(payload, state.max_upload_bytes)
        .await
        .map_err(|e| {
            let failure = Failure::from(e);
            failure.log(mode);
            failure.into_response(start)
        })
}

pub async fn predict_symptoms(
    state: web::Data<AppState>,
    req: web::Json<Observation>,
    request: HttpRequest,
) -> impl Responder {
    let start = Instant::now();
    if !within_rate_limit(&state, &request) {
        return rate_limited(start);
    }

    let input = DetectionInput::from_observation(req.into_inner());
    predict(state, DetectionMode::Symptoms, input, start).await
}

pub async fn predict_image(
    state: web::Data<AppState>,
    payload: Multipart,
    request: HttpRequest,
) -> impl Responder {
    let start = Instant::now();
    if !within_rate_limit(&state, &request) {
        return rate_limited(start);
    }

    match read_form(&state, payload, DetectionMode::Image, start).await {
        Ok(input) => predict(state, DetectionMode::Image, input, start).await,
        Err(response) => response,
    }
}

pub async fn predict_hybrid(
    state: web::Data<AppState>,
    payload: Multipart,
    request: HttpRequest,
) -> impl Responder {
    let start = Instant::now();
    if !within_rate_limit(&state, &request) {
        return rate_limited(start);
    }

    match read_form(&state, payload, DetectionMode::Hybrid, start).await {
        Ok(input) => predict(state, DetectionMode::Hybrid, input, start).await,
        Err(response) => response,
    }
}

pub async fn report_symptoms(
    state: web::Data<AppState>,
    req: web::Json<Observation>,
    request: HttpRequest,
) -> impl Responder {
    let start = Instant::now();
    if !within_rate_limit(&state, &request) {
        return rate_limited(start);
    }

    let input = DetectionInput::from_observation(req.into_inner());
    report(state, DetectionMode::Symptoms, input, start).await
}

pub async fn report_image(
    state: web::Data<AppState>,
    payload: Multipart,
    request: HttpRequest,
) -> impl Responder {
    let start = Instant::now();
    if !within_rate_limit(&state, &request) {
        return rate_limited(start);
    }

    match read_form(&state, payload, DetectionMode::Image, start).await {
        Ok(input) => report(state, DetectionMode::Image, input, start).await,
        Err(response) => response,
    }
}

pub async fn report_hybrid(
    state: web::Data<AppState>,
    payload: Multipart,
    request: HttpRequest,
) -> impl Responder {
    let start = Instant::now();
    if !within_rate_limit(&state, &request) {
        return rate_limited(start);
    }

    match read_form(&state, payload, DetectionMode::Hybrid, start).await {
        Ok(input) => report(state, DetectionMode::Hybrid, input, start).await,
        Err(response) => response,
    }
}

pub async fn clear_cache(state: web::Data<AppState>, request: HttpRequest) -> impl Responder {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if !state.is_authorized(api_key) {
        log::warn!("Rejected cache clear: missing or invalid API key");
        return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid or missing API key"));
    }

    let cleared = state.symptom_model.clear_cache();
    log::info!("Symptom cache cleared: {} entries", cleared);
    HttpResponse::Ok().json(ApiResponse::success(format!("Cache cleared: {} entries", cleared)))
}
