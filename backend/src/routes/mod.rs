pub mod api;
pub mod pages;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use mastitis_inference::{Detection, DetectionMode, InferenceError};

use crate::models::ApiResponse;
use crate::report::{self, ReportError};
use crate::state::AppState;
use crate::upload::{DetectionInput, RejectedForm, UploadError};

/// Why a detection request did not complete
#[derive(Debug)]
pub enum Failure {
    Inference(InferenceError),
    Upload(UploadError),
    Report(ReportError),
    Blocking(String),
}

impl Failure {
    pub fn status(&self) -> StatusCode {
        match self {
            Failure::Inference(e) if e.is_missing_input() => StatusCode::BAD_REQUEST,
            Failure::Inference(e) if e.is_bad_image() => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Failure::Inference(_) | Failure::Report(_) | Failure::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Failure::Upload(UploadError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            Failure::Upload(UploadError::Multipart(_)) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Failure::Inference(e) if e.is_missing_input())
    }

    pub fn message(&self) -> String {
        match self {
            Failure::Inference(e) => e.to_string(),
            Failure::Upload(e) => e.to_string(),
            Failure::Report(e) => e.to_string(),
            Failure::Blocking(e) => e.clone(),
        }
    }

    pub fn log(&self, mode: DetectionMode) {
        if self.is_warning() {
            log::warn!("{:?} detection refused: {}", mode, self.message());
        } else {
            log::error!("{:?} detection failed: {}", mode, self.message());
        }
    }

    pub fn into_response(self, start: std::time::Instant) -> HttpResponse {
        HttpResponse::build(self.status())
            .json(ApiResponse::<()>::error(&self.message()).timed(start))
    }
}

impl From<UploadError> for Failure {
    fn from(e: UploadError) -> Self {
        Failure::Upload(e)
    }
}

impl From<RejectedForm> for Failure {
    fn from(rejected: RejectedForm) -> Self {
        Failure::from(rejected.error)
    }
}

/// Run a detection, and optionally render its report, on the blocking pool
pub async fn run_detection(
    state: web::Data<AppState>,
    mode: DetectionMode,
    input: DetectionInput,
    with_report: bool,
) -> Result<(Detection, Option<Vec<u8>>), Failure> {
    web::block(move || {
        let detection = state.detect(mode, &input).map_err(Failure::Inference)?;
        let report = if with_report {
            Some(report::render_pdf(&detection).map_err(Failure::Report)?)
        } else {
            None
        };
        Ok::<_, Failure>((detection, report))
    })
    .await
    .map_err(|e| Failure::Blocking(e.to_string()))?
}

/// Count the request against its client; requests without a peer address pass
pub fn within_rate_limit(state: &AppState, request: &HttpRequest) -> bool {
    match request.peer_addr() {
        Some(addr) => {
            let client = addr.ip().to_string();
            let allowed = state.limiter.check(&client);
            if !allowed {
                log::warn!("Rate limit exceeded for {}", client);
            }
            allowed
        }
        None => true,
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(pages::home))
        .route("/about", web::get().to(pages::about))
        .route("/contact", web::get().to(pages::contact))
        .route("/image", web::get().to(pages::image_form))
        .route("/image", web::post().to(pages::image_submit))
        .route("/symptoms", web::get().to(pages::symptoms_form))
        .route("/symptoms", web::post().to(pages::symptoms_submit))
        .route("/hybrid", web::get().to(pages::hybrid_form))
        .route("/hybrid", web::post().to(pages::hybrid_submit))
        .service(
            web::scope("/api")
                .app_data(web::JsonConfig::default().error_handler(json_error))
                .route("/health", web::get().to(api::health_check))
                .route("/model-info", web::get().to(api::model_info))
                .route("/stats", web::get().to(api::stats))
                .route("/predict/image", web::post().to(api::predict_image))
                .route("/predict/symptoms", web::post().to(api::predict_symptoms))
                .route("/predict/hybrid", web::post().to(api::predict_hybrid))
                .route("/report/image", web::post().to(api::report_image))
                .route("/report/symptoms", web::post().to(api::report_symptoms))
                .route("/report/hybrid", web::post().to(api::report_hybrid))
                .route("/clear-cache", web::post().to(api::clear_cache)),
        );
}

/// Malformed JSON bodies still answer with the API envelope
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::warn!("Rejected JSON body: {}", err);
    let response = HttpResponse::BadRequest()
        .json(ApiResponse::<()>::error(&format!("Invalid request body: {}", err)));
    InternalError::from_response(err, response).into()
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::error("Endpoint not found"))
}
