use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use mastitis_inference::{DetectionMode, Observation};
use serde::Deserialize;

use crate::html::{self, Outcome};
use crate::routes::{run_detection, within_rate_limit, Failure};
use crate::state::AppState;
use crate::upload::read_detection_form;

const HTML: &str = "text/html; charset=utf-8";

fn page(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type(HTML).body(body)
}

pub async fn home() -> impl Responder {
    page(html::home())
}

#[derive(Debug, Default, Deserialize)]
pub struct AboutQuery {
    #[serde(default)]
    show: bool,
}

pub async fn about(query: web::Query<AboutQuery>) -> impl Responder {
    page(html::about(query.show))
}

pub async fn contact() -> impl Responder {
    page(html::contact())
}

pub async fn image_form() -> impl Responder {
    page(html::detection_page(DetectionMode::Image, &Observation::default(), None))
}

pub async fn symptoms_form() -> impl Responder {
    page(html::detection_page(DetectionMode::Symptoms, &Observation::default(), None))
}

pub async fn hybrid_form() -> impl Responder {
    page(html::detection_page(DetectionMode::Hybrid, &Observation::default(), None))
}

/// Handle a submitted detection form and render the page with its outcome
async fn submit(
    state: web::Data<AppState>,
    payload: Multipart,
    request: HttpRequest,
    mode: DetectionMode,
) -> HttpResponse {
    if !within_rate_limit(&state, &request) {
        return HttpResponse::TooManyRequests()
            .content_type(HTML)
            .body(html::rate_limited());
    }

    let input = match read_detection_form(payload, state.max_upload_bytes).await {
        Ok(input) => input,
        Err(rejected) => {
            let observation = rejected.observation;
            let failure = Failure::from(rejected);
            failure.log(mode);
            let outcome = Outcome::Failure(failure.message());
            return HttpResponse::build(failure.status())
                .content_type(HTML)
                .body(html::detection_page(mode, &observation, Some(&outcome)));
        }
    };

    let observation = input.observation;
    let outcome = match run_detection(state, mode, input, true).await {
        Ok((detection, report)) => Outcome::Completed { detection, report },
        Err(failure) => {
            failure.log(mode);
            if failure.is_warning() {
                Outcome::Warning(failure.message())
            } else {
                Outcome::Failure(failure.message())
            }
        }
    };

    page(html::detection_page(mode, &observation, Some(&outcome)))
}

pub async fn image_submit(
    state: web::Data<AppState>,
    payload: Multipart,
    request: HttpRequest,
) -> impl Responder {
    submit(state, payload, request, DetectionMode::Image).await
}

pub async fn symptoms_submit(
    state: web::Data<AppState>,
    payload: Multipart,
    request: HttpRequest,
) -> impl Responder {
    submit(state, payload, request, DetectionMode::Symptoms).await
}

pub async fn hybrid_submit(
    state: web::Data<AppState>,
    payload: Multipart,
    request: HttpRequest,
) -> impl Responder {
    submit(state, payload, request, DetectionMode::Hybrid).await
}
