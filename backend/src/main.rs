use actix_cors::Cors;
use actix_files::Files;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use log::{error, info, warn};

use mastitis_web::routes::{self, api::API_KEY_HEADER};
use mastitis_web::{AppConfig, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    info!("Starting mastitis detection server v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env().context("invalid configuration")?;

    let state = match AppState::from_config(&config) {
        Ok(state) => {
            info!("Image model loaded from {:?}", config.image_model_path);
            info!("Symptom model loaded from {:?}", config.symptom_model_path);
            state
        }
        Err(e) => {
            error!("{}", e);
            return Err(e).context("failed to load models");
        }
    };
    if config.api_keys.is_empty() {
        warn!("API_KEYS is empty; /api/clear-cache will reject every request");
    }
    if !config.static_dir.exists() {
        warn!("Static directory {:?} not found; pages will render unstyled", config.static_dir);
    }

    let state = web::Data::new(state);
    let bind_address = config.bind_address();
    let origin = format!("http://{}", bind_address);
    let local_origin = format!("http://localhost:{}", config.port);
    let static_dir = config.static_dir.clone();

    info!("Server listening on http://{}", bind_address);
    info!("Workers: {}", config.workers);
    info!("Pages: /  /image  /symptoms  /hybrid  /about  /contact");
    info!("API endpoints:");
    info!("   GET  /api/health");
    info!("   GET  /api/model-info");
    info!("   GET  /api/stats");
    info!("   POST /api/predict/{{image,symptoms,hybrid}}");
    info!("   POST /api/report/{{image,symptoms,hybrid}}");
    info!("   POST /api/clear-cache   ({} required)", API_KEY_HEADER);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&origin)
            .allowed_origin(&local_origin)
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::HeaderName::from_static("x-api-key"),
            ])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .wrap(cors)
            .app_data(state.clone())
            .configure(routes::configure)
            .service(Files::new("/static", &static_dir).prefer_utf8(true))
            .default_service(web::route().to(routes::not_found))
    })
    .workers(config.workers)
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
