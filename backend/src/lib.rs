//! Web interface and JSON API for mastitis detection.
//!
//! Pages and API routes share the same detection path: the upload is read,
//! the classifiers run on the blocking pool, and the PDF report is rendered
//! in memory.

pub mod config;
pub mod html;
pub mod models;
pub mod rate_limit;
pub mod report;
pub mod routes;
pub mod state;
pub mod upload;

pub use config::AppConfig;
pub use state::AppState;
