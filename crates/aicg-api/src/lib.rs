//! HTTP controller for the pipeline core.
//!
//! Operational surface only: submit and observe jobs, inspect chapter
//! state, browse and select generation history. Authentication and the
//! user-facing product API live elsewhere.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::{create_router, init_metrics};
pub use state::AppState;
