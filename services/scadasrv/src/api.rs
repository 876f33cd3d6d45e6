//! HTTP adapter
//!
//! axum router over the upstream facade. The adapter never talks to PrintSrv;
//! it only queues writes and serves the latest snapshot.

pub mod dto;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use crate::service::ScadaService;

pub use routes::{create_routes, ApiDoc};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScadaService>,
}

impl AppState {
    pub fn new(service: Arc<ScadaService>) -> Self {
        Self { service }
    }
}
