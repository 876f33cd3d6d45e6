//! Shared service plumbing for the SCADA bridge services
//!
//! Provides basic functions shared by all services, including:
//! - logging initialisation and runtime level control (with admin handlers)
//! - graceful shutdown signal handling
//! - unified API response envelopes
//! - lenient serde helpers for loosely typed upstream payloads

#[cfg(feature = "axum")]
pub mod admin_api;
pub mod api_types;
pub mod logging;
pub mod serde_helpers;
pub mod service_bootstrap;
pub mod shutdown;

// Re-export commonly used API types
pub use api_types::{ErrorInfo, ErrorResponse, SuccessResponse};

// Re-export AppError when axum feature is enabled
#[cfg(feature = "axum")]
pub use api_types::AppError;

// Re-export common dependencies
pub use anyhow;
pub use serde;
pub use serde_json;
pub use tokio;
