//! Unified service bootstrap utilities
//!
//! Startup banner and the standard logging setup shared by service binaries.

use std::path::PathBuf;

use crate::logging::{self, LogConfig};
use tracing::info;

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "scadasrv")
    pub name: String,
    /// Service version
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Print the startup banner
pub fn print_startup_banner(service: &ServiceInfo, endpoints: &[(&str, String)]) {
    info!("========================================");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    for (label, value) in endpoints {
        info!(" {:<10} {}", label, value);
    }
    info!("========================================");
}

/// Logging options a service passes through from its own configuration
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Enable the rolling file sink
    pub file: bool,
    /// Root log directory; the service name is appended
    pub dir: String,
    /// JSON output for the file sink
    pub json: bool,
}

/// Initialize logging for a service with standard configuration
///
/// Files go to `<dir>/<service>/` when enabled.
pub fn init_logging(service: &ServiceInfo, options: &LoggingOptions) -> anyhow::Result<()> {
    let log_dir = options
        .file
        .then(|| PathBuf::from(&options.dir).join(&service.name));

    let level = if options.level.trim().is_empty() {
        "info".to_string()
    } else {
        options.level.clone()
    };

    logging::init_with_config(LogConfig {
        service_name: service.name.clone(),
        log_dir,
        level,
        enable_json: options.json,
    })
    .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
