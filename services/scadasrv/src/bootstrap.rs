//! Service bootstrap
//!
//! Command-line arguments, configuration loading with CLI overrides, and the
//! wiring of pool, client, health policy, stores and scan cycle.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use common::service_bootstrap::{LoggingOptions, ServiceInfo};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{Result, ScadaError};
use crate::printsrv::{
    ConnectionPool, FrameCodec, PrintSrvClient, RequestExecutor, TcpConnectionFactory,
};
use crate::runtime::{ConnectionHealthPolicy, ScanCycle};
use crate::service::ScadaService;
use crate::store::{PendingWriteBuffer, SnapshotStore};

/// Service startup arguments
#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "SCADA bridge between PrintSrv and HTTP clients")]
pub struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, value_name = "FILE", env = "SCADASRV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bind address override (e.g., 127.0.0.1:8080)
    #[arg(short, long)]
    pub bind_address: Option<String>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(bind) = &self.bind_address {
            let (host, port) = bind
                .rsplit_once(':')
                .ok_or_else(|| ScadaError::config(format!("invalid bind address '{}'", bind)))?;
            config.service.api.host = host.to_string();
            config.service.api.port = port
                .parse()
                .map_err(|_| ScadaError::config(format!("invalid port in '{}'", bind)))?;
        }
        if let Some(level) = &self.log_level {
            config.service.logging.level = level.clone();
        }
        Ok(())
    }
}

pub fn create_service_info() -> ServiceInfo {
    ServiceInfo::new(
        "scadasrv",
        env!("CARGO_PKG_VERSION"),
        "SCADA Bridge - PrintSrv Protocol Gateway",
    )
}

/// Load, override and re-validate the configuration
pub fn load_configuration(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

pub fn logging_options(config: &AppConfig) -> LoggingOptions {
    let logging = &config.service.logging;
    LoggingOptions {
        level: logging.level.clone(),
        file: logging.file,
        dir: logging.dir.clone(),
        json: logging.json,
    }
}

pub type BridgeClient = PrintSrvClient<TcpConnectionFactory>;

/// Everything the binary needs to run the bridge
pub struct Bridge {
    pub pool: Arc<ConnectionPool<TcpConnectionFactory>>,
    pub service: Arc<ScadaService>,
    pub scan_cycle: Arc<ScanCycle<BridgeClient>>,
}

/// Build the PrintSrv side of the service
///
/// The pool is pre-populated here; if PrintSrv is down the bridge still
/// starts and keeps trying from the scan cycle.
pub async fn build_bridge(config: &AppConfig, shutdown: CancellationToken) -> Result<Bridge> {
    let printsrv = &config.printsrv;
    let codec = FrameCodec::for_label(&printsrv.charset)?;

    let factory = TcpConnectionFactory::new(
        printsrv.host.clone(),
        printsrv.port,
        codec,
        printsrv.connect_timeout(),
    );
    let pool = Arc::new(ConnectionPool::new(factory, printsrv.pool.size).await?);

    let client = Arc::new(PrintSrvClient::new(
        RequestExecutor::new(Arc::clone(&pool)),
        printsrv.device_name.clone(),
    ));

    let health = Arc::new(
        ConnectionHealthPolicy::new(printsrv.health_policy(), shutdown)
            .with_reset_hook(pool.clone()),
    );
    let buffer = Arc::new(PendingWriteBuffer::new());
    let store = Arc::new(SnapshotStore::new());

    let scan_cycle = Arc::new(ScanCycle::new(
        client,
        Arc::clone(&health),
        Arc::clone(&buffer),
        Arc::clone(&store),
        printsrv.polling_interval(),
    ));

    let service = Arc::new(
        ScadaService::new(printsrv.device_name.clone(), buffer, store, health)
            .with_pool_monitor(pool.clone())
            .with_cycle_stats(scan_cycle.stats()),
    );

    info!(
        "Bridge ready for {} at {} (charset {}, pool {})",
        printsrv.device_name,
        printsrv.endpoint(),
        codec.charset(),
        printsrv.pool.size
    );

    Ok(Bridge {
        pool,
        service,
        scan_cycle,
    })
}
