//! SCADA bridge service entry point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use scadasrv::api::{create_routes, AppState};
use scadasrv::bootstrap::{self, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let service_info = bootstrap::create_service_info();

    let config = bootstrap::load_configuration(&args)?;

    // Validation mode: validate and exit
    if args.validate {
        println!(
            "Configuration OK: PrintSrv {} (device {}), API {}",
            config.printsrv.endpoint(),
            config.printsrv.device_name,
            config.bind_address()
        );
        return Ok(());
    }

    common::service_bootstrap::init_logging(&service_info, &bootstrap::logging_options(&config))?;
    common::service_bootstrap::print_startup_banner(
        &service_info,
        &[
            ("API", format!("http://{}", config.bind_address())),
            ("PrintSrv", config.printsrv.endpoint()),
            ("Device", config.printsrv.device_name.clone()),
            ("Polling", format!("{}ms", config.printsrv.polling.interval_ms)),
        ],
    );

    let shutdown_token = CancellationToken::new();
    let signal_handle = common::shutdown::cancel_on_shutdown(shutdown_token.clone());

    let bridge = bootstrap::build_bridge(&config, shutdown_token.clone()).await?;

    // Scan cycle
    let cycle = Arc::clone(&bridge.scan_cycle);
    let cycle_token = shutdown_token.clone();
    let cycle_handle = tokio::spawn(async move { cycle.run(cycle_token).await });

    // API server
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_address()))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()
    } else {
        tokio::net::TcpSocket::new_v6()
    }
    .context("Failed to create socket")?;
    socket
        .set_reuseaddr(true)
        .context("Failed to set SO_REUSEADDR")?;
    socket
        .bind(addr)
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let listener = socket.listen(1024).context("Failed to listen")?;

    let app = create_routes(
        AppState::new(Arc::clone(&bridge.service)),
        &config.service.api.cors_allowed_origins,
    );

    info!("API server listening on http://{}", addr);

    let server_token = shutdown_token.clone();
    let server = serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await });
    if let Err(e) = server.await {
        error!("Server error: {}", e);
        shutdown_token.cancel();
    }

    // Shutdown: scan cycle first, then sockets
    info!("Shutting down");
    if let Err(e) = cycle_handle.await {
        error!("Scan cycle task failed: {}", e);
    }
    bridge.pool.shutdown().await;
    signal_handle.abort();

    info!("{} stopped", service_info.name);
    Ok(())
}
