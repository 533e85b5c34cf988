use clap::Parser;
use tokio::net::TcpListener;

use forward_proxy::admin;
use forward_proxy::config::{loader, CliArgs};
use forward_proxy::lifecycle::{wait_for_signal, Shutdown};
use forward_proxy::observability::{logging, metrics};
use forward_proxy::HttpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config = match loader::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("INIT ERROR: {}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.observability)?;

    tracing::info!(
        port = %config.listener.bind_address,
        workers = config.workers.max_concurrent,
        timeout_ms = config.timeouts.attempt_ms,
        "forward-proxy v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config.clone());

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let dispatcher = server.dispatcher();
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, dispatcher, admin_shutdown).await {
                tracing::error!(error = %e, "Admin listener failed");
            }
        });
    }

    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
            tracing::warn!("HTTP server exited without a shutdown signal");
            return Ok(());
        }
        signal = wait_for_signal() => {
            let signal = signal?;
            tracing::info!(signal, "Shutdown signal received");
        }
    }

    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
