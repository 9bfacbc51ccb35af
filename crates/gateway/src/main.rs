use anyhow::Context;

use warden_gateway::app::{GatewayServices, build_app};
use warden_gateway::config::GatewayConfig;
use warden_observability::ServiceInfo;

const SERVICE: &str = "warden-gateway";

fn main() -> anyhow::Result<()> {
    warden_observability::init();
    warden_observability::log_header(SERVICE, env!("CARGO_PKG_VERSION"));

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers.max(1))
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(config))
}

async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let services = GatewayServices::from_config(&config).context("failed to build gateway services")?;
    for service in services.forwarder.routing().services() {
        tracing::info!(service, "route registered");
    }
    let app = build_app(services);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    warden_observability::log_ready(&ServiceInfo {
        service: SERVICE,
        version: env!("CARGO_PKG_VERSION"),
        environment: config.environment.clone(),
        host: config.host.clone(),
        port: config.port,
        workers: config.workers,
        database: None,
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server error")?;

    warden_observability::log_shutdown(SERVICE);
    Ok(())
}
