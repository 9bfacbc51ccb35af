use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use warden_iam::app::build_app;
use warden_iam::bootstrap::bootstrap;
use warden_iam::config::IamConfig;
use warden_iam::manager::UserManager;
use warden_infra::{
    IdentityProvider, InMemoryUserRepository, KeycloakClient, PostgresUserRepository, UserRepository,
};
use warden_observability::ServiceInfo;

const SERVICE: &str = "warden-iam";
const READY_ATTEMPTS: u32 = 30;
const READY_DELAY: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    warden_observability::init();
    warden_observability::log_header(SERVICE, env!("CARGO_PKG_VERSION"));

    let config = match IamConfig::from_env() {
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

async fn repository(config: &IamConfig) -> anyhow::Result<(Arc<dyn UserRepository>, Option<String>)> {
    match config.database_url.as_deref() {
        Some(url) => {
            let repo = PostgresUserRepository::connect(url)
                .await
                .context("failed to connect to database")?;
            repo.ensure_schema().await.context("failed to ensure schema")?;
            Ok((Arc::new(repo), Some("postgres".to_string())))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, user records are kept in memory");
            Ok((Arc::new(InMemoryUserRepository::new()), Some("in-memory".to_string())))
        }
    }
}

async fn run(config: IamConfig) -> anyhow::Result<()> {
    let (repo, database) = repository(&config).await?;

    let keycloak = KeycloakClient::new(config.keycloak.clone()).context("failed to build keycloak client")?;
    keycloak
        .wait_until_ready(READY_ATTEMPTS, READY_DELAY)
        .await
        .context("keycloak unavailable")?;
    keycloak.initialize_realm().await.context("failed to initialize realm")?;
    let idp: Arc<dyn IdentityProvider> = Arc::new(keycloak);

    let manager = Arc::new(UserManager::new(repo, idp, config.system_admin.user_name.clone()));
    bootstrap(&manager, &config.system_admin)
        .await
        .context("bootstrap failed")?;

    let app = build_app(manager);

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
        database,
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
