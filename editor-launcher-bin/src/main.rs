//! HTTP server for launching browser code editors.

use std::net::SocketAddr;
use std::sync::Arc;

use editor_runtime::api::editor_api_router;
use editor_runtime::launcher::check_docker_connection;
use editor_runtime::{DockerEngine, EditorLauncher, EditorRuntimeConfig, templates};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> editor_runtime::Result<()> {
    setup_log();

    let config = EditorRuntimeConfig::load().clone();
    info!(
        templates_dir = %config.templates_dir.display(),
        static_dir = %config.static_dir.display(),
        "Loaded editor runtime config"
    );
    for template in templates::all() {
        let dir = config.template_dir(template.name);
        if !dir.is_dir() {
            warn!(
                "Template {} has no build context at {}; launching it will fail until the image exists",
                template.name,
                dir.display()
            );
        }
    }

    let engine = Arc::new(DockerEngine::new(config.docker_host.clone()));

    // Requests re-check the daemon, so a failure here is not fatal.
    if let Err(err) = check_docker_connection(engine.as_ref()).await {
        warn!("Docker is not reachable yet: {err}");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let launcher = Arc::new(EditorLauncher::new(engine, config));
    let router = editor_api_router(launcher);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on http://localhost:{}", addr.port());

    if let Err(err) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Editor API error: {err}");
        return Err(err.into());
    }

    info!("Shutting down editor launcher");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}
