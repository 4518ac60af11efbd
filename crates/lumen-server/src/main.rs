use anyhow::Result;
use clap::Parser;
use lumen_core::AppState;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.json_logs);

    let config = config::Config::load(&args.config)?;
    ensure_data_dirs(&config);

    let db = lumen_db::create_pool(&config.database.url, config.database.max_connections).await?;
    lumen_db::run_migrations(&db).await?;
    tracing::info!("Database ready");

    let state = AppState::new(db, config.app_config()?);
    spawn_session_sweeper(state.clone());
    spawn_presence_sweeper(state.clone());

    let app = lumen_api::build_router()
        .merge(lumen_ws::gateway_router())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!("Lumen listening on {}", config.server.bind_address);

    let shutdown_state = state.clone();
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
            tracing::info!("Shutdown signal received, closing sockets");
            // Sockets hold their connections open; wake them so graceful
            // shutdown can finish.
            shutdown_state.shutdown.notify_waiters();
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lumen=info,tower_http=debug"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn spawn_session_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.session_cleanup_interval);
        interval.tick().await; // skip immediate first tick
        loop {
            interval.tick().await;
            let evicted = state.sessions.sweep_expired();
            if evicted > 0 {
                tracing::info!(evicted, "expired sessions swept");
            }
        }
    });
}

fn spawn_presence_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.presence_sweep_interval);
        interval.tick().await; // skip immediate first tick
        loop {
            interval.tick().await;
            match state.presence.sweep().await {
                Ok(0) => {}
                Ok(demoted) => tracing::debug!(demoted, "idle users marked offline"),
                Err(e) => tracing::warn!("presence sweep failed: {e}"),
            }
        }
    });
}

fn ensure_data_dirs(config: &config::Config) {
    if let Some(path) = config.database.url.strip_prefix("sqlite://") {
        let file = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(file).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create database directory {:?}: {e}", parent);
                }
            }
        }
    }
}
