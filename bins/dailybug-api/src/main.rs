mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use dailybug_common::config::{Config, LanguageConfigManager};
use dailybug_grader::{FileProblemStore, Grader, HttpSandbox, ProblemCache};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

pub struct AppState {
    pub grader: Grader,
    pub problems: ProblemCache,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("dailybug API booting...");

    let config = Config::from_env();

    let languages = LanguageConfigManager::load_or_builtin(&config.languages_config).map_err(|e| {
        error!("Failed to load language configurations: {:#}", e);
        e
    })?;
    info!("Loaded language configurations for: {:?}", languages.list_languages());

    let sandbox = HttpSandbox::new(config.sandbox_url.as_str())
        .context("Failed to build sandbox HTTP client")?;
    info!(
        sandbox_url = %config.sandbox_url,
        timeout_ms = config.sandbox_timeout_ms,
        "Sandbox configured"
    );

    let store = FileProblemStore::new(config.problems_path.clone());
    let problems = ProblemCache::new(Arc::new(store), config.problem_cache_ttl());
    info!(
        problems_path = %config.problems_path.display(),
        ttl_secs = config.problem_cache_ttl_secs,
        "Problem store configured"
    );

    // Warm the cache; a missing problem is not fatal at boot
    if let Err(e) = problems.today().await {
        warn!(error = %e, "Could not load today's problem at startup");
    }

    let state = Arc::new(AppState {
        grader: Grader::new(Arc::new(sandbox), languages, config.sandbox_timeout()),
        problems,
    });

    let app = routes::routes().with_state(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, draining connections...");
}
