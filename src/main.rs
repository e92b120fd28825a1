use maison_planning::{app, config::Config};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maison_planning=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "bad configuration");
            std::process::exit(2);
        }
    };

    let state = match app::AppState::from_config(&config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "could not build calendar client");
            std::process::exit(1);
        }
    };

    // First pass runs right away, then every sync_interval
    let sync_loop = state.scheduler.clone().spawn();

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %config.bind_addr, "bind failed");
            std::process::exit(1);
        }
    };

    info!(
        addr = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        interval_secs = config.sync_interval.as_secs(),
        "server running, API base /api"
    );

    if let Err(e) = axum::serve(listener, app::router(state)).await {
        error!(error = %e, "server error");
    }
    sync_loop.abort();
}
