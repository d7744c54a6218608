use std::str::FromStr;
use std::time::Duration;

use cadre_daemon::{dispatcher::Dispatcher, health};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, store, health_state) = cadre_daemon::bootstrap("dispatcher").await?;
    let timezone = chrono_tz::Tz::from_str(&cfg.general.timezone).unwrap_or(chrono_tz::UTC);
    let dispatcher = Dispatcher::new(store, timezone, health_state.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.daemon.health_port)).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health::router(health_state)).await {
            tracing::error!(error = %e, "health server exited");
        }
    });

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.daemon.tick_interval_secs));
    loop {
        interval.tick().await;
        if let Err(e) = dispatcher.tick(&cfg).await {
            tracing::error!(error = %e, "dispatcher tick failed");
        }
    }
}
