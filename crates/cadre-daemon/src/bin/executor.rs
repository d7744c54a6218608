use std::sync::Arc;
use std::time::Duration;

use cadre_daemon::executor::Executor;
use cadre_daemon::health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, store, health_state) = cadre_daemon::bootstrap("executor").await?;
    let router = Arc::new(cadre_daemon::build_router(&cfg, store.clone()));
    let tools = Arc::new(cadre_daemon::build_tool_resolver());
    let executor = Executor::new(store, router, tools, health_state.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.daemon.health_port + 1)).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health::router(health_state)).await {
            tracing::error!(error = %e, "health server exited");
        }
    });

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.daemon.tick_interval_secs));
    loop {
        interval.tick().await;
        if let Err(e) = executor.tick().await {
            tracing::error!(error = %e, "executor tick failed");
        }
    }
}
