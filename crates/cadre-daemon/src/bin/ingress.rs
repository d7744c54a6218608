//! Ingress process (§2): the one HTTP surface external callers (the chat
//! bridge, the admin CLI) use to propose new missions. It never touches
//! mission steps — it only ever creates `mission_proposals` rows for the
//! dispatcher to promote.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use cadre_agents::mission::MissionEngine;
use cadre_core::store::Store;
use cadre_core::types::Priority;
use cadre_daemon::health;
use serde::Deserialize;

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
}

#[derive(Deserialize)]
struct CreateProposalRequest {
    title: String,
    description: String,
    #[serde(default)]
    urgent: bool,
    raw_message: Option<String>,
}

async fn create_proposal(
    State(state): State<AppState>,
    Json(body): Json<CreateProposalRequest>,
) -> impl IntoResponse {
    let engine = MissionEngine::new(&state.store);
    let priority = if body.urgent { Priority::Urgent } else { Priority::Normal };
    match engine
        .create_proposal(body.title, body.description, priority, None, body.raw_message)
        .await
    {
        Ok(proposal) => (StatusCode::CREATED, Json(proposal)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, store, health_state) = cadre_daemon::bootstrap("ingress").await?;
    let app_state = AppState { store };

    let app = Router::new()
        .route("/proposals", post(create_proposal))
        .with_state(app_state)
        .merge(health::router(health_state));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.daemon.health_port + 2)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
