use axum::{extract::State, routing::get, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{context::ServerContext, Router};

/// A quick overview of the running server.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub uptime_secs: u64,
    /// Sessions currently open
    pub sessions: usize,
    /// Gateway connections currently attached
    pub connections: usize,
}

#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "health",
    responses(
        (status = 200, body = Health)
    )
)]
async fn health(State(context): State<ServerContext>) -> Json<Health> {
    let coordinator = &context.coordinator;

    Json(Health {
        status: "ok",
        uptime_secs: context.started_at.elapsed().as_secs(),
        sessions: coordinator.sessions().len(),
        connections: coordinator.broadcaster().connection_count(),
    })
}

pub fn router() -> Router {
    Router::new().route("/health", get(health))
}
