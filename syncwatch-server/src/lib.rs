//! HTTP and WebSocket surface of a syncwatch coordinator.

use std::{
    future::Future,
    net::{Ipv6Addr, SocketAddr},
};

use axum::routing::get;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod auth;
mod config;
mod context;
mod docs;
mod errors;
mod gateway;
mod health;
mod protocol;
mod schemas;
mod serialized;
mod sessions;

pub use config::*;
pub use context::ServerContext;

pub type Router = axum::Router<ServerContext>;

/// Serves the gateway and HTTP API on the given port until `shutdown` resolves.
pub async fn run_server<F>(context: ServerContext, port: u16, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .merge(gateway::router())
        .merge(sessions::router())
        .merge(health::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, root_router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}
