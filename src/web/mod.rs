pub mod api;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::notifications::NotificationManager;
use crate::store::Store;

/// Shared state handed to every route handler. Read-only: the API never
/// mutates trading state, only reports it (spec §6 ENABLE_API surface).
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Store>,
    pub notifications: Arc<NotificationManager>,
}

/// Builds the inspection API router and serves it on `port` until the
/// future is dropped. Only called when `ENABLE_API=true`.
pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let app: Router = api::router().with_state(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("inspection API listening on :{port}");
    axum::serve(listener, app).await?;
    Ok(())
}
