//! HTTP surface of the node.
//!
//! Read-only observability for the presentation layer:
//! - `GET /health` — liveness plus the reporting-health flag
//! - `GET /status` — current mode, bound task, today's earnings
//!
//! Operator/admin channel:
//! - `POST /admin/cancel` — abandon the bound task, force return to mining
//! - `POST /admin/reload` — re-load the configuration file
//!
//! Admin posts only enqueue an [`AdminCommand`]; the control loop is the
//! sole actor that touches workers or config, so the HTTP layer can never
//! race it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use crate::controller::AdminCommand;
use crate::state::{NodeState, Shutdown};

/// Shared state handed to every handler.
pub struct AppState {
    pub node_id: String,
    pub state: Arc<NodeState>,
    pub admin_tx: mpsc::Sender<AdminCommand>,
}

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResp {
    pub healthy: bool,
    pub node_id: String,
    /// False when recent report deliveries were dropped.
    pub reporting_ok: bool,
    pub mode: String,
}

/// Bound task portion of the status response.
#[derive(Debug, Serialize)]
pub struct TaskResp {
    pub id: u64,
    pub reward: f64,
    pub algorithm: String,
}

/// GET /status response.
#[derive(Debug, Serialize)]
pub struct StatusResp {
    pub node_id: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskResp>,
    pub earnings_today: f64,
    pub uptime_secs: u64,
    pub reporting_ok: bool,
}

/// POST /admin/* response.
#[derive(Debug, Serialize)]
pub struct AdminResp {
    pub queued: bool,
}

pub fn router(app: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/admin/cancel", post(admin_cancel))
        .route("/admin/reload", post(admin_reload))
        .with_state(app)
}

async fn health(State(app): State<Arc<AppState>>) -> Json<HealthResp> {
    let snap = app.state.snapshot();
    Json(HealthResp {
        healthy: true,
        node_id: app.node_id.clone(),
        reporting_ok: app.state.report_healthy(),
        mode: snap.mode.to_string(),
    })
}

async fn status(State(app): State<Arc<AppState>>) -> Json<StatusResp> {
    let snap = app.state.snapshot();
    Json(StatusResp {
        node_id: app.node_id.clone(),
        mode: snap.mode.to_string(),
        task: snap.task.map(|t| TaskResp {
            id: t.id,
            reward: t.reward,
            algorithm: t.algorithm,
        }),
        earnings_today: app.state.earnings_today(),
        uptime_secs: app.state.uptime_secs(),
        reporting_ok: app.state.report_healthy(),
    })
}

async fn admin_cancel(State(app): State<Arc<AppState>>) -> (StatusCode, Json<AdminResp>) {
    enqueue(&app, AdminCommand::Cancel).await
}

async fn admin_reload(State(app): State<Arc<AppState>>) -> (StatusCode, Json<AdminResp>) {
    enqueue(&app, AdminCommand::Reload).await
}

async fn enqueue(app: &AppState, cmd: AdminCommand) -> (StatusCode, Json<AdminResp>) {
    match app.admin_tx.send(cmd).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(AdminResp { queued: true })),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(AdminResp { queued: false })),
    }
}

/// Serves the router until shutdown.
pub async fn serve(addr: SocketAddr, app: Arc<AppState>, shutdown: Arc<Shutdown>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, app, shutdown).await
}

/// Serves on an already bound listener (tests bind to an ephemeral port).
pub async fn serve_on(
    listener: TcpListener,
    app: Arc<AppState>,
    shutdown: Arc<Shutdown>,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("status server listening on {}", addr);
    }
    axum::serve(listener, router(app))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    Ok(())
}
