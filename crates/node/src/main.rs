//! HNH node entry point.
//!
//! ```text
//! hnh-node [config-path]
//! ```
//!
//! The config path defaults to `$HNH_CONFIG`, then `~/.hnh/config.toml`.
//! A missing or malformed file is not an error: the node starts with the
//! documented defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hnh_common::NodeConfig;
use hnh_node::handlers::{self, AppState};
use hnh_node::{HttpReportSink, HttpTaskFeed, ModeController, NodeState, ResultReporter, Shutdown};

fn config_path() -> PathBuf {
    if let Some(arg) = env::args().nth(1) {
        return PathBuf::from(arg);
    }
    if let Ok(path) = env::var("HNH_CONFIG") {
        return PathBuf::from(path);
    }
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".hnh").join("config.toml"),
        None => PathBuf::from("hnh-config.toml"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = config_path();
    let config = NodeConfig::load(&config_path);
    info!(
        "node {} starting (coordinator {}, threshold ${})",
        config.node_id, config.coordinator_url, config.switch_threshold
    );

    let state = NodeState::new();
    let shutdown = Shutdown::new();
    let (admin_tx, admin_rx) = mpsc::channel(8);

    let feed = Arc::new(HttpTaskFeed::new(config.coordinator_url.clone()));
    let sink = Arc::new(HttpReportSink::new(config.coordinator_url.clone()));
    let reporter = ResultReporter::new(sink, config.node_id.clone(), state.clone());

    let app = Arc::new(AppState {
        node_id: config.node_id.clone(),
        state: state.clone(),
        admin_tx,
    });
    let http_addr = SocketAddr::from(([127, 0, 0, 1], config.http_port));

    let controller = ModeController::new(config_path, config, feed, reporter, state);

    let http = tokio::spawn(handlers::serve(http_addr, app, shutdown.clone()));
    let control = tokio::spawn(controller.run(admin_rx, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    shutdown.trigger();

    control.await??;
    http.await??;
    Ok(())
}
