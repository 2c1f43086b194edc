//! Simulador Clínico 3280 · Backend
//!
//! - Axum HTTP + WebSocket API (one WebSocket connection drives one session)
//! - OpenAI integration for case generation and order evaluation (via environment variables)
//! - PDF report export
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables OpenAI integration if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_CASE_MODEL   : default "gpt-4o-mini"
//!   OPENAI_EVAL_MODEL   : default "gpt-4o"
//!   OPENAI_TIMEOUT_SECS : request timeout, default 60
//!   AGENT_CONFIG_PATH   : path to TOML config (prompts + session settings)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod client;
mod openai;
mod timer;
mod workflow;
mod export;
mod protocol;
mod logic;
mod state;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::new());
  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "simulador", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "simulador", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "simulador", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}
