//! WebSocket upgrade + session loop. Each connection owns one `SessionController`.
//! The loop waits on the socket and on countdown events at the same time; every client
//! message gets an immediate reply, and model calls get a second message when they finish.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, error, info, instrument};

use crate::logic::{ReportError, SessionController, TimerOutcome};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;
use crate::workflow::{SubmitMode, WorkflowError};

/// Slow work to run after the immediate reply has been sent.
#[derive(Debug, PartialEq, Eq)]
enum FollowUp {
  LoadCase,
  Evaluate,
}

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "simulador", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "simulador", "WebSocket connected");
  let mut ctl = state.new_session();

  if send(&mut socket, &ServerWsMessage::Session { session: ctl.view() }).await.is_err() {
    return;
  }

  loop {
    let (reply, follow_up) = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "simulador", "WS received: {:?}", &msg);
            handle_client_ws(msg, &mut ctl)
          }
          Err(e) => (ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }, None),
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => continue,
        Some(Err(e)) => {
          error!(target: "simulador", error = %e, "WS receive error");
          break;
        }
      },
      Some(event) = ctl.next_timer_event() => match ctl.on_timer(event) {
        TimerOutcome::Ignored => continue,
        TimerOutcome::Tick(remaining) => (ServerWsMessage::tick(remaining), None),
        TimerOutcome::Expired => (ServerWsMessage::Session { session: ctl.view() }, Some(FollowUp::Evaluate)),
      },
    };

    if let Err(e) = send(&mut socket, &reply).await {
      error!(target: "simulador", error = %e, "WS send error");
      break;
    }
    if let Some(step) = follow_up {
      let done = run_follow_up(step, &mut ctl).await;
      if let Err(e) = send(&mut socket, &done).await {
        error!(target: "simulador", error = %e, "WS send error");
        break;
      }
    }
  }
  // Dropping the controller aborts any running countdown.
  info!(target: "simulador", phase = ?ctl.phase(), "WebSocket disconnected");
}

fn session_or_rejected(result: Result<crate::protocol::SessionView, WorkflowError>) -> ServerWsMessage {
  match result {
    Ok(session) => ServerWsMessage::Session { session },
    Err(e) => {
      debug!(target: "simulador", error = %e, "WS action rejected");
      ServerWsMessage::Rejected { reason: e.to_string() }
    }
  }
}

/// Apply one client message. Returns the immediate reply and, for model calls, the step
/// that must run afterwards.
fn handle_client_ws(msg: ClientWsMessage, ctl: &mut SessionController) -> (ServerWsMessage, Option<FollowUp>) {
  match msg {
    ClientWsMessage::Ping => (ServerWsMessage::Pong, None),
    ClientWsMessage::Snapshot => (ServerWsMessage::Session { session: ctl.view() }, None),
    ClientWsMessage::EnterRegistration => (session_or_rejected(ctl.enter_registration()), None),
    ClientWsMessage::CancelRegistration => (session_or_rejected(ctl.cancel_registration()), None),

    ClientWsMessage::StartCase { student, topic } => match ctl.register(student, topic) {
      Ok(session) => (ServerWsMessage::Session { session }, Some(FollowUp::LoadCase)),
      Err(e) => (ServerWsMessage::Rejected { reason: e.to_string() }, None),
    },

    ClientWsMessage::UpdateOrders { text } => (session_or_rejected(ctl.update_orders(text)), None),

    ClientWsMessage::SubmitOrders => match ctl.submit(SubmitMode::Manual) {
      Ok(session) => (ServerWsMessage::Session { session }, Some(FollowUp::Evaluate)),
      Err(e) => (ServerWsMessage::Rejected { reason: e.to_string() }, None),
    },

    ClientWsMessage::Restart => (session_or_rejected(ctl.restart()), None),

    ClientWsMessage::ExportReport => match ctl.export_report() {
      Ok(file) => {
        info!(target: "export", filename = %file.filename, bytes = file.bytes.len(), "WS report served");
        let msg = ServerWsMessage::Report {
          filename: file.filename,
          mime: file.mime.to_string(),
          data_base64: STANDARD.encode(&file.bytes),
        };
        (msg, None)
      }
      Err(ReportError::Workflow(e)) => (ServerWsMessage::Rejected { reason: e.to_string() }, None),
      Err(ReportError::Export(e)) => {
        error!(target: "export", error = %e, "WS report failed");
        (ServerWsMessage::Error { message: e.to_string() }, None)
      }
    },
  }
}

async fn run_follow_up(step: FollowUp, ctl: &mut SessionController) -> ServerWsMessage {
  let session = match step {
    FollowUp::LoadCase => ctl.load_case().await,
    FollowUp::Evaluate => ctl.evaluate().await,
  };
  ServerWsMessage::Session { session }
}
