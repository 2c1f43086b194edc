//! HTTP endpoint handlers. Thin wrappers; the session itself only lives on the WebSocket.

use axum::{
  http::{header, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use chrono::Local;
use tracing::{error, info, instrument};

use crate::export::{export_report, ReportInput};
use crate::protocol::*;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info")]
pub async fn http_get_topics() -> impl IntoResponse { Json(topics_out()) }

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
  (status, Json(ErrorOut { error: message.into() })).into_response()
}

/// Render a report from a finished attempt sent by the client.
#[instrument(level = "info", skip(body), fields(case_id = %body.case.id, orders_len = body.orders.len()))]
pub async fn http_post_report(Json(body): Json<ReportIn>) -> Response {
  if !body.student.is_complete() {
    return error_response(StatusCode::BAD_REQUEST, "Nombre y número de cédula son obligatorios.");
  }
  let input = ReportInput {
    student: &body.student,
    case: &body.case,
    orders: &body.orders,
    evaluation: &body.evaluation,
  };
  match export_report(&input, Local::now()) {
    Ok(file) => {
      info!(target: "export", filename = %file.filename, bytes = file.bytes.len(), "HTTP report served");
      (
        [
          (header::CONTENT_TYPE, file.mime.to_string()),
          (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file.filename)),
        ],
        file.bytes,
      )
        .into_response()
    }
    Err(e) => {
      error!(target: "export", error = %e, "HTTP report failed");
      error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::body::{to_bytes, Body};
  use axum::http::Request;
  use std::sync::Arc;
  use tower::ServiceExt;

  use crate::config::SessionSettings;
  use crate::routes::build_router;
  use crate::state::AppState;
  use crate::workflow::tests::{pepito, sample_case, sample_evaluation};

  fn app() -> axum::Router {
    build_router(Arc::new(AppState::with_model(None, SessionSettings::default())))
  }

  fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
      .method("POST")
      .uri(uri)
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap()
  }

  #[tokio::test]
  async fn health_and_topics() {
    let res = app().oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], br#"{"ok":true}"#);

    let res = app().oneshot(Request::get("/api/v1/topics").body(Body::empty()).unwrap()).await.unwrap();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let topics: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(topics.as_array().unwrap().len(), 5);
    assert_eq!(topics[2]["label"], "Atención del parto");
  }

  #[tokio::test]
  async fn report_returns_pdf_attachment() {
    let body = serde_json::json!({
      "student": pepito(),
      "case": sample_case(),
      "orders": "Hemograma, parcial de orina, control en 1 semana.",
      "evaluation": sample_evaluation(),
    });
    let res = app().oneshot(post_json("/api/v1/report", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");
    let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"Reporte_Caso_123456789_"));
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
  }

  #[tokio::test]
  async fn report_without_identity_is_rejected() {
    let body = serde_json::json!({
      "student": { "name": "", "idNumber": "" },
      "case": sample_case(),
      "evaluation": sample_evaluation(),
    });
    let res = app().oneshot(post_json("/api/v1/report", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(v["error"].as_str().unwrap().contains("obligatorios"));
  }
}
