//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{ClinicalCase, ClinicalTopic, EvaluationResult, ScoreTier, StudentInfo};
use crate::timer::{format_clock, is_urgent};
use crate::workflow::{Phase, Session};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Snapshot,
    EnterRegistration,
    CancelRegistration,
    StartCase {
        #[serde(default)]
        student: Option<StudentInfo>,
        topic: ClinicalTopic,
    },
    UpdateOrders {
        text: String,
    },
    SubmitOrders,
    Restart,
    ExportReport,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionView,
    },
    Tick {
        #[serde(rename = "remainingSecs")]
        remaining_secs: u32,
        clock: String,
        urgent: bool,
    },
    Rejected {
        reason: String,
    },
    Report {
        filename: String,
        mime: String,
        #[serde(rename = "dataBase64")]
        data_base64: String,
    },
    Error {
        message: String,
    },
}

impl ServerWsMessage {
    pub fn tick(remaining_secs: u32) -> Self {
        ServerWsMessage::Tick { remaining_secs, clock: format_clock(remaining_secs), urgent: is_urgent(remaining_secs) }
    }
}

/// Score presentation for the feedback view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackView {
    pub score_label: String,
    pub tier: ScoreTier,
    pub favorable: bool,
}

/// Snapshot of a session after a transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub phase: Phase,
    pub student: Option<StudentInfo>,
    pub topic: Option<ClinicalTopic>,
    pub case: Option<ClinicalCase>,
    pub orders: String,
    pub orders_chars: usize,
    pub min_orders_chars: usize,
    pub can_submit: bool,
    pub remaining_secs: u32,
    pub clock: String,
    pub urgent: bool,
    pub evaluation: Option<EvaluationResult>,
    pub feedback: Option<FeedbackView>,
    pub error: Option<String>,
}

/// Convert the internal `Session` into the public snapshot.
pub fn to_view(s: &Session) -> SessionView {
    let remaining = s.remaining_secs();
    SessionView {
        phase: s.phase(),
        student: s.student().cloned(),
        topic: s.topic(),
        case: s.case().cloned(),
        orders: s.orders().to_string(),
        orders_chars: s.orders_chars(),
        min_orders_chars: s.settings().min_orders_chars,
        can_submit: s.can_submit(),
        remaining_secs: remaining,
        clock: format_clock(remaining),
        urgent: s.phase() == Phase::ActiveCase && is_urgent(remaining),
        evaluation: s.evaluation().cloned(),
        feedback: s.evaluation().map(|e| FeedbackView {
            score_label: e.score_label(),
            tier: e.tier(),
            favorable: e.is_favorable(),
        }),
        error: s.error().map(str::to_string),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct TopicOut {
    pub key: &'static str,
    pub label: &'static str,
    pub obstetric: bool,
}

pub fn topics_out() -> Vec<TopicOut> {
    ClinicalTopic::ALL
        .iter()
        .map(|t| TopicOut { key: t.key(), label: t.label(), obstetric: t.is_obstetric_emergency() })
        .collect()
}

/// Stateless report export request.
#[derive(Debug, Deserialize)]
pub struct ReportIn {
    pub student: StudentInfo,
    pub case: ClinicalCase,
    #[serde(default)]
    pub orders: String,
    pub evaluation: EvaluationResult,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
