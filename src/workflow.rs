//! Session state machine.
//!
//! `Idle → Registration → LoadingCase → ActiveCase → Evaluating → Feedback`, with the
//! failure paths `LoadingCase → Idle` and `Evaluating → ActiveCase`. All mutation goes
//! through the named transitions below; no IO happens here.

use serde::Serialize;
use thiserror::Error;

use crate::config::SessionSettings;
use crate::domain::{ClinicalCase, ClinicalTopic, EvaluationResult, StudentInfo};

pub const CASE_ERROR_MESSAGE: &str =
    "Error generando el caso. Por favor verifica tu conexión o intenta de nuevo.";
pub const EVALUATION_ERROR_MESSAGE: &str = "Error al evaluar. Intenta enviar de nuevo.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Registration,
    LoadingCase,
    ActiveCase,
    Evaluating,
    Feedback,
}

/// How orders reach evaluation. `Forced` is the timer-expiry path and skips the
/// minimum-length check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitMode {
    Manual,
    Forced,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("action '{action}' is not available while {phase:?}")]
    InvalidTransition { phase: Phase, action: &'static str },
    #[error("Nombre y número de cédula son obligatorios.")]
    MissingIdentity,
    #[error("Las órdenes deben tener al menos {min} caracteres ({actual} escritos).")]
    OrdersTooShort { min: usize, actual: usize },
    #[error("No hay un informe disponible todavía.")]
    NoReport,
}

#[derive(Clone, Debug)]
pub struct Session {
    phase: Phase,
    student: Option<StudentInfo>,
    topic: Option<ClinicalTopic>,
    case: Option<ClinicalCase>,
    orders: String,
    evaluation: Option<EvaluationResult>,
    remaining_secs: u32,
    error: Option<String>,
    settings: SessionSettings,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            phase: Phase::Idle,
            student: None,
            topic: None,
            case: None,
            orders: String::new(),
            evaluation: None,
            remaining_secs: settings.case_duration_secs,
            error: None,
            settings,
        }
    }

    pub fn phase(&self) -> Phase { self.phase }
    pub fn student(&self) -> Option<&StudentInfo> { self.student.as_ref() }
    pub fn topic(&self) -> Option<ClinicalTopic> { self.topic }
    pub fn case(&self) -> Option<&ClinicalCase> { self.case.as_ref() }
    pub fn orders(&self) -> &str { &self.orders }
    pub fn evaluation(&self) -> Option<&EvaluationResult> { self.evaluation.as_ref() }
    pub fn remaining_secs(&self) -> u32 { self.remaining_secs }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }
    pub fn settings(&self) -> &SessionSettings { &self.settings }

    /// Length in Unicode scalar values, not UTF-16 units; untrimmed.
    pub fn orders_chars(&self) -> usize {
        self.orders.chars().count()
    }

    /// Whether the manual submit action is enabled.
    pub fn can_submit(&self) -> bool {
        self.phase == Phase::ActiveCase && self.orders_chars() >= self.settings.min_orders_chars
    }

    fn expect(&self, phase: Phase, action: &'static str) -> Result<(), WorkflowError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition { phase: self.phase, action })
        }
    }

    /// Idle → Registration.
    pub fn enter_registration(&mut self) -> Result<(), WorkflowError> {
        self.expect(Phase::Idle, "enter_registration")?;
        self.phase = Phase::Registration;
        Ok(())
    }

    /// Registration → Idle.
    pub fn cancel_registration(&mut self) -> Result<(), WorkflowError> {
        self.expect(Phase::Registration, "cancel_registration")?;
        self.phase = Phase::Idle;
        Ok(())
    }

    /// Registration → LoadingCase. `student` may be omitted when an identity from an
    /// earlier attempt is already stored.
    pub fn submit_registration(
        &mut self,
        student: Option<StudentInfo>,
        topic: ClinicalTopic,
    ) -> Result<(), WorkflowError> {
        self.expect(Phase::Registration, "start_case")?;
        let student = match student.or_else(|| self.student.clone()) {
            Some(s) if s.is_complete() => s,
            _ => return Err(WorkflowError::MissingIdentity),
        };
        self.student = Some(student);
        self.topic = Some(topic);
        self.case = None;
        self.evaluation = None;
        self.error = None;
        self.phase = Phase::LoadingCase;
        Ok(())
    }

    /// LoadingCase → ActiveCase. Orders and the clock start fresh.
    pub fn case_loaded(&mut self, case: ClinicalCase) -> Result<(), WorkflowError> {
        self.expect(Phase::LoadingCase, "case_loaded")?;
        self.case = Some(case);
        self.orders.clear();
        self.evaluation = None;
        self.remaining_secs = self.settings.case_duration_secs;
        self.phase = Phase::ActiveCase;
        Ok(())
    }

    /// LoadingCase → Idle with a user-facing message.
    pub fn case_failed(&mut self, message: &str) -> Result<(), WorkflowError> {
        self.expect(Phase::LoadingCase, "case_failed")?;
        self.case = None;
        self.evaluation = None;
        self.orders.clear();
        self.error = Some(message.to_string());
        self.phase = Phase::Idle;
        Ok(())
    }

    pub fn set_orders(&mut self, text: String) -> Result<(), WorkflowError> {
        self.expect(Phase::ActiveCase, "update_orders")?;
        self.orders = text;
        Ok(())
    }

    pub fn tick(&mut self, remaining: u32) -> Result<(), WorkflowError> {
        self.expect(Phase::ActiveCase, "tick")?;
        self.remaining_secs = remaining.min(self.settings.case_duration_secs);
        Ok(())
    }

    /// ActiveCase → Evaluating.
    pub fn begin_evaluation(&mut self, mode: SubmitMode) -> Result<(), WorkflowError> {
        self.expect(Phase::ActiveCase, "submit_orders")?;
        if mode == SubmitMode::Manual {
            let actual = self.orders_chars();
            let min = self.settings.min_orders_chars;
            if actual < min {
                return Err(WorkflowError::OrdersTooShort { min, actual });
            }
        }
        if mode == SubmitMode::Forced {
            self.remaining_secs = 0;
        }
        self.error = None;
        self.phase = Phase::Evaluating;
        Ok(())
    }

    /// Evaluating → Feedback.
    pub fn evaluation_succeeded(&mut self, result: EvaluationResult) -> Result<(), WorkflowError> {
        self.expect(Phase::Evaluating, "evaluation_succeeded")?;
        self.evaluation = Some(result);
        self.phase = Phase::Feedback;
        Ok(())
    }

    /// Evaluating → ActiveCase. Case and drafted orders stay for a resubmission.
    pub fn evaluation_failed(&mut self, message: &str) -> Result<(), WorkflowError> {
        self.expect(Phase::Evaluating, "evaluation_failed")?;
        self.error = Some(message.to_string());
        self.phase = Phase::ActiveCase;
        Ok(())
    }

    /// Feedback → Registration. Identity is kept; everything else is dropped.
    pub fn restart(&mut self) -> Result<(), WorkflowError> {
        self.expect(Phase::Feedback, "restart")?;
        self.case = None;
        self.evaluation = None;
        self.orders.clear();
        self.error = None;
        self.remaining_secs = self.settings.case_duration_secs;
        self.phase = Phase::Registration;
        Ok(())
    }

    /// Everything the report needs, available only once feedback exists.
    pub fn report_parts(&self) -> Result<(&StudentInfo, &ClinicalCase, &str, &EvaluationResult), WorkflowError> {
        match (self.phase, &self.student, &self.case, &self.evaluation) {
            (Phase::Feedback, Some(s), Some(c), Some(e)) => Ok((s, c, &self.orders, e)),
            _ => Err(WorkflowError::NoReport),
        }
    }
}
