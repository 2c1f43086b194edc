//! Session controller shared by the WebSocket handler.
//!
//! Owns one `Session`, the model client and the running countdown. Synchronous
//! transitions return the new snapshot right away; the two model calls are split into a
//! transition into a loading phase followed by an async step (`load_case`, `evaluate`),
//! so the client sees the loading state before the call is awaited.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{ClinicalModel, EvaluationError, GenerationError, ModelError};
use crate::config::SessionSettings;
use crate::domain::{ClinicalTopic, StudentInfo};
use crate::export::{export_report, ReportFile, ReportInput};
use crate::protocol::{to_view, SessionView};
use crate::timer::{start_countdown, CountdownHandle, TimerEvent};
use crate::workflow::{
  Phase, Session, SubmitMode, WorkflowError, CASE_ERROR_MESSAGE, EVALUATION_ERROR_MESSAGE,
};

/// What a countdown event did to the session.
#[derive(Debug, PartialEq, Eq)]
pub enum TimerOutcome {
  /// Stale or out-of-phase event.
  Ignored,
  Tick(u32),
  /// Time ran out; the session is now `Evaluating` and `evaluate` must run.
  Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
  #[error(transparent)]
  Workflow(#[from] WorkflowError),
  #[error(transparent)]
  Export(#[from] crate::export::ExportError),
}

pub struct SessionController {
  session: Session,
  model: Option<Arc<dyn ClinicalModel>>,
  countdown: Option<CountdownHandle>,
  epoch: u64,
  timer_tx: mpsc::UnboundedSender<TimerEvent>,
  timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
}

impl SessionController {
  pub fn new(model: Option<Arc<dyn ClinicalModel>>, settings: SessionSettings) -> Self {
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    Self {
      session: Session::new(settings),
      model,
      countdown: None,
      epoch: 0,
      timer_tx,
      timer_rx,
    }
  }

  pub fn view(&self) -> SessionView {
    to_view(&self.session)
  }

  pub fn phase(&self) -> Phase {
    self.session.phase()
  }

  /// Next countdown event. Pending forever while no countdown runs.
  pub async fn next_timer_event(&mut self) -> Option<TimerEvent> {
    self.timer_rx.recv().await
  }

  /// Abort the running countdown. Bumping the epoch also turns any event it already
  /// queued into a stale one.
  fn stop_countdown(&mut self) {
    if let Some(handle) = self.countdown.take() {
      handle.cancel();
      self.epoch += 1;
    }
  }

  fn arm_countdown(&mut self) {
    self.stop_countdown();
    self.epoch += 1;
    let remaining = self.session.remaining_secs();
    self.countdown = Some(start_countdown(self.epoch, remaining, self.timer_tx.clone()));
  }

  pub fn enter_registration(&mut self) -> Result<SessionView, WorkflowError> {
    self.session.enter_registration()?;
    Ok(self.view())
  }

  pub fn cancel_registration(&mut self) -> Result<SessionView, WorkflowError> {
    self.session.cancel_registration()?;
    Ok(self.view())
  }

  /// Registration → LoadingCase. Follow with `load_case`.
  #[instrument(level = "info", skip(self, student), fields(topic = %topic.key(), has_student = student.is_some()))]
  pub fn register(&mut self, student: Option<StudentInfo>, topic: ClinicalTopic) -> Result<SessionView, WorkflowError> {
    self.session.submit_registration(student, topic)?;
    Ok(self.view())
  }

  /// Run case generation for the pending registration.
  #[instrument(level = "info", skip(self))]
  pub async fn load_case(&mut self) -> SessionView {
    let Some(topic) = self.session.topic().filter(|_| self.session.phase() == Phase::LoadingCase) else {
      warn!(target: "session", phase = ?self.session.phase(), "load_case outside LoadingCase");
      return self.view();
    };

    let result = match &self.model {
      Some(model) => model.generate_case(topic).await,
      None => Err(GenerationError(ModelError::NotConfigured)),
    };

    let applied = match result {
      Ok(case) => {
        info!(target: "session", case_id = %case.id, topic = %topic.key(), "Case ready");
        self.session.case_loaded(case).map(|_| self.arm_countdown())
      }
      Err(e) => {
        error!(target: "session", topic = %topic.key(), error = %e, cause = ?std::error::Error::source(&e).map(|s| s.to_string()), "Case generation failed");
        self.session.case_failed(CASE_ERROR_MESSAGE)
      }
    };
    if let Err(e) = applied {
      error!(target: "session", error = %e, "Unexpected transition failure after case generation");
    }
    self.view()
  }

  pub fn update_orders(&mut self, text: String) -> Result<SessionView, WorkflowError> {
    self.session.set_orders(text)?;
    Ok(self.view())
  }

  /// ActiveCase → Evaluating. Follow with `evaluate`.
  #[instrument(level = "info", skip(self))]
  pub fn submit(&mut self, mode: SubmitMode) -> Result<SessionView, WorkflowError> {
    self.session.begin_evaluation(mode)?;
    self.stop_countdown();
    info!(target: "session", ?mode, orders_chars = self.session.orders_chars(), "Orders submitted");
    Ok(self.view())
  }

  /// Run the evaluation for the submitted orders.
  #[instrument(level = "info", skip(self))]
  pub async fn evaluate(&mut self) -> SessionView {
    if self.session.phase() != Phase::Evaluating {
      warn!(target: "session", phase = ?self.session.phase(), "evaluate outside Evaluating");
      return self.view();
    }
    let Some(case) = self.session.case().cloned() else {
      error!(target: "session", "Evaluating without a case");
      return self.view();
    };
    let orders = self.session.orders().to_string();

    let result = match &self.model {
      Some(model) => model.evaluate_orders(&case, &orders).await,
      None => Err(EvaluationError(ModelError::NotConfigured)),
    };

    let applied = match result {
      Ok(evaluation) => {
        info!(target: "session", case_id = %case.id, score = evaluation.score, "Evaluation received");
        self.session.evaluation_succeeded(evaluation)
      }
      Err(e) => {
        error!(target: "session", case_id = %case.id, error = %e, cause = ?std::error::Error::source(&e).map(|s| s.to_string()), "Evaluation failed");
        self.session.evaluation_failed(EVALUATION_ERROR_MESSAGE)
      }
    };
    if let Err(e) = applied {
      error!(target: "session", error = %e, "Unexpected transition failure after evaluation");
    }
    self.view()
  }

  /// Feedback → Registration.
  pub fn restart(&mut self) -> Result<SessionView, WorkflowError> {
    self.session.restart()?;
    self.stop_countdown();
    Ok(self.view())
  }

  /// Apply a countdown event. Expiry performs the forced submission.
  pub fn on_timer(&mut self, event: TimerEvent) -> TimerOutcome {
    if event.epoch() != self.epoch || self.session.phase() != Phase::ActiveCase {
      debug!(target: "timer", ?event, current_epoch = self.epoch, "Ignoring stale timer event");
      return TimerOutcome::Ignored;
    }
    match event {
      TimerEvent::Tick { remaining, .. } => match self.session.tick(remaining) {
        Ok(()) => TimerOutcome::Tick(self.session.remaining_secs()),
        Err(_) => TimerOutcome::Ignored,
      },
      TimerEvent::Expired { .. } => match self.submit(SubmitMode::Forced) {
        Ok(_) => {
          info!(target: "session", "Time is up; submitting orders");
          TimerOutcome::Expired
        }
        Err(e) => {
          error!(target: "session", error = %e, "Forced submission rejected");
          TimerOutcome::Ignored
        }
      },
    }
  }

  /// Render the report for the finished attempt.
  pub fn export_report(&self) -> Result<ReportFile, ReportError> {
    let (student, case, orders, evaluation) = self.session.report_parts()?;
    let input = ReportInput { student, case, orders, evaluation };
    Ok(export_report(&input, Local::now())?)
  }
}
