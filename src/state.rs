//! Application state shared by every connection: the optional model client and the
//! session settings. Per-connection session state lives in `logic::SessionController`.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::client::ClinicalModel;
use crate::config::{load_agent_config_from_env, SessionSettings};
use crate::logic::SessionController;
use crate::openai::OpenAI;

#[derive(Clone)]
pub struct AppState {
  pub model: Option<Arc<dyn ClinicalModel>>,
  pub settings: SessionSettings,
}

impl AppState {
  /// Build state from env: load the TOML config, then the OpenAI client if a key is set.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_agent_config_from_env().unwrap_or_default();
    let model = OpenAI::from_env(cfg.prompts).map(|m| Arc::new(m) as Arc<dyn ClinicalModel>);
    if model.is_some() {
      info!(target: "simulador", "OpenAI integration enabled");
    } else {
      warn!(target: "simulador", "OPENAI_API_KEY not set; case generation will fail until configured");
    }
    info!(
      target: "simulador",
      case_duration_secs = cfg.session.case_duration_secs,
      min_orders_chars = cfg.session.min_orders_chars,
      "Session settings"
    );
    Self { model, settings: cfg.session }
  }

  pub fn with_model(model: Option<Arc<dyn ClinicalModel>>, settings: SessionSettings) -> Self {
    Self { model, settings }
  }

  /// Fresh controller for one connection.
  pub fn new_session(&self) -> SessionController {
    SessionController::new(self.model.clone(), self.settings.clone())
  }
}
