//! Loading agent configuration (prompts + session settings) from TOML.
//!
//! See `AgentConfig`, `Prompts` and `SessionSettings` for expected schema.

use serde::Deserialize;
use tracing::{info, error};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub session: SessionSettings,
}

/// Timing and validation knobs for a session attempt.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
  pub case_duration_secs: u32,
  /// Minimum characters for a manual submission. Timer expiry bypasses it.
  pub min_orders_chars: usize,
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self { case_duration_secs: 7 * 60, min_orders_chars: 10 }
  }
}

/// Prompts used by the model client. Defaults target Colombian primary care (Res. 3280).
/// You can override them in TOML if you need to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Case generation
  pub case_system: String,
  pub case_user_template: String,
  pub obstetric_guidance: String,
  // Evaluation
  pub evaluation_system: String,
  pub evaluation_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      case_system: "Eres un generador de casos clínicos para docencia médica en Colombia. Responde ÚNICAMENTE con JSON que cumpla el esquema.".into(),
      case_user_template: "Genera un caso clínico aleatorio para un estudiante de medicina en contexto de ATENCIÓN PRIMARIA EN SALUD en COLOMBIA.\n\
El caso debe estar alineado con la Resolución 3280 de 2018 (Rutas Integrales de Atención en Salud - RIAS).\n\
El tema ESPECÍFICO del caso debe ser: \"{topic}\".\n\n\
Asegúrate de:\n\
1. Que los signos vitales sean coherentes con la historia y la patología del tema seleccionado.\n\
2. Usar terminología médica adecuada pero realista para una consulta de primer nivel o urgencia baja según corresponda al tema.\n\
{topic_guidance}".into(),
      obstetric_guidance: "3. Sitúa el caso en un contexto donde el médico de atención primaria deba actuar inicialmente como primer respondiente.".into(),
      evaluation_system: "Eres un profesor estricto de medicina familiar y obstetricia en Colombia. Responde ÚNICAMENTE con JSON que cumpla el esquema.".into(),
      evaluation_user_template: "Evalúa las órdenes médicas ingresadas por el estudiante para el siguiente caso clínico:\n\n\
TEMA: {topic}\n\
PACIENTE: {age} {gender}.\n\
DIAGNÓSTICO PROBABLE: Basado en {chief_complaint} y {history}.\n\
CONTEXTO: {context}.\n\n\
ÓRDENES DEL ESTUDIANTE:\n\"{orders}\"\n\n\
CRITERIOS DE EVALUACIÓN (Resolución 3280 de 2018):\n\
1. ¿Identificó el riesgo o diagnóstico correcto acorde al tema \"{topic}\"?\n\
2. ¿Solicitó los paraclínicos adecuados para el nivel de complejidad?\n\
3. ¿El tratamiento y conducta son acordes a las RIAS (Ruta Materno Perinatal, Promoción y Mantenimiento, etc)?\n\
4. ¿Incluyó educación al paciente y signos de alarma?\n\n\
Califica de 0.0 a 5.0. Sé constructivo pero riguroso con la normativa.\n\
Si el estudiante dejó el campo vacío o escribió disparates, califica con 0 o 1.".into(),
    }
  }
}

/// Parse a TOML document into `AgentConfig`. Missing sections fall back to defaults.
pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "simulador", %path, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "simulador", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "simulador", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
