//! Contract with the external model: prompts, output schemas, response parsing and the
//! `ClinicalModel` seam the session controller talks to.
//!
//! The model is a black box. Everything it returns goes through `parse_case` /
//! `parse_evaluation`; anything that does not fit the expected shape becomes a
//! generic domain error instead of a raw parse failure.

use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::{ClinicalCase, ClinicalTopic, EvaluationResult, PatientInfo, Vitals, MAX_SCORE};
use crate::util::{fill_template, strip_code_fences};

/// Transport/shape failures. Logged at the failure site, never shown to the student.
#[derive(Debug, Error)]
pub enum ModelError {
  #[error("model client not configured (OPENAI_API_KEY missing)")]
  NotConfigured,
  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("model HTTP {status}: {message}")]
  Status { status: u16, message: String },
  #[error("model returned no content")]
  EmptyResponse,
  #[error("response does not match schema: {0}")]
  Shape(#[from] serde_json::Error),
  #[error("invalid score {0}")]
  InvalidScore(f64),
}

#[derive(Debug, Error)]
#[error("No se pudo generar el caso clínico. Intenta nuevamente.")]
pub struct GenerationError(#[source] pub ModelError);

#[derive(Debug, Error)]
#[error("Error al evaluar las órdenes. Intenta nuevamente.")]
pub struct EvaluationError(#[source] pub ModelError);

/// The two requests the simulator makes of the external model.
pub trait ClinicalModel: Send + Sync {
  fn generate_case(&self, topic: ClinicalTopic) -> BoxFuture<'_, Result<ClinicalCase, GenerationError>>;

  fn evaluate_orders<'a>(
    &'a self,
    case: &'a ClinicalCase,
    orders: &'a str,
  ) -> BoxFuture<'a, Result<EvaluationResult, EvaluationError>>;
}

// --- Prompts ---

pub fn case_prompt(prompts: &Prompts, topic: ClinicalTopic) -> String {
  let guidance = if topic.is_obstetric_emergency() { prompts.obstetric_guidance.as_str() } else { "" };
  fill_template(&prompts.case_user_template, &[("topic", topic.label()), ("topic_guidance", guidance)])
    .trim_end()
    .to_string()
}

pub fn evaluation_prompt(prompts: &Prompts, case: &ClinicalCase, orders: &str) -> String {
  fill_template(
    &prompts.evaluation_user_template,
    &[
      ("topic", case.topic.label()),
      ("age", &case.patient_info.age),
      ("gender", &case.patient_info.gender),
      ("chief_complaint", &case.chief_complaint),
      ("history", &case.history_of_present_illness),
      ("context", &case.context_hints),
      ("orders", orders),
    ],
  )
}

// --- Output schemas ---

pub fn case_schema() -> Value {
  let s = json!({ "type": "string" });
  json!({
    "type": "object",
    "properties": {
      "title": { "type": "string", "description": "Un título clínico descriptivo" },
      "patientInfo": {
        "type": "object",
        "properties": {
          "name": s, "age": s, "gender": s, "occupation": s, "residence": s,
          "insuranceType": { "type": "string", "description": "Régimen Contributivo o Subsidiado" }
        },
        "required": ["name", "age", "gender", "occupation", "insuranceType"]
      },
      "chiefComplaint": { "type": "string", "description": "Motivo de consulta en palabras del paciente" },
      "historyOfPresentIllness": { "type": "string", "description": "Enfermedad actual detallada" },
      "pastMedicalHistory": { "type": "string", "description": "Antecedentes patológicos, quirúrgicos, alérgicos, tóxicos" },
      "familyHistory": s,
      "vitals": {
        "type": "object",
        "properties": {
          "bp": s, "hr": s, "rr": s, "temp": s, "o2": s, "weight": s, "height": s, "bmi": s
        },
        "required": ["bp", "hr", "rr", "temp", "weight", "height"]
      },
      "physicalExam": { "type": "string", "description": "Hallazgos positivos y negativos relevantes al examen físico" },
      "labsAndImages": { "type": "string", "description": "Paraclínicos que trae el paciente o 'No aporta'" },
      "contextHints": { "type": "string", "description": "Contexto de la ruta de atención" }
    },
    "required": ["title", "patientInfo", "chiefComplaint", "historyOfPresentIllness", "pastMedicalHistory", "vitals", "physicalExam"]
  })
}

pub fn evaluation_schema() -> Value {
  let list = json!({ "type": "array", "items": { "type": "string" } });
  json!({
    "type": "object",
    "properties": {
      "score": { "type": "number", "description": "Puntuación de 0 a 5" },
      "positiveAspects": list,
      "areasForImprovement": list,
      "recommendations": { "type": "array", "items": { "type": "string" }, "description": "Recomendaciones específicas basadas en Res. 3280" },
      "clinicalSummary": { "type": "string", "description": "Resumen breve del manejo ideal según la norma" }
    },
    "required": ["score", "positiveAspects", "areasForImprovement", "recommendations", "clinicalSummary"]
  })
}

// --- Response parsing ---

/// Accepts `"28 años"` as well as `28`.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  match Value::deserialize(d)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!("expected string, got {other}"))),
  }
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  match Option::<Value>::deserialize(d)? {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) => Ok(Some(s)),
    Some(Value::Number(n)) => Ok(Some(n.to_string())),
    Some(other) => Err(serde::de::Error::custom(format!("expected string, got {other}"))),
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenPatient {
  name: String,
  #[serde(deserialize_with = "lenient_string")]
  age: String,
  gender: String,
  occupation: String,
  #[serde(default)]
  residence: String,
  insurance_type: String,
}

#[derive(Deserialize)]
struct GenVitals {
  #[serde(default, deserialize_with = "lenient_opt_string")] bp: Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")] hr: Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")] rr: Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")] temp: Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")] o2: Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")] weight: Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")] height: Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")] bmi: Option<String>,
}

/// Shape the model must return. `id`/`topic`, if present, are ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenCase {
  title: String,
  patient_info: GenPatient,
  chief_complaint: String,
  history_of_present_illness: String,
  past_medical_history: String,
  #[serde(default)]
  family_history: String,
  vitals: GenVitals,
  physical_exam: String,
  #[serde(default)]
  labs_and_images: String,
  #[serde(default)]
  context_hints: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenEvaluation {
  score: f64,
  positive_aspects: Vec<String>,
  areas_for_improvement: Vec<String>,
  recommendations: Vec<String>,
  clinical_summary: String,
}

/// Parse a case-generation response and stamp it with a fresh id and the requested topic.
pub fn parse_case(raw: &str, topic: ClinicalTopic) -> Result<ClinicalCase, ModelError> {
  let gen: GenCase = serde_json::from_str(strip_code_fences(raw))?;
  let p = gen.patient_info;
  let v = gen.vitals;
  Ok(ClinicalCase {
    id: Uuid::new_v4().to_string(),
    title: gen.title,
    topic,
    patient_info: PatientInfo {
      name: p.name,
      age: p.age,
      gender: p.gender,
      occupation: p.occupation,
      residence: p.residence,
      insurance_type: p.insurance_type,
    },
    chief_complaint: gen.chief_complaint,
    history_of_present_illness: gen.history_of_present_illness,
    past_medical_history: gen.past_medical_history,
    family_history: gen.family_history,
    vitals: Vitals {
      bp: v.bp,
      hr: v.hr,
      rr: v.rr,
      temp: v.temp,
      o2: v.o2,
      weight: v.weight,
      height: v.height,
      bmi: v.bmi,
    },
    physical_exam: gen.physical_exam,
    labs_and_images: gen.labs_and_images,
    context_hints: gen.context_hints,
  })
}

/// Parse an evaluation response. The score is clamped into [0, 5].
pub fn parse_evaluation(raw: &str) -> Result<EvaluationResult, ModelError> {
  let gen: GenEvaluation = serde_json::from_str(strip_code_fences(raw))?;
  if !gen.score.is_finite() {
    return Err(ModelError::InvalidScore(gen.score));
  }
  Ok(EvaluationResult {
    score: gen.score.clamp(0.0, MAX_SCORE),
    positive_aspects: gen.positive_aspects,
    areas_for_improvement: gen.areas_for_improvement,
    recommendations: gen.recommendations,
    clinical_summary: gen.clinical_summary,
  })
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) const CASE_JSON: &str = r#"{
    "id": "model-chosen-id",
    "topic": "Pediatría",
    "title": "Gestante de 38 semanas con contracciones",
    "patientInfo": {
      "name": "María Gómez", "age": 24, "gender": "Femenino",
      "occupation": "Comerciante", "insuranceType": "Subsidiado"
    },
    "chiefComplaint": "Tengo dolores muy seguidos",
    "historyOfPresentIllness": "Contracciones cada 3 minutos desde hace 4 horas.",
    "pastMedicalHistory": "G2P1, sin patologías.",
    "vitals": { "bp": "120/80 mmHg", "hr": "88 lpm", "rr": 18, "temp": "36.8" },
    "physicalExam": "Dilatación 7 cm, borramiento 90%."
  }"#;

  /// Every optional field present, for report tests.
  pub(crate) const FULL_CASE_JSON: &str = r#"{
    "title": "Primigestante de 39 semanas en trabajo de parto",
    "patientInfo": {
      "name": "Laura Restrepo", "age": "27 años", "gender": "Femenino",
      "occupation": "Docente", "residence": "Vereda El Carmen, Rionegro",
      "insuranceType": "Contributivo"
    },
    "chiefComplaint": "Me duele mucho el vientre",
    "historyOfPresentIllness": "Contracciones regulares desde hace 6 horas.",
    "pastMedicalHistory": "G1P0, controles prenatales completos.",
    "familyHistory": "Madre con hipertensión crónica.",
    "vitals": {
      "bp": "118/76 mmHg", "hr": "84 lpm", "rr": "18 rpm", "temp": "36.7 °C",
      "o2": "98%", "weight": "68 kg", "height": "1.62 m", "bmi": "25.9"
    },
    "physicalExam": "Altura uterina 33 cm, FCF 140 lpm, dilatación 5 cm.",
    "labsAndImages": "Ecografía de tercer trimestre normal.",
    "contextHints": "Hospital de primer nivel en zona rural."
  }"#;

  #[test]
  fn case_prompt_embeds_topic_and_obstetric_guidance_only_when_relevant() {
    let prompts = Prompts::default();
    let labor = case_prompt(&prompts, ClinicalTopic::Childbirth);
    assert!(labor.contains("\"Atención del parto\""));
    assert!(labor.contains(&prompts.obstetric_guidance));
    assert!(!labor.contains("{topic_guidance}"));

    let cervical = case_prompt(&prompts, ClinicalTopic::CervicalCancerScreening);
    assert!(cervical.contains("cáncer de cuello uterino"));
    assert!(!cervical.contains(&prompts.obstetric_guidance));
  }

  #[test]
  fn evaluation_prompt_embeds_case_and_orders() {
    let case = parse_case(CASE_JSON, ClinicalTopic::Childbirth).unwrap();
    let prompt = evaluation_prompt(&Prompts::default(), &case, "Ingreso a sala de partos");
    assert!(prompt.contains("TEMA: Atención del parto"));
    assert!(prompt.contains("PACIENTE: 24 Femenino."));
    assert!(prompt.contains("\"Ingreso a sala de partos\""));
    assert!(prompt.contains("califica con 0 o 1"));
  }

  #[test]
  fn placeholders_written_by_the_model_are_not_expanded() {
    let mut case = parse_case(CASE_JSON, ClinicalTopic::Childbirth).unwrap();
    case.chief_complaint = "dolor {orders}".into();
    case.history_of_present_illness = "ver {context}".into();
    let prompt = evaluation_prompt(&Prompts::default(), &case, "Oxitocina");
    assert!(prompt.contains("Basado en dolor {orders} y ver {context}."));
    assert_eq!(prompt.matches("Oxitocina").count(), 1);
  }

  #[test]
  fn parsed_case_gets_local_id_and_requested_topic() {
    let a = parse_case(CASE_JSON, ClinicalTopic::Childbirth).unwrap();
    let b = parse_case(CASE_JSON, ClinicalTopic::Childbirth).unwrap();
    assert_ne!(a.id, "model-chosen-id");
    assert_ne!(a.id, b.id);
    assert_eq!(a.topic, ClinicalTopic::Childbirth);
    assert_eq!(a.patient_info.age, "24");
    assert_eq!(a.patient_info.residence, "");
    assert_eq!(a.vitals.rr.as_deref(), Some("18"));
    assert_eq!(a.vitals.o2, None);
    assert_eq!(a.family_history, "");
  }

  #[test]
  fn fenced_case_is_accepted() {
    let fenced = format!("```json\n{}\n```", CASE_JSON);
    assert!(parse_case(&fenced, ClinicalTopic::Childbirth).is_ok());
  }

  #[test]
  fn case_missing_required_fields_is_rejected() {
    let missing_exam = CASE_JSON.replace("\"physicalExam\"", "\"otherField\"");
    assert!(matches!(parse_case(&missing_exam, ClinicalTopic::Childbirth), Err(ModelError::Shape(_))));
    assert!(parse_case("lo siento, no puedo", ClinicalTopic::Childbirth).is_err());
    assert!(parse_case("{}", ClinicalTopic::Childbirth).is_err());
  }

  #[test]
  fn evaluation_parses_and_clamps_score() {
    let raw = r#"{"score": 4.2, "positiveAspects": ["A"], "areasForImprovement": ["B"], "recommendations": ["C"], "clinicalSummary": "S"}"#;
    let e = parse_evaluation(raw).unwrap();
    assert_eq!(e.score, 4.2);
    assert_eq!(e.positive_aspects, vec!["A".to_string()]);

    let high = raw.replace("4.2", "7.5");
    assert_eq!(parse_evaluation(&high).unwrap().score, 5.0);
    let low = raw.replace("4.2", "-1");
    assert_eq!(parse_evaluation(&low).unwrap().score, 0.0);
  }

  #[test]
  fn evaluation_allows_empty_lists_but_not_missing_ones() {
    let empty = r#"{"score": 0, "positiveAspects": [], "areasForImprovement": [], "recommendations": [], "clinicalSummary": ""}"#;
    assert!(parse_evaluation(empty).unwrap().recommendations.is_empty());

    let missing = r#"{"score": 3, "positiveAspects": [], "clinicalSummary": "S"}"#;
    assert!(parse_evaluation(missing).is_err());
    let wrong = r#"{"score": "alto", "positiveAspects": [], "areasForImprovement": [], "recommendations": [], "clinicalSummary": ""}"#;
    assert!(parse_evaluation(wrong).is_err());
  }

  #[test]
  fn domain_errors_hide_model_details() {
    let err = GenerationError(ModelError::Status { status: 500, message: "quota exceeded".into() });
    assert!(!err.to_string().contains("quota"));
    let err = EvaluationError(ModelError::EmptyResponse);
    assert_eq!(err.to_string(), "Error al evaluar las órdenes. Intenta nuevamente.");
  }

  #[test]
  fn schemas_declare_required_fields() {
    let case = case_schema();
    assert_eq!(case["required"].as_array().unwrap().len(), 7);
    assert!(case["properties"]["vitals"]["properties"]["bmi"].is_object());
    let eval = evaluation_schema();
    assert_eq!(eval["required"].as_array().unwrap().len(), 5);
  }
}
