//! Domain models used by the backend: student identity, clinical topics, the generated
//! case and the evaluation returned for the student's orders.

use serde::{Deserialize, Serialize};

/// Identity captured at registration. Printed on the report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
  pub name: String,
  /// Cédula.
  pub id_number: String,
}

impl StudentInfo {
  /// Both fields must carry something other than whitespace.
  pub fn is_complete(&self) -> bool {
    !self.name.trim().is_empty() && !self.id_number.trim().is_empty()
  }
}

/// Guideline-aligned topics (Resolución 3280 de 2018) a case can be generated for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClinicalTopic {
  #[serde(rename = "Detección temprana de cáncer de cuello uterino")]
  CervicalCancerScreening,
  #[serde(rename = "Ruta integral de atención en salud materno perinatal")]
  MaternalPerinatalRoute,
  #[serde(rename = "Atención del parto")]
  Childbirth,
  #[serde(rename = "Atención de emergencias obstétricas")]
  ObstetricEmergencies,
  #[serde(rename = "Atención para el cuidado preconcepcional")]
  PreconceptionCare,
}

impl ClinicalTopic {
  pub const ALL: [ClinicalTopic; 5] = [
    ClinicalTopic::CervicalCancerScreening,
    ClinicalTopic::MaternalPerinatalRoute,
    ClinicalTopic::Childbirth,
    ClinicalTopic::ObstetricEmergencies,
    ClinicalTopic::PreconceptionCare,
  ];

  pub fn label(self) -> &'static str {
    match self {
      ClinicalTopic::CervicalCancerScreening => "Detección temprana de cáncer de cuello uterino",
      ClinicalTopic::MaternalPerinatalRoute => "Ruta integral de atención en salud materno perinatal",
      ClinicalTopic::Childbirth => "Atención del parto",
      ClinicalTopic::ObstetricEmergencies => "Atención de emergencias obstétricas",
      ClinicalTopic::PreconceptionCare => "Atención para el cuidado preconcepcional",
    }
  }

  pub fn key(self) -> &'static str {
    match self {
      ClinicalTopic::CervicalCancerScreening => "cervical_cancer_screening",
      ClinicalTopic::MaternalPerinatalRoute => "maternal_perinatal_route",
      ClinicalTopic::Childbirth => "childbirth",
      ClinicalTopic::ObstetricEmergencies => "obstetric_emergencies",
      ClinicalTopic::PreconceptionCare => "preconception_care",
    }
  }

  /// Labor and obstetric emergencies place the primary-care physician as first responder.
  pub fn is_obstetric_emergency(self) -> bool {
    matches!(self, ClinicalTopic::Childbirth | ClinicalTopic::ObstetricEmergencies)
  }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
  pub name: String,
  pub age: String,
  pub gender: String,
  pub occupation: String,
  #[serde(default)] pub residence: String,
  /// Régimen contributivo / subsidiado.
  pub insurance_type: String,
}

/// Vital signs as free text; the model formats units inline and may omit any of them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
  #[serde(default)] pub bp: Option<String>,
  #[serde(default)] pub hr: Option<String>,
  #[serde(default)] pub rr: Option<String>,
  #[serde(default)] pub temp: Option<String>,
  #[serde(default)] pub o2: Option<String>,
  #[serde(default)] pub weight: Option<String>,
  #[serde(default)] pub height: Option<String>,
  #[serde(default)] pub bmi: Option<String>,
}

/// One generated clinical scenario. `id` and `topic` are always assigned locally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalCase {
  pub id: String,
  pub title: String,
  pub topic: ClinicalTopic,
  pub patient_info: PatientInfo,
  pub chief_complaint: String,
  pub history_of_present_illness: String,
  pub past_medical_history: String,
  #[serde(default)] pub family_history: String,
  pub vitals: Vitals,
  pub physical_exam: String,
  #[serde(default)] pub labs_and_images: String,
  #[serde(default)] pub context_hints: String,
}

pub const MAX_SCORE: f64 = 5.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
  /// 0.0 ..= 5.0
  pub score: f64,
  pub positive_aspects: Vec<String>,
  pub areas_for_improvement: Vec<String>,
  pub recommendations: Vec<String>,
  pub clinical_summary: String,
}

/// Presentation tier for a score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
  Good,
  Middling,
  Poor,
}

impl EvaluationResult {
  pub fn tier(&self) -> ScoreTier {
    if self.score >= 4.0 {
      ScoreTier::Good
    } else if self.score >= 3.0 {
      ScoreTier::Middling
    } else {
      ScoreTier::Poor
    }
  }

  /// Passing threshold used for the report colour.
  pub fn is_favorable(&self) -> bool {
    self.score >= 3.0
  }

  pub fn score_label(&self) -> String {
    format!("{:.1}/{:.1}", self.score, MAX_SCORE)
  }
}
