//! Minimal OpenAI-compatible client for our use-cases.
//!
//! We only call chat.completions and request a JSON object constrained by a JSON schema.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, info, error, debug};

use crate::client::{
  case_prompt, case_schema, evaluation_prompt, evaluation_schema, parse_case, parse_evaluation, ClinicalModel,
  EvaluationError, GenerationError, ModelError,
};
use crate::config::Prompts;
use crate::domain::{ClinicalCase, ClinicalTopic, EvaluationResult};
use crate::util::trunc_for_log;

const CASE_TEMPERATURE: f32 = 0.8;
const EVALUATION_TEMPERATURE: f32 = 0.4;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub case_model: String,
  pub eval_model: String,
  pub prompts: Prompts,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let case_model =
      std::env::var("OPENAI_CASE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let eval_model =
      std::env::var("OPENAI_EVAL_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let timeout_secs = std::env::var("OPENAI_TIMEOUT_SECS")
      .ok()
      .and_then(|v| v.parse::<u64>().ok())
      .unwrap_or(60);

    let client = match reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()
    {
      Ok(c) => c,
      Err(e) => {
        error!(target: "simulador", error = %e, "Failed to build HTTP client");
        return None;
      }
    };

    Some(Self { client, api_key, base_url, case_model, eval_model, prompts })
  }

  /// Schema-constrained chat completion. Returns the raw message content.
  #[instrument(level = "info", skip(self, system, user, schema), fields(model = %model, %schema_name))]
  async fn chat_json(
    &self,
    model: &str,
    system: &str,
    user: &str,
    schema_name: &str,
    schema: Value,
    temperature: f32,
  ) -> Result<String, ModelError> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat::json_schema(schema_name, schema)),
      max_tokens: None,
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "simulador-clinico-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let message = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(ModelError::Status { status, message });
    }

    let body: ChatCompletionResponse = res.json().await?;
    let elapsed = start.elapsed();
    if let Some(usage) = &body.usage {
      info!(?elapsed, prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .map(|t| t.trim().to_string())
      .unwrap_or_default();
    if text.is_empty() {
      return Err(ModelError::EmptyResponse);
    }
    debug!(response_len = text.len(), preview = %trunc_for_log(&text, 80), "Model response received");
    Ok(text)
  }

  // --- High-level helpers (domain-specialized) ---

  #[instrument(level = "info", skip(self), fields(topic = %topic.key(), model = %self.case_model))]
  async fn generate_case_inner(&self, topic: ClinicalTopic) -> Result<ClinicalCase, ModelError> {
    let user = case_prompt(&self.prompts, topic);
    let raw = self
      .chat_json(&self.case_model, &self.prompts.case_system, &user, "clinical_case", case_schema(), CASE_TEMPERATURE)
      .await?;
    let case = parse_case(&raw, topic)?;
    info!(
      case_id = %case.id,
      title_preview = %case.title.chars().take(40).collect::<String>(),
      "Clinical case successfully generated"
    );
    Ok(case)
  }

  #[instrument(level = "info", skip(self, case, orders), fields(case_id = %case.id, orders_len = orders.len(), model = %self.eval_model))]
  async fn evaluate_orders_inner(&self, case: &ClinicalCase, orders: &str) -> Result<EvaluationResult, ModelError> {
    let user = evaluation_prompt(&self.prompts, case, orders);
    let raw = self
      .chat_json(&self.eval_model, &self.prompts.evaluation_system, &user, "evaluation", evaluation_schema(), EVALUATION_TEMPERATURE)
      .await?;
    let result = parse_evaluation(&raw)?;
    info!(case_id = %case.id, score = result.score, "Orders evaluated");
    Ok(result)
  }
}

impl ClinicalModel for OpenAI {
  fn generate_case(&self, topic: ClinicalTopic) -> BoxFuture<'_, Result<ClinicalCase, GenerationError>> {
    async move {
      self.generate_case_inner(topic).await.map_err(|e| {
        error!(target: "simulador", topic = %topic.key(), error = %e, "Case generation failed");
        GenerationError(e)
      })
    }
    .boxed()
  }

  fn evaluate_orders<'a>(
    &'a self,
    case: &'a ClinicalCase,
    orders: &'a str,
  ) -> BoxFuture<'a, Result<EvaluationResult, EvaluationError>> {
    async move {
      self.evaluate_orders_inner(case, orders).await.map_err(|e| {
        error!(target: "simulador", case_id = %case.id, error = %e, "Evaluation failed");
        EvaluationError(e)
      })
    }
    .boxed()
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat {
  #[serde(rename = "type")] r#type: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  json_schema: Option<JsonSchemaSpec>,
}
#[derive(Serialize)]
struct JsonSchemaSpec { name: String, schema: Value, strict: bool }

impl ResponseFormat {
  /// Non-strict: strict mode would force every optional field to be required.
  fn json_schema(name: &str, schema: Value) -> Self {
    Self {
      r#type: "json_schema".into(),
      json_schema: Some(JsonSchemaSpec { name: name.into(), schema, strict: false }),
    }
  }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
