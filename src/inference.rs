//! Client for the external text-to-recipe inference service.
//!
//! Sends raw recipe text with a schema-constrained instruction and decodes
//! the service's reply into a normalized recipe candidate. The instruction
//! is a contract the model is expected to honor, but its output is never
//! trusted: decoding is followed by [`crate::normalize::apply_defaults`].

use crate::config::AppConfig;
use crate::normalize;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_COMPLETION_TOKENS: u32 = 4096;

/// Fixed input for the availability probe.
const SMOKE_TEST_TEXT: &str =
    "Pancakes: mix 2 eggs with 200g flour and a glass of milk, fry in butter.";

/// The JSON contract sent as the system instruction. The three defaulting
/// rules are restated here so a cooperative model applies them, and
/// re-applied locally because not every model does.
const SYSTEM_INSTRUCTION: &str = r#"You are a recipe extraction assistant. Convert the user's raw recipe text into a single JSON object with exactly this shape:

{
  "title": "string",
  "servings": number,
  "ingredients": [{"name": "string", "quantity": number, "unit": "string"}],
  "steps": [{"order": number, "text": "string"}],
  "tags": ["string"]
}

Rules:
- If the text does not state a serving count, use 4.
- If an ingredient quantity cannot be parsed as a number, use 1.
- Number the steps from 1 in the order they appear.

Return ONLY the JSON object, with no commentary and no markdown."#;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("no text to extract from")]
    EmptyInput,

    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("inference service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The reply matched neither known envelope shape, or carried no text.
    #[error("inference response carried no textual content")]
    Protocol,

    /// The service answered, but its text was not parseable recipe JSON.
    #[error("inference response was not valid recipe JSON: {0}")]
    Format(String),
}

/// Stateless client for the model-invocation endpoint.
#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl InferenceClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.inference_api_url.trim_end_matches('/').to_string(),
            api_key: config.inference_api_key.clone(),
            model: config.extraction_model.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Extract a normalized recipe candidate from raw text.
    pub async fn extract(&self, raw_text: &str) -> Result<Value, InferenceError> {
        if raw_text.trim().is_empty() {
            return Err(InferenceError::EmptyInput);
        }

        let request = InvokeRequest {
            system: SYSTEM_INSTRUCTION,
            messages: vec![RequestMessage {
                role: "user",
                content: raw_text,
            }],
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let url = format!("{}/model/{}/invoke", self.base_url, self.model);
        debug!("Invoking extraction model {}", self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = reply_text(&body)?;
        debug!("Model reply: {} chars", text.len());

        let candidate = parse_candidate_json(&text)?;
        Ok(normalize::apply_defaults(candidate))
    }

    /// Probe the service with one real extraction. Reports `false` on any
    /// failure and never errors.
    pub async fn check_availability(&self) -> bool {
        match self.extract(SMOKE_TEST_TEXT).await {
            Ok(_) => true,
            Err(err) => {
                warn!("Inference availability probe failed: {err}");
                false
            }
        }
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// The endpoint answers in one of two envelope shapes depending on the model
/// family behind it. The shape is resolved once here, by which top-level
/// field is present, never by looking at the configured model id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InvokeResponse {
    /// `{"output": {"message": {"content": [{"text": ...}]}}}`
    OutputMessage { output: Output },
    /// `{"content": [{"type": "text", "text": ...}]}`
    ContentList { content: Vec<TypedContent> },
}

#[derive(Debug, Deserialize)]
struct Output {
    message: OutputMessage,
}

#[derive(Debug, Deserialize)]
struct OutputMessage {
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TypedContent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl InvokeResponse {
    /// First textual content item, whichever shape the envelope took.
    fn into_text(self) -> Option<String> {
        match self {
            Self::OutputMessage { output } => {
                output.message.content.into_iter().find_map(|c| c.text)
            }
            Self::ContentList { content } => content
                .into_iter()
                .find(|c| c.kind.as_deref() == Some("text"))
                .and_then(|c| c.text),
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Decode the response envelope and pull out the reply text.
fn reply_text(body: &str) -> Result<String, InferenceError> {
    let envelope: InvokeResponse =
        serde_json::from_str(body).map_err(|_| InferenceError::Protocol)?;
    envelope.into_text().ok_or(InferenceError::Protocol)
}

/// Parse the reply text as JSON, stripping markdown code fences first since
/// some models wrap their output in them despite instructions.
fn parse_candidate_json(text: &str) -> Result<Value, InferenceError> {
    let json_str = if text.contains("```json") {
        text.split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(text)
            .trim()
    } else if text.contains("```") {
        text.split("```").nth(1).unwrap_or(text).trim()
    } else {
        text.trim()
    };

    serde_json::from_str(json_str).map_err(|e| {
        info!("Unparseable model reply: {}", &text.chars().take(200).collect::<String>());
        InferenceError::Format(e.to_string())
    })
}
