//! Canonical recipe types and result envelopes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A structured recipe, the canonical output of the extraction pipeline.
///
/// A `Recipe` is only constructed from a candidate that already passed
/// normalization and validation, so every field is present with the right
/// shape: positive `servings`, numeric quantities, lower-cased units,
/// 1-based step order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    pub servings: f64,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub order: u32,
    pub text: String,
}

/// Outcome of one extraction run, including the downstream submission leg.
///
/// The recipe is kept even when the downstream store rejected it; the
/// submission outcome is reported alongside instead of replacing the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub recipe: Recipe,
    pub downstream: DownstreamOutcome,
    pub metadata: ExtractionMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamOutcome {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownstreamOutcome {
    pub fn delivered(status: u16) -> Self {
        Self {
            sent: true,
            status: Some(status),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            sent: false,
            status: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    pub id: String,
    pub extracted_at: String,
    pub model_used: String,
    pub content_hash: String,
}

impl ExtractionMetadata {
    /// Stamp a fresh extraction: id, capture time, model and a hash of the
    /// source text.
    pub fn new(model: &str, raw_text: &str) -> Self {
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(raw_text.as_bytes());
            format!("{:x}", hasher.finalize())
        };

        Self {
            id: format!("rec_{}", Uuid::new_v4().simple()),
            extracted_at: Utc::now().to_rfc3339(),
            model_used: model.to_string(),
            content_hash,
        }
    }
}

/// Aggregate health of the service's external collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub services: ServiceAvailability,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAvailability {
    pub backend: bool,
    pub downstream: bool,
}
