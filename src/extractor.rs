//! Recipe extraction pipeline: backend extraction, validation, downstream
//! submission.

use crate::config::AppConfig;
use crate::inference::{InferenceClient, InferenceError};
use crate::schema::{
    DownstreamOutcome, ExtractionMetadata, ExtractionResult, HealthReport, HealthStatus, Recipe,
    ServiceAvailability,
};
use crate::store::RecipeStoreClient;
use crate::validator;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no text to extract from")]
    EmptyInput,

    #[error(transparent)]
    Backend(#[from] InferenceError),

    #[error("extracted recipe failed validation: {}", errors.join("; "))]
    InvalidRecipe { errors: Vec<String> },

    /// A validated candidate that still fails to deserialize means the
    /// validator and the canonical types disagree.
    #[error("recipe candidate did not match the canonical shape: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Drives raw text through extraction, validation and submission.
pub struct RecipeExtractor {
    inference: InferenceClient,
    store: RecipeStoreClient,
}

impl RecipeExtractor {
    pub fn new(inference: InferenceClient, store: RecipeStoreClient) -> Self {
        Self { inference, store }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(InferenceClient::new(config), RecipeStoreClient::new(config))
    }

    /// Extract a recipe from raw text and submit it downstream.
    ///
    /// A downstream failure is captured in the result instead of propagated:
    /// the extraction already succeeded and must not be lost because the
    /// storage leg is temporarily down.
    pub async fn run(&self, raw_text: &str) -> Result<ExtractionResult, ExtractError> {
        if raw_text.trim().is_empty() {
            return Err(ExtractError::EmptyInput);
        }

        info!(
            "Starting extraction: {} chars of input",
            raw_text.chars().count()
        );

        let candidate = self.inference.extract(raw_text).await?;

        let report = validator::validate(&candidate);
        if !report.valid {
            return Err(ExtractError::InvalidRecipe {
                errors: report.errors,
            });
        }
        let recipe: Recipe = serde_json::from_value(candidate)?;

        let downstream = match self.store.submit(&recipe).await {
            Ok(receipt) => DownstreamOutcome::delivered(receipt.status),
            Err(err) => {
                warn!("Downstream submission failed, keeping extraction: {err}");
                DownstreamOutcome::failed(err.to_string())
            }
        };

        info!(
            "Extraction complete: '{}' ({} ingredients, {} steps)",
            recipe.title,
            recipe.ingredients.len(),
            recipe.steps.len()
        );

        Ok(ExtractionResult {
            metadata: ExtractionMetadata::new(self.inference.model(), raw_text),
            recipe,
            downstream,
        })
    }

    /// Probe both collaborators independently and report aggregate health.
    pub async fn health_check(&self) -> HealthReport {
        let backend = self.inference.check_availability().await;
        let downstream = self.store.check_availability().await;

        let status = match (backend, downstream) {
            (true, true) => HealthStatus::Healthy,
            (false, false) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };

        HealthReport {
            status,
            services: ServiceAvailability {
                backend,
                downstream,
            },
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
