//! Client for the downstream recipe store.

use crate::config::AppConfig;
use crate::schema::Recipe;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("recipe store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("recipe store returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Acknowledgement from a successful submission.
#[derive(Debug, Clone)]
pub struct StoreReceipt {
    pub status: u16,
}

/// Client for the environment's recipe store.
#[derive(Clone)]
pub struct RecipeStoreClient {
    client: Client,
    base_url: String,
    store_name: String,
}

impl RecipeStoreClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.recipe_store_url.trim_end_matches('/').to_string(),
            store_name: config.store_name(),
        }
    }

    /// POST a validated recipe to the store.
    pub async fn submit(&self, recipe: &Recipe) -> Result<StoreReceipt, StoreError> {
        let url = format!("{}/recipes", self.base_url);
        debug!("Submitting '{}' to {}", recipe.title, self.store_name);

        let response = self.client.post(&url).json(recipe).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(StoreReceipt {
            status: status.as_u16(),
        })
    }

    /// Probe the store's health endpoint. Reports `false` on any failure
    /// and never errors.
    pub async fn check_availability(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!("{} availability probe failed: {err}", self.store_name);
                false
            }
        }
    }
}
