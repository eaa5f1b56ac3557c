//! Runtime configuration, read once at startup and handed to every component.
//!
//! No component reads environment state on its own; `main` builds one
//! [`AppConfig`] and passes it into the constructors.

use anyhow::{Context, Result};
use std::env;

/// Read-only configuration for one deployment of the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Region identifier, carried through to outbound request logging.
    pub region: String,
    /// Deployment environment tag; selects the downstream store's logical name.
    pub environment: String,
    /// Identifier of the generative model used for recipe extraction.
    pub extraction_model: String,
    pub inference_api_url: String,
    pub inference_api_key: String,
    pub ocr_api_url: String,
    pub ocr_api_key: String,
    pub recipe_store_url: String,
    /// Required only when OCR runs asynchronously.
    pub ocr_notification_topic: Option<String>,
    /// Required only when OCR runs asynchronously.
    pub ocr_execution_role: Option<String>,
    /// When set, uploaded documents are OCR'd and extracted inline instead of
    /// going through an async detection job.
    pub sync_ocr: bool,
    pub bind_addr: String,
}

impl AppConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            region: env::var("REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()),
            extraction_model: env::var("EXTRACTION_MODEL")
                .unwrap_or_else(|_| "text-extract-v2".to_string()),
            inference_api_url: required("INFERENCE_API_URL")?,
            inference_api_key: required("INFERENCE_API_KEY")?,
            ocr_api_url: required("OCR_API_URL")?,
            ocr_api_key: required("OCR_API_KEY")?,
            recipe_store_url: required("RECIPE_STORE_URL")?,
            ocr_notification_topic: env::var("OCR_NOTIFICATION_TOPIC").ok(),
            ocr_execution_role: env::var("OCR_EXECUTION_ROLE").ok(),
            sync_ocr: flag("SYNC_OCR"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }

    /// Logical name of the downstream store for this environment.
    pub fn store_name(&self) -> String {
        format!("recipe-store-{}", self.environment)
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} environment variable not set"))
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
