//! Client for the external document-text-detection service.
//!
//! Jobs are started here and their terminal results read here, but job
//! state is owned by the service: there is no polling loop or backoff.
//! `poll_result` is only meant to be called after an external completion
//! signal has arrived.

use crate::config::AppConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("detection request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("detection service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("detection job failed: {status_message}")]
    JobFailed { status_message: String },

    /// The job has no terminal state yet; the caller polled too early.
    #[error("detection job is still in progress")]
    JobNotReady,
}

/// Stateless client for the text-detection API.
#[derive(Clone)]
pub struct OcrClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OcrClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.ocr_api_url.trim_end_matches('/').to_string(),
            api_key: config.ocr_api_key.clone(),
        }
    }

    /// Submit a stored document for asynchronous text detection. Completion
    /// is signalled out-of-band on the given notification topic.
    pub async fn start_async(
        &self,
        bucket: &str,
        key: &str,
        notification_topic: &str,
        execution_role: &str,
    ) -> Result<String, OcrError> {
        let request = StartJobRequest {
            bucket,
            key,
            notification_topic,
            execution_role,
        };

        let url = format!("{}/jobs", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let started: StartJobResponse = read_json(response).await?;
        info!("Started detection job {} for {bucket}/{key}", started.job_id);
        Ok(started.job_id)
    }

    /// Fetch the pages of a finished detection job, following the
    /// continuation token until exhausted, and join the detected lines.
    pub async fn poll_result(&self, job_id: &str) -> Result<String, OcrError> {
        let mut lines: Vec<String> = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let url = format!("{}/jobs/{job_id}", self.base_url);
            let mut request = self.client.get(&url).bearer_auth(&self.api_key);
            if let Some(token) = &next_token {
                request = request.query(&[("nextToken", token)]);
            }

            let page: JobResultPage = read_json(request.send().await?).await?;
            match page.status.as_str() {
                "SUCCEEDED" => {}
                "FAILED" => {
                    return Err(OcrError::JobFailed {
                        status_message: page
                            .status_message
                            .unwrap_or_else(|| "no status message".to_string()),
                    });
                }
                _ => return Err(OcrError::JobNotReady),
            }

            debug!("Job {job_id}: page with {} lines", page.lines.len());
            lines.extend(page.lines);

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        info!("Job {job_id}: collected {} lines", lines.len());
        Ok(lines.join("\n"))
    }

    /// Detect text in one call, for small documents. No job id is involved.
    pub async fn detect_sync(&self, bucket: &str, key: &str) -> Result<String, OcrError> {
        let url = format!("{}/detect", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&DetectRequest { bucket, key })
            .send()
            .await?;

        let detected: DetectResponse = read_json(response).await?;
        info!(
            "Synchronous detection of {bucket}/{key}: {} lines",
            detected.lines.len()
        );
        Ok(detected.lines.join("\n"))
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, OcrError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OcrError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartJobRequest<'a> {
    bucket: &'a str,
    key: &'a str,
    notification_topic: &'a str,
    execution_role: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartJobResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResultPage {
    status: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    lines: Vec<String>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectRequest<'a> {
    bucket: &'a str,
    key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectResponse {
    #[serde(default)]
    lines: Vec<String>,
}
