//! Inbound event classification and dispatch.
//!
//! One inbound event is exactly one of: a storage-upload batch, a
//! job-completion batch, or a direct request. Batch paths never fail as a
//! whole for one record's error (only the async-OCR configuration check
//! runs before the records); the direct path maps every failure class to
//! its own status code.

use crate::config::AppConfig;
use crate::extractor::{ExtractError, RecipeExtractor};
use crate::ocr::OcrClient;
use crate::schema::{ExtractionResult, HealthReport};
use crate::web::{self, PageFetcher};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

/// Upload extensions accepted for OCR.
const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// Hard limit on the text handed to the extraction backend. Literal text
/// over the limit is rejected; URL-sourced text is truncated instead.
const MAX_TEXT_CHARS: usize = 50_000;

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ApiResponse {
    pub fn success(status_code: u16, data: Value) -> Self {
        Self {
            status_code,
            body: ResponseBody {
                success: true,
                data: Some(data),
                error: None,
            },
        }
    }

    pub fn failure(status_code: u16, message: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            status_code,
            body: ResponseBody {
                success: false,
                data: None,
                error: Some(ErrorBody {
                    message: message.into(),
                    details,
                }),
            },
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

// ============================================================================
// Event classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    StorageUpload,
    JobCompletion,
    Direct,
}

/// Classify an event by its structural markers. Exhaustive and mutually
/// exclusive; anything without a recognized batch marker is a direct
/// request.
fn classify(event: &Value) -> EventKind {
    let first_origin = event
        .get("records")
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .and_then(|record| record.get("originTag"))
        .and_then(Value::as_str);

    match first_origin {
        Some("storage") => EventKind::StorageUpload,
        Some("queue") => EventKind::JobCompletion,
        _ => EventKind::Direct,
    }
}

// ============================================================================
// Router
// ============================================================================

pub struct EventRouter {
    extractor: RecipeExtractor,
    ocr: OcrClient,
    pages: PageFetcher,
    config: AppConfig,
}

impl EventRouter {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            extractor: RecipeExtractor::from_config(&config),
            ocr: OcrClient::new(&config),
            pages: PageFetcher::new()?,
            config,
        })
    }

    /// Dispatch one inbound event and assemble the outer response.
    pub async fn handle(&self, event: Value) -> ApiResponse {
        match classify(&event) {
            EventKind::StorageUpload => self.handle_storage_batch(&event).await,
            EventKind::JobCompletion => self.handle_job_completion_batch(&event).await,
            EventKind::Direct => self.handle_direct(&event).await,
        }
    }

    pub async fn health(&self) -> HealthReport {
        self.extractor.health_check().await
    }

    // ------------------------------------------------------------------
    // Storage-upload path
    // ------------------------------------------------------------------

    async fn handle_storage_batch(&self, event: &Value) -> ApiResponse {
        let records = event
            .get("records")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // Async mode needs the notification wiring; checked before any
        // record is touched so a misconfigured batch fails as a whole.
        let async_ocr = if self.config.sync_ocr {
            None
        } else {
            match (
                &self.config.ocr_notification_topic,
                &self.config.ocr_execution_role,
            ) {
                (Some(topic), Some(role)) => Some((topic.clone(), role.clone())),
                _ => {
                    return ApiResponse::failure(
                        500,
                        "Asynchronous OCR requires both a notification topic and an execution role",
                        Vec::new(),
                    )
                }
            }
        };

        let mut outcomes = Vec::with_capacity(records.len());
        for record in &records {
            let bucket = string_field(record, "bucketName");
            let key = string_field(record, "objectKey");
            outcomes.push(
                self.process_storage_record(&bucket, &key, async_ocr.as_ref())
                    .await,
            );
        }

        info!("Storage batch processed: {} records", outcomes.len());
        ApiResponse::success(
            202,
            json!({ "processed": outcomes.len(), "records": outcomes }),
        )
    }

    async fn process_storage_record(
        &self,
        bucket: &str,
        key: &str,
        async_ocr: Option<&(String, String)>,
    ) -> StorageRecordOutcome {
        let mut outcome = StorageRecordOutcome::new(bucket, key);

        if key.is_empty() {
            outcome.status = RecordStatus::Error;
            outcome.message = Some("record is missing objectKey".to_string());
            return outcome;
        }

        if !has_supported_extension(key) {
            info!("Skipping upload with unsupported extension: {key}");
            outcome.status = RecordStatus::Skipped;
            outcome.message = Some("unsupported file extension".to_string());
            return outcome;
        }

        match async_ocr {
            // Synchronous mode: detect and extract inline.
            None => match self.ocr.detect_sync(bucket, key).await {
                Ok(text) => match self.extractor.run(&text).await {
                    Ok(result) => {
                        outcome.status = RecordStatus::Completed;
                        outcome.result = Some(Box::new(result));
                    }
                    Err(err) => {
                        error!("Extraction failed for {bucket}/{key}: {err}");
                        outcome.status = RecordStatus::Error;
                        outcome.message = Some(err.to_string());
                    }
                },
                Err(err) => {
                    error!("Detection failed for {bucket}/{key}: {err}");
                    outcome.status = RecordStatus::Error;
                    outcome.message = Some(err.to_string());
                }
            },
            // Asynchronous mode: only start the job; the completion
            // notification arrives as a separate event.
            Some((topic, role)) => match self.ocr.start_async(bucket, key, topic, role).await {
                Ok(job_id) => {
                    outcome.status = RecordStatus::Processing;
                    outcome.job_id = Some(job_id);
                }
                Err(err) => {
                    error!("Could not start detection for {bucket}/{key}: {err}");
                    outcome.status = RecordStatus::Error;
                    outcome.message = Some(err.to_string());
                }
            },
        }

        outcome
    }

    // ------------------------------------------------------------------
    // Job-completion path
    // ------------------------------------------------------------------

    async fn handle_job_completion_batch(&self, event: &Value) -> ApiResponse {
        let records = event
            .get("records")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut outcomes = Vec::with_capacity(records.len());
        for record in &records {
            outcomes.push(self.process_completion_record(record).await);
        }

        info!("Completion batch processed: {} records", outcomes.len());
        ApiResponse::success(
            200,
            json!({ "processed": outcomes.len(), "records": outcomes }),
        )
    }

    async fn process_completion_record(&self, record: &Value) -> CompletionRecordOutcome {
        let status = match unwrap_completion(record) {
            Ok(status) => status,
            Err(message) => {
                return CompletionRecordOutcome {
                    job_id: None,
                    processed: false,
                    status: "ERROR".to_string(),
                    result: None,
                    error: Some(message),
                }
            }
        };

        let mut outcome = CompletionRecordOutcome {
            job_id: Some(status.job_id.clone()),
            processed: false,
            status: status.status.clone(),
            result: None,
            error: None,
        };

        // Only successful terminal states have text worth fetching.
        if status.status != "SUCCEEDED" {
            info!("Skipping job {} in state {}", status.job_id, status.status);
            return outcome;
        }

        let extraction = match self.ocr.poll_result(&status.job_id).await {
            Ok(text) => self.extractor.run(&text).await,
            Err(err) => {
                error!("Could not read results of job {}: {err}", status.job_id);
                outcome.error = Some(err.to_string());
                return outcome;
            }
        };

        match extraction {
            Ok(result) => {
                outcome.processed = true;
                outcome.result = Some(Box::new(result));
            }
            Err(err) => {
                error!("Extraction failed for job {}: {err}", status.job_id);
                outcome.error = Some(err.to_string());
            }
        }

        outcome
    }

    // ------------------------------------------------------------------
    // Direct-request path
    // ------------------------------------------------------------------

    async fn handle_direct(&self, event: &Value) -> ApiResponse {
        let request = match parse_direct_body(event) {
            Ok(request) => request,
            Err(message) => return ApiResponse::failure(400, message, Vec::new()),
        };

        // URL takes precedence when both fields are present.
        if let Some(url) = request.url.filter(|u| !u.trim().is_empty()) {
            return self.handle_url_request(&url).await;
        }

        let text = match request.recipe_text.filter(|t| !t.trim().is_empty()) {
            Some(text) => text,
            None => {
                return ApiResponse::failure(
                    400,
                    "Missing required parameter: url or recipeText",
                    Vec::new(),
                )
            }
        };

        if text.chars().count() > MAX_TEXT_CHARS {
            return ApiResponse::failure(
                400,
                format!("recipeText exceeds the {MAX_TEXT_CHARS} character limit"),
                Vec::new(),
            );
        }

        self.extract_and_wrap(&text).await
    }

    async fn handle_url_request(&self, url: &str) -> ApiResponse {
        if !web::is_valid_url(url) {
            return ApiResponse::failure(400, format!("Invalid URL: {url}"), Vec::new());
        }

        let page = match self.pages.fetch_and_extract(url).await {
            Ok(page) => page,
            Err(err) => {
                error!("Fetch failed for {url}: {err}");
                return ApiResponse::failure(
                    502,
                    "Failed to fetch URL",
                    vec![err.to_string()],
                );
            }
        };

        if page.text.trim().is_empty() {
            return ApiResponse::failure(422, "No text found at URL", Vec::new());
        }

        // Page text over the limit is truncated, never rejected.
        let text: String = page.text.chars().take(MAX_TEXT_CHARS).collect();
        self.extract_and_wrap(&text).await
    }

    async fn extract_and_wrap(&self, text: &str) -> ApiResponse {
        match self.extractor.run(text).await {
            Ok(result) => {
                ApiResponse::success(200, serde_json::to_value(result).unwrap_or(Value::Null))
            }
            Err(err) => extraction_failure(err),
        }
    }
}

/// Map an extraction failure to its externally-visible status code.
fn extraction_failure(err: ExtractError) -> ApiResponse {
    match err {
        ExtractError::EmptyInput => ApiResponse::failure(
            400,
            "Missing required parameter: url or recipeText",
            Vec::new(),
        ),
        ExtractError::Backend(err) => {
            error!("Backend extraction failed: {err}");
            ApiResponse::failure(
                503,
                "AI service temporarily unavailable",
                vec![err.to_string()],
            )
        }
        ExtractError::InvalidRecipe { errors } => {
            ApiResponse::failure(422, "Could not extract a valid recipe", errors)
        }
        other => {
            error!("Extraction failed: {other}");
            ApiResponse::failure(500, "Internal error", Vec::new())
        }
    }
}

// ============================================================================
// Record shapes
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StorageRecordOutcome {
    bucket_name: String,
    object_key: String,
    status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Box<ExtractionResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl StorageRecordOutcome {
    fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket_name: bucket.to_string(),
            object_key: key.to_string(),
            status: RecordStatus::Error,
            job_id: None,
            result: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum RecordStatus {
    Completed,
    Skipped,
    Processing,
    Error,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRecordOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
    processed: bool,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Box<ExtractionResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Inner payload of a completion notification after both envelope layers
/// are unwrapped.
#[derive(Debug, Deserialize)]
struct JobStatusMessage {
    #[serde(rename = "JobId")]
    job_id: String,
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct TransportEnvelope {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    recipe_text: Option<String>,
}

// ============================================================================
// Helper functions
// ============================================================================

fn string_field(record: &Value, field: &str) -> String {
    record
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn has_supported_extension(key: &str) -> bool {
    std::path::Path::new(key)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Unwrap the two notification layers: the record's `body` is transport
/// envelope JSON whose `Message` is job-status JSON.
fn unwrap_completion(record: &Value) -> Result<JobStatusMessage, String> {
    let body = record
        .get("body")
        .ok_or_else(|| "record is missing body".to_string())?;

    let envelope: TransportEnvelope = match body {
        Value::String(raw) => serde_json::from_str(raw),
        other => serde_json::from_value(other.clone()),
    }
    .map_err(|e| format!("malformed transport envelope: {e}"))?;

    serde_json::from_str(&envelope.message)
        .map_err(|e| format!("malformed job-status payload: {e}"))
}

/// Parse a direct request's payload. The body arrives either as a JSON
/// string or as an already-parsed object; an absent or blank body is an
/// empty request (reported as a missing parameter, not as malformed).
fn parse_direct_body(event: &Value) -> Result<DirectRequest, String> {
    let body = match event.get("body") {
        None | Some(Value::Null) => return Ok(DirectRequest::default()),
        Some(body) => body,
    };

    match body {
        Value::String(raw) if raw.trim().is_empty() => Ok(DirectRequest::default()),
        Value::String(raw) => {
            serde_json::from_str(raw).map_err(|e| format!("Malformed request body: {e}"))
        }
        other => serde_json::from_value(other.clone())
            .map_err(|e| format!("Malformed request body: {e}")),
    }
}
