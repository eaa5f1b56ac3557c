//! End-to-end tests for the ingestion router against mocked HTTP
//! collaborators (inference service, OCR service, recipe store).

use recipe_ingest::config::AppConfig;
use recipe_ingest::ocr::{OcrClient, OcrError};
use recipe_ingest::router::EventRouter;
use recipe_ingest::schema::HealthStatus;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FRENCH_SALAD: &str = "Salade verte: laitue, tomates, concombre, vinaigrette. \
     Laver et couper les légumes, assaisonner.";

fn test_config(inference_url: &str, ocr_url: &str, store_url: &str) -> AppConfig {
    AppConfig {
        region: "test-region-1".to_string(),
        environment: "test".to_string(),
        extraction_model: "test-model".to_string(),
        inference_api_url: inference_url.to_string(),
        inference_api_key: "inference-key".to_string(),
        ocr_api_url: ocr_url.to_string(),
        ocr_api_key: "ocr-key".to_string(),
        recipe_store_url: store_url.to_string(),
        ocr_notification_topic: None,
        ocr_execution_role: None,
        sync_ocr: true,
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

async fn mock_servers() -> (MockServer, MockServer, MockServer) {
    let inference = MockServer::start().await;
    let ocr = MockServer::start().await;
    let store = MockServer::start().await;
    (inference, ocr, store)
}

fn salad_recipe() -> Value {
    json!({
        "title": "Salade verte",
        "servings": 2,
        "ingredients": [
            {"name": "laitue", "quantity": 1, "unit": ""},
            {"name": "tomates", "quantity": 2, "unit": ""},
        ],
        "steps": [
            {"order": 1, "text": "Laver et couper les légumes."},
            {"order": 2, "text": "Assaisonner."},
        ],
        "tags": ["salade"],
    })
}

/// Reply in the "content array with typed items" envelope shape.
fn content_list_reply(recipe: &Value) -> Value {
    json!({"content": [{"type": "text", "text": recipe.to_string()}]})
}

/// Reply in the "output message" envelope shape.
fn output_message_reply(recipe: &Value) -> Value {
    json!({"output": {"message": {"content": [{"text": recipe.to_string()}]}}})
}

async fn mount_inference_reply(server: &MockServer, reply: Value) {
    Mock::given(method("POST"))
        .and(path("/model/test-model/invoke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .mount(server)
        .await;
}

async fn mount_store_accepting(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/recipes"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "stored-1"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn direct_text_request_returns_structured_recipe() {
    let (inference, ocr, store) = mock_servers().await;
    mount_inference_reply(&inference, content_list_reply(&salad_recipe())).await;
    mount_store_accepting(&store).await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"body": {"recipeText": FRENCH_SALAD}}))
        .await;

    assert_eq!(response.status_code, 200);
    assert!(response.body.success);

    let data = response.body.data.expect("success response carries data");
    assert!(!data["recipe"]["ingredients"].as_array().unwrap().is_empty());
    assert!(!data["recipe"]["steps"].as_array().unwrap().is_empty());
    assert_eq!(data["downstream"]["sent"], json!(true));
    assert_eq!(data["metadata"]["modelUsed"], json!("test-model"));
}

#[tokio::test]
async fn downstream_failure_never_discards_the_extraction() {
    let (inference, ocr, store) = mock_servers().await;
    mount_inference_reply(&inference, content_list_reply(&salad_recipe())).await;
    Mock::given(method("POST"))
        .and(path("/recipes"))
        .respond_with(ResponseTemplate::new(500).set_body_string("store is down"))
        .mount(&store)
        .await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"body": {"recipeText": FRENCH_SALAD}}))
        .await;

    // The extraction still succeeds; only the submission leg is reported
    // as failed.
    assert_eq!(response.status_code, 200);
    let data = response.body.data.unwrap();
    assert_eq!(data["recipe"]["title"], json!("Salade verte"));
    assert_eq!(data["downstream"]["sent"], json!(false));
    assert!(data["downstream"]["error"].is_string());
}

#[tokio::test]
async fn both_response_envelope_shapes_are_accepted() {
    let (inference, ocr, store) = mock_servers().await;
    mount_inference_reply(&inference, output_message_reply(&salad_recipe())).await;
    mount_store_accepting(&store).await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"body": {"recipeText": FRENCH_SALAD}}))
        .await;

    assert_eq!(response.status_code, 200);
    let data = response.body.data.unwrap();
    assert_eq!(data["recipe"]["title"], json!("Salade verte"));
}

#[tokio::test]
async fn empty_body_is_a_missing_parameter() {
    let (inference, ocr, store) = mock_servers().await;
    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();

    let response = router.handle(json!({"body": {}})).await;

    assert_eq!(response.status_code, 400);
    assert_eq!(
        response.body.error.unwrap().message,
        "Missing required parameter: url or recipeText"
    );
}

#[tokio::test]
async fn oversized_literal_text_is_rejected_before_any_backend_call() {
    let (inference, ocr, store) = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/model/test-model/invoke"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&inference)
        .await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let text = "a".repeat(50_001);
    let response = router.handle(json!({"body": {"recipeText": text}})).await;

    assert_eq!(response.status_code, 400);
}

#[tokio::test]
async fn url_sourced_text_is_truncated_not_rejected() {
    let (inference, ocr, store) = mock_servers().await;
    let pages = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recipe"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("<p>{}</p>", "a".repeat(60_000))),
        )
        .mount(&pages)
        .await;
    mount_inference_reply(&inference, content_list_reply(&salad_recipe())).await;
    mount_store_accepting(&store).await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"body": {"url": format!("{}/recipe", pages.uri())}}))
        .await;

    assert_eq!(response.status_code, 200);

    // The backend saw at most the cap, not the full page text.
    let requests = inference.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let user_text = sent["messages"][0]["content"].as_str().unwrap();
    assert_eq!(user_text.chars().count(), 50_000);
}

#[tokio::test]
async fn redirects_are_followed() {
    let (inference, ocr, store) = mock_servers().await;
    let pages = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/final"))
        .mount(&pages)
        .await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Salade verte</h1>"))
        .mount(&pages)
        .await;
    mount_inference_reply(&inference, content_list_reply(&salad_recipe())).await;
    mount_store_accepting(&store).await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"body": {"url": format!("{}/start", pages.uri())}}))
        .await;

    assert_eq!(response.status_code, 200);
}

#[tokio::test]
async fn redirect_cycles_are_bounded() {
    let (inference, ocr, store) = mock_servers().await;
    let pages = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&pages)
        .await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"body": {"url": format!("{}/loop", pages.uri())}}))
        .await;

    assert_eq!(response.status_code, 502);
}

#[tokio::test]
async fn invalid_candidate_maps_to_unprocessable() {
    let (inference, ocr, store) = mock_servers().await;
    // Parseable JSON, but no title and no ingredient/step arrays.
    mount_inference_reply(&inference, content_list_reply(&json!({"servings": 2}))).await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"body": {"recipeText": FRENCH_SALAD}}))
        .await;

    assert_eq!(response.status_code, 422);
    let error = response.body.error.unwrap();
    assert_eq!(error.message, "Could not extract a valid recipe");
    assert!(!error.details.is_empty());
}

#[tokio::test]
async fn unparseable_model_reply_maps_to_service_unavailable() {
    let (inference, ocr, store) = mock_servers().await;
    mount_inference_reply(
        &inference,
        json!({"content": [{"type": "text", "text": "I could not find a recipe."}]}),
    )
    .await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"body": {"recipeText": FRENCH_SALAD}}))
        .await;

    assert_eq!(response.status_code, 503);
    assert_eq!(
        response.body.error.unwrap().message,
        "AI service temporarily unavailable"
    );
}

#[tokio::test]
async fn storage_batch_skips_unsupported_files_and_extracts_the_rest() {
    let (inference, ocr, store) = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/detect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lines": ["Salade verte", "laitue, tomates", "Laver et couper les légumes."]
        })))
        .expect(1)
        .mount(&ocr)
        .await;
    mount_inference_reply(&inference, content_list_reply(&salad_recipe())).await;
    mount_store_accepting(&store).await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"records": [
            {"originTag": "storage", "bucketName": "uploads", "objectKey": "menu.pdf"},
            {"originTag": "storage", "bucketName": "uploads", "objectKey": "photo.gif"},
        ]}))
        .await;

    assert_eq!(response.status_code, 202);
    let data = response.body.data.unwrap();
    assert_eq!(data["processed"], json!(2));
    assert_eq!(data["records"][0]["status"], json!("completed"));
    assert_eq!(
        data["records"][0]["result"]["recipe"]["title"],
        json!("Salade verte")
    );
    assert_eq!(data["records"][1]["status"], json!("skipped"));
}

#[tokio::test]
async fn async_storage_batch_fails_fast_without_notification_config() {
    let (inference, ocr, store) = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ocr)
        .await;

    let mut config = test_config(&inference.uri(), &ocr.uri(), &store.uri());
    config.sync_ocr = false;

    let router = EventRouter::new(config).unwrap();
    let response = router
        .handle(json!({"records": [
            {"originTag": "storage", "bucketName": "uploads", "objectKey": "menu.pdf"},
        ]}))
        .await;

    assert_eq!(response.status_code, 500);
    assert!(!response.body.success);
}

#[tokio::test]
async fn async_storage_batch_starts_detection_jobs() {
    let (inference, ocr, store) = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jobId": "job-42"})))
        .expect(1)
        .mount(&ocr)
        .await;

    let mut config = test_config(&inference.uri(), &ocr.uri(), &store.uri());
    config.sync_ocr = false;
    config.ocr_notification_topic = Some("ocr-complete-topic".to_string());
    config.ocr_execution_role = Some("ocr-publish-role".to_string());

    let router = EventRouter::new(config).unwrap();
    let response = router
        .handle(json!({"records": [
            {"originTag": "storage", "bucketName": "uploads", "objectKey": "menu.pdf"},
        ]}))
        .await;

    assert_eq!(response.status_code, 202);
    let data = response.body.data.unwrap();
    assert_eq!(data["records"][0]["status"], json!("processing"));
    assert_eq!(data["records"][0]["jobId"], json!("job-42"));

    // The job submission carried the notification wiring.
    let requests = ocr.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["notificationTopic"], json!("ocr-complete-topic"));
    assert_eq!(sent["executionRole"], json!("ocr-publish-role"));
}

fn completion_record(job_id: &str, status: &str) -> Value {
    json!({
        "originTag": "queue",
        "body": json!({
            "Message": json!({"JobId": job_id, "Status": status}).to_string()
        })
        .to_string(),
    })
}

#[tokio::test]
async fn failed_jobs_are_reported_without_touching_the_backend() {
    let (inference, ocr, store) = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/model/test-model/invoke"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&inference)
        .await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"records": [completion_record("job-7", "FAILED")]}))
        .await;

    assert_eq!(response.status_code, 200);
    let data = response.body.data.unwrap();
    assert_eq!(data["records"][0]["processed"], json!(false));
    assert_eq!(data["records"][0]["status"], json!("FAILED"));
}

#[tokio::test]
async fn successful_jobs_run_the_full_pipeline() {
    let (inference, ocr, store) = mock_servers().await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCEEDED",
            "lines": ["Salade verte", "laitue, tomates"],
        })))
        .mount(&ocr)
        .await;
    mount_inference_reply(&inference, content_list_reply(&salad_recipe())).await;
    mount_store_accepting(&store).await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let response = router
        .handle(json!({"records": [completion_record("job-9", "SUCCEEDED")]}))
        .await;

    assert_eq!(response.status_code, 200);
    let data = response.body.data.unwrap();
    assert_eq!(data["records"][0]["processed"], json!(true));
    assert_eq!(
        data["records"][0]["result"]["recipe"]["title"],
        json!("Salade verte")
    );
}

#[tokio::test]
async fn job_results_follow_the_continuation_token_in_page_order() {
    let (inference, ocr, store) = mock_servers().await;

    // The token-bearing request must be matched first; wiremock picks the
    // earliest mounted matching mock.
    Mock::given(method("GET"))
        .and(path("/jobs/job-3"))
        .and(query_param("nextToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCEEDED",
            "lines": ["Cuire 30 minutes."],
        })))
        .mount(&ocr)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCEEDED",
            "lines": ["Tarte aux pommes", "4 pommes"],
            "nextToken": "page-2",
        })))
        .mount(&ocr)
        .await;

    let client = OcrClient::new(&test_config(&inference.uri(), &ocr.uri(), &store.uri()));
    let text = client.poll_result("job-3").await.unwrap();

    assert_eq!(text, "Tarte aux pommes\n4 pommes\nCuire 30 minutes.");
}

#[tokio::test]
async fn polling_an_unfinished_job_is_its_own_error() {
    let (inference, ocr, store) = mock_servers().await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-5"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "IN_PROGRESS"})),
        )
        .mount(&ocr)
        .await;

    let client = OcrClient::new(&test_config(&inference.uri(), &ocr.uri(), &store.uri()));
    assert!(matches!(
        client.poll_result("job-5").await,
        Err(OcrError::JobNotReady)
    ));
}

#[tokio::test]
async fn health_degrades_when_only_the_store_is_down() {
    let (inference, ocr, store) = mock_servers().await;
    mount_inference_reply(&inference, content_list_reply(&salad_recipe())).await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&store)
        .await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let report = router.health().await;

    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(report.services.backend);
    assert!(!report.services.downstream);
}

#[tokio::test]
async fn health_is_unhealthy_when_no_collaborator_answers() {
    let (inference, ocr, store) = mock_servers().await;
    Mock::given(method("POST"))
        .and(path("/model/test-model/invoke"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&inference)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&store)
        .await;

    let router = EventRouter::new(test_config(&inference.uri(), &ocr.uri(), &store.uri())).unwrap();
    let report = router.health().await;

    assert_eq!(report.status, HealthStatus::Unhealthy);
}
