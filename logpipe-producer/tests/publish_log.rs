use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use logpipe::codec::decode;
use logpipe::log::memory::{LogOperation, MemoryLog};
use logpipe_config::shared::StreamConfig;
use logpipe_producer::routes::ErrorMessage;
use logpipe_producer::routes::logs::PublishLogResponse;
use logpipe_producer::startup::configure_routes;
use logpipe_telemetry::metrics::init_metrics_handle;
use serde_json::json;

macro_rules! test_app {
    ($log:expr) => {
        test::init_service(
            App::new()
                .app_data(web::ThinData(init_metrics_handle().unwrap()))
                .app_data(web::Data::new($log.clone()))
                .app_data(web::Data::new(StreamConfig::default()))
                .configure(configure_routes::<MemoryLog>),
        )
        .await
    };
}

fn valid_event() -> serde_json::Value {
    json!({
        "ts": "2024-05-01T12:30:00Z",
        "app": "billing",
        "level": "INFO",
        "msg": "invoice sent",
        "fields": {"invoice_id": 42}
    })
}

#[actix_web::test]
async fn valid_event_is_appended_to_the_stream() {
    let log = MemoryLog::new();
    let app = test_app!(log);

    let request = test::TestRequest::post()
        .uri("/api/logs")
        .set_json(valid_event())
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: PublishLogResponse = test::read_body_json(response).await;

    let entries = log.entries(StreamConfig::DEFAULT_NAME).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, body.record_id);

    let event = decode(&entries[0]).unwrap();
    assert_eq!(event.application, "billing");
    assert_eq!(event.level, "INFO");
    assert_eq!(event.message, "invoice sent");
    assert_eq!(event.fields.unwrap()["invoice_id"], json!(42));
}

#[actix_web::test]
async fn response_carries_the_record_id_as_a_string() {
    let log = MemoryLog::new();
    let app = test_app!(log);

    let request = test::TestRequest::post()
        .uri("/api/logs")
        .set_json(valid_event())
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;

    let record_id = body["recordId"].as_str().unwrap();
    assert!(record_id.contains('-'));
    assert!(body.get("record_id").is_none());
}

#[actix_web::test]
async fn event_without_timestamp_is_rejected() {
    let log = MemoryLog::new();
    let app = test_app!(log);

    let mut event = valid_event();
    event.as_object_mut().unwrap().remove("ts");
    let request = test::TestRequest::post()
        .uri("/api/logs")
        .set_json(event)
        .to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorMessage = test::read_body_json(response).await;
    assert_eq!(body.error, "missing required field 'ts'");
    assert!(log.entries(StreamConfig::DEFAULT_NAME).await.is_empty());
}

#[actix_web::test]
async fn malformed_body_is_rejected() {
    let log = MemoryLog::new();
    let app = test_app!(log);

    let request = test::TestRequest::post()
        .uri("/api/logs")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorMessage = test::read_body_json(response).await;
    assert!(body.error.starts_with("invalid request body"));
    assert_eq!(log.calls(LogOperation::Append).await, 0);
}

#[actix_web::test]
async fn oversized_fields_and_bad_timestamps_are_rejected() {
    let log = MemoryLog::new();
    let app = test_app!(log);

    let mut event = valid_event();
    event["app"] = json!("a".repeat(101));
    let request = test::TestRequest::post()
        .uri("/api/logs")
        .set_json(event)
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorMessage = test::read_body_json(response).await;
    assert_eq!(
        body.error,
        "field 'app' is 101 characters long, the limit is 100"
    );

    let mut event = valid_event();
    event["ts"] = json!("yesterday");
    let request = test::TestRequest::post()
        .uri("/api/logs")
        .set_json(event)
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorMessage = test::read_body_json(response).await;
    assert!(body.error.starts_with("invalid timestamp 'yesterday'"));

    assert!(log.entries(StreamConfig::DEFAULT_NAME).await.is_empty());
}

#[actix_web::test]
async fn nul_characters_are_rejected() {
    let log = MemoryLog::new();
    let app = test_app!(log);

    let mut event = valid_event();
    event["msg"] = json!("before\u{0}after");
    let request = test::TestRequest::post()
        .uri("/api/logs")
        .set_json(event)
        .to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorMessage = test::read_body_json(response).await;
    assert_eq!(body.error, "field 'msg' contains a NUL character");
    assert!(log.entries(StreamConfig::DEFAULT_NAME).await.is_empty());
}

#[actix_web::test]
async fn log_failure_returns_an_internal_error() {
    let log = MemoryLog::new();
    log.inject_failures(LogOperation::Append, 1).await;
    let app = test_app!(log);

    let request = test::TestRequest::post()
        .uri("/api/logs")
        .set_json(valid_event())
        .to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorMessage = test::read_body_json(response).await;
    assert_eq!(body.error, "internal server error");
}

#[actix_web::test]
async fn health_check_works() {
    let log = MemoryLog::new();
    let app = test_app!(log);

    let request = test::TestRequest::get().uri("/health_check").to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[actix_web::test]
async fn metrics_expose_published_records() {
    let log = MemoryLog::new();
    let app = test_app!(log);

    let request = test::TestRequest::post()
        .uri("/api/logs")
        .set_json(valid_event())
        .to_request();
    assert!(test::call_service(&app, request).await.status().is_success());

    let request = test::TestRequest::get().uri("/metrics").to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = test::read_body(response).await;
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("logpipe_records_published_total"));
}
