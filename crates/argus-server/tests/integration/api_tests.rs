use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use crate::integration::common::setup_test_app;

fn submit_body(urls: &[&str]) -> Body {
    Body::from(serde_json::to_vec(&serde_json::json!({ "urls": urls })).unwrap())
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_returns_200() {
    let (app, _db, _container) = setup_test_app().await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn submit_queues_new_urls() {
    let (app, _db, _container) = setup_test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/url-content")
                .header("content-type", "application/json")
                .body(submit_body(&["https://example.com", "example.org"]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["submitted"].as_array().unwrap().len(), 2);
    assert_eq!(json["queued"].as_array().unwrap().len(), 2);
    assert!(json["skipped"].as_array().unwrap().is_empty());

    // The record is immediately retrievable, in canonical form.
    let id = json["queued"][0].as_str().unwrap().to_string();
    let response = app
        .oneshot(
            Request::get(format!("/api/url-content/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = json_body(response).await;
    assert_eq!(record["url"], "https://example.com");
    assert_eq!(record["status"], "pending");
    assert_eq!(record["retryCount"], 0);
}

#[tokio::test]
async fn duplicate_submission_is_skipped() {
    let (app, _db, _container) = setup_test_app().await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/url-content")
                    .header("content-type", "application/json")
                    .body(submit_body(&["https://dup.test"]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::post("/api/url-content")
                .header("content-type", "application/json")
                .body(submit_body(&["https://dup.test"]))
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(response).await;
    assert!(json["queued"].as_array().unwrap().is_empty());
    assert_eq!(
        json["skipped"][0]["reason"],
        "Already queued (status=pending)"
    );
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let (app, _db, _container) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::post("/api/url-content")
                .header("content-type", "application/json")
                .body(submit_body(&[]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let (app, _db, _container) = setup_test_app().await;

    let urls: Vec<String> = (0..101).map(|i| format!("https://site{i}.test")).collect();
    let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let response = app
        .oneshot(
            Request::post("/api/url-content")
                .header("content-type", "application/json")
                .body(submit_body(&refs))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_returns_newest_first() {
    let (app, _db, _container) = setup_test_app().await;

    app.clone()
        .oneshot(
            Request::post("/api/url-content")
                .header("content-type", "application/json")
                .body(submit_body(&["https://a.test", "https://b.test"]))
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::get("/api/url-content?limit=10&offset=0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn latest_without_success_is_404() {
    let (app, _db, _container) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::get("/api/url-content/latest?url=https://nothing.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn latest_requires_url_parameter() {
    let (app, _db, _container) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::get("/api/url-content/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_id_is_400_and_unknown_id_is_404() {
    let (app, _db, _container) = setup_test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/url-content/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::get(format!("/api/url-content/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn by_url_returns_history_shape() {
    let (app, _db, _container) = setup_test_app().await;

    app.clone()
        .oneshot(
            Request::post("/api/url-content")
                .header("content-type", "application/json")
                .body(submit_body(&["https://hist.test"]))
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::get("/api/url-content/by-url?url=hist.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["url"], "hist.test");
    assert_eq!(json["totalScrapes"], 1);
    assert_eq!(json["scrapes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn fix_inconsistencies_reports_count() {
    let (app, db, _container) = setup_test_app().await;

    // Plant an invariant violation behind the repository's back.
    sqlx::query(
        r#"
        INSERT INTO fetch_records (url, status, content, error_message)
        VALUES ('https://broken.test', 'failed', '<x/>', 'boom')
        "#,
    )
    .execute(db.pool())
    .await
    .unwrap();

    let response = app
        .oneshot(
            Request::post("/api/url-content/fix-inconsistencies")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["fixed"], 1);
}
