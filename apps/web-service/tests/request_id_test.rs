//! # Request ID レイヤーのテスト
//!
//! 組み立てたアプリケーションの Request ID レイヤー（SetRequestIdLayer +
//! PropagateRequestIdLayer + カスタム make_span_with）が正しく動作することを検証する。
//!
//! - レスポンスに `X-Request-Id` ヘッダーが含まれる
//! - クライアント提供の `X-Request-Id` がそのまま返される
//! - 自動生成の `X-Request-Id` が UUID v7 形式である
//! - 404 ページにも `X-Request-Id` が付く

use axum::body::Body;
use http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use tower::ServiceExt;
use web_service::{AppConfig, WebApp, create_app};

fn test_app() -> WebApp {
    create_app(Some(AppConfig::testing())).unwrap()
}

#[tokio::test]
async fn test_レスポンスにx_request_idヘッダーが含まれる() {
    let app = test_app();

    let response = app
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers().contains_key("x-request-id"),
        "レスポンスに x-request-id ヘッダーが含まれること"
    );
}

#[tokio::test]
async fn test_クライアント提供のx_request_idがそのまま返される() {
    let app = test_app();
    let custom_id = "client-provided-request-id-123";

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", custom_id)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .unwrap()
            .to_str()
            .unwrap(),
        custom_id,
        "クライアント提供の Request ID がそのまま返されること"
    );
}

#[tokio::test]
async fn test_自動生成のx_request_idがuuid_v7形式である() {
    let app = test_app();

    let response = app
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let request_id = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap();
    let uuid = uuid::Uuid::parse_str(request_id).unwrap();
    assert_eq!(uuid.get_version_num(), 7, "UUID v7 であること");
}

#[tokio::test]
async fn test_404ページにもx_request_idが付く() {
    let app = test_app();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/no/such/page")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
}
