//! # CSRF 保護のテスト
//!
//! - 発行したトークンをヘッダーまたはフォームで送れば状態変更リクエストが通る
//! - トークンがない・一致しない場合は 400 で拒否され、DB セッションは開かれない
//! - CSRF を無効にした設定では検証しない

use axum::body::Body;
use http::{Request, StatusCode, header};
use pretty_assertions::assert_eq;
use tower::ServiceExt;
use web_service::{AppConfig, WebApp, create_app, middleware::CSRF_COOKIE_NAME};
use web_service_shared::{ApiResponse, ErrorResponse};

fn csrf_enabled_app() -> WebApp {
    let mut config = AppConfig::testing();
    config.csrf.enabled = true;
    create_app(Some(config)).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// `GET /auth/csrf` でトークンを発行し、(Cookie ヘッダー値, トークン) を返す
async fn issue_token(app: &WebApp) -> (String, String) {
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/auth/csrf")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{CSRF_COOKIE_NAME}=")))
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string();

    let body: ApiResponse<serde_json::Value> =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    let token = body.data["token"].as_str().unwrap().to_string();

    (cookie, token)
}

#[tokio::test]
async fn test_トークンなしのpostは400で拒否される() {
    let app = csrf_enabled_app();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body.error_type.ends_with("/csrf-validation-failed"));
}

#[tokio::test]
async fn test_拒否されたリクエストはセッションを開かない() {
    let app = csrf_enabled_app();

    app.router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(app.db().session_counts().opened, 0);
}

#[tokio::test]
async fn test_ヘッダーでトークンを送ればpostが通る() {
    let app = csrf_enabled_app();
    let (cookie, token) = issue_token(&app).await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(header::COOKIE, &cookie)
                .header("X-CSRFToken", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
}

#[tokio::test]
async fn test_フォームでトークンを送ればpostが通る() {
    let app = csrf_enabled_app();
    let (cookie, token) = issue_token(&app).await;
    let form = format!("email=user%40example.com&csrf_token={token}");

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_一致しないトークンは400で拒否される() {
    let app = csrf_enabled_app();
    let (cookie, _token) = issue_token(&app).await;

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .header(header::COOKIE, &cookie)
                .header("X-CSRF-Token", "not-the-issued-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ログインフォームにトークンが埋め込まれる() {
    let app = csrf_enabled_app();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/auth/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::SET_COOKIE));
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains(r#"name="csrf_token""#));
}

#[tokio::test]
async fn test_csrf無効の設定ではトークンなしでも通る() {
    let app = create_app(Some(AppConfig::testing())).unwrap();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}
