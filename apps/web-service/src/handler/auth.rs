//! # 認証ルート
//!
//! ログインフォームの表示と CSRF トークンの発行を担当する。
//! 資格情報の照合は行わない。
//!
//! - `GET /auth/login` — ログインフォーム（CSRF トークンを埋め込む）
//! - `POST /auth/login` — フォーム送信を受け付けてトップへリダイレクト
//! - `GET /auth/csrf` — CSRF トークンを JSON で返す
//! - `POST /auth/logout` — CSRF Cookie を削除してトップへリダイレクト

use axum::{
    Form,
    Json,
    extract::State,
    response::{Html, Redirect},
    routing::{get, post},
};
use axum_extra::extract::SignedCookieJar;
use serde::{Deserialize, Serialize};
use tera::Context;
use web_service_shared::ApiResponse;

use super::{RouteGroup, RouteTable};
use crate::{error::AppError, middleware::CSRF_FORM_FIELD, state::AppState};

/// 認証ルート
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthRoutes;

impl RouteGroup for AuthRoutes {
    fn name(&self) -> &'static str {
        "auth routes"
    }

    fn mount(&self, routes: RouteTable) -> RouteTable {
        routes
            .route("/auth/login", get(login_form).post(login))
            .route("/auth/csrf", get(csrf_token))
            .route("/auth/logout", post(logout))
    }
}

/// ログインフォームの入力
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
}

/// CSRF トークンのレスポンスデータ
#[derive(Debug, Serialize, Deserialize)]
pub struct CsrfTokenData {
    pub token: String,
}

/// ログインフォーム
pub async fn login_form(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Html<String>), AppError> {
    let (jar, token) = state.csrf.issue(jar);

    let mut context = Context::new();
    context.insert(CSRF_FORM_FIELD, &token);
    let html = state.templates.render("auth/login.html", &context)?;

    Ok((jar, Html(html)))
}

/// ログインフォームの送信
///
/// CSRF 検証はミドルウェアで済んでいる。
pub async fn login(Form(form): Form<LoginForm>) -> Result<Redirect, AppError> {
    if form.email.trim().is_empty() {
        return Err(AppError::BadRequest("メールアドレスが空です".to_string()));
    }
    tracing::info!("ログインフォームを受け付けました");
    Ok(Redirect::to("/"))
}

/// CSRF トークンを発行する
pub async fn csrf_token(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> (SignedCookieJar, Json<ApiResponse<CsrfTokenData>>) {
    let (jar, token) = state.csrf.issue(jar);
    (jar, Json(ApiResponse::new(CsrfTokenData { token })))
}

/// ログアウト
pub async fn logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> (SignedCookieJar, Redirect) {
    (state.csrf.clear(jar), Redirect::to("/"))
}
