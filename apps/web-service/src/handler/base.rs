//! # ベースルート
//!
//! - `GET /` — トップページ（`index.html`）
//! - `GET /health` — Liveness Check（常に `"healthy"` を返す）
//! - `GET /health/ready` — Readiness Check（リクエストセッション経由で DB を確認）

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use tera::Context;
use web_service_shared::{CheckStatus, HealthResponse, ReadinessResponse};

use super::{RouteGroup, RouteTable};
use crate::{error::AppError, middleware::RequestSession, state::AppState};

/// ベースルート
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseRoutes;

impl RouteGroup for BaseRoutes {
    fn name(&self) -> &'static str {
        "base routes"
    }

    fn mount(&self, routes: RouteTable) -> RouteTable {
        routes
            .route("/", get(index))
            .route("/health", get(health_check))
            .route("/health/ready", get(readiness_check))
    }
}

/// トップページ
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let mut context = Context::new();
    context.insert("profile", state.config.profile.as_str());

    let html = state.templates.render("index.html", &context)?;
    Ok(Html(html))
}

/// Liveness Check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy(env!("CARGO_PKG_VERSION")))
}

/// Readiness Check
///
/// リクエストセッションで `SELECT 1` を実行する。成功 → 200、失敗 → 503。
#[tracing::instrument(skip_all, fields(session_id = %session.id()))]
pub async fn readiness_check(session: RequestSession) -> impl IntoResponse {
    let ping = match session.lock().await {
        Ok(mut db_session) => db_session.ping().await,
        Err(e) => Err(e),
    };
    let database = match ping {
        Ok(()) => CheckStatus::Ok,
        Err(e) => {
            tracing::warn!("DB の疎通確認に失敗: {}", e);
            CheckStatus::Error
        }
    };

    let response = ReadinessResponse::from_checks(BTreeMap::from([(
        "database".to_string(),
        database,
    )]));
    let http_status = if response.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(response))
}
