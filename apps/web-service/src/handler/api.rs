//! # API リソース
//!
//! `/api/v1` 配下の JSON API。

use axum::{Json, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use web_service_shared::ApiResponse;

use super::{RouteGroup, RouteTable};
use crate::state::AppState;

/// API のパスプレフィックス
pub const API_PREFIX: &str = "/api/v1";

/// API リソースの集まり
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiResources;

impl RouteGroup for ApiResources {
    fn name(&self) -> &'static str {
        "api"
    }

    fn mount(&self, routes: RouteTable) -> RouteTable {
        routes.nest(API_PREFIX, RouteTable::new().route("/status", get(status)))
    }
}

/// サービス状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub version:        String,
    pub profile:        String,
    pub database:       String,
    pub migration_mode: String,
}

/// `GET /api/v1/status`
pub async fn status(State(state): State<AppState>) -> Json<ApiResponse<ServiceStatus>> {
    Json(ApiResponse::new(ServiceStatus {
        version:        env!("CARGO_PKG_VERSION").to_string(),
        profile:        state.config.profile.to_string(),
        database:       state.db.backend().to_string(),
        migration_mode: state.migration_mode.as_str().to_string(),
    }))
}
