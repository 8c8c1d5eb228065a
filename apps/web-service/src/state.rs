//! # 共有状態
//!
//! ハンドラとミドルウェアが axum の `State` で受け取るプロセス共有の状態。

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use web_service_infra::{Database, MigrationMode};

use crate::{config::AppConfig, middleware::CsrfProtect, templates::TemplateRenderer};

/// アプリケーション状態
///
/// 組み立て時に一度だけ作られ、リクエストごとに複製される。
#[derive(Debug, Clone)]
pub struct AppState {
    pub config:         Arc<AppConfig>,
    pub db:             Database,
    pub csrf:           CsrfProtect,
    pub templates:      Arc<TemplateRenderer>,
    pub migration_mode: MigrationMode,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.csrf.key().clone()
    }
}
