//! # アプリケーションエラー
//!
//! ハンドラ・ミドルウェアが返すエラーと、アプリケーション組み立て時のエラー。
//!
//! HTTP へ変換する際、JSON は RFC 9457 形式の [`ErrorResponse`] を使う。
//! `NotFound` だけはレスポンス拡張に [`NotFoundMarker`] を付け、
//! [`render_not_found`](crate::middleware::render_not_found) が `404.html` に差し替える。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use web_service_infra::InfraError;
use web_service_shared::ErrorResponse;

use crate::{
    config::ConfigError,
    middleware::{CsrfError, CsrfFailure, NotFoundMarker},
};

/// リクエスト処理中のエラー
#[derive(Debug, Error)]
pub enum AppError {
    #[error("リソースが見つかりません")]
    NotFound,

    #[error("不正なリクエスト: {0}")]
    BadRequest(String),

    #[error("CSRF 検証に失敗しました: {0}")]
    Csrf(#[from] CsrfFailure),

    #[error("データベースエラー: {0}")]
    Database(#[from] InfraError),

    #[error("テンプレートエラー: {0}")]
    Template(#[from] tera::Error),

    #[error("内部エラー: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => {
                let mut response = (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::not_found("リソースが見つかりません")),
                )
                    .into_response();
                response.extensions_mut().insert(NotFoundMarker);
                response
            }
            AppError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::bad_request(detail))).into_response()
            }
            AppError::Csrf(failure) => {
                tracing::warn!(reason = %failure, "CSRF 検証に失敗");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::csrf_validation_failed(failure.to_string())),
                )
                    .into_response()
            }
            AppError::Database(e) => {
                tracing::error!(
                    error.category = "infrastructure",
                    error.kind = "database",
                    "データベースエラー: {}",
                    e
                );
                internal_error_response()
            }
            AppError::Template(e) => {
                tracing::error!(
                    error.category = "infrastructure",
                    error.kind = "template",
                    "テンプレート描画エラー: {:?}",
                    e
                );
                internal_error_response()
            }
            AppError::Internal(msg) => {
                tracing::error!(error.category = "internal", "内部エラー: {}", msg);
                internal_error_response()
            }
        }
    }
}

/// 500 Internal Server Error（詳細は返さない）
pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal_error()),
    )
        .into_response()
}

/// アプリケーション組み立て時のエラー
///
/// どれか 1 つでも失敗した場合、アプリケーションは返されない。
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("設定の読み込みに失敗しました: {0}")]
    Config(#[from] ConfigError),

    #[error("CSRF 保護の初期化に失敗しました: {0}")]
    Csrf(#[from] CsrfError),

    #[error("データベースの初期化に失敗しました: {0}")]
    Database(#[from] InfraError),

    #[error("テンプレートの読み込みに失敗しました: {0}")]
    Template(#[from] tera::Error),
}
