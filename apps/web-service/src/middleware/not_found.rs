//! # 404 ページ
//!
//! [`NotFoundMarker`] の付いたレスポンス（未登録パスへのフォールバック、
//! ハンドラが返した [`AppError::NotFound`](crate::error::AppError::NotFound)）を、
//! `404.html` を描画した HTML レスポンスに差し替える。

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

use crate::{error::internal_error_response, state::AppState};

/// 404 ページへの差し替え対象であることを示すレスポンス拡張
#[derive(Debug, Clone, Copy)]
pub struct NotFoundMarker;

/// 404 ページ描画ミドルウェア
pub async fn render_not_found(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if response.extensions().get::<NotFoundMarker>().is_none() {
        return response;
    }

    match state.templates.render_not_found() {
        Ok(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(
                error.category = "infrastructure",
                error.kind = "template",
                "404 ページの描画に失敗: {:?}",
                e
            );
            internal_error_response()
        }
    }
}
