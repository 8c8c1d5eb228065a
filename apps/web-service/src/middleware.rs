//! # ミドルウェア
//!
//! リクエストの前後に差し込む処理を提供する。
//!
//! - [`csrf`] - CSRF トークンの発行と検証
//! - [`db_session`] - リクエストごとの DB セッションの開閉
//! - [`not_found`] - 404 ページの描画

mod csrf;
mod db_session;
mod not_found;

pub use csrf::{
    CSRF_COOKIE_NAME,
    CSRF_FORM_FIELD,
    CsrfError,
    CsrfFailure,
    CsrfProtect,
    csrf_middleware,
};
pub use db_session::{RequestSession, SessionScope, db_session_scope};
pub use not_found::{NotFoundMarker, render_not_found};
