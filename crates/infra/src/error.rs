//! # インフラ層エラー定義
//!
//! データベース接続・マイグレーション・リクエストセッションで発生するエラー。
//!
//! `std::io::Error` と同じ struct + enum パターン:
//! - [`InfraError`]: 種別（[`InfraErrorKind`]）と生成時点の [`SpanTrace`] を保持する
//! - [`InfraErrorKind`]: エラーの具体的な種別

use std::fmt;

use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

/// インフラ層で発生するエラー
///
/// `From<sqlx::Error>` 等の変換や convenience constructor で生成すると、
/// その時点のスパン情報が自動的にキャプチャされる。
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// インフラ層エラーの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// データベースエラー
    ///
    /// 接続文字列の解析失敗、接続失敗、クエリ失敗など。
    #[error("データベースエラー: {0}")]
    Database(#[source] sqlx::Error),

    /// マイグレーションエラー
    #[error("マイグレーションエラー: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    /// クローズ済みのセッションを使おうとした
    ///
    /// リクエスト終了後にハンドラが保持し続けたセッションで発生する。
    #[error("セッションはクローズ済みです: {session_id}")]
    SessionClosed { session_id: String },

    /// スキーマ変更を SQL に変換できない
    #[error("スキーマ変更を適用できません: {0}")]
    InvalidSchemaChange(String),
}

impl InfraError {
    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    pub fn into_parts(self) -> (InfraErrorKind, SpanTrace) {
        (self.kind, self.span_trace)
    }

    fn capture(kind: InfraErrorKind) -> Self {
        Self {
            kind,
            span_trace: SpanTrace::capture(),
        }
    }

    pub fn session_closed(session_id: impl fmt::Display) -> Self {
        Self::capture(InfraErrorKind::SessionClosed {
            session_id: session_id.to_string(),
        })
    }

    pub fn invalid_schema_change(msg: impl Into<String>) -> Self {
        Self::capture(InfraErrorKind::InvalidSchemaChange(msg.into()))
    }
}

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<sqlx::Error> for InfraError {
    fn from(source: sqlx::Error) -> Self {
        Self::capture(InfraErrorKind::Database(source))
    }
}

impl From<sqlx::migrate::MigrateError> for InfraError {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::capture(InfraErrorKind::Migration(source))
    }
}
