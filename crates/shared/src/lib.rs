//! # Web Service 共有ユーティリティ
//!
//! アプリケーション本体とインフラ層の両方から使われる共通の型を提供する。
//!
//! ## 設計方針
//!
//! - axum に依存しない純粋なデータ型のみを配置する
//! - トレーシング初期化など実行時依存が必要なものは `observability` feature の裏に置く

pub mod api_response;
pub mod error_response;
pub mod health;
pub mod observability;

pub use api_response::ApiResponse;
pub use error_response::ErrorResponse;
pub use health::{CheckStatus, HealthResponse, ReadinessResponse, ReadinessStatus};
