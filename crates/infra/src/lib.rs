//! # Web Service インフラ層
//!
//! データベースとの接続・リクエストセッション・スキーママイグレーションを担当する。
//!
//! ## モジュール構成
//!
//! - [`db`] - データベースバインディング（接続プール、セッション払い出し）
//! - [`session`] - リクエストスコープの DB セッション
//! - [`migrate`] - 埋め込みマイグレーションの適用と batch / in-place 判定
//! - [`schema`] - スキーマ変更の SQL 生成
//! - [`error`] - インフラ層エラー定義
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use web_service_infra::{Database, MigrationMode, PoolSettings, SchemaMigrator};
//!
//! async fn setup(url: &str) -> Result<(), web_service_infra::InfraError> {
//!     let db = Database::init(url, &PoolSettings::default())?;
//!     let migrator = SchemaMigrator::init(&db, MigrationMode::for_database_url(url));
//!     migrator.upgrade().await?;
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod migrate;
pub mod schema;
pub mod session;

pub use db::{Database, DatabaseBackend, PoolSettings, SessionCounts};
pub use error::{InfraError, InfraErrorKind};
pub use migrate::{MigrationMode, MigrationStatus, SchemaMigrator};
pub use schema::{ColumnDef, SchemaChange, TableDef};
pub use session::DbSession;
