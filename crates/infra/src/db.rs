//! # データベースバインディング
//!
//! 接続プールを保持し、リクエストごとの [`DbSession`] を払い出す。
//!
//! ## 設計方針
//!
//! - **any ドライバ**: 接続文字列のスキームで SQLite / PostgreSQL を切り替える
//! - **遅延接続**: 初期化時は接続文字列の検証だけを行い、実際の接続は
//!   最初にセッションが使われたときに張る
//! - **明示的な所有**: グローバルなシングルトンは持たず、組み立てたアプリケーションが
//!   [`Database`] を所有してハンドラへ渡す
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use web_service_infra::{Database, PoolSettings};
//!
//! let db = Database::init("sqlite::memory:", &PoolSettings::single_connection())?;
//! let mut session = db.session();
//! session.ping().await?;
//! session.close();
//! ```

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use sqlx::{AnyPool, any::AnyPoolOptions};

use crate::{error::InfraError, session::DbSession};

/// 接続文字列から判別したデータベースの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    /// any ドライバが受け付けたが上記以外のスキーム
    Other,
}

impl DatabaseBackend {
    /// 接続文字列のスキームから判別する
    pub fn from_url(database_url: &str) -> Self {
        match database_url.split(':').next() {
            Some("sqlite") => Self::Sqlite,
            Some("postgres" | "postgresql") => Self::Postgres,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 接続プールの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// 最大接続数
    pub max_connections: u32,
    /// 接続取得のタイムアウト
    pub acquire_timeout: Duration,
    /// アイドル接続を閉じるまでの時間（`None` で閉じない）
    pub idle_timeout:    Option<Duration>,
    /// 接続の最大寿命（`None` で無制限）
    pub max_lifetime:    Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout:    Some(Duration::from_secs(600)),
            max_lifetime:    Some(Duration::from_secs(1800)),
        }
    }
}

impl PoolSettings {
    /// 接続を 1 本だけ保持し続ける設定
    ///
    /// `sqlite::memory:` は接続ごとに別のデータベースになるため、
    /// 接続を閉じるとスキーマとデータが失われる。
    pub fn single_connection() -> Self {
        Self {
            max_connections: 1,
            idle_timeout: None,
            max_lifetime: None,
            ..Self::default()
        }
    }
}

/// セッションの開閉回数
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    opened: AtomicU64,
    closed: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn record_open(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SessionCounts {
        SessionCounts {
            opened: self.opened.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
        }
    }
}

/// [`Database::session_counts`] のスナップショット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCounts {
    pub opened: u64,
    pub closed: u64,
}

impl SessionCounts {
    /// 開いたまま閉じられていないセッション数
    pub fn active(&self) -> u64 {
        self.opened.saturating_sub(self.closed)
    }
}

/// データベースバインディング
///
/// クローンは同じプールとカウンタを共有する。
#[derive(Clone)]
pub struct Database {
    pool:     AnyPool,
    backend:  DatabaseBackend,
    counters: Arc<SessionCounters>,
}

impl Database {
    /// 接続文字列とプール設定からバインディングを初期化する
    ///
    /// 接続文字列が解析できない場合、または対応するドライバがない場合は
    /// エラーを返す。実際の接続はまだ張らない。
    pub fn init(database_url: &str, settings: &PoolSettings) -> Result<Self, InfraError> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .max_lifetime(settings.max_lifetime)
            .connect_lazy(database_url)?;

        let backend = DatabaseBackend::from_url(database_url);
        tracing::info!(
            backend = %backend,
            max_connections = settings.max_connections,
            "データベースバインディングを初期化しました"
        );

        Ok(Self {
            pool,
            backend,
            counters: Arc::new(SessionCounters::default()),
        })
    }

    /// 新しいセッションを開く
    ///
    /// 接続はセッションが最初に使われた時点でプールから取得される。
    pub fn session(&self) -> DbSession {
        DbSession::open(self.pool.clone(), Arc::clone(&self.counters))
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn session_counts(&self) -> SessionCounts {
        self.counters.snapshot()
    }

    /// プール経由で `SELECT 1` を実行する
    pub async fn ping(&self) -> Result<(), InfraError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// プールを閉じる（シャットダウン時）
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend)
            .field("sessions", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}
