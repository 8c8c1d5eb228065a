//! # リクエストスコープの DB セッション
//!
//! 1 リクエストにつき 1 つ開かれ、リクエスト終了時に必ず閉じられるセッション。
//!
//! ## ライフサイクル
//!
//! 1. [`Database::session`](crate::Database::session) で開く（この時点では未接続）
//! 2. [`DbSession::connection`] の初回呼び出しでプールから接続を取得する
//! 3. [`DbSession::close`] で接続をプールへ返却する。2 回目以降の呼び出しは何もしない
//! 4. `close` されずにドロップされた場合も `Drop` で同じ処理が走る

use std::{fmt, sync::Arc};

use sqlx::{Any, AnyConnection, AnyPool, pool::PoolConnection};
use uuid::Uuid;

use crate::{db::SessionCounters, error::InfraError};

/// リクエストスコープの DB セッション
pub struct DbSession {
    id:       Uuid,
    pool:     AnyPool,
    conn:     Option<PoolConnection<Any>>,
    closed:   bool,
    counters: Arc<SessionCounters>,
}

impl DbSession {
    pub(crate) fn open(pool: AnyPool, counters: Arc<SessionCounters>) -> Self {
        let id = Uuid::new_v4();
        counters.record_open();
        tracing::debug!(session_id = %id, "DB セッションを開きました");

        Self {
            id,
            pool,
            conn: None,
            closed: false,
            counters,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// プールから接続を取得済みかどうか
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// セッションの接続を取得する
    ///
    /// 初回呼び出しでプールから接続を取得し、以降は同じ接続を返す。
    /// クローズ済みの場合は [`InfraErrorKind::SessionClosed`](crate::InfraErrorKind::SessionClosed)。
    pub async fn connection(&mut self) -> Result<&mut AnyConnection, InfraError> {
        if self.closed {
            return Err(InfraError::session_closed(self.id));
        }
        if self.conn.is_none() {
            let conn = self.pool.acquire().await?;
            self.conn = Some(conn);
        }
        self.conn
            .as_deref_mut()
            .ok_or_else(|| InfraError::session_closed(self.id))
    }

    /// セッションの接続で `SELECT 1` を実行する
    pub async fn ping(&mut self) -> Result<(), InfraError> {
        let conn = self.connection().await?;
        sqlx::query("SELECT 1").execute(conn).await?;
        Ok(())
    }

    /// セッションを閉じる
    ///
    /// 接続を保持していればプールへ返却する。既に閉じている場合は何もせず
    /// `false` を返す。
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let was_connected = self.conn.take().is_some();
        self.counters.record_close();
        tracing::debug!(
            session_id = %self.id,
            was_connected,
            "DB セッションを閉じました"
        );
        true
    }
}

impl Drop for DbSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for DbSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSession")
            .field("id", &self.id)
            .field("connected", &self.conn.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Database, InfraErrorKind, PoolSettings};

    fn memory_db() -> Database {
        Database::init("sqlite::memory:", &PoolSettings::single_connection()).unwrap()
    }

    #[tokio::test]
    async fn test_開いた直後は未接続() {
        let db = memory_db();

        let session = db.session();

        assert!(session.is_open());
        assert!(!session.is_connected());
        assert_eq!(db.session_counts().opened, 1);
    }

    #[tokio::test]
    async fn test_closeは1回だけ数えられる() {
        let db = memory_db();
        let mut session = db.session();

        assert!(session.close());
        assert!(!session.close());
        drop(session);

        let counts = db.session_counts();
        assert_eq!(counts.opened, 1);
        assert_eq!(counts.closed, 1);
    }

    #[tokio::test]
    async fn test_接続せずに閉じてもパニックしない() {
        let db = memory_db();
        let mut session = db.session();

        session.close();

        assert!(!session.is_open());
        assert_eq!(db.session_counts().active(), 0);
    }

    #[tokio::test]
    async fn test_ドロップで閉じられる() {
        let db = memory_db();

        {
            let _session = db.session();
        }

        assert_eq!(db.session_counts().closed, 1);
    }

    #[tokio::test]
    async fn test_クローズ後の接続取得はエラー() {
        let db = memory_db();
        let mut session = db.session();
        session.close();

        let err = session.connection().await.unwrap_err();

        assert!(matches!(err.kind(), InfraErrorKind::SessionClosed { .. }));
    }

    #[tokio::test]
    async fn test_pingで接続が取得され閉じると返却される() {
        let db = memory_db();
        let mut session = db.session();

        session.ping().await.unwrap();
        assert!(session.is_connected());

        session.close();
        assert!(!session.is_connected());

        // 接続がプールへ返却されていれば、max_connections=1 でも次のセッションが使える
        let mut next = db.session();
        next.ping().await.unwrap();
    }
}
