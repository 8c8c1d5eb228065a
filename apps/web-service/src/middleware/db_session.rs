//! # リクエストスコープの DB セッション
//!
//! リクエスト開始時にセッションを開いてリクエスト拡張に格納し、
//! リクエスト終了時に必ず閉じる。
//!
//! ## 終了経路
//!
//! [`SessionScope`] のドロップでセッションを閉じるため、以下のいずれでも閉じられる。
//!
//! - ハンドラが正常にレスポンスを返した
//! - ハンドラがエラーレスポンスを返した
//! - ハンドラがパニックした（巻き戻し中にドロップされる）
//! - クライアント切断などでリクエストの future が破棄された
//!
//! リクエスト終了時にハンドラ側がまだロックを保持していた場合（spawn した
//! タスクにハンドルを渡した等）、セッションは終了済みとして印を付ける。
//! 以降の [`RequestSession::lock`] は `SessionClosed` エラーになり、
//! 実際の切断は最後のハンドルがドロップされた時点で行われる。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;
use web_service_infra::{Database, DbSession, InfraError};

use crate::error::AppError;

/// ハンドラから使うリクエストセッション
///
/// リクエスト拡張に格納されたセッションへの共有ハンドル。
/// ハンドラでは extractor として受け取る。
#[derive(Clone)]
pub struct RequestSession {
    id:      Uuid,
    session: Arc<Mutex<DbSession>>,
    ended:   Arc<AtomicBool>,
}

impl RequestSession {
    fn new(session: DbSession) -> Self {
        Self {
            id:      session.id(),
            session: Arc::new(Mutex::new(session)),
            ended:   Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// リクエストが終了し、セッションが使えなくなったか
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// セッションを排他的に借用する
    ///
    /// リクエスト終了後は [`InfraError::session_closed`] を返す。
    pub async fn lock(&self) -> Result<MutexGuard<'_, DbSession>, InfraError> {
        let guard = self.session.lock().await;
        if self.is_ended() {
            return Err(InfraError::session_closed(self.id));
        }
        Ok(guard)
    }
}

impl std::fmt::Debug for RequestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSession")
            .field("id", &self.id)
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl<S> FromRequestParts<S> for RequestSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestSession>()
            .cloned()
            .ok_or_else(|| AppError::Internal("リクエストセッションが開かれていません".to_string()))
    }
}

/// セッションを閉じる RAII ガード
///
/// ドロップ時に保持しているセッションを閉じる。セッションを持たない場合や
/// 既に閉じた場合は何もしない。
#[derive(Debug, Default)]
pub struct SessionScope {
    session: Option<RequestSession>,
}

impl SessionScope {
    /// セッションを開き、ガードとハンドラ用のハンドルを返す
    pub fn open(db: &Database) -> (Self, RequestSession) {
        let session = RequestSession::new(db.session());
        let scope = Self {
            session: Some(session.clone()),
        };
        (scope, session)
    }

    /// セッションを持たないガード
    pub fn empty() -> Self {
        Self::default()
    }

    /// セッションを閉じる
    ///
    /// 実際に閉じた場合だけ `true` を返す。
    ///
    /// ハンドラ側がまだロックを保持している場合はここでは閉じず、
    /// 終了済みの印だけを付ける。切断は最後のハンドルがドロップされた時点で
    /// `DbSession` 自身が行う。
    pub fn close(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        session.ended.store(true, Ordering::Release);
        match session.session.try_lock() {
            Ok(mut guard) => guard.close(),
            Err(_) => {
                tracing::warn!(
                    session_id = %session.id,
                    "セッションが使用中のため、ハンドル解放時に閉じます"
                );
                false
            }
        }
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        self.close();
    }
}

/// リクエストごとにセッションを開閉するミドルウェア
pub async fn db_session_scope(
    State(db): State<Database>,
    mut request: Request,
    next: Next,
) -> Response {
    let (scope, session) = SessionScope::open(&db);
    request.extensions_mut().insert(session);

    let response = next.run(request).await;

    drop(scope);
    response
}
