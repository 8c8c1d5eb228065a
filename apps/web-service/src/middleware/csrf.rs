//! # CSRF 保護ミドルウェア
//!
//! 状態変更リクエスト（POST/PUT/PATCH/DELETE）で CSRF トークンを検証する。
//!
//! ## 方式
//!
//! 署名付き Cookie によるダブルサブミット方式。
//!
//! 1. [`CsrfProtect::issue`] がランダムなトークンを発行し、発行時刻とともに
//!    `SECRET_KEY` から導出した鍵で署名した Cookie に保存する
//! 2. クライアントは同じトークンを `X-CSRFToken` / `X-CSRF-Token` ヘッダー、
//!    またはフォームの `csrf_token` フィールドで送り返す
//! 3. [`csrf_middleware`] が Cookie 側と送信側を定数時間で比較する
//!
//! 検証失敗時は 400 Bad Request を返す。

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    SignedCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{
    config::{CsrfSettings, SecretKey},
    error::AppError,
};

/// CSRF トークンを保存する Cookie 名
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// フォームで送られる CSRF トークンのフィールド名
pub const CSRF_FORM_FIELD: &str = "csrf_token";

/// CSRF トークンを受け付けるヘッダー（先に見つかったものを使う）
const CSRF_HEADERS: &[&str] = &["X-CSRFToken", "X-CSRF-Token"];

/// 署名鍵の導出に必要な秘密鍵の最小長
const MIN_SECRET_LEN: usize = 32;

/// トークンのバイト長
const TOKEN_BYTES: usize = 32;

/// フォームボディを読み込む上限
const FORM_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// CSRF 保護の初期化エラー
#[derive(Debug, Error)]
pub enum CsrfError {
    #[error("SECRET_KEY は {min} バイト以上必要です（{actual} バイト）", min = MIN_SECRET_LEN)]
    SecretTooShort { actual: usize },
}

/// CSRF 検証の失敗理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CsrfFailure {
    #[error("CSRF トークンがありません")]
    MissingToken,

    #[error("CSRF Cookie がありません")]
    MissingCookie,

    #[error("CSRF トークンの有効期限が切れています")]
    Expired,

    #[error("CSRF トークンが一致しません")]
    Mismatch,
}

/// Cookie に保存するトークン（`{token}.{issued_at_unix}`）
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredToken {
    token:     String,
    issued_at: i64,
}

impl StoredToken {
    fn parse(value: &str) -> Option<Self> {
        let (token, issued_at) = value.rsplit_once('.')?;
        if token.is_empty() {
            return None;
        }
        Some(Self {
            token:     token.to_string(),
            issued_at: issued_at.parse().ok()?,
        })
    }

    fn encode(&self) -> String {
        format!("{}.{}", self.token, self.issued_at)
    }
}

/// CSRF 保護
///
/// 署名鍵・設定・検証除外パスを保持する。複製は安価。
#[derive(Clone)]
pub struct CsrfProtect {
    key:          Key,
    settings:     CsrfSettings,
    exempt_paths: Arc<BTreeSet<String>>,
}

impl CsrfProtect {
    /// 設定と秘密鍵から初期化する
    pub fn init(settings: &CsrfSettings, secret_key: &SecretKey) -> Result<Self, CsrfError> {
        let secret = secret_key.as_bytes();
        if secret.len() < MIN_SECRET_LEN {
            return Err(CsrfError::SecretTooShort {
                actual: secret.len(),
            });
        }

        Ok(Self {
            key:          Key::derive_from(secret),
            settings:     settings.clone(),
            exempt_paths: Arc::new(BTreeSet::new()),
        })
    }

    /// パスを検証対象から除外する（完全一致）
    pub fn exempt(&mut self, path: impl Into<String>) -> &mut Self {
        Arc::make_mut(&mut self.exempt_paths).insert(path.into());
        self
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// トークンを発行し、Cookie に保存する
    ///
    /// 既に有効なトークンがあれば同じ値を使い、発行時刻だけを更新する。
    pub fn issue(&self, jar: SignedCookieJar) -> (SignedCookieJar, String) {
        let now = now_unix();
        let token = self
            .stored_token(&jar)
            .filter(|stored| !self.is_expired(stored, now))
            .map(|stored| stored.token)
            .unwrap_or_else(generate_token);

        let stored = StoredToken {
            token:     token.clone(),
            issued_at: now,
        };
        let mut cookie = Cookie::build((CSRF_COOKIE_NAME, stored.encode()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        if let Some(limit) = self.settings.time_limit {
            cookie = cookie.max_age(time::Duration::seconds(duration_secs(limit)));
        }

        (jar.add(cookie.build()), token)
    }

    /// Cookie のトークンを削除する
    pub fn clear(&self, jar: SignedCookieJar) -> SignedCookieJar {
        jar.remove(Cookie::build(CSRF_COOKIE_NAME).path("/"))
    }

    /// 送信されたトークンを検証する
    pub fn validate(&self, jar: &SignedCookieJar, submitted: Option<&str>) -> Result<(), CsrfFailure> {
        self.validate_at(jar, submitted, now_unix())
    }

    fn validate_at(
        &self,
        jar: &SignedCookieJar,
        submitted: Option<&str>,
        now: i64,
    ) -> Result<(), CsrfFailure> {
        let submitted = submitted
            .filter(|token| !token.is_empty())
            .ok_or(CsrfFailure::MissingToken)?;
        let stored = self.stored_token(jar).ok_or(CsrfFailure::MissingCookie)?;

        if self.is_expired(&stored, now) {
            return Err(CsrfFailure::Expired);
        }

        // タイミング攻撃対策として定数時間比較を使用
        let is_valid: bool = stored.token.as_bytes().ct_eq(submitted.as_bytes()).into();
        if !is_valid {
            return Err(CsrfFailure::Mismatch);
        }
        Ok(())
    }

    fn stored_token(&self, jar: &SignedCookieJar) -> Option<StoredToken> {
        jar.get(CSRF_COOKIE_NAME)
            .and_then(|cookie| StoredToken::parse(cookie.value()))
    }

    fn is_expired(&self, stored: &StoredToken, now: i64) -> bool {
        match self.settings.time_limit {
            Some(limit) => now.saturating_sub(stored.issued_at) > duration_secs(limit),
            None => false,
        }
    }
}

impl std::fmt::Debug for CsrfProtect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfProtect")
            .field("settings", &self.settings)
            .field("exempt_paths", &self.exempt_paths)
            .finish_non_exhaustive()
    }
}

/// CSRF 検証が必要なメソッドかどうか
fn requires_csrf_validation(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    CSRF_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}

fn is_form_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

fn form_token(body: &Bytes) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(name, _)| name == CSRF_FORM_FIELD)
        .map(|(_, value)| value.into_owned())
}

/// CSRF 検証ミドルウェア
///
/// フォーム送信の場合はボディを読み込んでトークンを取り出し、
/// 読み込んだボディをそのままハンドラへ渡す。
///
/// メソッドルーターの `route_layer` として付けること。ルーター全体に付けると
/// 404 や 405 になるはずのリクエストまで 400 で拒否してしまう。
pub async fn csrf_middleware(
    State(csrf): State<CsrfProtect>,
    request: Request,
    next: Next,
) -> Response {
    if !csrf.is_enabled()
        || !requires_csrf_validation(request.method())
        || csrf.is_exempt(request.uri().path())
    {
        return next.run(request).await;
    }

    let jar = SignedCookieJar::from_headers(request.headers(), csrf.key().clone());

    let (request, submitted) = match header_token(request.headers()) {
        Some(token) => (request, Some(token)),
        None if is_form_request(request.headers()) => {
            let (parts, body) = request.into_parts();
            let bytes = match axum::body::to_bytes(body, FORM_BODY_LIMIT).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return AppError::BadRequest(format!("フォームを読み込めません: {e}"))
                        .into_response();
                }
            };
            let token = form_token(&bytes);
            (Request::from_parts(parts, Body::from(bytes)), token)
        }
        None => (request, None),
    };

    if let Err(failure) = csrf.validate(&jar, submitted.as_deref()) {
        return AppError::Csrf(failure).into_response();
    }

    next.run(request).await
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn duration_secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn generate_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; TOKEN_BYTES]>())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    const SECRET: &str = "unit-test-secret-key-0123456789abcdef";

    fn protect(time_limit: Option<Duration>) -> CsrfProtect {
        CsrfProtect::init(
            &CsrfSettings {
                enabled: true,
                time_limit,
            },
            &SecretKey::new(SECRET),
        )
        .unwrap()
    }

    fn empty_jar(csrf: &CsrfProtect) -> SignedCookieJar {
        SignedCookieJar::new(csrf.key().clone())
    }

    #[test]
    fn test_短い秘密鍵は初期化に失敗する() {
        let result = CsrfProtect::init(&CsrfSettings::default(), &SecretKey::new("short"));

        assert!(matches!(
            result,
            Err(CsrfError::SecretTooShort { actual: 5 })
        ));
    }

    #[test]
    fn test_発行したトークンで検証が通る() {
        let csrf = protect(Some(Duration::from_secs(3600)));

        let (jar, token) = csrf.issue(empty_jar(&csrf));

        assert_eq!(csrf.validate(&jar, Some(&token)), Ok(()));
    }

    #[test]
    fn test_再発行しても同じトークンを使う() {
        let csrf = protect(None);

        let (jar, first) = csrf.issue(empty_jar(&csrf));
        let (_, second) = csrf.issue(jar);

        assert_eq!(first, second);
    }

    #[test]
    fn test_送信トークンがなければmissing_token() {
        let csrf = protect(None);
        let (jar, _) = csrf.issue(empty_jar(&csrf));

        assert_eq!(csrf.validate(&jar, None), Err(CsrfFailure::MissingToken));
        assert_eq!(csrf.validate(&jar, Some("")), Err(CsrfFailure::MissingToken));
    }

    #[test]
    fn test_cookieがなければmissing_cookie() {
        let csrf = protect(None);

        let result = csrf.validate(&empty_jar(&csrf), Some("token"));

        assert_eq!(result, Err(CsrfFailure::MissingCookie));
    }

    #[test]
    fn test_異なるトークンはmismatch() {
        let csrf = protect(None);
        let (jar, _) = csrf.issue(empty_jar(&csrf));

        assert_eq!(
            csrf.validate(&jar, Some("other-token")),
            Err(CsrfFailure::Mismatch)
        );
    }

    #[test]
    fn test_有効期間を過ぎたトークンはexpired() {
        let csrf = protect(Some(Duration::from_secs(60)));
        let (jar, token) = csrf.issue(empty_jar(&csrf));

        let result = csrf.validate_at(&jar, Some(&token), now_unix() + 61);

        assert_eq!(result, Err(CsrfFailure::Expired));
    }

    #[test]
    fn test_無期限なら古いトークンも通る() {
        let csrf = protect(None);
        let (jar, token) = csrf.issue(empty_jar(&csrf));

        let result = csrf.validate_at(&jar, Some(&token), now_unix() + 86_400 * 365);

        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_署名のないcookieは無視される() {
        let csrf = protect(None);
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "csrf_token=forged.0".parse().unwrap());
        let jar = SignedCookieJar::from_headers(&headers, csrf.key().clone());

        assert_eq!(
            csrf.validate(&jar, Some("forged")),
            Err(CsrfFailure::MissingCookie)
        );
    }

    #[test]
    fn test_除外パスは完全一致で判定する() {
        let mut csrf = protect(None);
        csrf.exempt("/api/v1/webhook");

        assert!(csrf.is_exempt("/api/v1/webhook"));
        assert!(!csrf.is_exempt("/api/v1/webhook/extra"));
    }

    #[rstest]
    #[case(Method::GET, false)]
    #[case(Method::HEAD, false)]
    #[case(Method::OPTIONS, false)]
    #[case(Method::POST, true)]
    #[case(Method::PUT, true)]
    #[case(Method::PATCH, true)]
    #[case(Method::DELETE, true)]
    fn test_検証対象のメソッド(#[case] method: Method, #[case] expected: bool) {
        assert_eq!(requires_csrf_validation(&method), expected);
    }

    #[test]
    fn test_フォームからトークンを取り出す() {
        let body = Bytes::from_static(b"email=a%40example.com&csrf_token=abc-123");

        assert_eq!(form_token(&body), Some("abc-123".to_string()));
    }

    #[test]
    fn test_ヘッダーはx_csrftokenを優先する() {
        let mut headers = HeaderMap::new();
        headers.insert("X-CSRF-Token", "second".parse().unwrap());
        headers.insert("X-CSRFToken", "first".parse().unwrap());

        assert_eq!(header_token(&headers), Some("first".to_string()));
    }

    #[test]
    fn test_保存形式を解析できる() {
        assert_eq!(
            StoredToken::parse("abc.100"),
            Some(StoredToken {
                token:     "abc".to_string(),
                issued_at: 100,
            })
        );
        assert_eq!(StoredToken::parse("abc"), None);
        assert_eq!(StoredToken::parse(".100"), None);
        assert_eq!(StoredToken::parse("abc.x"), None);
    }
}
