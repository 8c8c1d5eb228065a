//! # アプリケーション設定
//!
//! 設定プロファイル（開発 / 本番 / テスト）と、環境変数からの読み込みを提供する。
//!
//! ## プロファイルの選択
//!
//! 組み立て時に設定が渡されなかった場合、[`FrameworkDefaults`] の debug フラグで
//! プロファイルを決める。debug なら [`ConfigProfile::Development`]、そうでなければ
//! [`ConfigProfile::Production`]。
//!
//! ## 環境変数
//!
//! | 変数名 | 説明 |
//! |--------|------|
//! | `APP_DEBUG` | フレームワーク既定の debug フラグ（プロファイル選択に使う） |
//! | `DATABASE_URL` | 接続文字列（本番では必須） |
//! | `SECRET_KEY` | CSRF トークン署名用の秘密鍵（本番では必須、32 バイト以上） |
//! | `APP_HOST` / `APP_PORT` | バインドアドレス（デフォルト: `0.0.0.0:5000`） |
//! | `DB_MAX_CONNECTIONS` | 最大接続数 |
//! | `DB_ACQUIRE_TIMEOUT_SECS` | 接続取得のタイムアウト秒数 |
//! | `CSRF_ENABLED` | CSRF 検証の有効化（デフォルト: 有効） |
//! | `CSRF_TIME_LIMIT_SECS` | CSRF トークンの有効期間秒数（`0` で無期限、デフォルト 3600） |

use std::{env, fmt, net::SocketAddr, time::Duration};

use thiserror::Error;
use web_service_infra::PoolSettings;

/// 開発用の秘密鍵（本番では `SECRET_KEY` が必須）
const DEV_SECRET_KEY: &str = "development-secret-key-do-not-use-in-production";

/// テスト用の秘密鍵
const TESTING_SECRET_KEY: &str = "testing-secret-key-0123456789abcdef";

/// 開発用の接続文字列
const DEV_DATABASE_URL: &str = "sqlite://dev.db?mode=rwc";

/// テスト用の接続文字列
const TESTING_DATABASE_URL: &str = "sqlite::memory:";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_CSRF_TIME_LIMIT_SECS: u64 = 3600;

/// 設定の読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    #[error("{name} の値が不正です: {value:?}（{reason}）")]
    Invalid {
        name:   &'static str,
        value:  String,
        reason: String,
    },
}

/// 設定プロファイル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigProfile {
    Development,
    Production,
    Testing,
}

impl ConfigProfile {
    /// 明示的な設定がない場合のプロファイル選択
    pub fn select(default_debug: bool) -> Self {
        if default_debug {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Testing => "testing",
        }
    }
}

impl fmt::Display for ConfigProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 設定が渡されなかったときに参照する、フレームワーク既定の値
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameworkDefaults {
    pub debug: bool,
}

impl FrameworkDefaults {
    /// `APP_DEBUG` から読み込む（未設定なら debug = false）
    pub fn from_env() -> Self {
        Self {
            debug: env::var("APP_DEBUG").is_ok_and(|v| parse_flag(&v)),
        }
    }
}

/// 秘密鍵
///
/// ログに出ないよう `Debug` では伏せ字にする。
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

/// CSRF 保護の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfSettings {
    pub enabled:    bool,
    /// トークンの有効期間（`None` で無期限）
    pub time_limit: Option<Duration>,
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            enabled:    true,
            time_limit: Some(Duration::from_secs(DEFAULT_CSRF_TIME_LIMIT_SECS)),
        }
    }
}

/// アプリケーション設定
///
/// 組み立て後は変更されず、アプリケーションが `Arc` で所有する。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub profile:      ConfigProfile,
    pub debug:        bool,
    pub testing:      bool,
    pub database_url: String,
    pub secret_key:   SecretKey,
    pub csrf:         CsrfSettings,
    pub pool:         PoolSettings,
    pub host:         String,
    pub port:         u16,
}

impl AppConfig {
    /// プロファイルに対応する設定を環境変数から読み込む
    pub fn for_profile(profile: ConfigProfile) -> Result<Self, ConfigError> {
        Self::from_lookup(profile, |name| env::var(name).ok())
    }

    pub fn development() -> Result<Self, ConfigError> {
        Self::for_profile(ConfigProfile::Development)
    }

    pub fn production() -> Result<Self, ConfigError> {
        Self::for_profile(ConfigProfile::Production)
    }

    /// テスト用設定
    ///
    /// 環境変数は参照しない。インメモリ SQLite を 1 接続で使い、CSRF 検証は無効。
    pub fn testing() -> Self {
        Self {
            profile:      ConfigProfile::Testing,
            debug:        false,
            testing:      true,
            database_url: TESTING_DATABASE_URL.to_string(),
            secret_key:   SecretKey::new(TESTING_SECRET_KEY),
            csrf:         CsrfSettings {
                enabled: false,
                ..CsrfSettings::default()
            },
            pool:         PoolSettings::single_connection(),
            host:         "127.0.0.1".to_string(),
            port:         0,
        }
    }

    /// 任意の値の取得元から設定を組み立てる
    ///
    /// `lookup` は環境変数名を受け取り、値があれば返す。
    pub fn from_lookup(
        profile: ConfigProfile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if profile == ConfigProfile::Testing {
            return Ok(Self::testing());
        }
        let is_production = profile == ConfigProfile::Production;

        let database_url = match lookup("DATABASE_URL") {
            Some(url) => url,
            None if is_production => return Err(ConfigError::Missing("DATABASE_URL")),
            None => DEV_DATABASE_URL.to_string(),
        };
        let secret_key = match lookup("SECRET_KEY") {
            Some(key) => SecretKey::new(key),
            None if is_production => return Err(ConfigError::Missing("SECRET_KEY")),
            None => SecretKey::new(DEV_SECRET_KEY),
        };

        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            max_connections: parse_or("DB_MAX_CONNECTIONS", &lookup, defaults.max_connections)?,
            acquire_timeout: Duration::from_secs(parse_or(
                "DB_ACQUIRE_TIMEOUT_SECS",
                &lookup,
                defaults.acquire_timeout.as_secs(),
            )?),
            ..defaults
        };

        let time_limit_secs = parse_or(
            "CSRF_TIME_LIMIT_SECS",
            &lookup,
            DEFAULT_CSRF_TIME_LIMIT_SECS,
        )?;
        let csrf = CsrfSettings {
            enabled:    lookup("CSRF_ENABLED").is_none_or(|v| parse_flag(&v)),
            time_limit: (time_limit_secs > 0).then(|| Duration::from_secs(time_limit_secs)),
        };

        Ok(Self {
            profile,
            debug: !is_production,
            testing: false,
            database_url,
            secret_key,
            csrf,
            pool,
            host: lookup("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("APP_PORT", &lookup, DEFAULT_PORT)?,
        })
    }

    /// バインドアドレス
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = format!("{}:{}", self.host, self.port);
        value.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            name: "APP_HOST",
            value,
            reason: e.to_string(),
        })
    }
}

/// `1` / `true` / `yes` / `on`（大文字小文字を問わない）を真とみなす
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_or<T>(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
