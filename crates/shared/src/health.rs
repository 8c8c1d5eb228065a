//! # ヘルスチェック共通型
//!
//! `/health`（Liveness）と `/health/ready`（Readiness）のレスポンス型。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Liveness レスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 稼働状態（常に `"healthy"`）
    pub status:  String,
    /// アプリケーションバージョン
    pub version: String,
}

impl HealthResponse {
    pub fn healthy(version: impl Into<String>) -> Self {
        Self {
            status:  "healthy".to_string(),
            version: version.into(),
        }
    }
}

/// 個別チェックの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Error,
}

/// Readiness 全体のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    Ready,
    NotReady,
}

/// Readiness レスポンス
///
/// `checks` はチェック名の昇順で出力される。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: ReadinessStatus,
    pub checks: BTreeMap<String, CheckStatus>,
}

impl ReadinessResponse {
    /// 個別チェック結果から全体ステータスを決める
    ///
    /// 1 つでも [`CheckStatus::Error`] があれば [`ReadinessStatus::NotReady`]。
    pub fn from_checks(checks: BTreeMap<String, CheckStatus>) -> Self {
        let status = if checks.values().all(|s| *s == CheckStatus::Ok) {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NotReady
        };
        Self { status, checks }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ReadinessStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_全チェック成功ならready() {
        let checks = BTreeMap::from([("database".to_string(), CheckStatus::Ok)]);

        let response = ReadinessResponse::from_checks(checks);

        assert!(response.is_ready());
    }

    #[test]
    fn test_1つでも失敗ならnot_ready() {
        let checks = BTreeMap::from([
            ("database".to_string(), CheckStatus::Error),
            ("templates".to_string(), CheckStatus::Ok),
        ]);

        let response = ReadinessResponse::from_checks(checks);

        assert_eq!(response.status, ReadinessStatus::NotReady);
    }

    #[test]
    fn test_readinessのjson形状() {
        let checks = BTreeMap::from([("database".to_string(), CheckStatus::Ok)]);
        let json = serde_json::to_value(ReadinessResponse::from_checks(checks)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "status": "ready", "checks": { "database": "ok" } })
        );
    }
}
