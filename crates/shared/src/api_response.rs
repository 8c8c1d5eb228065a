//! # API レスポンスエンベロープ
//!
//! API リソース（`/api/v1/*`）の統一レスポンス形式 `{ "data": T }`。

use serde::{Deserialize, Serialize};

/// API リソースのレスポンス型
///
/// ```
/// use web_service_shared::ApiResponse;
///
/// let response = ApiResponse::new(3);
/// assert_eq!(response.data, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_dataフィールドでラップされる() {
        let json = serde_json::to_value(ApiResponse::new("ok")).unwrap();

        assert_eq!(json, serde_json::json!({ "data": "ok" }));
    }

    #[test]
    fn test_ネストしたオブジェクトもそのまま出力される() {
        let json =
            serde_json::to_value(ApiResponse::new(serde_json::json!({ "profile": "testing" })))
                .unwrap();

        assert_eq!(json["data"]["profile"], "testing");
    }
}
