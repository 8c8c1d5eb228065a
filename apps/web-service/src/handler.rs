//! # HTTP リクエストハンドラ
//!
//! ルートグループ単位でハンドラをまとめ、アプリケーションに登録する。
//!
//! ## 設計方針
//!
//! - ルートグループは [`RouteGroup`] を実装し、自分のルートを [`RouteTable`] に追加する
//! - CSRF 検証とセッション開閉は組み立て側がメソッド単位で付ける
//! - アプリケーションの組み立て側はグループの中身を知らない
//! - ハンドラは薄く保ち、DB へのアクセスは [`RequestSession`](crate::middleware::RequestSession) 経由
//!
//! ## ルートグループ一覧
//!
//! - `base`: トップページ、ヘルスチェック
//! - `auth`: ログインフォーム、CSRF トークン、ログアウト
//! - `api`: JSON API（`/api/v1`）

pub mod api;
pub mod auth;
pub mod base;

use axum::routing::MethodRouter;

pub use api::ApiResources;
pub use auth::AuthRoutes;
pub use base::BaseRoutes;

use crate::state::AppState;

/// ルートグループ
///
/// アプリケーションに登録できるルートのまとまり。
pub trait RouteGroup: Send + Sync {
    /// ログに出すグループ名
    fn name(&self) -> &'static str;

    /// ルート表に自分のルートを追加する
    fn mount(&self, routes: RouteTable) -> RouteTable;

    /// CSRF 検証から除外するパス
    fn csrf_exempt(&self) -> &'static [&'static str] {
        &[]
    }
}

/// ルートグループが登録するルートの一覧
///
/// パスとメソッドルーターの組を登録順に保持する。
/// ルーターへの追加は組み立て時にまとめて行う。
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<(String, MethodRouter<AppState>)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// ルートを追加する
    pub fn route(mut self, path: impl Into<String>, method_router: MethodRouter<AppState>) -> Self {
        self.routes.push((path.into(), method_router));
        self
    }

    /// 別のルート表をパスプレフィックス付きで取り込む
    pub fn nest(mut self, prefix: &str, other: RouteTable) -> Self {
        let prefix = prefix.trim_end_matches('/');
        for (path, method_router) in other.routes {
            self.routes.push((format!("{prefix}{path}"), method_router));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(path, _)| path.as_str())
    }

    pub fn into_routes(self) -> Vec<(String, MethodRouter<AppState>)> {
        self.routes
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.paths()).finish()
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_nestはプレフィックスを付けて取り込む() {
        let table = RouteTable::new().route("/", get(|| async { "top" })).nest(
            "/api/v1/",
            RouteTable::new()
                .route("/status", get(|| async { "status" }))
                .route("/users", get(|| async { "users" })),
        );

        let paths: Vec<_> = table.paths().collect();
        assert_eq!(paths, vec!["/", "/api/v1/status", "/api/v1/users"]);
    }

    #[test]
    fn test_空のルート表() {
        let table = RouteTable::new();

        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }
}
