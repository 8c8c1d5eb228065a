//! # アプリケーション組み立て
//!
//! 設定の解決からルーター構築までを決まった順序で行い、
//! リクエストを受け付けられる [`WebApp`] を返す。
//!
//! ## 組み立て順序
//!
//! 1. 設定プロファイルの解決（明示されなければ debug フラグで選ぶ）
//! 2. CSRF 保護の初期化
//! 3. データベースバインディングの初期化（接続は遅延）
//! 4. マイグレーションツールの初期化（`sqlite` で始まる URL なら batch 方式）
//! 5. ルートグループの登録
//! 6. API リソースの登録
//! 7. リクエスト開始時のセッション開始
//! 8. リクエスト終了時のセッション終了（どの経路でも 1 回だけ）
//! 9. 404 ページの描画
//!
//! どこかで失敗した場合は [`AssembleError`] を返し、アプリケーションは作られない。
//!
//! 接続プールの保守タスクを起動するため、tokio ランタイム上で呼び出すこと。

use std::{any::Any, env, sync::Arc};

use axum::{
    Router,
    handler::Handler,
    middleware::from_fn_with_state,
    response::Response,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use web_service_infra::{Database, MigrationMode, SchemaMigrator};
use web_service_shared::observability::{MakeRequestUuidV7, make_request_span};

use crate::{
    config::{AppConfig, ConfigProfile, FrameworkDefaults},
    error::{AppError, AssembleError, internal_error_response},
    handler::{ApiResources, AuthRoutes, BaseRoutes, RouteGroup, RouteTable},
    middleware::{CsrfProtect, csrf_middleware, db_session_scope, render_not_found},
    state::AppState,
    templates::TemplateRenderer,
};

/// 設定値の取得元（変数名 → 値）
type ConfigSource = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// アプリケーションの組み立て役
pub struct AppAssembler {
    config:        Option<AppConfig>,
    defaults:      FrameworkDefaults,
    config_source: ConfigSource,
    route_groups:  Vec<Box<dyn RouteGroup>>,
    api:           Option<Box<dyn RouteGroup>>,
}

impl AppAssembler {
    /// 設定を指定して組み立てを始める
    ///
    /// `None` の場合は [`FrameworkDefaults`] の debug フラグでプロファイルを選ぶ。
    pub fn new(config: Option<AppConfig>) -> Self {
        Self {
            config,
            defaults: FrameworkDefaults::from_env(),
            config_source: Box::new(|name| env::var(name).ok()),
            route_groups: Vec::new(),
            api: None,
        }
    }

    /// フレームワーク既定値を差し替える
    pub fn framework_defaults(mut self, defaults: FrameworkDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// プロファイルから設定を作るときの値の取得元を差し替える
    ///
    /// 既定はプロセスの環境変数。設定を明示した場合は使われない。
    pub fn config_source(
        mut self,
        source: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.config_source = Box::new(source);
        self
    }

    /// ルートグループを追加する（登録は追加順）
    pub fn route_group(mut self, group: impl RouteGroup + 'static) -> Self {
        self.route_groups.push(Box::new(group));
        self
    }

    /// API リソースを設定する
    pub fn api(mut self, api: impl RouteGroup + 'static) -> Self {
        self.api = Some(Box::new(api));
        self
    }

    /// アプリケーションを組み立てる
    pub fn assemble(self) -> Result<WebApp, AssembleError> {
        // 1. 設定プロファイル
        let config = match self.config {
            Some(config) => config,
            None => {
                let profile = ConfigProfile::select(self.defaults.debug);
                tracing::info!(
                    default_debug = self.defaults.debug,
                    %profile,
                    "設定が渡されなかったためプロファイルを選択しました"
                );
                AppConfig::from_lookup(profile, &*self.config_source)?
            }
        };
        tracing::info!(profile = %config.profile, debug = config.debug, "設定を適用します");

        // 2. CSRF 保護
        let mut csrf = CsrfProtect::init(&config.csrf, &config.secret_key)?;
        tracing::debug!(enabled = csrf.is_enabled(), "CSRF 保護を初期化しました");

        // 3. データベース
        let db = Database::init(&config.database_url, &config.pool)?;
        tracing::debug!(backend = %db.backend(), "データベースを初期化しました");

        // 4. マイグレーション
        let migration_mode = MigrationMode::for_database_url(&config.database_url);
        let migrator = SchemaMigrator::init(&db, migration_mode);
        tracing::debug!(mode = migration_mode.as_str(), "マイグレーションを初期化しました");

        // 5, 6. ルートグループと API
        // 除外パスを揃えてから CSRF レイヤーを作るため、ルーターへの追加は後で行う
        let mut routes = RouteTable::new();
        let mut route_groups = Vec::with_capacity(self.route_groups.len() + 1);
        for group in self.route_groups.iter().chain(self.api.iter()) {
            routes = group.mount(routes);
            for path in group.csrf_exempt() {
                csrf.exempt(*path);
            }
            tracing::debug!(group = group.name(), "ルートグループを登録しました");
            route_groups.push(group.name());
        }

        let templates = Arc::new(TemplateRenderer::new()?);

        let state = AppState {
            config: Arc::new(config),
            db,
            csrf,
            templates,
            migration_mode,
        };

        // 7〜9. リクエストのライフサイクル
        // CSRF 検証とセッション開閉はメソッドに一致したハンドラだけに付ける。
        // 未登録パス（404）と未登録メソッド（405）は検証せずにそのまま返す。
        //
        // レイヤー順序が重要: 下に書いたものが外側
        // 1. SetRequestIdLayer（最外）: UUID v7 のリクエスト ID を付与
        // 2. TraceLayer: request_id を含むスパンを作る
        // 3. PropagateRequestIdLayer: レスポンスヘッダーに X-Request-Id をコピー
        // 4. CatchPanicLayer: ハンドラのパニックを 500 に変換
        // 5. render_not_found: NotFound を 404.html に差し替え
        // 6. csrf_middleware: 状態変更リクエストを検証（失敗時はセッションを開かない）
        // 7. db_session_scope（最内）: セッションを開き、終了時に閉じる
        //
        // フォールバックには db_session_scope だけを付ける。
        let mut router = Router::new();
        for (path, method_router) in routes.into_routes() {
            let method_router = method_router
                .route_layer(from_fn_with_state(state.db.clone(), db_session_scope))
                .route_layer(from_fn_with_state(state.csrf.clone(), csrf_middleware));
            router = router.route(&path, method_router);
        }

        let fallback =
            not_found_fallback.layer(from_fn_with_state(state.db.clone(), db_session_scope));
        let router = router
            .fallback(fallback)
            .layer(from_fn_with_state(state.clone(), render_not_found))
            .with_state(state.clone())
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7));

        tracing::info!(route_groups = ?route_groups, "アプリケーションを組み立てました");

        Ok(WebApp {
            router,
            state,
            migrator,
            route_groups,
        })
    }
}

impl std::fmt::Debug for AppAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.route_groups.iter().map(|g| g.name()).collect();
        f.debug_struct("AppAssembler")
            .field("config", &self.config)
            .field("defaults", &self.defaults)
            .field("route_groups", &names)
            .field("api", &self.api.as_ref().map(|a| a.name()))
            .finish()
    }
}

/// 組み立て済みのアプリケーション
#[derive(Debug)]
pub struct WebApp {
    router:       Router,
    state:        AppState,
    migrator:     SchemaMigrator,
    route_groups: Vec<&'static str>,
}

impl WebApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.config
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn migrator(&self) -> &SchemaMigrator {
        &self.migrator
    }

    /// 登録されたルートグループ名（登録順、API を含む）
    pub fn route_groups(&self) -> &[&'static str] {
        &self.route_groups
    }
}

/// 既定のルートグループと API を登録してアプリケーションを組み立てる
pub fn create_app(config: Option<AppConfig>) -> Result<WebApp, AssembleError> {
    AppAssembler::new(config)
        .route_group(BaseRoutes)
        .route_group(AuthRoutes)
        .api(ApiResources)
        .assemble()
}

/// 未登録パスへのフォールバック
async fn not_found_fallback() -> AppError {
    AppError::NotFound
}

/// パニックを 500 レスポンスに変換する
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail: &str = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "不明なパニック"
    };
    tracing::error!(error.category = "panic", "ハンドラがパニックしました: {}", detail);
    internal_error_response()
}
