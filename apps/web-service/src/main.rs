//! # Web Service サーバー
//!
//! [`create_app`] で組み立てたアプリケーションを HTTP で公開する。
//!
//! ## 環境変数
//!
//! 設定項目は [`web_service::config`] を参照。`.env` ファイルがあれば読み込む。
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（APP_DEBUG=true で development プロファイル）
//! APP_DEBUG=true cargo run -p web-service
//!
//! # 本番環境
//! DATABASE_URL=postgres://... SECRET_KEY=... cargo run -p web-service --release
//! ```

use tokio::net::TcpListener;
use web_service::create_app;
use web_service_shared::observability::TracingConfig;

/// Web Service サーバーのエントリーポイント
///
/// 以下の順序で初期化を行う:
///
/// 1. 環境変数の読み込み（.env ファイル）
/// 2. トレーシングの初期化
/// 3. アプリケーションの組み立て
/// 4. HTTP サーバーの起動
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    let tracing_config = TracingConfig::from_env("web-service");
    web_service_shared::observability::init_tracing(tracing_config);
    let _tracing_guard = tracing::info_span!("app", service = "web-service").entered();

    let app = create_app(None)?;
    let addr = app.config().bind_addr()?;
    let db = app.db().clone();

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(profile = %app.config().profile, "Web Service サーバーが起動しました: {}", addr);

    axum::serve(listener, app.into_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let counts = db.session_counts();
    tracing::info!(
        opened = counts.opened,
        closed = counts.closed,
        "サーバーを停止します"
    );
    db.close().await;

    Ok(())
}

/// Ctrl-C を待つ
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("シグナルの待機に失敗しました: {}", e);
    }
}
