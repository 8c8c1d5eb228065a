//! # マイグレーションツール
//!
//! アプリケーションと同じ設定でデータベースに埋め込みマイグレーションを適用する。
//! 接続文字列が `sqlite` で始まる場合は batch 方式で動く。
//!
//! ## 使い方
//!
//! ```bash
//! # 未適用のマイグレーションを適用する
//! cargo run --bin migrate -p web-service -- upgrade
//!
//! # 適用状況を表示する
//! cargo run --bin migrate -p web-service -- status
//! ```

use anyhow::bail;
use web_service::create_app;
use web_service_shared::observability::TracingConfig;

const USAGE: &str = "使い方: migrate <upgrade|status>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    web_service_shared::observability::init_tracing(TracingConfig::from_env("migrate"));

    let command = std::env::args().nth(1);
    let app = create_app(None)?;
    let migrator = app.migrator();
    tracing::info!(mode = migrator.mode().as_str(), "マイグレーションツールを起動します");

    match command.as_deref() {
        Some("upgrade") => {
            migrator.upgrade().await?;
            println!("マイグレーションを適用しました（{}）", migrator.mode().as_str());
        }
        Some("status") => {
            for migration in migrator.status().await? {
                let mark = if migration.applied { "applied" } else { "pending" };
                println!("{:>16}  {:<8}  {}", migration.version, mark, migration.description);
            }
        }
        _ => bail!(USAGE),
    }

    app.db().close().await;
    Ok(())
}
