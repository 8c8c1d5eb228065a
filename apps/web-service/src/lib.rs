//! # Web Service ライブラリ
//!
//! 設定プロファイルの解決から、CSRF 保護・データベース・マイグレーション・
//! ルートグループ・リクエストセッション・404 ページまでを組み立てて、
//! リクエストを受け付けられるアプリケーションを作る。
//!
//! ## モジュール構成
//!
//! - `app_builder`: アプリケーションの組み立て（[`AppAssembler`], [`create_app`]）
//! - `config`: 設定プロファイルと環境変数の読み込み
//! - `error`: HTTP エラーと組み立てエラー
//! - `handler`: ルートグループとハンドラ
//! - `middleware`: CSRF 検証、DB セッション、404 ページ
//! - `state`: ハンドラが共有する状態
//! - `templates`: tera テンプレートの描画

pub mod app_builder;
pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod state;
pub mod templates;

pub use app_builder::{AppAssembler, WebApp, create_app};
pub use config::{AppConfig, ConfigProfile, FrameworkDefaults};
pub use error::{AppError, AssembleError};
pub use state::AppState;
