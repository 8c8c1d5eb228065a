//! # テンプレートレンダラー
//!
//! tera で HTML ページを描画する。
//!
//! テンプレートは `include_str!` でバイナリに埋め込むため、
//! 実行時に作業ディレクトリの `templates/` を参照しない。

use tera::{Context, Tera};

/// 404 ページのテンプレート名
pub const NOT_FOUND_TEMPLATE: &str = "404.html";

/// テンプレートレンダラー
pub struct TemplateRenderer {
    engine: Tera,
}

impl TemplateRenderer {
    /// 埋め込みテンプレートを登録したレンダラーを作成する
    pub fn new() -> Result<Self, tera::Error> {
        let mut engine = Tera::default();

        engine.add_raw_templates(vec![
            ("base.html", include_str!("../templates/base.html")),
            (NOT_FOUND_TEMPLATE, include_str!("../templates/404.html")),
            ("index.html", include_str!("../templates/index.html")),
            ("auth/login.html", include_str!("../templates/auth/login.html")),
        ])?;

        Ok(Self { engine })
    }

    pub fn render(&self, template_name: &str, context: &Context) -> Result<String, tera::Error> {
        self.engine.render(template_name, context)
    }

    /// 404 ページを描画する
    pub fn render_not_found(&self) -> Result<String, tera::Error> {
        self.render(NOT_FOUND_TEMPLATE, &Context::new())
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("templates", &self.engine.get_template_names().count())
            .finish()
    }
}
