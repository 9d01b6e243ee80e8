//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンでテンプレート ID とデータから件名と HTML 本文を生成する。
//!
//! ## 設計方針
//!
//! - **`include_str!` によるコンパイル時埋め込み**: 標準テンプレートはバイナリに埋め込まれる
//! - **命名規約**: 本文は `{template_id}.html`、件名は任意の `{template_id}.subject`
//! - **件名ブロックは任意**: `.subject` がないテンプレートでは件名を `None` で返し、
//!   呼び出し側がフォールバックを決める
//! - **レンダリング失敗は致命的**: テンプレートの不備はリトライしても直らない

use std::error::Error as _;

use courier_domain::notification::NotificationError;
use serde_json::Value;
use tera::{Context, Tera};

/// レンダリング結果
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTemplate {
    /// テンプレートが定義する件名（前後の空白は除去済み）
    pub subject:   Option<String>,
    /// HTML 本文
    pub html_body: String,
}

/// テンプレートレンダラー
pub struct TemplateRenderer {
    engine: Tera,
}

impl TemplateRenderer {
    /// 新しいレンダラーインスタンスを作成
    ///
    /// `include_str!` で埋め込んだ標準テンプレートを tera に登録する。
    pub fn new() -> Result<Self, NotificationError> {
        Self::from_raw_templates(vec![
            (
                "welcome_mail.html",
                include_str!("../../../templates/notifications/welcome_mail.html"),
            ),
            (
                "welcome_mail.subject",
                include_str!("../../../templates/notifications/welcome_mail.subject"),
            ),
        ])
    }

    /// 生のテンプレート文字列からレンダラーを作成する
    ///
    /// テンプレート名は `{template_id}.html` / `{template_id}.subject` の規約に従うこと。
    /// `.html` で終わるテンプレートは HTML エスケープされる。
    pub fn from_raw_templates(templates: Vec<(&str, &str)>) -> Result<Self, NotificationError> {
        let mut engine = Tera::default();

        engine
            .add_raw_templates(templates)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(Self { engine })
    }

    /// テンプレートをレンダリングする
    ///
    /// # 引数
    ///
    /// - `template_id`: テンプレート ID（拡張子なし）
    /// - `payload`: テンプレートに渡すデータ。JSON オブジェクトまたは `null`
    pub fn render(
        &self,
        template_id: &str,
        payload: &Value,
    ) -> Result<RenderedTemplate, NotificationError> {
        let context = build_context(payload)?;

        let html_body = self
            .engine
            .render(&format!("{template_id}.html"), &context)
            .map_err(|e| NotificationError::TemplateFailed(render_error_detail(&e)))?;

        let subject_name = format!("{template_id}.subject");
        let subject = if self.has_template(&subject_name) {
            let subject = self
                .engine
                .render(&subject_name, &context)
                .map_err(|e| NotificationError::TemplateFailed(render_error_detail(&e)))?;
            Some(subject.trim().to_string())
        } else {
            None
        };

        Ok(RenderedTemplate { subject, html_body })
    }

    fn has_template(&self, name: &str) -> bool {
        self.engine.get_template_names().any(|n| n == name)
    }
}

fn build_context(payload: &Value) -> Result<Context, NotificationError> {
    match payload {
        Value::Null => Ok(Context::new()),
        Value::Object(_) => Context::from_value(payload.clone())
            .map_err(|e| NotificationError::TemplateFailed(e.to_string())),
        other => Err(NotificationError::TemplateFailed(format!(
            "テンプレートデータは JSON オブジェクトである必要があります: {other}"
        ))),
    }
}

/// tera のエラーは原因がネストするため、連結して 1 行にする
fn render_error_detail(error: &tera::Error) -> String {
    let mut detail = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}
