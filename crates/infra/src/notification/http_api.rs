//! HTTP API 通知送信実装
//!
//! メール配信プロバイダーの JSON API（Plunk 互換）を reqwest で呼び出す。
//!
//! ## リクエスト
//!
//! `POST {api_url}`、`Authorization: Bearer {api_key}`、`Content-Type: application/json`
//!
//! ```json
//! { "to": "...", "subject": "...", "body": "<html>", "name": "送信元名", "from": "送信元アドレス" }
//! ```
//!
//! ## レスポンスの解釈
//!
//! | ステータス | ボディ | 結果 |
//! |-----------|--------|------|
//! | 2xx | `success: true` | 成功 |
//! | 2xx | JSON として解析不能 | 成功（レスポンス形式には依存しない） |
//! | その他 | - | `error` → `message` → `HTTP {status}: {body}` の順でエラー文言を決定 |

use std::time::Duration;

use async_trait::async_trait;
use courier_domain::notification::{EmailMessage, NotificationError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::NotificationSender;

/// デフォルトの API エンドポイント
pub const DEFAULT_API_URL: &str = "https://api.useplunk.com/v1/send";

/// HTTP クライアントのタイムアウト（外側のリトライとは独立）
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to:      &'a str,
    subject: &'a str,
    body:    &'a str,
    name:    &'a str,
    from:    &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendResponse {
    success: bool,
    message: Option<String>,
    error:   Option<String>,
}

/// HTTP API 通知送信
pub struct HttpApiNotificationSender {
    client:       reqwest::Client,
    api_url:      String,
    api_key:      String,
    from_address: String,
    from_name:    String,
}

impl HttpApiNotificationSender {
    /// 新しい HTTP API 送信インスタンスを作成
    ///
    /// # 引数
    ///
    /// - `api_url`: 送信エンドポイント（通常は [`DEFAULT_API_URL`]）
    /// - `api_key`: Bearer トークン
    /// - `from_address`: 送信元メールアドレス
    /// - `from_name`: 送信元の表示名
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from_address: impl Into<String>,
        from_name: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::SendFailed(format!("HTTP クライアント構築失敗: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            from_address: from_address.into(),
            from_name: from_name.into(),
        })
    }
}

/// プロバイダーのレスポンスを送信結果に変換する
fn interpret_response(status: StatusCode, body: &str) -> Result<(), NotificationError> {
    let response: SendResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) if status.is_success() => {
            tracing::debug!(
                status = status.as_u16(),
                error = %e,
                body,
                "送信成功レスポンスを解析できませんでしたが成功として扱います"
            );
            return Ok(());
        }
        Err(e) => {
            return Err(NotificationError::SendFailed(format!(
                "レスポンス解析失敗 (status: {}): {e}, body: {body}",
                status.as_u16()
            )));
        }
    };

    if status.is_success() && response.success {
        return Ok(());
    }

    let detail = [response.error, response.message]
        .into_iter()
        .flatten()
        .find(|msg| !msg.is_empty())
        .unwrap_or_else(|| format!("HTTP {}: {body}", status.as_u16()));

    tracing::warn!(status = status.as_u16(), body, "メール配信 API がエラーを返しました");

    Err(NotificationError::SendFailed(format!(
        "API リクエスト失敗: {detail}"
    )))
}

#[async_trait]
impl NotificationSender for HttpApiNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let request = SendRequest {
            to:      &email.to,
            subject: &email.subject,
            body:    &email.html_body,
            name:    &self.from_name,
            from:    &self.from_address,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotificationError::SendFailed(format!("HTTP リクエスト送信失敗: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotificationError::SendFailed(format!("レスポンス読み取り失敗: {e}")))?;

        interpret_response(status, &body)
    }

    fn channel(&self) -> &'static str {
        "http_api"
    }

    fn from_header(&self) -> Option<String> {
        if self.from_name.is_empty() {
            Some(self.from_address.clone())
        } else {
            Some(format!("{} <{}>", self.from_name, self.from_address))
        }
    }
}
