//! # Mail Service 設定
//!
//! 環境変数からメール配信サブシステムの設定を読み込む。
//!
//! ## 環境変数
//!
//! | 変数名 | デフォルト | 説明 |
//! |--------|-----------|------|
//! | `MAIL_BACKEND` | `noop` | 送信バックエンド（`smtp` / `http` / `noop`） |
//! | `MAIL_HOST` | `smtp.useplunk.com` | SMTP ホスト |
//! | `MAIL_PORT` | `587` | SMTP ポート |
//! | `MAIL_USERNAME` | 空 | SMTP 認証ユーザー名 |
//! | `MAIL_PASSWORD` | 空 | SMTP 認証パスワード |
//! | `MAIL_ACCEPT_INVALID_CERTS` | `false` | STARTTLS で不正な証明書を許容するか |
//! | `MAIL_API_URL` | `https://api.useplunk.com/v1/send` | HTTP API エンドポイント |
//! | `MAIL_API_KEY` | - | HTTP API キー（`http` の場合は必須） |
//! | `MAIL_FROM_ADDRESS` | `demo@godsend.dev` | 送信元アドレス |
//! | `MAIL_FROM_NAME` | `Social Blog` | 送信元の表示名 |
//! | `MAIL_WORKER_COUNT` | `3` | ワーカー数 |
//! | `MAIL_QUEUE_SIZE` | `100` | キュー容量 |
//! | `MAIL_MAX_RETRIES` | `3` | 1 件あたりの最大試行回数 |
//! | `MAIL_RETRY_DELAY_SECS` | `5` | 試行間隔（秒） |
//! | `APP_ENV` | `development` | `production` 以外ではサンドボックスモード |
//! | `MAIL_TEST_RECIPIENT` | - | 設定すると起動時にこの宛先へ確認メールを 1 通送る |

use std::{env, str::FromStr, time::Duration};

use courier_infra::notification::{DEFAULT_API_URL, SmtpConfig};
use thiserror::Error;

use crate::usecase::notification::{QueueOptions, RetryPolicy};

/// 設定エラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 必須の環境変数が設定されていない
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    /// 環境変数の値が不正
    #[error("{key} の値が不正です: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// 送信バックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MailBackend {
    /// SMTP サーバー経由で送信
    Smtp,
    /// メール配信プロバイダーの HTTP API 経由で送信
    Http,
    /// 送信しない（ログ出力のみ）
    Noop,
}

/// HTTP API の接続設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpApiConfig {
    pub api_url: String,
    pub api_key: String,
}

/// Mail Service の設定
#[derive(Debug, Clone)]
pub struct MailServiceConfig {
    /// 送信バックエンド
    pub backend:        MailBackend,
    /// SMTP 接続設定（送信元アドレス・表示名を含む）
    pub smtp:           SmtpConfig,
    /// HTTP API 接続設定（backend=http の場合のみ `Some`）
    pub http:           Option<HttpApiConfig>,
    /// キューの構成
    pub queue:          QueueOptions,
    /// リトライ方針
    pub retry:          RetryPolicy,
    /// 既定の配信をサンドボックスモードにするか
    pub sandbox:        bool,
    /// 起動確認メールの宛先
    pub test_recipient: Option<String>,
}

impl MailServiceConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意の参照関数から設定を読み込む
    ///
    /// 空文字列は未設定として扱う。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let backend = parse_or(&get, "MAIL_BACKEND", MailBackend::Noop)?;

        let http = match backend {
            MailBackend::Http => Some(HttpApiConfig {
                api_url: get_or("MAIL_API_URL", DEFAULT_API_URL),
                api_key: get("MAIL_API_KEY").ok_or(ConfigError::Missing("MAIL_API_KEY"))?,
            }),
            MailBackend::Smtp | MailBackend::Noop => None,
        };

        let smtp = SmtpConfig {
            host:                 get_or("MAIL_HOST", "smtp.useplunk.com"),
            port:                 parse_or(&get, "MAIL_PORT", 587)?,
            username:             get_or("MAIL_USERNAME", ""),
            password:             get_or("MAIL_PASSWORD", ""),
            accept_invalid_certs: parse_or(&get, "MAIL_ACCEPT_INVALID_CERTS", false)?,
            from_address:         get_or("MAIL_FROM_ADDRESS", "demo@godsend.dev"),
            from_name:            get_or("MAIL_FROM_NAME", "Social Blog"),
        };

        let queue = QueueOptions {
            worker_count: parse_or(&get, "MAIL_WORKER_COUNT", 3)?,
            capacity: parse_or(&get, "MAIL_QUEUE_SIZE", 100)?,
            ..QueueOptions::default()
        };

        let retry = RetryPolicy::new(
            parse_or(&get, "MAIL_MAX_RETRIES", 3)?,
            Duration::from_secs(parse_or(&get, "MAIL_RETRY_DELAY_SECS", 5)?),
        );

        let sandbox = get_or("APP_ENV", "development") != "production";
        let test_recipient = get("MAIL_TEST_RECIPIENT");

        Ok(Self {
            backend,
            smtp,
            http,
            queue,
            retry,
            sandbox,
            test_recipient,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<MailServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MailServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_未設定ならデフォルト値を使う() {
        let config = load(&[]).unwrap();

        assert_eq!(config.backend, MailBackend::Noop);
        assert_eq!(config.smtp.host, "smtp.useplunk.com");
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.smtp.from_address, "demo@godsend.dev");
        assert_eq!(config.smtp.from_name, "Social Blog");
        assert!(!config.smtp.accept_invalid_certs);
        assert_eq!(config.http, None);
        assert_eq!(config.queue.worker_count, 3);
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.retry, RetryPolicy::new(3, Duration::from_secs(5)));
        assert!(config.sandbox);
        assert_eq!(config.test_recipient, None);
    }

    #[test]
    fn test_smtpバックエンドの設定を読み込む() {
        let config = load(&[
            ("MAIL_BACKEND", "smtp"),
            ("MAIL_HOST", "localhost"),
            ("MAIL_PORT", "1025"),
            ("MAIL_USERNAME", "plunk"),
            ("MAIL_PASSWORD", "secret"),
            ("MAIL_ACCEPT_INVALID_CERTS", "true"),
            ("MAIL_WORKER_COUNT", "5"),
            ("MAIL_QUEUE_SIZE", "10"),
            ("MAIL_MAX_RETRIES", "2"),
            ("MAIL_RETRY_DELAY_SECS", "1"),
            ("APP_ENV", "production"),
            ("MAIL_TEST_RECIPIENT", "geek@example.com"),
        ])
        .unwrap();

        assert_eq!(config.backend, MailBackend::Smtp);
        assert_eq!(config.smtp.host, "localhost");
        assert_eq!(config.smtp.port, 1025);
        assert_eq!(config.smtp.username, "plunk");
        assert_eq!(config.smtp.password, "secret");
        assert!(config.smtp.accept_invalid_certs);
        assert_eq!(config.queue.worker_count, 5);
        assert_eq!(config.queue.capacity, 10);
        assert_eq!(config.retry, RetryPolicy::new(2, Duration::from_secs(1)));
        assert!(!config.sandbox);
        assert_eq!(config.test_recipient.as_deref(), Some("geek@example.com"));
    }

    #[test]
    fn test_httpバックエンドはapiキーが必須() {
        let result = load(&[("MAIL_BACKEND", "http")]);

        assert_eq!(result.unwrap_err(), ConfigError::Missing("MAIL_API_KEY"));
    }

    #[test]
    fn test_httpバックエンドの設定を読み込む() {
        let config = load(&[("MAIL_BACKEND", "http"), ("MAIL_API_KEY", "sk_test")]).unwrap();

        assert_eq!(
            config.http,
            Some(HttpApiConfig {
                api_url: DEFAULT_API_URL.to_string(),
                api_key: "sk_test".to_string(),
            })
        );
    }

    #[rstest]
    #[case("MAIL_BACKEND", "ses")]
    #[case("MAIL_PORT", "smtp")]
    #[case("MAIL_PORT", "70000")]
    #[case("MAIL_WORKER_COUNT", "-1")]
    #[case("MAIL_ACCEPT_INVALID_CERTS", "yes")]
    fn test_不正な値はエラー(#[case] key: &'static str, #[case] value: &str) {
        let result = load(&[(key, value)]);

        assert_eq!(
            result.unwrap_err(),
            ConfigError::Invalid {
                key,
                value: value.to_string(),
            }
        );
    }

    #[test]
    fn test_空文字列は未設定として扱う() {
        let config = load(&[("MAIL_BACKEND", ""), ("MAIL_PORT", "")]).unwrap();

        assert_eq!(config.backend, MailBackend::Noop);
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn test_最大試行回数0は1に切り上げられる() {
        let config = load(&[("MAIL_MAX_RETRIES", "0")]).unwrap();

        assert_eq!(config.retry.max_retries(), 1);
    }
}
