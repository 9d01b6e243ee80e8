//! # 通知ユースケース
//!
//! メールの非同期配信サブシステムを構成する。
//!
//! ```text
//! 呼び出し元 → MailClient ─┬─ sync ──────────────────────────▶ Transport ──▶ NotificationSender
//!                          └─ async_memory ─▶ MailQueue ─▶ Worker ─┘
//! ```
//!
//! ## モジュール構成
//!
//! - [`template_renderer`] - tera テンプレートエンジンによるメール生成
//! - [`transport`] - レンダリング + サンドボックス判定 + リトライ付き送信
//! - [`queue`] - 有界キューと固定数のワーカー
//! - [`client`] - 配信モードを振り分ける入口

pub mod client;
pub mod queue;
pub mod template_renderer;
pub mod transport;

pub use client::{MailClient, QueuedMailClient};
pub use queue::{MailQueue, QueueOptions, QueueStats};
pub use template_renderer::{RenderedTemplate, TemplateRenderer};
pub use transport::{MailTransport, RetryPolicy, Transport};
