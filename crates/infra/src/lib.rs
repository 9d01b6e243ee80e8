//! # Courier インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 設計方針
//!
//! このクレートはメール送信手段（SMTP / HTTP API）の具体的な実装を提供する。
//! ネットワークに触れるのはこのクレートだけで、リトライやキューイングは上位層が担う。
//!
//! ## 依存関係
//!
//! ```text
//! mail-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`notification`] - メール送信トレイトと SMTP / HTTP API / Noop 実装
//! - `mock` - テスト用の送信実装（`test-utils` feature）

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
