//! # Courier ドメイン層
//!
//! 通知配信サブシステムのドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **値としてのジョブ**: 配信ジョブは所有権ごとキューへ渡され、ワーカーだけが状態を変更する
//! - **インフラ非依存**: SMTP / HTTP などの送信手段は知らない
//! - **エラー型の集約**: キュー拒否・レンダリング失敗・送信失敗を 1 つの enum で表現する
//!
//! ## 依存関係の方向
//!
//! ```text
//! mail-service → infra → domain
//!        ↘                 ↑
//!          ────────────────
//! ```
//!
//! ## モジュール構成
//!
//! - [`notification`] - 配信ジョブ、配信モード、メールメッセージ、通知エラー

#[macro_use]
mod macros;

pub mod notification;
