//! # Mail Service ライブラリ
//!
//! 設定とメール配信ユースケースを公開する。
//! 統合テストと、配信機能を組み込むホストアプリケーションから利用する。

pub mod config;
pub mod usecase;
