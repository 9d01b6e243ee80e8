//! # ユースケース層
//!
//! メール配信のアプリケーションロジックを実装する。

pub mod notification;
