//! Telegram Bot API long-poll client
//!
//! Only the `getUpdates` call the relay needs; updates are mapped onto
//! [`chatrelay_core::Event`] so the relay never sees Telegram types.

pub mod client;
pub mod error;
pub mod types;

pub use client::TelegramClient;
pub use error::TelegramError;
pub use types::{Chat, Message, Update};
