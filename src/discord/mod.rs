//! Chat platform module.
//!
//! Message delivery is abstracted behind `ChatClient`; `DiscordClient`
//! implements it over the Discord REST API.

mod client;
mod models;

pub use client::*;
pub use models::*;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::presentation::RenderedPayload;

/// Chat platform error types.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to encode payload: {0}")]
    Encode(String),
}

/// A resolved output location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub channel_id: String,
    pub name: Option<String>,
}

/// Reference to a delivered message, used for in-place edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

/// Operations the bot needs from the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Look up a destination; `Ok(None)` when it does not exist or is not visible.
    async fn resolve(&self, channel_id: &str) -> Result<Option<Destination>, ChatError>;

    /// Post a new message.
    async fn send(&self, destination: &Destination, payload: &RenderedPayload) -> Result<MessageHandle, ChatError>;

    /// Replace the content of an existing message.
    async fn edit(&self, handle: &MessageHandle, payload: &RenderedPayload) -> Result<(), ChatError>;
}
