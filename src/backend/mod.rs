pub mod webhook;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::models::chat::ChatRequest;

pub use self::webhook::WebhookBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("chat backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat backend responded with status {0}")]
    Status(u16),
    #[error("chat backend stream broke: {0}")]
    Stream(String),
    #[error("invalid chat backend configuration: {0}")]
    Config(String),
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, BackendError>> + Send>>;

/// The chat webhook: posts one question and yields the raw response body as it
/// arrives. Returning `Ok` means the response was opened with a success status.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, BackendError>;
}
