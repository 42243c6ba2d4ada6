//! Request/response access to the collaborators behind a summary: the token
//! issuer, the message store, and the local summarizer.

mod gmail;
mod ollama;
mod token;

pub use gmail::GmailClient;
pub use ollama::OllamaClient;
pub use token::TokenProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::credentials::TokenStore;
use crate::extract::MessagePayload;
use crate::ident::CanonicalId;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("service unavailable")]
    Unavailable,
    #[error("access denied")]
    Denied,
    #[error("no token")]
    NoToken,
    #[error("no messages found")]
    NoMessages,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl BridgeError {
    /// Worth another attempt: server-side or connection trouble
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::Status(code) => *code >= 500 || *code == 429,
            BridgeError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[async_trait]
pub trait Bridge: Send + Sync {
    async fn request_token(&self) -> Result<String, BridgeError>;

    /// May return the most recent message rather than `id` itself
    async fn fetch_message(&self, id: &CanonicalId, token: &str) -> Result<MessagePayload, BridgeError>;

    async fn summarize(&self, text: &str) -> Result<String, BridgeError>;
}

/// The real collaborators, over HTTP
pub struct HttpBridge {
    tokens: TokenProvider,
    gmail: GmailClient,
    ollama: OllamaClient,
}

impl HttpBridge {
    pub fn new(tokens: TokenProvider, gmail: GmailClient, ollama: OllamaClient) -> Self {
        Self {
            tokens,
            gmail,
            ollama,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, BridgeError> {
        let tokens = TokenProvider::new(
            config.client_id(),
            TokenStore::new(&config.auth.account),
            config.auth.interactive,
        );
        Ok(Self::new(
            tokens,
            GmailClient::new(&config.gmail)?,
            OllamaClient::new(&config.summarizer)?,
        ))
    }
}

#[async_trait]
impl Bridge for HttpBridge {
    async fn request_token(&self) -> Result<String, BridgeError> {
        self.tokens.access_token().await
    }

    async fn fetch_message(&self, id: &CanonicalId, token: &str) -> Result<MessagePayload, BridgeError> {
        self.gmail.fetch_recent(id, token).await
    }

    async fn summarize(&self, text: &str) -> Result<String, BridgeError> {
        self.ollama.summarize(text).await
    }
}
