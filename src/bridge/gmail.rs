//! Gmail REST client
//!
//! Hover identifiers scraped from the page rarely match API message ids, so
//! a fetch lists the most recent messages and returns the first one in full.
//! The requested id is only logged.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::BridgeError;
use crate::actor::retry::{RetryPolicy, with_retry_if};
use crate::config::GmailConfig;
use crate::extract::MessagePayload;
use crate::ident::CanonicalId;

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

pub struct GmailClient {
    http: Client,
    api_base: String,
    recent_limit: u32,
    retry: RetryPolicy,
}

impl GmailClient {
    pub fn new(config: &GmailConfig) -> Result<Self, BridgeError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            recent_limit: config.recent_limit,
            retry: RetryPolicy::default(),
        })
    }

    pub async fn fetch_recent(&self, requested: &CanonicalId, token: &str) -> Result<MessagePayload, BridgeError> {
        tracing::debug!("Fetching message for requested id {}", requested);

        let list_url = format!(
            "{}/users/me/messages?maxResults={}",
            self.api_base, self.recent_limit
        );
        let list: MessageList = self.get_json(&list_url, token).await?;
        let first = list.messages.first().ok_or(BridgeError::NoMessages)?;
        tracing::debug!(
            "Listed {} recent messages, using {}",
            list.messages.len(),
            first.id
        );

        let message_url = format!("{}/users/me/messages/{}?format=full", self.api_base, first.id);
        self.get_json(&message_url, token).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, BridgeError> {
        with_retry_if(&self.retry, BridgeError::is_transient, || async {
            let response = self.http.get(url).bearer_auth(token).send().await?;
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(BridgeError::Denied);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!("Gmail API error {}: {}", status, body);
                return Err(BridgeError::Status(status.as_u16()));
            }
            response
                .json::<T>()
                .await
                .map_err(|e| BridgeError::MalformedResponse(e.to_string()))
        })
        .await
    }
}
