//! Access-token issuance for the message store
//!
//! Sources, in order: the `HOVERMAIL_ACCESS_TOKEN` override, the cached token
//! while it is fresh, a refresh with the stored refresh token, and finally the
//! interactive browser consent.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::BridgeError;
use crate::credentials::TokenStore;
use crate::oauth2::{Callback, OAuthClient, TokenResponse, client_secret_from_env};

const ACCESS_TOKEN_ENV: &str = "HOVERMAIL_ACCESS_TOKEN";

/// Treat tokens this close to expiry as already expired
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the token endpoint does not say
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn from_response(tokens: &TokenResponse) -> Self {
        let lifetime = tokens
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LIFETIME);
        Self {
            access_token: tokens.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

pub struct TokenProvider {
    client_id: Option<String>,
    store: TokenStore,
    interactive: bool,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(client_id: Option<String>, store: TokenStore, interactive: bool) -> Self {
        Self {
            client_id,
            store,
            interactive,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, BridgeError> {
        if let Some(token) = std::env::var(ACCESS_TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
            return Ok(token);
        }

        // Held across the refresh so concurrent hovers share one token request
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        let Some(client_id) = self.client_id.as_deref() else {
            tracing::warn!("No OAuth client id configured");
            return Err(BridgeError::Unavailable);
        };
        let client = OAuthClient::new(client_id, client_secret_from_env()).map_err(|e| {
            tracing::warn!("OAuth client setup failed: {:#}", e);
            BridgeError::Unavailable
        })?;

        if let Some(refresh_token) = self.store.load() {
            match client.refresh(&refresh_token).await {
                Ok(tokens) => {
                    tracing::debug!("Refreshed access token");
                    let fresh = CachedToken::from_response(&tokens);
                    let token = fresh.access_token.clone();
                    *cached = Some(fresh);
                    return Ok(token);
                }
                Err(e) => tracing::warn!("Token refresh failed: {:#}", e),
            }
        }

        if !self.interactive {
            return Err(BridgeError::NoToken);
        }

        let tokens = self.authorize(&client).await?;
        let fresh = CachedToken::from_response(&tokens);
        let token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Browser consent. Stores the refresh token it yields.
    async fn authorize(&self, client: &OAuthClient) -> Result<TokenResponse, BridgeError> {
        let pending = client.begin().map_err(|e| {
            tracing::warn!("Could not start authorization: {:#}", e);
            BridgeError::Unavailable
        })?;

        tracing::info!("Opening browser for Gmail authorization");
        if let Err(e) = open::that(pending.auth_url.as_str()) {
            tracing::warn!("Failed to open browser: {}", e);
            eprintln!("Open this URL to authorize hovermail:\n{}", pending.auth_url);
        }

        let (pending, callback) = tokio::task::spawn_blocking(move || {
            let callback = pending.wait();
            (pending, callback)
        })
        .await
        .map_err(|e| {
            tracing::warn!("Authorization wait aborted: {}", e);
            BridgeError::NoToken
        })?;

        let code = match callback {
            Ok(Callback::Code(code)) => code,
            Ok(Callback::Refused(reason)) => {
                tracing::info!("Authorization refused: {}", reason);
                return Err(BridgeError::Denied);
            }
            Err(e) => {
                tracing::warn!("Authorization failed: {:#}", e);
                return Err(BridgeError::NoToken);
            }
        };

        let tokens = client.exchange(&code, &pending).await.map_err(|e| {
            tracing::warn!("{:#}", e);
            BridgeError::NoToken
        })?;

        match tokens.refresh_token.as_deref() {
            Some(refresh_token) => {
                if let Err(e) = self.store.save(refresh_token) {
                    tracing::warn!("Could not store refresh token: {:#}", e);
                }
            }
            None => tracing::warn!("Authorization returned no refresh token"),
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_freshness() {
        let tokens = TokenResponse {
            access_token: "ya29.a".to_string(),
            refresh_token: None,
            expires_in: Some(3599),
        };
        assert!(CachedToken::from_response(&tokens).is_fresh());

        let nearly_expired = TokenResponse {
            expires_in: Some(30),
            ..tokens
        };
        assert!(!CachedToken::from_response(&nearly_expired).is_fresh());
    }

    #[tokio::test]
    async fn test_missing_client_id_is_unavailable() {
        if std::env::var(ACCESS_TOKEN_ENV).is_ok() {
            return;
        }
        let store = TokenStore::new("hovermail-test-no-client");
        let provider = TokenProvider::new(None, store, false);
        assert!(matches!(
            provider.access_token().await,
            Err(BridgeError::Unavailable)
        ));
    }
}
