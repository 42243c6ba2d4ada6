//! Gmail authorization via the OAuth2 installed-app flow
//!
//! The user approves read-only mail access in a browser; Google redirects to a
//! loopback listener with an authorization code, which is exchanged (with the
//! PKCE verifier) for an access token and a refresh token.

use anyhow::{Context, Result, bail};
use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::time::{Duration, Instant};
use url::Url;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Read-only access is all the summarizer needs
const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Client id override; the `[auth]` config section is used otherwise
pub fn client_id_from_env() -> Option<String> {
    std::env::var("HOVERMAIL_OAUTH_CLIENT_ID").ok()
}

pub fn client_secret_from_env() -> Option<String> {
    std::env::var("HOVERMAIL_OAUTH_CLIENT_SECRET").ok()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

fn random_token(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).map_err(|e| anyhow::anyhow!("Failed to generate random bytes: {}", e))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// How the browser came back to the loopback listener
#[derive(Debug, PartialEq, Eq)]
pub enum Callback {
    Code(String),
    /// The user (or the provider) declined; carries the error code
    Refused(String),
}

/// An authorization waiting for the user to finish in the browser
pub struct PendingAuthorization {
    pub auth_url: Url,
    redirect_uri: String,
    verifier: String,
    state: String,
    listener: TcpListener,
}

impl PendingAuthorization {
    /// Block until the browser hits the loopback listener or the wait times out
    pub fn wait(&self) -> Result<Callback> {
        self.listener.set_nonblocking(true)?;
        let start = Instant::now();

        let mut stream = loop {
            match self.listener.accept() {
                Ok((stream, _)) => break stream,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > CALLBACK_TIMEOUT {
                        bail!("Timed out waiting for the browser authorization");
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(e).context("Failed to accept OAuth callback"),
            }
        };
        stream.set_nonblocking(false)?;

        let mut request_line = String::new();
        BufReader::new(&stream).read_line(&mut request_line)?;
        let path = request_line.split_whitespace().nth(1).unwrap_or("/");

        let outcome = parse_callback(path, &self.state);
        let page = match &outcome {
            Ok(Callback::Code(_)) => {
                "<h1>Authorized</h1><p>You can close this window and return to hovermail.</p>".to_string()
            }
            Ok(Callback::Refused(error)) => {
                format!("<h1>Authorization declined</h1><p>{}</p>", escape_html(error))
            }
            Err(e) => format!("<h1>Authorization failed</h1><p>{}</p>", escape_html(&e.to_string())),
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body>{}</body></html>",
            page
        );
        stream.write_all(response.as_bytes()).ok();

        outcome
    }
}

/// Interpret the callback request path. A state mismatch is an error, never a code.
fn parse_callback(path: &str, expected_state: &str) -> Result<Callback> {
    let url = Url::parse("http://127.0.0.1")?
        .join(path)
        .context("Malformed callback request")?;
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(error) = param("error") {
        return Ok(Callback::Refused(error));
    }

    let state = param("state").context("Callback is missing the state parameter")?;
    if state != expected_state {
        bail!("Callback state does not match this authorization");
    }

    param("code")
        .filter(|c| !c.is_empty())
        .map(Callback::Code)
        .context("Callback carries no authorization code")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct OAuthClient {
    client_id: String,
    client_secret: Option<String>,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(client_id: &str, client_secret: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client_id: client_id.to_string(),
            client_secret,
            http,
        })
    }

    /// Bind the loopback listener and build the consent URL
    pub fn begin(&self) -> Result<PendingAuthorization> {
        let listener = TcpListener::bind("127.0.0.1:0").context("Failed to bind loopback port")?;
        let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
        let verifier = random_token(32)?;
        let state = random_token(16)?;

        let auth_url = Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", GMAIL_SCOPE),
                ("code_challenge", pkce_challenge(&verifier).as_str()),
                ("code_challenge_method", "S256"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state.as_str()),
            ],
        )?;
        tracing::debug!("OAuth2 redirect URI: {}", redirect_uri);

        Ok(PendingAuthorization {
            auth_url,
            redirect_uri,
            verifier,
            state,
            listener,
        })
    }

    pub async fn exchange(&self, code: &str, pending: &PendingAuthorization) -> Result<TokenResponse> {
        self.token_request(
            &[
                ("code", code),
                ("redirect_uri", pending.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code_verifier", pending.verifier.as_str()),
            ],
            "exchange",
        )
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.token_request(
            &[
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            "refresh",
        )
        .await
    }

    async fn token_request(&self, grant: &[(&str, &str)], what: &str) -> Result<TokenResponse> {
        let mut params: Vec<(&str, &str)> = vec![("client_id", self.client_id.as_str())];
        params.extend_from_slice(grant);
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .with_context(|| format!("Token {} request failed", what))?;

        if !response.status().is_success() {
            let error = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| "unknown_error".to_string());
            bail!("Token {} failed: {}", what, error);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse token {} response", what))
    }
}
