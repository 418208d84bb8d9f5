use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::CallError;

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    ttl: Option<u64>,
}

/// Short-lived credential for one join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCredential {
    pub token: String,
    /// Lifetime in seconds as reported by the backend. Informational only.
    pub ttl: Option<u64>,
}

/// Issues join credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(
        &self,
        channel: &str,
        identity: &str,
        is_publisher: bool,
    ) -> Result<JoinCredential, CallError>;
}

/// Requests credentials from the backend `GET /token` endpoint.
pub struct HttpTokenClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTokenClient {
    /// `base_url` is the API root, e.g. `https://api.example.com/v1`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn token_url(&self, channel: &str, identity: &str, is_publisher: bool) -> String {
        format!(
            "{}/token?channel={}&identity={}&isPublisher={}",
            self.base_url,
            urlencoding::encode(channel),
            urlencoding::encode(identity),
            is_publisher
        )
    }
}

#[async_trait]
impl TokenProvider for HttpTokenClient {
    async fn fetch_token(
        &self,
        channel: &str,
        identity: &str,
        is_publisher: bool,
    ) -> Result<JoinCredential, CallError> {
        let url = self.token_url(channel, identity, is_publisher);
        tracing::info!("requesting join token for channel {channel}");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CallError::Token(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CallError::Token(format!(
                "token endpoint returned status {}",
                resp.status()
            )));
        }

        let data: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CallError::Token(format!("invalid token response: {e}")))?;

        match data.token {
            Some(token) if !token.is_empty() => Ok(JoinCredential { token, ttl: data.ttl }),
            _ => Err(CallError::Token("response carried no token".into())),
        }
    }
}
