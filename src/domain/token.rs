use crate::domain::provider::Provider;
use serde::Deserialize;
use uuid::Uuid;

pub type TokenId = Uuid;

/// A registered delivery endpoint as loaded for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushToken {
    pub token: String,
    pub provider: Provider,
}

impl PushToken {
    #[must_use]
    pub fn new(token: impl Into<String>, provider: Provider) -> Self {
        Self { token: token.into(), provider }
    }
}

/// The browser subscription stored as the token of a `WEBPUSH` registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebPushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed web push subscription: {0}")]
pub struct TokenFormatError(pub String);

impl WebPushSubscription {
    /// Parses a stored `WEBPUSH` token.
    ///
    /// # Errors
    /// Returns `TokenFormatError` if the token is not a JSON object with string
    /// `endpoint`, `p256dh` and `auth` members.
    pub fn parse(token: &str) -> Result<Self, TokenFormatError> {
        let subscription: Self = serde_json::from_str(token).map_err(|e| TokenFormatError(e.to_string()))?;
        if subscription.endpoint.is_empty() || subscription.p256dh.is_empty() || subscription.auth.is_empty() {
            return Err(TokenFormatError("endpoint, p256dh and auth must not be empty".into()));
        }
        Ok(subscription)
    }
}
