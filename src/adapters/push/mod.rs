use crate::domain::notification::NotificationDescriptor;
use crate::domain::provider::Provider;
use crate::domain::token::TokenFormatError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod apns;
pub mod fcm;
pub mod init;
pub mod web_push;

pub use init::{InitError, ProviderClients, PushRuntime};

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Malformed push token: {0}")]
    InvalidToken(#[from] TokenFormatError),
    #[error("Token is no longer registered")]
    Unregistered,
    #[error("Rate limit exceeded")]
    QuotaExceeded,
    #[error("Provider rejected the notification ({status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error("Provider request timed out")]
    Timeout,
    #[error("Push system {0} is not enabled")]
    ProviderDisabled(Provider),
    #[error("Failed to authorize with provider: {0}")]
    Credentials(String),
    #[error("Failed to build notification: {0}")]
    Encoding(String),
    #[error("Transport error: {0}")]
    Transport(reqwest::Error),
    #[error("Send task failed: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { Self::Timeout } else { Self::Transport(err) }
    }
}

impl PushError {
    /// A token format error points at corrupt stored data, not a delivery problem.
    #[must_use]
    pub const fn is_token_format(&self) -> bool {
        matches!(self, Self::InvalidToken(_))
    }

    /// Low-cardinality label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidToken(_) => "invalid_token",
            Self::Unregistered => "unregistered",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Rejected { .. } => "rejected",
            Self::Timeout => "timeout",
            Self::ProviderDisabled(_) => "provider_disabled",
            Self::Credentials(_) => "credentials",
            Self::Encoding(_) => "encoding",
            Self::Transport(_) => "transport",
            Self::Internal(_) => "internal",
        }
    }
}

/// A client for one delivery network.
#[async_trait]
pub trait PushAdapter: Send + Sync + std::fmt::Debug {
    fn provider(&self) -> Provider;

    /// Sends a notification to a single token.
    ///
    /// # Errors
    /// Returns `PushError::InvalidToken` if the token cannot be interpreted for
    /// this provider, and another variant if the provider refused or could not
    /// be reached.
    async fn send(&self, token: &str, notification: &NotificationDescriptor) -> Result<(), PushError>;
}

/// The adapters available for dispatch, at most one per provider.
#[derive(Clone, Debug, Default)]
pub struct AdapterSet {
    adapters: HashMap<Provider, Arc<dyn PushAdapter>>,
}

impl AdapterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous one for the same provider.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn PushAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    #[must_use]
    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn PushAdapter>> {
        self.adapters.get(&provider)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

pub(crate) fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
