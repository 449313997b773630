use crate::adapters::push::{PushAdapter, PushError, unix_now};
use crate::domain::notification::NotificationDescriptor;
use crate::domain::provider::Provider;
use crate::domain::token::TokenFormatError;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::Mutex;

pub const PRODUCTION_GATEWAY: &str = "https://api.push.apple.com";
pub const DEVELOPMENT_GATEWAY: &str = "https://api.sandbox.push.apple.com";

// Apple rejects provider tokens older than an hour and throttles refreshes
// more frequent than every 20 minutes.
const PROVIDER_TOKEN_TTL_SECS: i64 = 50 * 60;

// Keys of the `aps` dictionary and the payload root that custom data may not replace.
const RESERVED_APS_KEYS: [&str; 4] = ["alert", "sound", "mutable-content", "thread-id"];
const RESERVED_ROOT_KEYS: [&str; 2] = ["aps", "native_push_image"];

/// Custom data entries, minus any key that would shadow a generated field.
fn custom_entries<'a>(data: &'a BTreeMap<String, String>, reserved: &[&str]) -> BTreeMap<&'a str, &'a str> {
    data.iter()
        .filter(|(key, _)| {
            let shadows = reserved.contains(&key.as_str());
            if shadows {
                tracing::warn!(key = %key, "Dropping custom data entry that collides with an APNS field");
            }
            !shadows
        })
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Alert<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title_loc_key: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    title_loc_args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    loc_key: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    loc_args: &'a [String],
}

impl Alert<'_> {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.title_loc_key.is_none()
            && self.title_loc_args.is_empty()
            && self.loc_key.is_none()
            && self.loc_args.is_empty()
    }
}

/// The `aps` dictionary, shared with the APNS block of FCM messages.
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Aps<'a> {
    #[serde(skip_serializing_if = "Alert::is_empty")]
    alert: Alert<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mutable_content: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
    #[serde(flatten)]
    custom: BTreeMap<&'a str, &'a str>,
}

impl<'a> Aps<'a> {
    pub(crate) fn from_descriptor(notification: &'a NotificationDescriptor) -> Self {
        Self {
            alert: Alert {
                title: notification.title.as_deref(),
                body: notification.body.as_deref(),
                title_loc_key: notification.title_localization_key.as_deref(),
                title_loc_args: &notification.title_localization_args,
                loc_key: notification.body_localization_key.as_deref(),
                loc_args: &notification.body_localization_args,
            },
            sound: notification.sound.as_deref(),
            mutable_content: notification.image_url.is_some().then_some(1),
            thread_id: None,
            custom: BTreeMap::new(),
        }
    }

    #[must_use]
    pub(crate) fn with_thread_id(mut self, thread_id: Option<&'a str>) -> Self {
        self.thread_id = thread_id;
        self
    }

    #[must_use]
    pub(crate) fn with_custom(mut self, custom: &'a BTreeMap<String, String>) -> Self {
        self.custom = custom_entries(custom, &RESERVED_APS_KEYS);
        self
    }
}

#[derive(Serialize)]
struct ApnsPayload<'a> {
    aps: Aps<'a>,
    /// Read by the app's notification service extension to attach the image.
    #[serde(rename = "native_push_image", skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(flatten)]
    data: BTreeMap<&'a str, &'a str>,
}

/// Builds the JSON body sent to `/3/device/{token}`.
///
/// # Errors
/// Returns `PushError::Encoding` if serialization fails.
pub fn build_payload(notification: &NotificationDescriptor) -> Result<serde_json::Value, PushError> {
    let payload = ApnsPayload {
        aps: Aps::from_descriptor(notification),
        image: notification.image_url.as_deref(),
        data: custom_entries(&notification.data, &RESERVED_ROOT_KEYS),
    };
    serde_json::to_value(&payload).map_err(|e| PushError::Encoding(e.to_string()))
}

#[derive(Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

/// Signs and caches the ES256 provider token used for token-based auth.
pub struct ProviderTokenSigner {
    key: EncodingKey,
    key_id: String,
    team_id: String,
    cached: Mutex<Option<(String, i64)>>,
}

impl fmt::Debug for ProviderTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTokenSigner")
            .field("key_id", &self.key_id)
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

impl ProviderTokenSigner {
    /// Creates a signer from the contents of a `.p8` key file.
    ///
    /// # Errors
    /// Returns an error if the key is not an EC private key in PEM form.
    pub fn from_p8(pem: &[u8], key_id: String, team_id: String) -> Result<Self, jsonwebtoken::errors::Error> {
        let signer = Self { key: EncodingKey::from_ec_pem(pem)?, key_id, team_id, cached: Mutex::new(None) };
        // Sign once so a key that parses but cannot sign fails at startup.
        signer.sign(unix_now())?;
        Ok(signer)
    }

    fn sign(&self, issued_at: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        jsonwebtoken::encode(&header, &ProviderClaims { iss: &self.team_id, iat: issued_at }, &self.key)
    }

    async fn bearer(&self) -> Result<String, PushError> {
        let mut cached = self.cached.lock().await;
        let now = unix_now();
        if let Some((token, _)) = cached.as_ref().filter(|(_, issued_at)| now - issued_at < PROVIDER_TOKEN_TTL_SECS) {
            return Ok(token.clone());
        }
        let token = self.sign(now).map_err(|e| PushError::Credentials(e.to_string()))?;
        *cached = Some((token.clone(), now));
        Ok(token)
    }
}

#[derive(Debug)]
pub enum ApnsAuth {
    /// The client certificate is attached to the HTTP client.
    Certificate,
    Token(ProviderTokenSigner),
}

#[derive(Deserialize)]
struct ErrorBody {
    reason: String,
}

#[derive(Debug)]
pub struct ApnsAdapter {
    client: reqwest::Client,
    gateway: String,
    topic: String,
    auth: ApnsAuth,
}

impl ApnsAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client, gateway: impl Into<String>, topic: impl Into<String>, auth: ApnsAuth) -> Self {
        Self { client, gateway: gateway.into(), topic: topic.into(), auth }
    }

    /// Appends the device token as a single percent-encoded path segment.
    fn device_url(&self, token: &str) -> Result<reqwest::Url, PushError> {
        if matches!(token, "" | "." | "..") {
            return Err(TokenFormatError(format!("{token:?} is not a device token")).into());
        }
        let mut url = reqwest::Url::parse(&self.gateway)
            .map_err(|e| PushError::Encoding(format!("invalid gateway {}: {e}", self.gateway)))?;
        url.path_segments_mut()
            .map_err(|()| PushError::Encoding(format!("gateway {} cannot carry a path", self.gateway)))?
            .pop_if_empty()
            .extend(["3", "device", token]);
        Ok(url)
    }
}

#[async_trait]
impl PushAdapter for ApnsAdapter {
    fn provider(&self) -> Provider {
        Provider::Apns
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "APNS"), err)]
    async fn send(&self, token: &str, notification: &NotificationDescriptor) -> Result<(), PushError> {
        let url = self.device_url(token)?;
        let payload = build_payload(notification)?;
        let mut request = self
            .client
            .post(url)
            .header("apns-topic", &self.topic)
            .header("apns-push-type", "alert")
            .header("apns-priority", notification.priority.to_apns().header_value())
            .json(&payload);
        if let Some(collapse_id) = &notification.collapse_key {
            request = request.header("apns-collapse-id", collapse_id);
        }
        if let ApnsAuth::Token(signer) = &self.auth {
            request = request.bearer_auth(signer.bearer().await?);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let reason = response
            .json::<ErrorBody>()
            .await
            .map_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string(), |body| body.reason);
        tracing::debug!(status = status.as_u16(), reason = %reason, "APNS rejected notification");

        Err(match (status.as_u16(), reason.as_str()) {
            (410, _) | (_, "BadDeviceToken" | "Unregistered" | "DeviceTokenNotForTopic") => PushError::Unregistered,
            (429, _) => PushError::QuotaExceeded,
            (code, _) => PushError::Rejected { status: code, reason },
        })
    }
}
