use crate::adapters::push::apns::Aps;
use crate::adapters::push::web_push::{insert_data, insert_localization};
use crate::adapters::push::{PushAdapter, PushError, unix_now};
use crate::domain::notification::NotificationDescriptor;
use crate::domain::provider::Provider;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::Mutex;

pub const DEFAULT_API_BASE: &str = "https://fcm.googleapis.com";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google service-account key file that FCM needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// # Errors
    /// Returns an error if the document is not a service-account key.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Exchanges a signed assertion for an OAuth2 access token and caches it.
struct AccessTokenSource {
    client: reqwest::Client,
    client_email: String,
    token_uri: String,
    key: EncodingKey,
    cached: Mutex<Option<(String, i64)>>,
}

impl AccessTokenSource {
    fn new(client: reqwest::Client, account: &ServiceAccount) -> Result<Self, jsonwebtoken::errors::Error> {
        let source = Self {
            client,
            client_email: account.client_email.clone(),
            token_uri: account.token_uri.clone(),
            key: EncodingKey::from_rsa_pem(account.private_key.as_bytes())?,
            cached: Mutex::new(None),
        };
        source.assertion(unix_now())?;
        Ok(source)
    }

    fn assertion(&self, issued_at: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_TTL_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
    }

    async fn access_token(&self) -> Result<String, PushError> {
        let mut cached = self.cached.lock().await;
        let now = unix_now();
        if let Some((token, _)) = cached.as_ref().filter(|(_, expires_at)| now < expires_at - REFRESH_MARGIN_SECS) {
            return Ok(token.clone());
        }

        let assertion = self.assertion(now).map_err(|e| PushError::Credentials(e.to_string()))?;
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Credentials(format!("token exchange failed ({status}): {body}")));
        }
        let token: TokenResponse = response.json().await.map_err(|e| PushError::Credentials(e.to_string()))?;

        tracing::debug!(expires_in = token.expires_in, "Refreshed FCM access token");
        *cached = Some((token.access_token.clone(), now + token.expires_in));
        Ok(token.access_token)
    }
}

#[derive(Serialize)]
struct AndroidNotification<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title_loc_key: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    title_loc_args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    body_loc_key: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    body_loc_args: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    notification_priority: &'static str,
}

#[derive(Serialize)]
struct AndroidConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    collapse_key: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    data: &'a BTreeMap<String, String>,
    notification: AndroidNotification<'a>,
}

#[derive(Serialize)]
struct ApnsFcmOptions<'a> {
    image: &'a str,
}

#[derive(Serialize)]
struct ApnsBody<'a> {
    aps: Aps<'a>,
}

#[derive(Serialize)]
struct ApnsConfig<'a> {
    headers: BTreeMap<&'static str, &'static str>,
    payload: ApnsBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fcm_options: Option<ApnsFcmOptions<'a>>,
}

#[derive(Serialize)]
struct WebPushNotification<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    data: Map<String, Value>,
}

#[derive(Serialize)]
struct WebPushConfig<'a> {
    headers: BTreeMap<&'static str, &'static str>,
    notification: WebPushNotification<'a>,
}

#[derive(Serialize)]
struct Message<'a> {
    token: &'a str,
    android: AndroidConfig<'a>,
    apns: ApnsConfig<'a>,
    webpush: WebPushConfig<'a>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: Message<'a>,
}

/// Builds the HTTP v1 `messages:send` body for a single registration token.
///
/// # Errors
/// Returns `PushError::Encoding` if serialization fails.
pub fn build_message(token: &str, notification: &NotificationDescriptor) -> Result<Value, PushError> {
    let image = notification.image_url.as_deref();

    let android = AndroidConfig {
        collapse_key: notification.collapse_key.as_deref(),
        data: &notification.data,
        notification: AndroidNotification {
            title: notification.title.as_deref(),
            body: notification.body.as_deref(),
            title_loc_key: notification.title_localization_key.as_deref(),
            title_loc_args: &notification.title_localization_args,
            body_loc_key: notification.body_localization_key.as_deref(),
            body_loc_args: &notification.body_localization_args,
            image,
            channel_id: notification.channel_id.as_deref(),
            sound: notification.sound.as_deref(),
            icon: notification.icon.as_deref(),
            notification_priority: notification.priority.to_android().as_str(),
        },
    };

    let apns = ApnsConfig {
        headers: BTreeMap::from([("apns-priority", notification.priority.to_apns().header_value())]),
        payload: ApnsBody {
            aps: Aps::from_descriptor(notification)
                .with_thread_id(notification.collapse_key.as_deref())
                .with_custom(&notification.data),
        },
        fcm_options: image.map(|image| ApnsFcmOptions { image }),
    };

    let mut web_data = Map::new();
    insert_localization(notification, &mut web_data);
    insert_data(notification, &mut web_data);
    let webpush = WebPushConfig {
        headers: BTreeMap::from([("Urgency", notification.priority.to_web_push().header_value())]),
        notification: WebPushNotification {
            title: notification.title.as_deref(),
            body: notification.body.as_deref(),
            image,
            data: web_data,
        },
    };

    let request = SendRequest { message: Message { token, android, apns, webpush } };
    serde_json::to_value(&request).map_err(|e| PushError::Encoding(e.to_string()))
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

fn classify(status: u16, body: &str) -> PushError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let error_code = parsed
        .as_ref()
        .and_then(|e| e.error.details.iter().find_map(|d| d.error_code.clone()));
    let unregistered = status == 404
        || error_code.as_deref() == Some("UNREGISTERED")
        || parsed.as_ref().is_some_and(|e| e.error.status == "NOT_FOUND");

    if unregistered {
        return PushError::Unregistered;
    }
    if status == 429 || error_code.as_deref() == Some("QUOTA_EXCEEDED") {
        return PushError::QuotaExceeded;
    }
    let reason = match (error_code, parsed) {
        (Some(code), _) => code,
        (None, Some(e)) if !e.error.message.is_empty() => e.error.message,
        _ => body.to_string(),
    };
    PushError::Rejected { status, reason }
}

pub struct FcmAdapter {
    client: reqwest::Client,
    send_url: String,
    tokens: AccessTokenSource,
}

impl fmt::Debug for FcmAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmAdapter").field("send_url", &self.send_url).finish_non_exhaustive()
    }
}

impl FcmAdapter {
    /// # Errors
    /// Returns an error if the service account's private key is not a usable RSA key.
    pub fn new(
        client: reqwest::Client,
        account: &ServiceAccount,
        api_base: &str,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        let tokens = AccessTokenSource::new(client.clone(), account)?;
        let send_url = format!("{}/v1/projects/{}/messages:send", api_base.trim_end_matches('/'), account.project_id);
        Ok(Self { client, send_url, tokens })
    }
}

#[async_trait]
impl PushAdapter for FcmAdapter {
    fn provider(&self) -> Provider {
        Provider::Fcm
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "FCM"), err)]
    async fn send(&self, token: &str, notification: &NotificationDescriptor) -> Result<(), PushError> {
        let message = build_message(token, notification)?;
        let access_token = self.tokens.access_token().await?;

        let response = self.client.post(&self.send_url).bearer_auth(access_token).json(&message).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), body = %body, "FCM rejected notification");
        Err(classify(status.as_u16(), &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::priority::Priority;
    use serde_json::json;

    #[test]
    fn test_message_carries_all_platform_blocks() {
        let mut notification = NotificationDescriptor {
            title: Some("Hi".into()),
            body: Some("There".into()),
            image_url: Some("https://img.example.com/p.png".into()),
            collapse_key: Some("chat-9".into()),
            channel_id: Some("messages".into()),
            priority: Priority::High,
            ..Default::default()
        };
        notification.data.insert("chat".into(), "9".into());

        let message = build_message("reg-token", &notification).unwrap();
        assert_eq!(
            message,
            json!({
                "message": {
                    "token": "reg-token",
                    "android": {
                        "collapse_key": "chat-9",
                        "data": { "chat": "9" },
                        "notification": {
                            "title": "Hi",
                            "body": "There",
                            "image": "https://img.example.com/p.png",
                            "channel_id": "messages",
                            "notification_priority": "PRIORITY_HIGH"
                        }
                    },
                    "apns": {
                        "headers": { "apns-priority": "10" },
                        "payload": {
                            "aps": {
                                "alert": { "title": "Hi", "body": "There" },
                                "mutable-content": 1,
                                "thread-id": "chat-9",
                                "chat": "9"
                            }
                        },
                        "fcm_options": { "image": "https://img.example.com/p.png" }
                    },
                    "webpush": {
                        "headers": { "Urgency": "high" },
                        "notification": {
                            "title": "Hi",
                            "body": "There",
                            "image": "https://img.example.com/p.png",
                            "data": { "chat": "9" }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_webpush_block_carries_localization_in_data() {
        let notification = NotificationDescriptor {
            title_localization_key: Some("t.key".into()),
            title_localization_args: vec!["a".into()],
            body_localization_key: Some("b.key".into()),
            ..Default::default()
        };
        let message = build_message("t", &notification).unwrap();
        assert_eq!(
            message["message"]["webpush"]["notification"],
            json!({ "data": { "titleLocalizationKey": "t.key", "titleLocalizationArgs": ["a"], "bodyLocalizationKey": "b.key" } })
        );
        assert_eq!(message["message"]["android"]["notification"]["title_loc_args"], json!(["a"]));
        assert!(message["message"]["apns"].get("fcm_options").is_none());
    }

    #[test]
    fn test_classify_errors() {
        let unregistered = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND",
            "details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        assert!(matches!(classify(404, unregistered), PushError::Unregistered));
        assert!(matches!(classify(429, ""), PushError::QuotaExceeded));

        let invalid = r#"{"error":{"code":400,"message":"bad","status":"INVALID_ARGUMENT",
            "details":[{"errorCode":"INVALID_ARGUMENT"}]}}"#;
        match classify(400, invalid) {
            PushError::Rejected { status, reason } => {
                assert_eq!(status, 400);
                assert_eq!(reason, "INVALID_ARGUMENT");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_service_account_defaults_token_uri() {
        let account =
            ServiceAccount::from_json(r#"{"project_id":"p","client_email":"e@p","private_key":"k"}"#).unwrap();
        assert_eq!(account.token_uri, DEFAULT_TOKEN_URI);
    }
}
