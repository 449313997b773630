use crate::adapters::push::{PushAdapter, PushError};
use crate::domain::notification::NotificationDescriptor;
use crate::domain::provider::Provider;
use crate::domain::token::{TokenFormatError, WebPushSubscription};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};
use std::fmt;
use web_push::{ContentEncoding, PartialVapidSignatureBuilder, SubscriptionInfo, WebPushMessageBuilder};

// Push services keep undelivered messages for at most four weeks.
const TTL_SECS: u32 = 2_419_200;

/// Adds the localization keys and arguments that are present.
pub(crate) fn insert_localization(notification: &NotificationDescriptor, fields: &mut Map<String, Value>) {
    if let Some(key) = &notification.title_localization_key {
        fields.insert("titleLocalizationKey".into(), key.clone().into());
    }
    if !notification.title_localization_args.is_empty() {
        fields.insert("titleLocalizationArgs".into(), notification.title_localization_args.clone().into());
    }
    if let Some(key) = &notification.body_localization_key {
        fields.insert("bodyLocalizationKey".into(), key.clone().into());
    }
    if !notification.body_localization_args.is_empty() {
        fields.insert("bodyLocalizationArgs".into(), notification.body_localization_args.clone().into());
    }
}

pub(crate) fn insert_data(notification: &NotificationDescriptor, fields: &mut Map<String, Value>) {
    for (key, value) in &notification.data {
        fields.insert(key.clone(), value.clone().into());
    }
}

/// Builds the JSON document that is encrypted for the browser's service worker.
/// Custom data entries win over same-named notification fields.
#[must_use]
pub fn build_payload(notification: &NotificationDescriptor) -> Value {
    let mut fields = Map::new();
    if let Some(title) = &notification.title {
        fields.insert("title".into(), title.clone().into());
    }
    if let Some(body) = &notification.body {
        fields.insert("body".into(), body.clone().into());
    }
    if let Some(image) = &notification.image_url {
        fields.insert("image".into(), image.clone().into());
        fields.insert("imageUrl".into(), image.clone().into());
    }
    insert_localization(notification, &mut fields);
    insert_data(notification, &mut fields);
    Value::Object(fields)
}

fn decode_key(name: &str, value: &str, expected_len: usize) -> Result<(), TokenFormatError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| TokenFormatError(format!("{name} is not base64url: {e}")))?;
    if bytes.len() != expected_len {
        return Err(TokenFormatError(format!("{name} must be {expected_len} bytes, got {}", bytes.len())));
    }
    Ok(())
}

/// Parses a stored subscription and checks its key material.
///
/// # Errors
/// Returns `TokenFormatError` for malformed JSON, missing members or keys of
/// the wrong encoding or size.
pub fn parse_subscription(token: &str) -> Result<WebPushSubscription, TokenFormatError> {
    let subscription = WebPushSubscription::parse(token)?;
    decode_key("p256dh", &subscription.p256dh, 65)?;
    decode_key("auth", &subscription.auth, 16)?;
    Ok(subscription)
}

pub struct WebPushAdapter {
    client: reqwest::Client,
    signer: PartialVapidSignatureBuilder,
    subject: String,
}

impl fmt::Debug for WebPushAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebPushAdapter").field("subject", &self.subject).finish_non_exhaustive()
    }
}

impl WebPushAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client, signer: PartialVapidSignatureBuilder, subject: impl Into<String>) -> Self {
        Self { client, signer, subject: subject.into() }
    }

    /// Returns the encrypted body and the headers that authenticate it.
    fn encrypt(
        &self,
        subscription: &WebPushSubscription,
        payload: &[u8],
    ) -> Result<(Vec<u8>, Vec<(&'static str, String)>), PushError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.p256dh.clone(),
            subscription.auth.clone(),
        );

        let mut signature = self.signer.clone().add_sub_info(&info);
        signature.add_claim("sub", self.subject.as_str());
        let signature = signature.build().map_err(|e| PushError::Credentials(e.to_string()))?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        let message = builder.build().map_err(|e| PushError::Encoding(e.to_string()))?;
        let encrypted = message.payload.ok_or_else(|| PushError::Encoding("encrypted payload missing".into()))?;
        Ok((encrypted.content, encrypted.crypto_headers))
    }
}

#[async_trait]
impl PushAdapter for WebPushAdapter {
    fn provider(&self) -> Provider {
        Provider::WebPush
    }

    #[tracing::instrument(level = "debug", skip_all, fields(provider = "WEBPUSH"), err)]
    async fn send(&self, token: &str, notification: &NotificationDescriptor) -> Result<(), PushError> {
        let subscription = parse_subscription(token)?;
        let body = serde_json::to_vec(&build_payload(notification)).map_err(|e| PushError::Encoding(e.to_string()))?;
        let (content, crypto_headers) = self.encrypt(&subscription, &body)?;

        let mut request = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", TTL_SECS.to_string())
            .header("Urgency", notification.priority.to_web_push().header_value())
            .header(reqwest::header::CONTENT_ENCODING, "aes128gcm")
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream");
        for (name, value) in crypto_headers {
            request = request.header(name, value);
        }

        let response = request.body(content).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let reason = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), reason = %reason, "Push service rejected notification");
        Err(match status.as_u16() {
            404 | 410 => PushError::Unregistered,
            429 => PushError::QuotaExceeded,
            code => PushError::Rejected { status: code, reason },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_merges_fields_and_data() {
        let mut notification = NotificationDescriptor {
            title: Some("Build finished".into()),
            body_localization_key: Some("build.ok".into()),
            body_localization_args: vec!["#42".into()],
            image_url: Some("https://img.example.com/ci.png".into()),
            ..Default::default()
        };
        notification.data.insert("url".into(), "/builds/42".into());

        assert_eq!(
            build_payload(&notification),
            json!({
                "title": "Build finished",
                "image": "https://img.example.com/ci.png",
                "imageUrl": "https://img.example.com/ci.png",
                "bodyLocalizationKey": "build.ok",
                "bodyLocalizationArgs": ["#42"],
                "url": "/builds/42"
            })
        );
    }

    #[test]
    fn test_data_overrides_fields() {
        let mut notification = NotificationDescriptor { title: Some("original".into()), ..Default::default() };
        notification.data.insert("title".into(), "override".into());
        assert_eq!(build_payload(&notification), json!({ "title": "override" }));
    }

    #[test]
    fn test_parse_subscription_checks_key_sizes() {
        let p256dh = URL_SAFE_NO_PAD.encode([4u8; 65]);
        let auth = URL_SAFE_NO_PAD.encode([7u8; 16]);
        let valid = json!({ "endpoint": "https://push.example.com/x", "p256dh": p256dh, "auth": auth }).to_string();
        assert!(parse_subscription(&valid).is_ok());

        let short_auth = json!({ "endpoint": "https://push.example.com/x", "p256dh": p256dh, "auth": "AAAA" }).to_string();
        let err = parse_subscription(&short_auth).unwrap_err();
        assert!(err.0.contains("auth must be 16 bytes"), "unexpected message: {}", err.0);

        let bad_b64 = json!({ "endpoint": "https://push.example.com/x", "p256dh": "***", "auth": auth }).to_string();
        assert!(parse_subscription(&bad_b64).is_err());
    }
}
