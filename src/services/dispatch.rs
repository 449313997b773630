use crate::adapters::push::{AdapterSet, PushAdapter, PushError};
use crate::domain::notification::NotificationDescriptor;
use crate::domain::owner::OwnerId;
use crate::domain::token::PushToken;
use crate::services::token_store::{StoreError, TokenStore};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    errors: Counter<u64>,
    malformed_tokens: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("native-push-server");
        Self {
            sent: meter
                .u64_counter("push_sent_total")
                .with_description("Total number of push notifications accepted by a provider")
                .build(),
            errors: meter
                .u64_counter("push_errors_total")
                .with_description("Total number of push notification delivery errors")
                .build(),
            malformed_tokens: meter
                .u64_counter("push_malformed_tokens_total")
                .with_description("Total number of stored push tokens that could not be interpreted")
                .build(),
        }
    }
}

/// The result of sending to one registered token.
#[derive(Debug)]
pub struct TokenOutcome {
    pub token: PushToken,
    pub result: Result<(), PushError>,
}

impl TokenOutcome {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<TokenOutcome>,
}

impl DispatchReport {
    /// True when every token was accepted, including when there were none.
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.outcomes.iter().all(TokenOutcome::is_delivered)
    }

    #[must_use]
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }
}

/// Fans a notification out to every token an owner has registered.
#[derive(Debug)]
pub struct NotificationDispatcher<Id: OwnerId> {
    store: Arc<dyn TokenStore<Id>>,
    adapters: AdapterSet,
    send_timeout: Duration,
    fan_out_limit: usize,
    metrics: Metrics,
}

impl<Id: OwnerId> Clone for NotificationDispatcher<Id> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            adapters: self.adapters.clone(),
            send_timeout: self.send_timeout,
            fan_out_limit: self.fan_out_limit,
            metrics: self.metrics.clone(),
        }
    }
}

async fn send_one(
    adapter: Option<Arc<dyn PushAdapter>>,
    semaphore: Arc<Semaphore>,
    token: PushToken,
    notification: Arc<NotificationDescriptor>,
    timeout: Duration,
) -> Result<(), PushError> {
    let adapter = adapter.ok_or(PushError::ProviderDisabled(token.provider))?;
    let _permit = semaphore.acquire_owned().await.map_err(|e| PushError::Internal(e.to_string()))?;
    tokio::time::timeout(timeout, adapter.send(&token.token, &notification))
        .await
        .map_err(|_| PushError::Timeout)?
}

impl<Id: OwnerId> NotificationDispatcher<Id> {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore<Id>>, adapters: AdapterSet, send_timeout: Duration, fan_out_limit: usize) -> Self {
        Self { store, adapters, send_timeout, fan_out_limit: fan_out_limit.max(1), metrics: Metrics::new() }
    }

    /// Sends to every token of `owner` and reports each outcome.
    ///
    /// Each send runs in its own task. A failing, timed-out or panicking send
    /// only affects its own outcome.
    ///
    /// # Errors
    /// Returns `StoreError` if the owner's tokens cannot be loaded.
    #[tracing::instrument(level = "debug", skip_all, fields(owner = %owner), err)]
    pub async fn dispatch(&self, owner: &Id, notification: &NotificationDescriptor) -> Result<DispatchReport, StoreError> {
        let tokens = self.store.load(owner).await?;
        if tokens.is_empty() {
            tracing::debug!("Owner has no registered tokens");
            return Ok(DispatchReport::default());
        }

        let notification = Arc::new(notification.clone());
        let semaphore = Arc::new(Semaphore::new(self.fan_out_limit));
        let mut tasks = JoinSet::new();
        for (index, token) in tokens.iter().enumerate() {
            let send = send_one(
                self.adapters.get(token.provider).cloned(),
                Arc::clone(&semaphore),
                token.clone(),
                Arc::clone(&notification),
                self.send_timeout,
            );
            tasks.spawn(
                async move { (index, send.await) }.instrument(tracing::debug_span!("send_push", provider = %token.provider)),
            );
        }

        let mut results: Vec<Option<Result<(), PushError>>> = tokens.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Push send task failed"),
            }
        }

        let outcomes = tokens
            .into_iter()
            .zip(results)
            .map(|(token, result)| {
                let result = result.unwrap_or_else(|| Err(PushError::Internal("send task did not complete".into())));
                self.record(&token, &result);
                TokenOutcome { token, result }
            })
            .collect();
        Ok(DispatchReport { outcomes })
    }

    /// Sends to every token of `owner`. Returns true if all sends succeeded,
    /// or if `owner` has no tokens.
    ///
    /// # Errors
    /// Returns `StoreError` if the owner's tokens cannot be loaded.
    pub async fn send_notification(&self, owner: &Id, notification: &NotificationDescriptor) -> Result<bool, StoreError> {
        let report = self.dispatch(owner, notification).await?;
        tracing::info!(
            owner = %owner,
            tokens = report.outcomes.len(),
            delivered = report.delivered(),
            "Notification dispatched"
        );
        Ok(report.all_delivered())
    }

    fn record(&self, token: &PushToken, result: &Result<(), PushError>) {
        let provider = KeyValue::new("provider", token.provider.as_str());
        match result {
            Ok(()) => {
                tracing::debug!(provider = %token.provider, "Push notification sent successfully");
                self.metrics.sent.add(1, &[provider]);
            }
            Err(e) if e.is_token_format() => {
                tracing::error!(provider = %token.provider, error = %e, "Stored push token is malformed");
                self.metrics.malformed_tokens.add(1, &[provider]);
            }
            Err(e) => {
                tracing::warn!(provider = %token.provider, error = %e, "Failed to send push notification");
                self.metrics.errors.add(1, &[provider, KeyValue::new("reason", e.reason())]);
            }
        }
    }
}
