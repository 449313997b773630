use crate::adapters::push::apns::{self, ApnsAdapter, ApnsAuth, ProviderTokenSigner};
use crate::adapters::push::fcm::{self, FcmAdapter, ServiceAccount};
use crate::adapters::push::web_push::WebPushAdapter;
use crate::adapters::push::AdapterSet;
use crate::config::PushConfig;
use crate::domain::provider::Provider;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use web_push::{PartialVapidSignatureBuilder, VapidSignatureBuilder};

#[derive(Error, Debug)]
pub enum InitError {
    #[error("Push providers have already been initialized")]
    AlreadyInitialized,
    #[error("{fields} must be specified when using {provider}")]
    MissingCredentials { provider: Provider, fields: &'static str },
    #[error("Invalid {provider} credentials: {message}")]
    Credentials { provider: Provider, message: String },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl InitError {
    fn credentials(provider: Provider, err: impl std::fmt::Display) -> Self {
        Self::Credentials { provider, message: err.to_string() }
    }
}

/// The provider clients built at startup, one per enabled push system.
#[derive(Debug, Default)]
pub struct ProviderClients {
    pub apns: Option<Arc<ApnsAdapter>>,
    pub fcm: Option<Arc<FcmAdapter>>,
    pub web_push: Option<Arc<WebPushAdapter>>,
}

impl ProviderClients {
    #[must_use]
    pub fn adapters(&self) -> AdapterSet {
        let mut set = AdapterSet::new();
        if let Some(apns) = &self.apns {
            set = set.with(apns.clone());
        }
        if let Some(fcm) = &self.fcm {
            set = set.with(fcm.clone());
        }
        if let Some(web_push) = &self.web_push {
            set = set.with(web_push.clone());
        }
        set
    }

    #[must_use]
    pub fn enabled(&self) -> Vec<Provider> {
        let mut enabled = Vec::new();
        if self.fcm.is_some() {
            enabled.push(Provider::Fcm);
        }
        if self.apns.is_some() {
            enabled.push(Provider::Apns);
        }
        if self.web_push.is_some() {
            enabled.push(Provider::WebPush);
        }
        enabled
    }
}

/// Owns the one-time transition from configuration to provider clients.
#[derive(Debug)]
pub struct PushRuntime {
    claimed: AtomicBool,
    clients: OnceLock<Arc<ProviderClients>>,
}

impl Default for PushRuntime {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: PushRuntime = PushRuntime::new();

impl PushRuntime {
    #[must_use]
    pub const fn new() -> Self {
        Self { claimed: AtomicBool::new(false), clients: OnceLock::new() }
    }

    /// The process-wide runtime.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Validates credentials for every enabled provider and builds their clients.
    ///
    /// Only the first call does any work. Later calls fail with
    /// `AlreadyInitialized`, even when the first one failed.
    ///
    /// # Errors
    /// Returns `InitError` on a repeated call or on missing or invalid credentials.
    pub fn initialize(&self, config: &PushConfig) -> Result<Arc<ProviderClients>, InitError> {
        if self.claimed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(InitError::AlreadyInitialized);
        }

        let plan = Plan::validate(config)?;
        let clients = Arc::new(plan.build(Duration::from_secs(config.request_timeout_secs))?);
        tracing::info!(providers = ?clients.enabled(), development = config.development, "Push providers initialized");

        // The claim above makes this the only writer.
        let _ = self.clients.set(clients.clone());
        Ok(clients)
    }

    /// The clients published by a successful `initialize`.
    #[must_use]
    pub fn clients(&self) -> Option<Arc<ProviderClients>> {
        self.clients.get().cloned()
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

enum ApnsCredentials<'a> {
    Certificate { p12: &'a Path, password: &'a str },
    Token { p8: &'a Path, key_id: &'a str, team_id: &'a str },
}

struct ApnsPlan<'a> {
    topic: &'a str,
    gateway: &'static str,
    credentials: ApnsCredentials<'a>,
}

enum VapidSource<'a> {
    Pem(&'a Path),
    Keys { public: &'a str, private: &'a str },
}

struct WebPushPlan<'a> {
    subject: &'a str,
    source: VapidSource<'a>,
}

/// Checked credential choices, borrowed from the configuration.
struct Plan<'a> {
    fcm: Option<&'a Path>,
    apns: Option<ApnsPlan<'a>>,
    web_push: Option<WebPushPlan<'a>>,
}

impl<'a> Plan<'a> {
    fn validate(config: &'a PushConfig) -> Result<Self, InitError> {
        let fcm = if config.is_enabled(Provider::Fcm) {
            let file = config.fcm.service_account_file.as_deref().ok_or(InitError::MissingCredentials {
                provider: Provider::Fcm,
                fields: "FIREBASE_SERVICE_ACCOUNT_FILE",
            })?;
            Some(file)
        } else {
            None
        };

        let apns = if config.is_enabled(Provider::Apns) { Some(Self::validate_apns(config)?) } else { None };
        let web_push =
            if config.is_enabled(Provider::WebPush) { Some(Self::validate_web_push(config)?) } else { None };

        Ok(Self { fcm, apns, web_push })
    }

    fn validate_apns(config: &'a PushConfig) -> Result<ApnsPlan<'a>, InitError> {
        let apns = &config.apns;
        let topic = present(apns.topic.as_ref())
            .ok_or(InitError::MissingCredentials { provider: Provider::Apns, fields: "APNS_TOPIC" })?;

        let certificate = apns
            .p12_file
            .as_deref()
            .zip(present(apns.p12_password.as_ref()))
            .map(|(p12, password)| ApnsCredentials::Certificate { p12, password });
        let token = || {
            let p8 = apns.p8_file.as_deref()?;
            let key_id = present(apns.key_id.as_ref())?;
            let team_id = present(apns.team_id.as_ref())?;
            Some(ApnsCredentials::Token { p8, key_id, team_id })
        };
        let credentials = certificate.or_else(token).ok_or(InitError::MissingCredentials {
            provider: Provider::Apns,
            fields: "APNS_P12_FILE and APNS_P12_PASSWORD, or APNS_P8_FILE, APNS_KEY_ID and APNS_TEAM_ID",
        })?;

        let gateway = if config.development { apns::DEVELOPMENT_GATEWAY } else { apns::PRODUCTION_GATEWAY };
        Ok(ApnsPlan { topic, gateway, credentials })
    }

    fn validate_web_push(config: &'a PushConfig) -> Result<WebPushPlan<'a>, InitError> {
        let web_push = &config.web_push;
        let subject = present(web_push.subject.as_ref())
            .ok_or(InitError::MissingCredentials { provider: Provider::WebPush, fields: "WEB_PUSH_SUBJECT" })?;

        let source = match (
            web_push.keys_file.as_deref(),
            present(web_push.public_key.as_ref()),
            present(web_push.private_key.as_ref()),
        ) {
            (Some(file), _, _) => VapidSource::Pem(file),
            (None, Some(public), Some(private)) => VapidSource::Keys { public, private },
            _ => {
                return Err(InitError::MissingCredentials {
                    provider: Provider::WebPush,
                    fields: "VAPID_KEYS_FILE, or VAPID_PUBLIC_KEY and VAPID_PRIVATE_KEY",
                });
            }
        };
        Ok(WebPushPlan { subject, source })
    }

    fn build(self, timeout: Duration) -> Result<ProviderClients, InitError> {
        let fcm = self.fcm.map(|file| build_fcm(file, timeout)).transpose()?;
        let apns = self.apns.map(|plan| build_apns(plan, timeout)).transpose()?;
        let web_push = self.web_push.map(|plan| build_web_push(plan, timeout)).transpose()?;
        Ok(ProviderClients {
            apns: apns.map(Arc::new),
            fcm: fcm.map(Arc::new),
            web_push: web_push.map(Arc::new),
        })
    }
}

fn read(path: &Path) -> Result<Vec<u8>, InitError> {
    std::fs::read(path).map_err(|source| InitError::Io { path: path.to_path_buf(), source })
}

fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder().timeout(timeout).connect_timeout(timeout).pool_idle_timeout(Duration::from_secs(90))
}

fn build_fcm(file: &Path, timeout: Duration) -> Result<FcmAdapter, InitError> {
    let json = String::from_utf8(read(file)?).map_err(|e| InitError::credentials(Provider::Fcm, e))?;
    let account = ServiceAccount::from_json(&json).map_err(|e| InitError::credentials(Provider::Fcm, e))?;
    let client = client_builder(timeout).use_rustls_tls().build()?;
    FcmAdapter::new(client, &account, fcm::DEFAULT_API_BASE).map_err(|e| InitError::credentials(Provider::Fcm, e))
}

fn build_apns(plan: ApnsPlan<'_>, timeout: Duration) -> Result<ApnsAdapter, InitError> {
    let (client, auth) = match plan.credentials {
        ApnsCredentials::Certificate { p12, password } => {
            let identity = reqwest::Identity::from_pkcs12_der(&read(p12)?, password)
                .map_err(|e| InitError::credentials(Provider::Apns, e))?;
            let client = client_builder(timeout).use_native_tls().identity(identity).build()?;
            (client, ApnsAuth::Certificate)
        }
        ApnsCredentials::Token { p8, key_id, team_id } => {
            let signer = ProviderTokenSigner::from_p8(&read(p8)?, key_id.to_string(), team_id.to_string())
                .map_err(|e| InitError::credentials(Provider::Apns, e))?;
            (client_builder(timeout).use_rustls_tls().build()?, ApnsAuth::Token(signer))
        }
    };
    Ok(ApnsAdapter::new(client, plan.gateway, plan.topic, auth))
}

fn vapid_signer(source: &VapidSource<'_>) -> Result<PartialVapidSignatureBuilder, InitError> {
    match source {
        VapidSource::Pem(file) => VapidSignatureBuilder::from_pem_no_sub(read(file)?.as_slice())
            .map_err(|e| InitError::credentials(Provider::WebPush, e)),
        VapidSource::Keys { public, private } => {
            let signer = VapidSignatureBuilder::from_base64_no_sub(private, web_push::URL_SAFE_NO_PAD)
                .map_err(|e| InitError::credentials(Provider::WebPush, e))?;
            let expected = URL_SAFE_NO_PAD
                .decode(public.trim_end_matches('='))
                .map_err(|e| InitError::credentials(Provider::WebPush, format!("VAPID_PUBLIC_KEY: {e}")))?;
            if signer.get_public_key() != expected {
                return Err(InitError::credentials(
                    Provider::WebPush,
                    "VAPID_PUBLIC_KEY does not match VAPID_PRIVATE_KEY",
                ));
            }
            Ok(signer)
        }
    }
}

fn build_web_push(plan: WebPushPlan<'_>, timeout: Duration) -> Result<WebPushAdapter, InitError> {
    let signer = vapid_signer(&plan.source)?;
    let client = client_builder(timeout).use_rustls_tls().build()?;
    Ok(WebPushAdapter::new(client, signer, plan.subject))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApnsConfig, FcmConfig, WebPushConfig};

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
    }

    fn config(providers: &[Provider]) -> PushConfig {
        PushConfig {
            providers: providers.to_vec(),
            development: true,
            request_timeout_secs: 5,
            fan_out_limit: 4,
            fcm: FcmConfig::default(),
            apns: ApnsConfig::default(),
            web_push: WebPushConfig::default(),
        }
    }

    fn expect_missing(config: &PushConfig, provider: Provider) -> String {
        match PushRuntime::new().initialize(config) {
            Err(err @ InitError::MissingCredentials { provider: p, .. }) if p == provider => err.to_string(),
            other => panic!("expected missing {provider} credentials, got {other:?}"),
        }
    }

    #[test]
    fn test_second_call_fails_even_after_failure() {
        let runtime = PushRuntime::new();
        assert!(matches!(runtime.initialize(&config(&[Provider::Fcm])), Err(InitError::MissingCredentials { .. })));
        assert!(matches!(runtime.initialize(&config(&[])), Err(InitError::AlreadyInitialized)));
        assert!(runtime.clients().is_none());
    }

    #[test]
    fn test_no_providers_initializes_empty() {
        let runtime = PushRuntime::new();
        let clients = runtime.initialize(&config(&[])).unwrap();
        assert!(clients.adapters().is_empty());
        assert!(runtime.clients().is_some());
        assert!(matches!(runtime.initialize(&config(&[])), Err(InitError::AlreadyInitialized)));
    }

    #[test]
    fn test_fcm_requires_service_account() {
        let message = expect_missing(&config(&[Provider::Fcm]), Provider::Fcm);
        assert_eq!(message, "FIREBASE_SERVICE_ACCOUNT_FILE must be specified when using FCM");
    }

    #[test]
    fn test_fcm_checked_before_other_providers() {
        let mut cfg = config(&[Provider::WebPush, Provider::Apns, Provider::Fcm]);
        cfg.apns.topic = Some("com.example.app".into());
        expect_missing(&cfg, Provider::Fcm);
    }

    #[test]
    fn test_apns_requires_topic() {
        let mut cfg = config(&[Provider::Apns]);
        cfg.apns.p8_file = Some(fixture("apns_auth_key.p8"));
        cfg.apns.key_id = Some("ABC123DEFG".into());
        cfg.apns.team_id = Some("DEF123GHIJ".into());
        let message = expect_missing(&cfg, Provider::Apns);
        assert!(message.starts_with("APNS_TOPIC"));
    }

    #[test]
    fn test_apns_requires_complete_credential_set() {
        let mut cfg = config(&[Provider::Apns]);
        cfg.apns.topic = Some("com.example.app".into());
        cfg.apns.p12_file = Some(fixture("missing.p12"));
        cfg.apns.p8_file = Some(fixture("apns_auth_key.p8"));
        cfg.apns.key_id = Some("ABC123DEFG".into());
        expect_missing(&cfg, Provider::Apns);
    }

    #[test]
    fn test_web_push_requires_subject_and_keys() {
        let mut cfg = config(&[Provider::WebPush]);
        cfg.web_push.keys_file = Some(fixture("vapid_private.pem"));
        let message = expect_missing(&cfg, Provider::WebPush);
        assert!(message.starts_with("WEB_PUSH_SUBJECT"));

        let mut cfg = config(&[Provider::WebPush]);
        cfg.web_push.subject = Some("mailto:ops@example.com".into());
        cfg.web_push.public_key = Some("BBOr".into());
        expect_missing(&cfg, Provider::WebPush);
    }

    #[test]
    fn test_unreadable_credential_file() {
        let mut cfg = config(&[Provider::Fcm]);
        cfg.fcm.service_account_file = Some(fixture("does-not-exist.json"));
        assert!(matches!(PushRuntime::new().initialize(&cfg), Err(InitError::Io { .. })));
    }

    #[test]
    fn test_vapid_key_mismatch() {
        let keys = std::fs::read_to_string(fixture("vapid_keys.txt")).unwrap();
        let mut lines = keys.lines();
        let _public = lines.next().unwrap();
        let private = lines.next().unwrap();

        let mut cfg = config(&[Provider::WebPush]);
        cfg.web_push.subject = Some("mailto:ops@example.com".into());
        cfg.web_push.public_key = Some(URL_SAFE_NO_PAD.encode([4u8; 65]));
        cfg.web_push.private_key = Some(private.to_string());
        assert!(matches!(
            PushRuntime::new().initialize(&cfg),
            Err(InitError::Credentials { provider: Provider::WebPush, .. })
        ));
    }

    #[test]
    fn test_initialize_all_providers_from_fixtures() {
        let keys = std::fs::read_to_string(fixture("vapid_keys.txt")).unwrap();
        let mut lines = keys.lines();
        let public = lines.next().unwrap();
        let private = lines.next().unwrap();

        let mut cfg = config(&Provider::ALL);
        cfg.fcm.service_account_file = Some(fixture("service_account.json"));
        cfg.apns.topic = Some("com.example.app".into());
        cfg.apns.p8_file = Some(fixture("apns_auth_key.p8"));
        cfg.apns.key_id = Some("ABC123DEFG".into());
        cfg.apns.team_id = Some("DEF123GHIJ".into());
        cfg.web_push.subject = Some("mailto:ops@example.com".into());
        cfg.web_push.public_key = Some(public.to_string());
        cfg.web_push.private_key = Some(private.to_string());

        let clients = PushRuntime::new().initialize(&cfg).unwrap();
        assert_eq!(clients.enabled(), vec![Provider::Fcm, Provider::Apns, Provider::WebPush]);
        let adapters = clients.adapters();
        for provider in Provider::ALL {
            assert_eq!(adapters.get(provider).map(|a| a.provider()), Some(provider));
        }
    }

    #[test]
    fn test_initialize_web_push_from_pem() {
        let mut cfg = config(&[Provider::WebPush]);
        cfg.web_push.subject = Some("mailto:ops@example.com".into());
        cfg.web_push.keys_file = Some(fixture("vapid_private.pem"));
        let clients = PushRuntime::new().initialize(&cfg).unwrap();
        assert!(clients.web_push.is_some());
        assert!(clients.apns.is_none());
    }
}
