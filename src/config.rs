use crate::domain::provider::Provider;
use clap::{Args, Parser, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Representation of owner ids
    #[arg(long, env = "ID_TYPE", value_enum, default_value_t = IdType::String)]
    pub id_type: IdType,

    /// Token storage backend
    #[arg(long, env = "STORE", value_enum, default_value_t = StoreBackend::Postgres)]
    pub store: StoreBackend,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub push: PushConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum IdType {
    Long,
    Uuid,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 80)]
    pub port: u16,

    /// How long to wait for in-flight requests on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL (required for the postgres store)
    #[arg(long = "database-url", env = "DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long = "database-max-connections", env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long = "database-acquire-timeout-secs", env = "DATABASE_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct PushConfig {
    /// Comma-separated list of enabled push systems
    #[arg(
        long = "push-systems",
        env = "PUSH_SYSTEMS",
        value_delimiter = ',',
        default_values_t = Provider::ALL
    )]
    pub providers: Vec<Provider>,

    /// Use the APNS sandbox gateway
    #[arg(long, env = "DEVELOPMENT", default_value_t = false)]
    pub development: bool,

    /// Timeout for a single outbound provider request
    #[arg(long, env = "PUSH_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Maximum concurrent provider requests per dispatched notification
    #[arg(long, env = "PUSH_FAN_OUT_LIMIT", default_value_t = 16)]
    pub fan_out_limit: usize,

    #[command(flatten)]
    pub fcm: FcmConfig,

    #[command(flatten)]
    pub apns: ApnsConfig,

    #[command(flatten)]
    pub web_push: WebPushConfig,
}

impl PushConfig {
    #[must_use]
    pub fn is_enabled(&self, provider: Provider) -> bool {
        self.providers.contains(&provider)
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct FcmConfig {
    /// Google service account JSON used to authorize FCM requests
    #[arg(long, env = "FIREBASE_SERVICE_ACCOUNT_FILE")]
    pub service_account_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Args)]
pub struct ApnsConfig {
    /// Bundle id used as the default apns-topic
    #[arg(long, env = "APNS_TOPIC")]
    pub topic: Option<String>,

    /// PKCS#12 client certificate
    #[arg(long = "apns-p12-file", env = "APNS_P12_FILE")]
    pub p12_file: Option<PathBuf>,

    /// Password of the PKCS#12 certificate
    #[arg(long = "apns-p12-password", env = "APNS_P12_PASSWORD", hide_env_values = true)]
    pub p12_password: Option<String>,

    /// Token-based authentication key (.p8)
    #[arg(long = "apns-p8-file", env = "APNS_P8_FILE")]
    pub p8_file: Option<PathBuf>,

    /// Key id of the .p8 key
    #[arg(long = "apns-key-id", env = "APNS_KEY_ID")]
    pub key_id: Option<String>,

    /// Apple developer team id
    #[arg(long = "apns-team-id", env = "APNS_TEAM_ID")]
    pub team_id: Option<String>,
}

#[derive(Clone, Debug, Default, Args)]
pub struct WebPushConfig {
    /// VAPID subject, a mailto: or https: contact
    #[arg(long = "web-push-subject", env = "WEB_PUSH_SUBJECT")]
    pub subject: Option<String>,

    /// PEM file holding the VAPID private key
    #[arg(long = "vapid-keys-file", env = "VAPID_KEYS_FILE")]
    pub keys_file: Option<PathBuf>,

    /// Uncompressed VAPID public key, base64url
    #[arg(long = "vapid-public-key", env = "VAPID_PUBLIC_KEY")]
    pub public_key: Option<String>,

    /// Raw VAPID private key, base64url
    #[arg(long = "vapid-private-key", env = "VAPID_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; export is disabled when unset
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Parses the configuration from arguments and environment, then fills
    /// unset secrets from their `<NAME>_FILE` companions.
    ///
    /// # Errors
    /// Returns an error if a referenced secret file cannot be read.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::parse();
        config.resolve_secret_files()?;
        Ok(config)
    }

    fn resolve_secret_files(&mut self) -> anyhow::Result<()> {
        let apns = &mut self.push.apns;
        let web_push = &mut self.push.web_push;
        for (value, name) in [
            (&mut apns.p12_password, "APNS_P12_PASSWORD"),
            (&mut apns.key_id, "APNS_KEY_ID"),
            (&mut apns.team_id, "APNS_TEAM_ID"),
            (&mut apns.topic, "APNS_TOPIC"),
            (&mut web_push.subject, "WEB_PUSH_SUBJECT"),
            (&mut web_push.public_key, "VAPID_PUBLIC_KEY"),
            (&mut web_push.private_key, "VAPID_PRIVATE_KEY"),
        ] {
            if value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
                continue;
            }
            if let Ok(path) = std::env::var(format!("{name}_FILE")) {
                *value = read_secret_file(Path::new(&path))
                    .map_err(|e| anyhow::anyhow!("failed to read {name}_FILE ({path}): {e}"))?;
            }
        }
        Ok(())
    }
}

/// Reads the first line of a secret file. Blank files yield `None`.
///
/// # Errors
/// Returns the underlying I/O error if the file cannot be read.
pub fn read_secret_file(path: &Path) -> std::io::Result<Option<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.lines().next().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["native-push-server"]).unwrap();
        assert_eq!(config.id_type, IdType::String);
        assert_eq!(config.push.providers, Provider::ALL.to_vec());
        assert!(!config.push.development);
        assert_eq!(config.push.request_timeout_secs, 10);
    }

    #[test]
    fn test_parse_push_systems() {
        let config =
            Config::try_parse_from(["native-push-server", "--push-systems", "FCM,webpush", "--id-type", "uuid"])
                .unwrap();
        assert_eq!(config.push.providers, vec![Provider::Fcm, Provider::WebPush]);
        assert!(!config.push.is_enabled(Provider::Apns));
        assert_eq!(config.id_type, IdType::Uuid);
    }

    #[test]
    fn test_reject_unknown_push_system() {
        assert!(Config::try_parse_from(["native-push-server", "--push-systems", "GCM"]).is_err());
    }

    #[test]
    fn test_read_secret_file_first_line() {
        let path = std::env::temp_dir().join(format!("native-push-secret-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "  hunter2  \nsecond line\n").unwrap();
        assert_eq!(read_secret_file(&path).unwrap().as_deref(), Some("hunter2"));

        std::fs::write(&path, "\n").unwrap();
        assert_eq!(read_secret_file(&path).unwrap(), None);
        std::fs::remove_file(&path).unwrap();
    }
}
