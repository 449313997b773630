#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::database::DbPool;
use crate::adapters::database::push_token_repo::{PgOwnerId, PushTokenRepository};
use crate::adapters::memory::InMemoryTokenStore;
use crate::adapters::push::AdapterSet;
use crate::api::AppState;
use crate::config::{Config, PushConfig, StoreBackend};
use crate::domain::owner::OwnerId;
use crate::services::dispatch::NotificationDispatcher;
use crate::services::push_token_service::PushTokenService;
use crate::services::token_store::TokenStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Applies pending schema migrations.
///
/// # Errors
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Flips `shutdown_tx` to `true` on Ctrl+C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Wires the token store and provider adapters into the HTTP application.
#[derive(Debug)]
pub struct AppBuilder<Id: OwnerId> {
    push: PushConfig,
    store: Option<Arc<dyn TokenStore<Id>>>,
    adapters: AdapterSet,
}

impl<Id: OwnerId> AppBuilder<Id> {
    #[must_use]
    pub fn new(push: PushConfig) -> Self {
        Self { push, store: None, adapters: AdapterSet::new() }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn TokenStore<Id>>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = adapters;
        self
    }

    /// Builds the router. Without a store, tokens are kept in memory.
    #[must_use]
    pub fn build(self) -> axum::Router {
        let store: Arc<dyn TokenStore<Id>> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryTokenStore::<Id>::new()),
        };
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&store),
            self.adapters,
            Duration::from_secs(self.push.request_timeout_secs),
            self.push.fan_out_limit,
        );
        api::app_router(AppState { push_token_service: PushTokenService::new(store), dispatcher })
    }
}

async fn open_store<Id: PgOwnerId>(config: &Config) -> anyhow::Result<Arc<dyn TokenStore<Id>>> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory token store, tokens are lost on restart");
            Ok(Arc::new(InMemoryTokenStore::<Id>::new()))
        }
        StoreBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be specified when using the postgres store"))?;
            let pool = adapters::database::init_pool(url, &config.database).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PushTokenRepository::<Id>::new(pool)))
        }
    }
}

/// Serves the API for owner ids of type `Id` until `shutdown_rx` turns `true`.
///
/// # Errors
/// Returns an error if the store cannot be opened or the listener fails.
pub async fn run<Id: PgOwnerId>(
    config: Config,
    adapters: AdapterSet,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let store = open_store::<Id>(&config).await?;
    let router = AppBuilder::<Id>::new(config.push.clone()).with_store(store).with_adapters(adapters).build();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, id_type = Id::KIND, "listening");

    let mut server_rx = shutdown_rx.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = server_rx.wait_for(|&s| s).await;
    });

    let mut timeout_rx = shutdown_rx;
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    tokio::select! {
        result = server.into_future() => result?,
        () = async {
            let _ = timeout_rx.wait_for(|&s| s).await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!("Timeout waiting for in-flight requests to finish.");
        }
    }
    Ok(())
}
