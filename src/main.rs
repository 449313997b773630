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

use native_push_server::adapters::push::PushRuntime;
use native_push_server::config::{Config, IdType};
use native_push_server::telemetry;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    // Phase 1: Provider clients. Missing credentials are fatal before anything listens.
    let clients = async { PushRuntime::global().initialize(&config.push) }
        .instrument(tracing::info_span!("init_push_providers"))
        .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    native_push_server::spawn_signal_handler(shutdown_tx);

    // Phase 2: Serve with the configured owner id representation.
    let adapters = clients.adapters();
    let result = match config.id_type {
        IdType::Long => native_push_server::run::<i64>(config, adapters, shutdown_rx).await,
        IdType::Uuid => native_push_server::run::<uuid::Uuid>(config, adapters, shutdown_rx).await,
        IdType::String => native_push_server::run::<String>(config, adapters, shutdown_rx).await,
    };
    if let Err(e) = &result {
        tracing::error!(error = %e, "Server error");
    }

    telemetry_guard.shutdown();
    result
}
