//! # pnp-twin Agent
//!
//! Device-side runtime for writable properties.
//!
//! ## Flow
//!
//! 1. Subscribe to document responses and desired-property patches
//! 2. Request the full property document
//! 3. Apply each writable property whose version is not stale
//! 4. Acknowledge the applied properties in one reported patch

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod mqtt;
mod runtime;
mod store;

pub use config::AgentConfig;
pub use runtime::DeviceRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting pnp-twin agent"
    );

    let config = AgentConfig::from_env()?;

    tracing::info!(
        device_id = %config.device_id,
        model_id = ?config.model_id,
        broker = %config.mqtt.broker,
        components = config.properties.components.len(),
        "Agent initialized"
    );

    let transport =
        mqtt::MqttTransport::connect(&config.mqtt.broker, &config.device_id, config.mqtt.keep_alive)
            .context("Failed to create MQTT transport")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = {
        let shutdown = Arc::clone(&shutdown);
        tokio::task::spawn_blocking(move || {
            let mut runtime = DeviceRuntime::new(transport, &config);
            runtime.run(&shutdown)
        })
    };
    tokio::pin!(worker);

    tokio::select! {
        result = &mut worker => {
            result.context("Runtime task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            shutdown.store(true, Ordering::Relaxed);
            worker.await.context("Runtime task panicked")??;
        }
    }

    tracing::info!("Agent stopped");
    Ok(())
}
