//! # hkbridged: hkbridge daemon
//!
//! Composition root that wires all adapters together and runs the bridge.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Install the `tracing` subscriber
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct the transport and registry adapters
//! - Run the bridge setup (discovery, unique-id migration, entity binding)
//! - Start the update pump and the periodic poller
//! - Route switch service calls typed on the console
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod console;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use hkbridge_adapter_virtual::VirtualAccessoryTransport;
use hkbridge_adapter_virtual::devices::demo_pairing;
use hkbridge_app::event_bus::{EventSubscription, InProcessEventBus};
use hkbridge_app::reconciler::Reconciler;
use hkbridge_app::services::bridge_service::BridgeService;
use hkbridge_app::services::switch_service::SwitchService;
use hkbridge_app::update_pump::{Poller, UpdatePump};
use hkbridge_domain::platform::PlatformTable;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Database
    let registry = Arc::new(
        hkbridge_adapter_storage_sqlite_sqlx::Config {
            database_url: config.database_url().to_string(),
        }
        .build()
        .await?,
    );

    // Event bus
    let event_bus = Arc::new(InProcessEventBus::new(256));
    let event_log = tokio::spawn(log_events(event_bus.subscribe()));

    // Transport
    let (inbound_tx, inbound_rx) = mpsc::channel(config.bridge.channel_capacity);
    let accessories = if config.integrations.virtual_enabled {
        demo_pairing()
    } else {
        Vec::new()
    };
    let transport =
        Arc::new(VirtualAccessoryTransport::new(accessories).with_events(inbound_tx.clone()));

    // Reconciliation
    let reconciler = Arc::new(Reconciler::new(
        transport,
        Arc::clone(&event_bus),
        config.bridge.reconciler_config(),
    ));
    let bridge = BridgeService::new(
        Arc::clone(&reconciler),
        registry,
        Arc::clone(&event_bus),
        PlatformTable::homekit_switches(),
        config.bridge.mac()?,
    );
    let report = bridge.setup().await?;
    tracing::info!(
        accessories = report.accessories,
        entities = report.entities,
        migrated = report.migration.migrated,
        deferred = report.migration.deferred,
        "hkbridged ready"
    );

    let pump = UpdatePump::start(
        Arc::clone(&reconciler),
        inbound_rx,
        config.bridge.worker_capacity,
    );
    let poller = Poller::start(
        Arc::clone(&reconciler),
        inbound_tx,
        config.bridge.poll_interval(),
    );

    // Commands
    let switches = SwitchService::new(reconciler);
    let console = config
        .integrations
        .console_enabled
        .then(|| tokio::spawn(console::run(switches, console::stdin_lines())));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    if let Some(console) = console {
        console.abort();
    }
    poller.abort();
    pump.abort();
    event_log.abort();

    Ok(())
}

async fn log_events(mut events: EventSubscription) {
    while let Some(event) = events.recv().await {
        tracing::info!(
            event_type = %event.event_type,
            entity_id = event.entity_id.as_deref().unwrap_or("-"),
            data = %event.data,
            "event"
        );
    }
}
