//! End-to-end tests for the full hkbridged stack.
//!
//! Each test wires the complete bridge (in-memory `SQLite` registry, virtual
//! transport with the demo pairing, real reconciler and services) and drives
//! it the way the daemon does, without a config file or signal handling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use hkbridge_adapter_storage_sqlite_sqlx::{Config, SqliteEntityRegistry};
use hkbridge_adapter_virtual::VirtualAccessoryTransport;
use hkbridge_app::event_bus::InProcessEventBus;
use hkbridge_app::ports::EntityRegistry;
use hkbridge_app::reconciler::{Reconciler, ReconcilerConfig};
use hkbridge_app::services::bridge_service::{BridgeService, SetupReport};
use hkbridge_app::services::switch_service::{SwitchService, TOGGLE, TURN_OFF, TURN_ON};
use hkbridge_app::update_pump::{InboundUpdate, UpdatePump};
use hkbridge_domain::characteristic::{ActiveValues, InUseValues};
use hkbridge_domain::entity::{AttributeValue, EntityState};
use hkbridge_domain::error::BridgeError;
use hkbridge_domain::event::EventType;
use hkbridge_domain::id::{Aid, Iid};
use hkbridge_domain::platform::{PlatformTable, SWITCH_DOMAIN};
use hkbridge_domain::projection::ATTR_IN_USE;
use hkbridge_domain::registry::{PLATFORM, RegistryEntry};

type TestReconciler = Reconciler<Arc<VirtualAccessoryTransport>, Arc<InProcessEventBus>>;

struct Bridge {
    registry: Arc<SqliteEntityRegistry>,
    transport: Arc<VirtualAccessoryTransport>,
    bus: Arc<InProcessEventBus>,
    reconciler: Arc<TestReconciler>,
    switches: SwitchService<Arc<VirtualAccessoryTransport>, Arc<InProcessEventBus>>,
    inbound: mpsc::Receiver<InboundUpdate>,
    report: SetupReport,
}

/// Build and set up a bridge whose registry already holds `existing`.
async fn bridge(existing: Vec<RegistryEntry>) -> Bridge {
    let registry = Arc::new(
        Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .expect("in-memory database should initialise"),
    );
    for entry in existing {
        registry.get_or_create(entry).await.unwrap();
    }

    let bus = Arc::new(InProcessEventBus::new(256));
    let (tx, inbound) = mpsc::channel(64);
    let transport = Arc::new(VirtualAccessoryTransport::default().with_events(tx));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&transport),
        Arc::clone(&bus),
        ReconcilerConfig {
            command_timeout: Duration::from_secs(1),
            command_retries: 1,
            retry_backoff: Duration::from_millis(10),
            unavailable_after: 2,
        },
    ));

    let report = BridgeService::new(
        Arc::clone(&reconciler),
        Arc::clone(&registry),
        Arc::clone(&bus),
        PlatformTable::homekit_switches(),
        "00:00:00:00:00:00".parse().unwrap(),
    )
    .setup()
    .await
    .expect("bridge setup should succeed");

    Bridge {
        registry,
        transport,
        bus,
        switches: SwitchService::new(Arc::clone(&reconciler)),
        reconciler,
        inbound,
        report,
    }
}

fn legacy(entity_id: &str, unique_id: &str) -> RegistryEntry {
    RegistryEntry::new(entity_id, SWITCH_DOMAIN, PLATFORM, unique_id).unwrap()
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_register_one_entity_per_switch() {
    let bridge = bridge(Vec::new()).await;

    assert_eq!(bridge.report.accessories, 4);
    assert_eq!(bridge.report.entities, 4);
    let mut ids: Vec<String> = bridge
        .reconciler
        .entities()
        .into_iter()
        .map(|e| e.entity_id)
        .collect();
    ids.sort();
    assert_eq!(
        ids,
        vec![
            "switch.aqara_hub_pairing_mode",
            "switch.desk_outlet",
            "switch.garden_faucet",
            "switch.lawn_sprinkler",
        ]
    );
    for entity in bridge.reconciler.entities() {
        assert_eq!(entity.state, EntityState::Off);
    }
}

#[tokio::test]
async fn should_persist_canonical_unique_ids() {
    let bridge = bridge(Vec::new()).await;

    let outlet = bridge
        .registry
        .get_by_entity_id("switch.desk_outlet")
        .await
        .unwrap()
        .unwrap();
    let pairing = bridge
        .registry
        .get_by_entity_id("switch.aqara_hub_pairing_mode")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outlet.unique_id, "00:00:00:00:00:00_1_8");
    assert_eq!(pairing.unique_id, "00:00:00:00:00:00_4_8_9");
}

// ---------------------------------------------------------------------------
// Unique-id migration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_migrate_legacy_unique_ids_and_keep_entity_ids() {
    let bridge = bridge(vec![
        legacy("switch.legacy_outlet", "homekit-00:00:00:00:00:00-1-8"),
        legacy("switch.legacy_pairing", "homekit-0001-aid:4-sid:8-cid:9"),
    ])
    .await;

    assert_eq!(bridge.report.migration.migrated, 2);
    let outlet = bridge
        .registry
        .get_by_entity_id("switch.legacy_outlet")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outlet.unique_id, "00:00:00:00:00:00_1_8");
    let pairing = bridge
        .registry
        .get_by_entity_id("switch.legacy_pairing")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pairing.unique_id, "00:00:00:00:00:00_4_8_9");
    assert_eq!(
        pairing.previous_unique_id.as_deref(),
        Some("homekit-0001-aid:4-sid:8-cid:9")
    );

    assert!(bridge.reconciler.entity("switch.legacy_outlet").is_some());
    assert!(bridge.reconciler.entity("switch.desk_outlet").is_none());
    assert_eq!(bridge.registry.list_by_platform(PLATFORM).await.unwrap().len(), 4);
}

#[tokio::test]
async fn should_leave_records_of_another_device_alone() {
    let bridge = bridge(vec![legacy(
        "switch.neighbour_pairing_mode",
        "homekit-SERIAL-OF-OTHER-DEVICE-aid:4-sid:8-cid:9",
    )])
    .await;

    assert_eq!(bridge.report.migration.migrated, 0);
    assert_eq!(bridge.report.migration.skipped, 1);
    let foreign = bridge
        .registry
        .get_by_entity_id("switch.neighbour_pairing_mode")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        foreign.unique_id,
        "homekit-SERIAL-OF-OTHER-DEVICE-aid:4-sid:8-cid:9"
    );
    assert!(bridge.reconciler.entity("switch.aqara_hub_pairing_mode").is_some());
    assert!(bridge.reconciler.entity("switch.neighbour_pairing_mode").is_none());
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_switch_outlet_on_and_off() {
    let bridge = bridge(Vec::new()).await;

    let on = bridge
        .switches
        .handle_service_call("switch.desk_outlet", TURN_ON)
        .await
        .unwrap();
    assert!(on.is_on());
    assert_eq!(bridge.transport.value(Aid(1), Iid(9)), Some(true.into()));

    let off = bridge
        .switches
        .handle_service_call("switch.desk_outlet", TURN_OFF)
        .await
        .unwrap();
    assert!(!off.is_on());
    assert_eq!(bridge.transport.value(Aid(1), Iid(9)), Some(false.into()));
}

#[tokio::test]
async fn should_write_active_for_faucet_and_valve() {
    let bridge = bridge(Vec::new()).await;

    bridge.switches.turn_on("switch.garden_faucet").await.unwrap();
    bridge.switches.turn_on("switch.lawn_sprinkler").await.unwrap();

    assert_eq!(
        bridge.transport.value(Aid(2), Iid(9)),
        Some(ActiveValues::Active.into())
    );
    assert_eq!(
        bridge.transport.value(Aid(3), Iid(9)),
        Some(ActiveValues::Active.into())
    );
    // IN_USE is reported by the valve, never written by the bridge.
    assert_eq!(
        bridge.transport.value(Aid(3), Iid(10)),
        Some(InUseValues::NotInUse.into())
    );
}

#[tokio::test]
async fn should_toggle_pairing_mode_without_touching_other_characteristics() {
    let bridge = bridge(Vec::new()).await;

    let entity = bridge
        .switches
        .handle_service_call("switch.aqara_hub_pairing_mode", TOGGLE)
        .await
        .unwrap();

    assert!(entity.is_on());
    assert_eq!(bridge.transport.value(Aid(4), Iid(9)), Some(true.into()));
    assert_eq!(bridge.transport.value(Aid(4), Iid(10)), Some(false.into()));
}

#[tokio::test]
async fn should_leave_state_unchanged_when_accessory_is_unreachable() {
    let bridge = bridge(Vec::new()).await;
    bridge.transport.set_reachable(Aid(1), false);

    let result = bridge.switches.turn_on("switch.desk_outlet").await;

    assert!(matches!(result, Err(BridgeError::Transport(_))));
    assert_eq!(
        bridge.reconciler.entity("switch.desk_outlet").unwrap().state,
        EntityState::Off
    );
    assert_eq!(bridge.transport.value(Aid(1), Iid(9)), Some(false.into()));
}

#[tokio::test]
async fn should_mark_unavailable_then_recover_on_poll() {
    let bridge = bridge(Vec::new()).await;
    bridge.transport.set_reachable(Aid(1), false);

    for _ in 0..2 {
        assert!(bridge.reconciler.poll(Aid(1)).await.is_err());
    }
    assert_eq!(
        bridge.reconciler.entity("switch.desk_outlet").unwrap().state,
        EntityState::Unavailable
    );
    assert_eq!(
        bridge.reconciler.entity("switch.garden_faucet").unwrap().state,
        EntityState::Off
    );

    bridge.transport.set_reachable(Aid(1), true);
    bridge.reconciler.poll(Aid(1)).await.unwrap();

    assert!(bridge.reconciler.is_available(Aid(1)));
    assert_eq!(
        bridge.reconciler.entity("switch.desk_outlet").unwrap().state,
        EntityState::Off
    );
}

// ---------------------------------------------------------------------------
// Accessory-side changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn should_apply_pushed_events_through_the_pump() {
    let Bridge {
        transport,
        bus,
        reconciler,
        inbound,
        ..
    } = bridge(Vec::new()).await;
    let mut events = bus.subscribe_to(&[EventType::StateChanged]);
    let pump = UpdatePump::start(Arc::clone(&reconciler), inbound, 8);

    transport
        .simulate_change(Aid(3), Iid(10), InUseValues::InUse.into())
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.entity_id.as_deref() == Some("switch.lawn_sprinkler") {
                return event;
            }
        }
    })
    .await
    .expect("state change should be published");

    assert_eq!(event.data["attributes"][ATTR_IN_USE], true);
    let valve = reconciler.entity("switch.lawn_sprinkler").unwrap();
    assert_eq!(valve.state, EntityState::Off);
    assert_eq!(
        valve.get_attribute(ATTR_IN_USE),
        Some(&AttributeValue::Bool(true))
    );

    pump.abort();
}

#[tokio::test]
async fn should_pick_up_unpushed_pairing_mode_on_poll() {
    let bridge = bridge(Vec::new()).await;

    bridge
        .transport
        .simulate_change(Aid(4), Iid(9), true.into())
        .await
        .unwrap();
    assert!(
        !bridge
            .reconciler
            .entity("switch.aqara_hub_pairing_mode")
            .unwrap()
            .is_on()
    );

    let touched = bridge.reconciler.poll(Aid(4)).await.unwrap();

    assert_eq!(touched, vec!["switch.aqara_hub_pairing_mode".to_string()]);
    assert!(
        bridge
            .reconciler
            .entity("switch.aqara_hub_pairing_mode")
            .unwrap()
            .is_on()
    );
}
