//! # hkbridge-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `AccessoryTransport`: read/write characteristics of paired accessories
//!   - `EntityRegistry`: persisted unique-id records
//!   - `AccessoryDirectory`: pairing MAC and serial number of observed accessories
//!   - `EventPublisher`: outbound entity events
//! - Keep the **characteristic mirror** (`AccessoryStore`) and reconcile
//!   pushed, polled and commanded values into it (`Reconciler`)
//! - Serialise inbound updates per accessory (`UpdatePump`, `Poller`)
//! - Define **driving/inbound ports** as use-case structs:
//!   - `BridgeService`: startup sequence
//!   - `IdentityMigrator`: legacy unique-id migration
//!   - `EntitySetup`: registry records and entities per accessory
//!   - `SwitchService`: `turn_on` / `turn_off` / `toggle`
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `hkbridge-domain` only (plus `tokio` for channels, locks and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_bus;
pub mod ports;
pub mod reconciler;
pub mod services;
pub mod store;
pub mod update_pump;

#[cfg(test)]
mod testing;
