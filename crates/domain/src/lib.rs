//! # hkbridge-domain
//!
//! Pure domain model for the hkbridge HomeKit accessory bridge.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define the **accessory graph** (accessories → services → characteristics)
//!   together with characteristic value domains and permissions
//! - Define **projection rules** turning a service's characteristic values into
//!   switch entity state
//! - Define the immutable **platform table** deciding which services and
//!   characteristics become switch entities
//! - Define **unique ids** (legacy and canonical formats) and persisted
//!   **registry entries**
//! - Define **Events** (state-change records)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod accessory;
pub mod characteristic;
pub mod entity;
pub mod event;
pub mod platform;
pub mod projection;
pub mod registry;
pub mod service;
pub mod unique_id;

/// UTC instant carried by entities, registry records and events.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
