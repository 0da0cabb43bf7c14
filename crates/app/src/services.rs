//! Application services: use-case implementations.
//!
//! Each service struct accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod bridge_service;
pub mod entity_setup;
pub mod migration_service;
pub mod switch_service;
