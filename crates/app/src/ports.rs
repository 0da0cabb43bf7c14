//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod directory;
pub mod event_bus;
pub mod registry;
pub mod transport;

pub use directory::AccessoryDirectory;
pub use event_bus::EventPublisher;
pub use registry::EntityRegistry;
pub use transport::{AccessoryTransport, CharacteristicReading, CharacteristicWrite};
