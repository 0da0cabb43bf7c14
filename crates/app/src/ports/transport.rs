//! Transport port: reading and writing characteristics on a paired accessory.
//!
//! The encrypted session, request framing and event subscription all live
//! behind this trait. Unsolicited events do not come back through it: the
//! adapter pushes them into the [`UpdatePump`](crate::update_pump::UpdatePump).

use std::future::Future;

use hkbridge_domain::accessory::Accessory;
use hkbridge_domain::characteristic::CharacteristicValue;
use hkbridge_domain::error::TransportError;
use hkbridge_domain::id::{Aid, Iid};

/// One characteristic write request.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicWrite {
    pub aid: Aid,
    pub iid: Iid,
    pub value: CharacteristicValue,
}

/// One characteristic value as reported by the accessory, either read or
/// acknowledged after a write.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicReading {
    pub aid: Aid,
    pub iid: Iid,
    pub value: CharacteristicValue,
}

/// Connection to the accessories of one pairing.
pub trait AccessoryTransport {
    /// Fetch the accessory database: every accessory with its services and
    /// characteristics.
    fn list_accessories(
        &self,
    ) -> impl Future<Output = Result<Vec<Accessory>, TransportError>> + Send;

    /// Write characteristics, returning the values the accessory acknowledged.
    ///
    /// A write missing from the returned list was not acknowledged.
    fn put_characteristics(
        &self,
        writes: Vec<CharacteristicWrite>,
    ) -> impl Future<Output = Result<Vec<CharacteristicReading>, TransportError>> + Send;

    /// Read every readable characteristic of accessory `aid` (full poll).
    fn get_characteristics(
        &self,
        aid: Aid,
    ) -> impl Future<Output = Result<Vec<CharacteristicReading>, TransportError>> + Send;
}

impl<T: AccessoryTransport + Send + Sync> AccessoryTransport for std::sync::Arc<T> {
    fn list_accessories(
        &self,
    ) -> impl Future<Output = Result<Vec<Accessory>, TransportError>> + Send {
        (**self).list_accessories()
    }

    fn put_characteristics(
        &self,
        writes: Vec<CharacteristicWrite>,
    ) -> impl Future<Output = Result<Vec<CharacteristicReading>, TransportError>> + Send {
        (**self).put_characteristics(writes)
    }

    fn get_characteristics(
        &self,
        aid: Aid,
    ) -> impl Future<Output = Result<Vec<CharacteristicReading>, TransportError>> + Send {
        (**self).get_characteristics(aid)
    }
}
