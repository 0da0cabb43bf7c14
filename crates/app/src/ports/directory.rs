//! Accessory directory port: which pairing an observed accessory belongs to.

use hkbridge_domain::id::{Aid, MacAddress};

/// Resolves the identity of accessories observed since startup.
///
/// Answers only for accessories that have actually been seen on a live
/// connection; a `None` means "not observed yet", not "does not exist".
pub trait AccessoryDirectory {
    /// Pairing MAC the accessory was observed on.
    fn mac_for(&self, aid: Aid) -> Option<MacAddress>;

    /// Serial number advertised by the accessory information service.
    fn serial_number_for(&self, aid: Aid) -> Option<String>;
}

impl<T: AccessoryDirectory> AccessoryDirectory for std::sync::Arc<T> {
    fn mac_for(&self, aid: Aid) -> Option<MacAddress> {
        (**self).mac_for(aid)
    }

    fn serial_number_for(&self, aid: Aid) -> Option<String> {
        (**self).serial_number_for(aid)
    }
}
