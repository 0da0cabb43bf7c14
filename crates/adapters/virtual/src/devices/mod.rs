//! Virtual accessories: outlet, faucet, valve, Aqara hub.
//!
//! Every accessory gets its information block first, so its first regular
//! service lands at `sid` 8 and that service's first characteristic at 9.

mod aqara;
mod faucet;
mod outlet;
mod valve;

pub use aqara::aqara_hub;
pub use faucet::faucet;
pub use outlet::outlet;
pub use valve::valve;

use hkbridge_domain::accessory::Accessory;
use hkbridge_domain::id::Aid;

/// The demo pairing: one accessory of each kind, `aid` 1 to 4.
#[must_use]
pub fn demo_pairing() -> Vec<Accessory> {
    vec![
        outlet(Aid(1), "Desk Outlet"),
        faucet(Aid(2), "Garden Faucet"),
        valve(Aid(3), "Lawn Sprinkler"),
        aqara_hub(Aid(4), "Aqara Hub"),
    ]
}
