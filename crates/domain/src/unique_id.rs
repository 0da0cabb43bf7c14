//! Entity unique ids: the canonical scheme and the legacy schemes it replaced.
//!
//! | format | example |
//! |--------|---------|
//! | legacy MAC (oldest) | `homekit-00:00:00:00:00:00-5-8` |
//! | legacy serial | `homekit-0001-aid:5-sid:8-cid:9` |
//! | canonical | `00:00:00:00:00:00_5_8_9` |
//!
//! The legacy serial format does not carry the pairing MAC; it has to be
//! resolved from the live accessory with that aid.

use std::fmt;
use std::str::FromStr;

use crate::id::{Aid, Iid, MacAddress};

const LEGACY_PREFIX: &str = "homekit-";

/// `{mac}_{aid}_{sid}[_{cid}]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalId {
    pub mac: MacAddress,
    pub aid: Aid,
    pub sid: Iid,
    pub cid: Option<Iid>,
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.mac, self.aid, self.sid)?;
        if let Some(cid) = self.cid {
            write!(f, "_{cid}")?;
        }
        Ok(())
    }
}

/// Error returned when a string is not a canonical unique id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a canonical unique id")]
pub struct NotCanonical(pub String);

impl FromStr for CanonicalId {
    type Err = NotCanonical;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_canonical(s).ok_or_else(|| NotCanonical(s.to_string()))
    }
}

/// A unique id recognised by one of the known formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueIdFormat {
    LegacyMac { mac: MacAddress, aid: Aid, sid: Iid },
    LegacySerial {
        serial: String,
        aid: Aid,
        sid: Iid,
        cid: Option<Iid>,
    },
    Canonical(CanonicalId),
}

impl UniqueIdFormat {
    /// Accessory id the record points at.
    #[must_use]
    pub fn aid(&self) -> Aid {
        match self {
            Self::LegacyMac { aid, .. } | Self::LegacySerial { aid, .. } => *aid,
            Self::Canonical(id) => id.aid,
        }
    }
}

type Parser = fn(&str) -> Option<UniqueIdFormat>;

/// Known formats, oldest first; the canonical one is always tried last.
const FORMATS: [Parser; 3] = [
    parse_legacy_mac,
    parse_legacy_serial,
    parse_canonical_format,
];

/// Recognise `unique_id` against every known format.
#[must_use]
pub fn parse(unique_id: &str) -> Option<UniqueIdFormat> {
    FORMATS.iter().find_map(|parser| parser(unique_id))
}

/// `homekit-{mac}-{aid}-{sid}`
fn parse_legacy_mac(s: &str) -> Option<UniqueIdFormat> {
    let rest = s.strip_prefix(LEGACY_PREFIX)?;
    let mut parts = rest.rsplitn(3, '-');
    let sid = parts.next()?.parse().ok()?;
    let aid = parts.next()?.parse().ok()?;
    let mac = parts.next()?.parse().ok()?;
    Some(UniqueIdFormat::LegacyMac { mac, aid, sid })
}

/// `homekit-{serial}-aid:{aid}-sid:{sid}[-cid:{cid}]`
fn parse_legacy_serial(s: &str) -> Option<UniqueIdFormat> {
    let rest = s.strip_prefix(LEGACY_PREFIX)?;
    let (serial, rest) = rest.rsplit_once("-aid:")?;
    if serial.is_empty() {
        return None;
    }
    let (aid, rest) = rest.split_once("-sid:")?;
    let (sid, cid) = match rest.split_once("-cid:") {
        Some((sid, cid)) => (sid, Some(cid.parse().ok()?)),
        None => (rest, None),
    };
    Some(UniqueIdFormat::LegacySerial {
        serial: serial.to_string(),
        aid: aid.parse().ok()?,
        sid: sid.parse().ok()?,
        cid,
    })
}

fn parse_canonical_format(s: &str) -> Option<UniqueIdFormat> {
    parse_canonical(s).map(UniqueIdFormat::Canonical)
}

fn parse_canonical(s: &str) -> Option<CanonicalId> {
    let mut parts = s.split('_');
    let mac = parts.next()?.parse().ok()?;
    let aid = parts.next()?.parse().ok()?;
    let sid = parts.next()?.parse().ok()?;
    let cid = parts.next().map(str::parse).transpose().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(CanonicalId { mac, aid, sid, cid })
}
