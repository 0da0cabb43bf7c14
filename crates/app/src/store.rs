//! Characteristic store: the last-known state of every observed accessory.
//!
//! Each accessory lives in its own slot holding an immutable
//! `Arc<Accessory>` snapshot plus an async writer lock. Writers clone the
//! snapshot, modify the clone and swap it in whole, so readers only ever see
//! a fully merged accessory and never wait for a writer. Writers of different
//! accessories never contend.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

use hkbridge_domain::accessory::Accessory;
use hkbridge_domain::error::{BridgeError, NotFoundError};
use hkbridge_domain::id::Aid;

struct Slot {
    snapshot: RwLock<Arc<Accessory>>,
    writer: Arc<Mutex<()>>,
}

impl Slot {
    fn new(accessory: Accessory) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(accessory)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    fn load(&self) -> Arc<Accessory> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn swap(&self, accessory: Accessory) -> Arc<Accessory> {
        let next = Arc::new(accessory);
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&next);
        next
    }
}

/// Snapshot store of every accessory, keyed by aid.
#[derive(Default)]
pub struct AccessoryStore {
    slots: RwLock<HashMap<Aid, Arc<Slot>>>,
}

impl AccessoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `accessory`, replacing any accessory previously stored under
    /// the same aid.
    pub fn insert(&self, accessory: Accessory) -> Arc<Accessory> {
        let slot = Slot::new(accessory);
        let snapshot = slot.load();
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.aid, Arc::new(slot));
        snapshot
    }

    /// Current snapshot of accessory `aid`.
    #[must_use]
    pub fn snapshot(&self, aid: Aid) -> Option<Arc<Accessory>> {
        self.slot(aid).map(|slot| slot.load())
    }

    /// Every stored aid, in ascending order.
    #[must_use]
    pub fn aids(&self) -> Vec<Aid> {
        let mut aids: Vec<Aid> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        aids.sort_unstable();
        aids
    }

    /// Take the writer lock of accessory `aid`.
    ///
    /// Only one [`AccessoryWriter`] per accessory exists at a time; others
    /// wait here.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] when `aid` was never inserted.
    pub async fn writer(&self, aid: Aid) -> Result<AccessoryWriter, BridgeError> {
        let slot = self.slot(aid).ok_or_else(|| NotFoundError {
            entity: "Accessory",
            id: aid.to_string(),
        })?;
        let guard = Arc::clone(&slot.writer).lock_owned().await;
        Ok(AccessoryWriter {
            slot,
            _guard: guard,
        })
    }

    fn slot(&self, aid: Aid) -> Option<Arc<Slot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&aid)
            .cloned()
    }
}

/// Exclusive write access to one accessory's snapshot.
pub struct AccessoryWriter {
    slot: Arc<Slot>,
    _guard: OwnedMutexGuard<()>,
}

impl AccessoryWriter {
    /// The snapshot the next commit will replace.
    #[must_use]
    pub fn current(&self) -> Arc<Accessory> {
        self.slot.load()
    }

    /// Apply `change` to a copy of the current snapshot and publish the copy.
    ///
    /// On error nothing is published and readers keep seeing the previous
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Whatever `change` returns.
    pub fn commit<F>(&self, change: F) -> Result<Arc<Accessory>, BridgeError>
    where
        F: FnOnce(&mut Accessory) -> Result<(), BridgeError>,
    {
        let mut next = Accessory::clone(&self.slot.load());
        change(&mut next)?;
        Ok(self.slot.swap(next))
    }
}
