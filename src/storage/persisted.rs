use std::sync::{
    atomic::{AtomicBool, Ordering},
    PoisonError, RwLock,
};

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{KeyValueStore, PersistQueue};

/// Envelope format version written alongside every store snapshot.
pub const STORE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    state: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    state: serde_json::Value,
}

/// In-memory state mirrored to one storage key.
///
/// Reads and writes are synchronous. Each effective mutation enqueues a full
/// snapshot while the write lock is held, so snapshots reach the queue in
/// mutation order. Nothing is written until [`Persisted::hydrate`] has run,
/// which keeps startup defaults from clobbering durable state.
pub struct Persisted<T> {
    key: &'static str,
    state: RwLock<T>,
    hydrated: AtomicBool,
    queue: PersistQueue,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    pub fn new(key: &'static str, queue: PersistQueue) -> Self {
        Self {
            key,
            state: RwLock::new(T::default()),
            hydrated: AtomicBool::new(false),
            queue,
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::Acquire)
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }

    /// Apply `f` to the state. `f` reports whether it changed anything; only
    /// changes are persisted.
    pub fn update(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let changed = f(&mut guard);
        if changed && self.is_hydrated() {
            match encode(&*guard) {
                Ok(serialized) => self.queue.set(self.key, serialized),
                Err(err) => warn!("Failed to serialize '{}': {err:#}", self.key),
            }
        }
        changed
    }

    /// Load the stored snapshot once. Missing, unreadable, or newer-format
    /// data leaves the in-memory defaults in place.
    pub async fn hydrate(&self, store: &dyn KeyValueStore) {
        if self.is_hydrated() {
            debug!("'{}' already hydrated", self.key);
            return;
        }

        match store.get(self.key).await {
            Ok(Some(raw)) => match decode::<T>(&raw) {
                Ok(state) => {
                    let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
                    *guard = state;
                    debug!("Hydrated '{}'", self.key);
                }
                Err(err) => warn!(
                    "Discarding stored '{}': {err:#}; starting from defaults",
                    self.key
                ),
            },
            Ok(None) => debug!("No stored '{}'; starting from defaults", self.key),
            Err(err) => warn!(
                "Failed to load '{}': {err:#}; starting from defaults",
                self.key
            ),
        }

        self.hydrated.store(true, Ordering::Release);
    }
}

pub(crate) fn encode<T: Serialize>(state: &T) -> Result<String> {
    serde_json::to_string(&EnvelopeRef {
        version: STORE_FORMAT_VERSION,
        state,
    })
    .context("failed to encode store snapshot")
}

pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let envelope: Envelope = serde_json::from_str(raw).context("malformed store envelope")?;
    if envelope.version > STORE_FORMAT_VERSION {
        bail!(
            "stored version ({}) is newer than supported ({})",
            envelope.version,
            STORE_FORMAT_VERSION
        );
    }
    serde_json::from_value(envelope.state).context("malformed store state")
}
