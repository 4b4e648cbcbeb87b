//! One-time key pool with atomic issue/consume and threshold-triggered
//! regeneration.

#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::{
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

use arkavo_crypto::EphemeralKeyPair;
use rand::rngs::OsRng;
use tracing::debug;

use crate::{
    error::KeyStoreError,
    storage::{KeyStorage, StoredKeyRecord},
};

/// Default pool capacity (regeneration target).
pub const DEFAULT_CAPACITY: usize = 50;

/// Default low-water mark (20% of default capacity).
pub const DEFAULT_LOW_WATER_MARK: usize = 10;

/// Capacity policy for the key pool.
#[derive(Debug, Clone, Copy)]
pub struct KeyPoolConfig {
    /// Target number of keys after a regeneration pass.
    pub capacity: usize,
    /// Regeneration is due when the available count drops below this.
    pub low_water_mark: usize,
}

impl Default for KeyPoolConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, low_water_mark: DEFAULT_LOW_WATER_MARK }
    }
}

/// Read-only snapshot of pool health for UI/telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStatistics {
    /// Number of keys still available for issue/consume.
    pub available: usize,
    /// Configured regeneration target.
    pub capacity: usize,
}

/// A key issued for one outbound seal.
///
/// The underlying pool entry is already marked consumed; this handle
/// stays valid for the in-flight send even if a regeneration pass runs
/// concurrently.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pair: EphemeralKeyPair,
    created_at: u64,
}

impl IssuedKey {
    /// Key pair to seal with.
    #[must_use]
    pub fn keypair(&self) -> &EphemeralKeyPair {
        &self.pair
    }

    /// Public half, the identity of the issued key.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        self.pair.public_bytes()
    }

    /// Unix seconds when the key was generated.
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Pool of one-time keys with write-through persistence.
///
/// Thread-safe via `Arc<Mutex<_>>`; clone shares the same pool. Every
/// state check and mark happens under one lock, so two concurrent
/// callers can never be issued the same key, and the durable record is
/// updated before the mark is visible to other callers.
#[derive(Clone)]
pub struct OneTimeKeyStore {
    inner: Arc<Mutex<Vec<StoredKeyRecord>>>,
    storage: Arc<dyn KeyStorage>,
    config: KeyPoolConfig,
}

impl OneTimeKeyStore {
    /// Load the pool from storage and top it up to capacity.
    ///
    /// Records load in `created_at` order so issuance stays
    /// oldest-first across restarts. Consumed records are kept: they
    /// are what lets a replayed envelope be rejected after a restart.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::Storage` if the store cannot be read or
    /// the initial regeneration cannot be persisted.
    pub fn open(
        storage: Arc<dyn KeyStorage>,
        config: KeyPoolConfig,
    ) -> Result<Self, KeyStoreError> {
        let mut records = storage.load_all()?;
        records.sort_by_key(|record| record.created_at);

        let pool = Self { inner: Arc::new(Mutex::new(records)), storage, config };
        let generated = pool.regenerate()?;
        if generated > 0 {
            debug!(generated, "filled key pool on open");
        }

        Ok(pool)
    }

    /// Issue the oldest available key for an outbound seal.
    ///
    /// The key is marked consumed atomically with the availability
    /// check; it will never be issued or accepted again.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::Exhausted` if no available key exists. Callers
    ///   should regenerate and retry once rather than give up.
    /// - `KeyStoreError::Storage` if the consumed mark cannot be
    ///   persisted (the key stays available in that case).
    pub fn issue_key(&self) -> Result<IssuedKey, KeyStoreError> {
        let mut records = self.inner.lock().expect("OneTimeKeyStore mutex poisoned");

        let record = records
            .iter_mut()
            .find(|record| !record.consumed)
            .ok_or(KeyStoreError::Exhausted)?;

        let mut updated = record.clone();
        updated.consumed = true;
        self.storage.put(&updated)?;
        *record = updated;

        Ok(IssuedKey {
            pair: EphemeralKeyPair::from_secret_bytes(record.secret),
            created_at: record.created_at,
        })
    }

    /// Consume the key named by an inbound envelope's hint.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::UnknownKey` if the hint is not a tracked key.
    /// - `KeyStoreError::AlreadyConsumed` on reuse - surfaced to the
    ///   caller as a potential replay, never swallowed.
    /// - `KeyStoreError::Storage` if the consumed mark cannot be
    ///   persisted.
    pub fn consume_key(&self, hint: &[u8; 32]) -> Result<EphemeralKeyPair, KeyStoreError> {
        let mut records = self.inner.lock().expect("OneTimeKeyStore mutex poisoned");

        let record = records
            .iter_mut()
            .find(|record| &record.public == hint)
            .ok_or(KeyStoreError::UnknownKey)?;

        if record.consumed {
            return Err(KeyStoreError::AlreadyConsumed);
        }

        let mut updated = record.clone();
        updated.consumed = true;
        self.storage.put(&updated)?;
        *record = updated;

        Ok(EphemeralKeyPair::from_secret_bytes(record.secret))
    }

    /// Generate fresh keys until the available count reaches capacity.
    ///
    /// Returns the number of keys generated. Runs under the same lock
    /// as issue/consume, so it cannot hand out a key twice; key
    /// material already issued stays valid because callers hold their
    /// own copy of the pair.
    ///
    /// # Errors
    ///
    /// Returns `KeyStoreError::Storage` if a new key cannot be
    /// persisted; keys persisted before the failure remain in the pool.
    pub fn regenerate(&self) -> Result<usize, KeyStoreError> {
        let mut records = self.inner.lock().expect("OneTimeKeyStore mutex poisoned");

        let available = records.iter().filter(|record| !record.consumed).count();
        let deficit = self.config.capacity.saturating_sub(available);

        for _ in 0..deficit {
            let pair = EphemeralKeyPair::generate(&mut OsRng);
            let record = StoredKeyRecord {
                public: pair.public_bytes(),
                secret: pair.secret_bytes(),
                consumed: false,
                created_at: unix_now(),
            };
            self.storage.put(&record)?;
            records.push(record);
        }

        if deficit > 0 {
            debug!(generated = deficit, target = self.config.capacity, "regenerated one-time keys");
        }

        Ok(deficit)
    }

    /// Snapshot of available count and capacity.
    pub fn statistics(&self) -> KeyStatistics {
        let records = self.inner.lock().expect("OneTimeKeyStore mutex poisoned");
        let available = records.iter().filter(|record| !record.consumed).count();
        KeyStatistics { available, capacity: self.config.capacity }
    }

    /// Whether the pool has dropped below its low-water mark.
    ///
    /// Checked after every issue; the owner schedules a background
    /// regeneration pass when this turns true.
    pub fn needs_regeneration(&self) -> bool {
        self.statistics().available < self.config.low_water_mark
    }

    /// Capacity policy this pool was opened with.
    #[must_use]
    pub fn config(&self) -> KeyPoolConfig {
        self.config
    }
}

/// Current time as Unix seconds. Zero if the clock is before the epoch.
fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}
