//! Claim-once rendezvous store.
//!
//! Wraps a [`KvEngine`] with two indivisible operations:
//!
//! - `register`: create the entry for a phrase, or fail with `Conflict` and
//!   leave the existing entry alone.
//! - `claim`: return the payload and delete the entry, or fail with
//!   `NotFound`. Racing claims deliver the payload to exactly one caller.
//!
//! The engine has no compare-and-swap, so each check-then-act sequence runs
//! under a lock. Locks are striped by phrase hash: operations on one phrase
//! are serialized, while a slow engine call only blocks phrases sharing its
//! stripe.
//!
//! The `_within` variants take a deadline that is checked after the stripe
//! lock is acquired and again right before the mutating engine call. Past the
//! deadline nothing is written or deleted, so a caller that gives up never
//! leaves behind a registration it was told failed, or a consumed entry
//! nobody received.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;
use crate::passphrase::Passphrase;
use crate::storage::engine::{EngineError, KvEngine};

const KEY_PREFIX: &str = "phrase/";

/// Errors surfaced by the rendezvous store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An unexpired entry already exists for the phrase.
    #[error("phrase already registered")]
    Conflict,

    /// No claimable entry exists for the phrase.
    #[error("phrase not found")]
    NotFound,

    /// The engine failed; no success was reported.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] EngineError),
}

/// Envelope persisted in the engine.
#[derive(Serialize, Deserialize)]
struct StoredEntry<P> {
    /// Unix milliseconds at registration.
    created_at: u64,
    payload: P,
}

#[derive(Deserialize)]
struct EntryHeader {
    created_at: u64,
}

/// Store tuning.
#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub lock_stripes: usize,
    /// Unclaimed entries older than this are treated as absent.
    pub entry_ttl: Option<Duration>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            lock_stripes: 64,
            entry_ttl: Some(Duration::from_secs(900)),
        }
    }
}

impl From<&crate::config::StorageConfig> for StoreSettings {
    fn from(config: &crate::config::StorageConfig) -> Self {
        Self {
            lock_stripes: config.lock_stripes,
            entry_ttl: (config.entry_ttl_secs > 0)
                .then(|| Duration::from_secs(config.entry_ttl_secs)),
        }
    }
}

/// Register/claim store over a key-value engine.
pub struct RendezvousStore<E> {
    engine: E,
    stripes: Box<[Mutex<()>]>,
    entry_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl<E: KvEngine> RendezvousStore<E> {
    pub fn new(engine: E, settings: StoreSettings, clock: Arc<dyn Clock>) -> Self {
        let stripes = (0..settings.lock_stripes.max(1))
            .map(|_| Mutex::new(()))
            .collect();
        Self {
            engine,
            stripes,
            entry_ttl: settings.entry_ttl,
            clock,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Create the entry for `phrase`, failing with `Conflict` if one exists.
    pub fn register<P: Serialize>(&self, phrase: &Passphrase, payload: &P) -> Result<(), StoreError> {
        self.register_within(phrase, payload, None)
    }

    /// `register`, abandoned without writing once `deadline` has passed.
    pub fn register_within<P: Serialize>(
        &self,
        phrase: &Passphrase,
        payload: &P,
        deadline: Option<Instant>,
    ) -> Result<(), StoreError> {
        let key = entry_key(phrase);
        let value = serde_json::to_vec(&StoredEntry {
            created_at: self.clock.now_millis(),
            payload,
        })
        .map_err(EngineError::from)?;

        let _guard = self.lock(phrase.as_str());
        check_deadline(deadline)?;
        if self.occupied(&key)? {
            return Err(StoreError::Conflict);
        }
        check_deadline(deadline)?;
        self.engine.put(&key, &value)?;
        Ok(())
    }

    /// Take the payload registered under `phrase` and delete the entry.
    pub fn claim<P: DeserializeOwned>(&self, phrase: &Passphrase) -> Result<P, StoreError> {
        self.claim_within(phrase, None)
    }

    /// `claim`, abandoned without deleting once `deadline` has passed.
    /// After a successful delete the payload is always returned.
    pub fn claim_within<P: DeserializeOwned>(
        &self,
        phrase: &Passphrase,
        deadline: Option<Instant>,
    ) -> Result<P, StoreError> {
        let key = entry_key(phrase);

        let _guard = self.lock(phrase.as_str());
        check_deadline(deadline)?;
        let Some(bytes) = self.engine.get(&key)? else {
            return Err(StoreError::NotFound);
        };
        let entry: StoredEntry<P> = serde_json::from_slice(&bytes).map_err(EngineError::from)?;

        if self.is_expired(entry.created_at) {
            self.engine.delete(&key)?;
            tracing::debug!(phrase = %phrase, "Dropped expired entry on claim");
            return Err(StoreError::NotFound);
        }

        // The delete must succeed before the payload is handed out; otherwise a
        // second claimer could receive it too.
        check_deadline(deadline)?;
        self.engine.delete(&key)?;
        Ok(entry.payload)
    }

    /// Delete every expired entry. Returns how many were removed.
    ///
    /// Each candidate is re-read under its stripe lock, so an entry claimed or
    /// replaced since the scan is left alone. Undecodable entries are skipped.
    pub fn sweep_expired(&self) -> Result<usize, StoreError> {
        if self.entry_ttl.is_none() {
            return Ok(0);
        }

        let mut removed = 0;
        for key in self.engine.scan_prefix(KEY_PREFIX.as_bytes())? {
            let Some(phrase) = phrase_of(&key) else {
                continue;
            };
            let _guard = self.lock(phrase);
            let Some(bytes) = self.engine.get(&key)? else {
                continue;
            };
            let Ok(header) = serde_json::from_slice::<EntryHeader>(&bytes) else {
                continue;
            };
            if self.is_expired(header.created_at) {
                self.engine.delete(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Whether a live entry sits under `key`. Caller holds the stripe lock.
    fn occupied(&self, key: &[u8]) -> Result<bool, StoreError> {
        if self.entry_ttl.is_none() {
            return Ok(self.engine.exists(key)?);
        }
        let Some(bytes) = self.engine.get(key)? else {
            return Ok(false);
        };
        let header: EntryHeader = serde_json::from_slice(&bytes).map_err(EngineError::from)?;
        Ok(!self.is_expired(header.created_at))
    }

    fn is_expired(&self, created_at: u64) -> bool {
        match self.entry_ttl {
            Some(ttl) => {
                self.clock.now_millis().saturating_sub(created_at) >= ttl.as_millis() as u64
            }
            None => false,
        }
    }

    fn lock(&self, phrase: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        phrase.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        // The mutex guards no data, so a poisoned stripe is still usable.
        self.stripes[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), StoreError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            Err(StoreError::Unavailable(EngineError::DeadlineExceeded))
        }
        _ => Ok(()),
    }
}

fn phrase_of(key: &[u8]) -> Option<&str> {
    std::str::from_utf8(key.strip_prefix(KEY_PREFIX.as_bytes())?).ok()
}

fn entry_key(phrase: &Passphrase) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_PREFIX.len() + phrase.as_str().len());
    key.extend_from_slice(KEY_PREFIX.as_bytes());
    key.extend_from_slice(phrase.as_str().as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::engine::MemoryEngine;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn phrase(s: &str) -> Passphrase {
        s.parse().unwrap()
    }

    fn store_with_ttl(ttl: Option<Duration>) -> (RendezvousStore<Arc<MemoryEngine>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(5_000_000));
        let settings = StoreSettings {
            lock_stripes: 8,
            entry_ttl: ttl,
        };
        (
            RendezvousStore::new(Arc::new(MemoryEngine::new()), settings, clock.clone()),
            clock,
        )
    }

    fn store() -> RendezvousStore<Arc<MemoryEngine>> {
        store_with_ttl(None).0
    }

    /// Engine whose operations can be made to fail on demand.
    #[derive(Default)]
    struct FlakyEngine {
        inner: MemoryEngine,
        fail_put: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl KvEngine for FlakyEngine {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
            self.inner.get(key)
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
            if self.fail_put.load(Ordering::SeqCst) {
                return Err(EngineError::Unavailable("disk full".into()));
            }
            self.inner.put(key, value)
        }

        fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(EngineError::Io(std::io::Error::other("delete failed")));
            }
            self.inner.delete(key)
        }

        fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, EngineError> {
            self.inner.scan_prefix(prefix)
        }
    }

    #[test]
    fn test_register_then_claim_once() {
        let store = store();
        let p = phrase("5-cat-dog");

        store.register(&p, &"/ip4/1.2.3.4/tcp/4001").unwrap();
        let payload: String = store.claim(&p).unwrap();
        assert_eq!(payload, "/ip4/1.2.3.4/tcp/4001");

        assert!(matches!(store.claim::<String>(&p), Err(StoreError::NotFound)));
        assert!(store.engine().is_empty());
    }

    #[test]
    fn test_claim_unknown_phrase() {
        let store = store();
        assert!(matches!(
            store.claim::<String>(&phrase("7-never-seen")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_second_register_conflicts_and_keeps_first() {
        let store = store();
        let p = phrase("100-happy-snail");

        store.register(&p, &"v1").unwrap();
        assert!(matches!(store.register(&p, &"v2"), Err(StoreError::Conflict)));

        let payload: String = store.claim(&p).unwrap();
        assert_eq!(payload, "v1");
    }

    #[test]
    fn test_reregister_after_claim() {
        let store = store();
        let p = phrase("3-red-fox");

        store.register(&p, &"v1").unwrap();
        assert_eq!(store.claim::<String>(&p).unwrap(), "v1");

        store.register(&p, &"v2").unwrap();
        assert_eq!(store.claim::<String>(&p).unwrap(), "v2");
    }

    #[test]
    fn test_concurrent_claims_deliver_once() {
        let store = Arc::new(store());
        let p = phrase("42-brave-otter");
        store.register(&p, &"payload").unwrap();

        let claimers = 32;
        let barrier = Arc::new(Barrier::new(claimers));
        let handles: Vec<_> = (0..claimers)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                let p = p.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.claim::<String>(&p)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners, vec!["payload"]);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(StoreError::NotFound)))
                .count(),
            claimers - 1
        );
    }

    #[test]
    fn test_concurrent_registers_admit_one() {
        let store = Arc::new(store());
        let p = phrase("9-quiet-moose");

        let registrants = 16;
        let barrier = Arc::new(Barrier::new(registrants));
        let handles: Vec<_> = (0..registrants)
            .map(|i| {
                let store = store.clone();
                let barrier = barrier.clone();
                let p = p.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.register(&p, &format!("v{i}")).map(|()| i)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<usize> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(StoreError::Conflict))));

        let payload: String = store.claim(&p).unwrap();
        assert_eq!(payload, format!("v{}", winners[0]));
    }

    #[test]
    fn test_distinct_phrases_do_not_interfere() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..50)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    let p = phrase(&format!("{n}-lone-wolf"));
                    store.register(&p, &n).unwrap();
                    store.claim::<u32>(&p).unwrap()
                })
            })
            .collect();

        for (n, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), n as u32);
        }
        assert!(store.engine().is_empty());
    }

    #[test]
    fn test_expired_entry_is_not_claimable() {
        let (store, clock) = store_with_ttl(Some(Duration::from_secs(60)));
        let p = phrase("1-old-news");

        store.register(&p, &"stale").unwrap();
        clock.advance(Duration::from_secs(60));

        assert!(matches!(store.claim::<String>(&p), Err(StoreError::NotFound)));
        assert!(store.engine().is_empty());
    }

    #[test]
    fn test_expired_entry_can_be_replaced() {
        let (store, clock) = store_with_ttl(Some(Duration::from_secs(60)));
        let p = phrase("2-new-leaf");

        store.register(&p, &"v1").unwrap();
        clock.advance(Duration::from_secs(59));
        assert!(matches!(store.register(&p, &"v2"), Err(StoreError::Conflict)));

        clock.advance(Duration::from_secs(1));
        store.register(&p, &"v2").unwrap();
        assert_eq!(store.claim::<String>(&p).unwrap(), "v2");
    }

    #[test]
    fn test_failed_put_registers_nothing() {
        let engine = Arc::new(FlakyEngine::default());
        let store = RendezvousStore::new(
            engine.clone(),
            StoreSettings::default(),
            Arc::new(ManualClock::new(0)),
        );
        let p = phrase("8-dark-moon");

        engine.fail_put.store(true, Ordering::SeqCst);
        assert!(matches!(
            store.register(&p, &"v"),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(store.claim::<String>(&p), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_failed_delete_withholds_payload() {
        let engine = Arc::new(FlakyEngine::default());
        let store = RendezvousStore::new(
            engine.clone(),
            StoreSettings::default(),
            Arc::new(ManualClock::new(0)),
        );
        let p = phrase("8-dark-moon");
        store.register(&p, &"v").unwrap();

        engine.fail_delete.store(true, Ordering::SeqCst);
        assert!(matches!(
            store.claim::<String>(&p),
            Err(StoreError::Unavailable(_))
        ));

        engine.fail_delete.store(false, Ordering::SeqCst);
        assert_eq!(store.claim::<String>(&p).unwrap(), "v");
    }

    #[test]
    fn test_corrupt_entry_is_unavailable() {
        let store = store();
        let p = phrase("6-bad-data");
        store.engine().put(&entry_key(&p), b"{not json").unwrap();

        assert!(matches!(
            store.claim::<String>(&p),
            Err(StoreError::Unavailable(EngineError::Codec(_)))
        ));
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let (store, clock) = store_with_ttl(Some(Duration::from_secs(60)));
        store.register(&phrase("1-old-news"), &"stale").unwrap();
        store.register(&phrase("2-old-news"), &"stale").unwrap();
        clock.advance(Duration::from_secs(30));
        store.register(&phrase("3-new-news"), &"fresh").unwrap();

        assert_eq!(store.sweep_expired().unwrap(), 0);

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.sweep_expired().unwrap(), 2);
        assert_eq!(store.engine().len(), 1);
        assert_eq!(store.claim::<String>(&phrase("3-new-news")).unwrap(), "fresh");

        store.register(&phrase("4-left-behind"), &"abandoned").unwrap();
        clock.advance(Duration::from_secs(60));
        assert_eq!(store.sweep_expired().unwrap(), 1);
        assert!(store.engine().is_empty());
    }

    #[test]
    fn test_sweep_without_ttl_keeps_everything() {
        let (store, clock) = store_with_ttl(None);
        store.register(&phrase("5-keep-me"), &"v").unwrap();
        clock.advance(Duration::from_secs(86_400));

        assert_eq!(store.sweep_expired().unwrap(), 0);
        assert_eq!(store.engine().len(), 1);
    }

    #[test]
    fn test_sweep_skips_foreign_and_corrupt_keys() {
        let (store, clock) = store_with_ttl(Some(Duration::from_secs(1)));
        store.engine().put(b"other/key", b"x").unwrap();
        store.engine().put(&entry_key(&phrase("6-bad-data")), b"{not json").unwrap();
        clock.advance(Duration::from_secs(5));

        assert_eq!(store.sweep_expired().unwrap(), 0);
        assert_eq!(store.engine().len(), 2);
    }

    #[test]
    fn test_elapsed_deadline_writes_nothing() {
        let store = store();
        let p = phrase("7-late-train");
        let past = Some(Instant::now());

        assert!(matches!(
            store.register_within(&p, &"v", past),
            Err(StoreError::Unavailable(EngineError::DeadlineExceeded))
        ));
        assert!(store.engine().is_empty());

        store.register(&p, &"v").unwrap();
        assert!(matches!(
            store.claim_within::<String>(&p, past),
            Err(StoreError::Unavailable(EngineError::DeadlineExceeded))
        ));
        assert_eq!(store.engine().len(), 1);

        let future = Some(Instant::now() + Duration::from_secs(60));
        assert_eq!(store.claim_within::<String>(&p, future).unwrap(), "v");
    }
}
