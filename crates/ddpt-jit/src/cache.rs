//! Content-addressed engine cache.
//!
//! Keys are the sha-1 of the pre-lowering module text; the mapping lives for
//! the process and is never evicted, so cached engines keep their code
//! memory and interned symbols across batches.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sha1::{Digest, Sha1};

/// Hex digest of the module text; the cache key.
pub fn sha1_hex(text: &str) -> String {
    let digest = Sha1::digest(text.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Process-lifetime map from cache key to built engine.
pub struct EngineCache<V> {
    entries: Mutex<HashMap<String, Arc<V>>>,
    builds: AtomicUsize,
}

impl<V> EngineCache<V> {
    pub fn new() -> Self {
        EngineCache {
            entries: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Returns the cached engine for `key`, or builds and inserts one.
    /// The boolean reports whether the lookup was a hit.
    pub fn get_or_try_insert_with<E, F>(&self, key: &str, build: F) -> Result<(Arc<V>, bool), E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(existing) = self
            .entries
            .lock()
            .expect("engine cache poisoned")
            .get(key)
            .cloned()
        {
            return Ok((existing, true));
        }

        let built = Arc::new(build()?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().expect("engine cache poisoned");
        match entries.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok((Arc::clone(entry.get()), true)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&built));
                Ok((built, false))
            }
        }
    }

    /// Number of engines built so far (cache misses).
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("engine cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for EngineCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
