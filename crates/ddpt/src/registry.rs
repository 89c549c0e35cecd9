//! Process-wide mapping from globally-unique ids to array futures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{RtResult, RuntimeError};
use crate::tensor::ArrayFuture;

/// Reserved sentinel for "no array attached".
pub const NOGUID: u64 = 0;

/// Id-keyed owner of array futures.
///
/// Ids are handed out monotonically; removal of an id that is absent is a
/// hard error (double drop).
pub struct Registry {
    next: AtomicU64,
    map: Mutex<HashMap<u64, ArrayFuture>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            next: AtomicU64::new(NOGUID + 1),
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a fresh guid, binds it to the future and stores it.
    pub fn put(&self, future: &ArrayFuture) -> RtResult<u64> {
        let guid = self.next.fetch_add(1, Ordering::Relaxed);
        future.bind_guid(guid)?;
        self.map
            .lock()
            .expect("registry poisoned")
            .insert(guid, future.clone());
        Ok(guid)
    }

    pub fn get(&self, guid: u64) -> RtResult<ArrayFuture> {
        self.map
            .lock()
            .expect("registry poisoned")
            .get(&guid)
            .cloned()
            .ok_or(RuntimeError::UnknownGuid { guid })
    }

    pub fn del(&self, guid: u64) -> RtResult<()> {
        match self.map.lock().expect("registry poisoned").remove(&guid) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::invariant(format!(
                "guid {guid} deleted twice"
            ))),
        }
    }

    pub fn contains(&self, guid: u64) -> bool {
        self.map.lock().expect("registry poisoned").contains_key(&guid)
    }

    pub fn len(&self) -> usize {
        self.map.lock().expect("registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
