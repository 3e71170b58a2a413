mod list;
mod stream;
pub mod value;
mod zset;

pub use stream::{parse_range_end, parse_range_start, parse_stream_id};
pub use value::{format_score, Entry, SortedSet, Stream, StreamFields, StreamId, Value};

use crate::errors::StoreError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{Notify, RwLock};

/// Process-wide typed store: one rw-lock over the key map, plus a lazily
/// populated per-key wakeup map for blocking readers. Wakeup handles are
/// never dropped before shutdown.
pub struct Store {
    map: RwLock<HashMap<String, Entry>>,
    wakeups: RwLock<HashMap<String, Arc<Notify>>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            wakeups: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_string(&self, key: &str, value: &str, expires_at: Option<SystemTime>) {
        {
            let mut map = self.map.write().await;
            map.insert(
                key.to_string(),
                Entry::with_expiry(Value::String(value.to_string()), expires_at),
            );
        }
        self.notify(key).await;
    }

    /// Deep clone of the live entry; expired entries read as missing.
    pub async fn get(&self, key: &str) -> Option<Entry> {
        let map = self.map.read().await;
        map.get(key).filter(|entry| !entry.is_expired()).cloned()
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    pub async fn keys(&self) -> Vec<String> {
        let map = self.map.read().await;
        map.keys().cloned().collect()
    }

    pub async fn type_name(&self, key: &str) -> &'static str {
        match self.get(key).await {
            Some(entry) => entry.value.type_name(),
            None => "none",
        }
    }

    /// Parse-increment-store under one write lock.
    pub async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let new_value;
        {
            let mut map = self.map.write().await;
            let (value, expires_at) = match map.get(key).filter(|entry| !entry.is_expired()) {
                None => (1, None),
                Some(entry) => match &entry.value {
                    Value::String(s) => {
                        let n = s
                            .parse::<i64>()
                            .map_err(|_| StoreError::NotAnInteger)?
                            .checked_add(1)
                            .ok_or(StoreError::NotAnInteger)?;
                        (n, entry.expires_at)
                    }
                    _ => return Err(StoreError::WrongType),
                },
            };
            new_value = value;
            map.insert(
                key.to_string(),
                Entry::with_expiry(Value::String(new_value.to_string()), expires_at),
            );
        }
        self.notify(key).await;
        Ok(new_value)
    }

    /// Wake the head waiter blocked on `key`. Called after every mutation
    /// that can satisfy a blocked reader.
    pub(crate) async fn notify(&self, key: &str) {
        let handle = self.wakeup_handle(key).await;
        handle.notify_one();
    }

    pub(crate) async fn wakeup_handle(&self, key: &str) -> Arc<Notify> {
        {
            let wakeups = self.wakeups.read().await;
            if let Some(handle) = wakeups.get(key) {
                return handle.clone();
            }
        }
        let mut wakeups = self.wakeups.write().await;
        wakeups
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub(crate) fn map(&self) -> &RwLock<HashMap<String, Entry>> {
        &self.map
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
