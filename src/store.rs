//! Keyed persistent store boundary.
//!
//! The surrounding ledger owns persistence; the core only sees byte keys and byte values.
//! Every engine operation runs against a [`CacheStore`] branch and commits only when it
//! succeeds, so a failed operation leaves no trace. Record values are JSON encoded.

use crate::types::{Address, Pair};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

pub trait KvStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    fn delete(&mut self, key: &[u8]);

    /// All keys starting with `prefix`, in ascending byte order.
    fn prefix_keys(&self, prefix: &[u8]) -> Vec<Vec<u8>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    fn prefix_keys(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// Write-buffering branch over a parent store. `None` in the buffer marks a delete.
/// Holding the parent mutably means nothing else can read tentative state.
pub struct CacheStore<'a, S: KvStore> {
    parent: &'a mut S,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, S: KvStore> CacheStore<'a, S> {
    pub fn new(parent: &'a mut S) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub fn commit(self) {
        for (key, value) in self.writes {
            match value {
                Some(bytes) => self.parent.set(key, bytes),
                None => self.parent.delete(&key),
            }
        }
    }
}

impl<S: KvStore> KvStore for CacheStore<'_, S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(buffered) => buffered.clone(),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn prefix_keys(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let mut keys: BTreeMap<Vec<u8>, ()> = self
            .parent
            .prefix_keys(prefix)
            .into_iter()
            .map(|k| (k, ()))
            .collect();

        for (key, value) in self.writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(_) => keys.insert(key.clone(), ()),
                None => keys.remove(key),
            };
        }

        keys.into_keys().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("corrupt record under {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("cannot encode record for {key}: {reason}")]
    Encode { key: String, reason: String },
}

// key layout. the pair and the address are the only variable parts. the pair is length
// prefixed (one byte, see MAX_PAIR_LEN) so no pair's keys are a prefix of another pair's:
// denoms like ibc/27394FB0 may contain '/'.
pub const MARKET_PREFIX: &[u8] = b"market/";
pub const POSITION_PREFIX: &[u8] = b"position/";
pub const VAULT_PREFIX: &[u8] = b"vault/";
pub const ACCOUNT_PREFIX: &[u8] = b"account/";

fn length_prefixed(pair: &Pair) -> Vec<u8> {
    let raw = pair.to_string();
    let mut out = Vec::with_capacity(raw.len() + 1);
    // parsing caps a pair at MAX_PAIR_LEN bytes
    out.push(u8::try_from(raw.len()).unwrap_or(u8::MAX));
    out.extend_from_slice(raw.as_bytes());
    out
}

pub fn market_key(pair: &Pair) -> Vec<u8> {
    [MARKET_PREFIX, &length_prefixed(pair)].concat()
}

pub fn position_key(pair: &Pair, trader: &Address) -> Vec<u8> {
    [positions_prefix(pair).as_slice(), trader.as_str().as_bytes()].concat()
}

pub fn positions_prefix(pair: &Pair) -> Vec<u8> {
    [POSITION_PREFIX, &length_prefixed(pair), b"/".as_slice()].concat()
}

pub fn vault_key(pair: &Pair) -> Vec<u8> {
    [VAULT_PREFIX, &length_prefixed(pair)].concat()
}

pub fn account_key(address: &Address) -> Vec<u8> {
    [ACCOUNT_PREFIX, address.as_str().as_bytes()].concat()
}

pub fn load<T: DeserializeOwned>(store: &impl KvStore, key: &[u8]) -> Result<Option<T>, StoreError> {
    match store.get(key) {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: String::from_utf8_lossy(key).into_owned(),
                reason: e.to_string(),
            }),
    }
}

pub fn save<T: Serialize>(store: &mut impl KvStore, key: Vec<u8>, record: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(record).map_err(|e| StoreError::Encode {
        key: String::from_utf8_lossy(&key).into_owned(),
        reason: e.to_string(),
    })?;
    store.set(key, bytes);
    Ok(())
}
