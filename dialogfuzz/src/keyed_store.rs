//! Per-session key/value store backing `Primitive::PreElement`. Grounded
//! on `original_source/boofuzz/primitives/pre_element.py`, whose
//! module-level `KEYS` dict is re-scoped here to one instance per
//! `Session` so two concurrent sessions never share state.

use ahash::AHashMap;

/// Values are populated by node on-receive callbacks as a dialog is
/// walked, then read back by `PreElement` primitives later in the same
/// or a following node. Reset between test cases (see
/// `Session::reset_fuzz_state`), not between fuzzing runs.
#[derive(Debug, Default, Clone)]
pub struct KeyedStore {
    values: AHashMap<String, Vec<u8>>,
}

impl KeyedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_returns_none() {
        let store = KeyedStore::new();
        assert_eq!(store.get("absent"), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut store = KeyedStore::new();
        store.set("session_id", b"abc123".to_vec());
        assert_eq!(store.get("session_id"), Some(&b"abc123"[..]));
    }

    #[test]
    fn clear_removes_all_keys() {
        let mut store = KeyedStore::new();
        store.set("a", vec![1]);
        store.clear();
        assert!(!store.contains("a"));
    }
}
