//! Precomputed executor calldata, keyed by (user, debt, collateral).
//!
//! Entries carry `debtToCover = 0` and are rebuilt with live sizing at
//! execution time; the cache exists so the hot path never encodes from
//! scratch inside the block deadline. Process lifetime, idempotent puts.

use alloy::primitives::Address;
use dashmap::DashMap;

pub struct PrecomputeCache {
    entries: DashMap<String, String>,
}

impl PrecomputeCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Canonical key: lowercase 0x-hex, colon-joined.
    pub fn key(user: Address, debt: Address, collateral: Address) -> String {
        format!("{user:#x}:{debt:#x}:{collateral:#x}")
    }

    /// Insert only if absent; repeated puts of the same tuple are no-ops.
    pub fn put_if_absent(&self, key: String, calldata_hex: String) {
        self.entries.entry(key).or_insert(calldata_hex);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PrecomputeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn key_is_colon_joined_lowercase_hex() {
        let user = address!("1111111111111111111111111111111111111111");
        let debt = address!("2222222222222222222222222222222222222222");
        let collat = address!("3333333333333333333333333333333333333333");
        let key = PrecomputeCache::key(user, debt, collat);
        assert_eq!(
            key,
            "0x1111111111111111111111111111111111111111:0x2222222222222222222222222222222222222222:0x3333333333333333333333333333333333333333"
        );
    }

    #[test]
    fn puts_are_idempotent() {
        let cache = PrecomputeCache::new();
        cache.put_if_absent("k".into(), "0xaaaa".into());
        cache.put_if_absent("k".into(), "0xbbbb".into());
        assert_eq!(cache.get("k").as_deref(), Some("0xaaaa"));
        assert_eq!(cache.len(), 1);
    }
}
