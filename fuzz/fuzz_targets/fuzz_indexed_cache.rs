// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for the indexed cache.
// Run with: cargo +nightly fuzz run fuzz_indexed_cache
//
// Each input byte pair is one operation on a small key space. After every
// operation the raw-key index must point at the matching value slot.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stowage_storage::IndexedCache;

fn check(cache: &IndexedCache<u8, u8>) {
    assert_eq!(cache.values().len(), cache.len());
    assert_eq!(cache.keys().len(), cache.len());
    for (i, raw_key) in cache.raw_keys().iter().enumerate() {
        assert_eq!(cache.index_of(raw_key), Some(i));
        assert_eq!(raw_key, &cache.keys()[i].to_string());
    }
}

fuzz_target!(|data: &[u8]| {
    let mut cache: IndexedCache<u8, u8> = IndexedCache::new();

    for pair in data.chunks_exact(2) {
        let key = pair[1] % 32;
        match pair[0] % 6 {
            0 | 1 => {
                cache.put(key.to_string(), pair[0], key);
            }
            2 => {
                cache.remove(&key.to_string());
            }
            3 => cache.sort_by(|a, b| a.cmp(b)),
            4 => cache.reverse(),
            _ => {
                let _ = cache.remove_at(key as usize);
            }
        }
        check(&cache);
    }
});
