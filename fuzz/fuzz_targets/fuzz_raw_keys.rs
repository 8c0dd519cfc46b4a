// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for raw-key decoding.
// Run with: cargo +nightly fuzz run fuzz_raw_keys
//
// Arbitrary stored keys must decode or fail cleanly, and anything that
// decodes must re-encode to a raw key that decodes again.

#![no_main]

use libfuzzer_sys::fuzz_target;
use stowage_storage::backend::{decode_prefixed, encode_prefixed};

const PREFIX: &str = "stowage:";

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if input.len() <= 4096 {
            let raw_key = format!("{PREFIX}{input}");
            if let Ok(key) = decode_prefixed(PREFIX, &raw_key) {
                let encoded = encode_prefixed(PREFIX, &key).unwrap();
                assert!(decode_prefixed(PREFIX, &encoded).is_ok());
            }
            let _ = decode_prefixed(PREFIX, input);
        }
    }
});
