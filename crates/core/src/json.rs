// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tolerant JSON helpers.
//!
//! Persisted JSON columns are read through [`parse_json`], which never
//! fails: malformed data degrades to the caller's fallback instead of
//! poisoning a load path.

use serde::de::DeserializeOwned;

/// Parse `raw` as JSON, returning `fallback` on any parse failure.
pub fn parse_json<T: DeserializeOwned>(raw: &str, fallback: T) -> T {
    serde_json::from_str(raw).unwrap_or(fallback)
}

/// Truncate `s` to at most `max_bytes` bytes without splitting a
/// multi-byte character.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
