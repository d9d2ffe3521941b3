// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

crate::define_id! {
    /// Test-only ID type.
    pub struct SampleId;
}

#[test]
fn display_and_as_str() {
    let id = SampleId::new("abc-123");
    assert_eq!(id.to_string(), "abc-123");
    assert_eq!(id.as_str(), "abc-123");
}

#[test]
fn short_truncates() {
    let id = SampleId::new("abcdefgh");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefgh");
}

#[test]
fn compares_against_str() {
    let id = SampleId::new("x");
    assert_eq!(id, *"x");
    assert_eq!(id, "x");
}

#[test]
fn serde_round_trip_is_a_bare_string() {
    let id = SampleId::new("task-9");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"task-9\"");
    let back: SampleId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn uuid_gen_produces_unique_ids() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("run");
    assert_eq!(gen.next(), "run-1");
    assert_eq!(gen.next(), "run-2");

    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "run-3");
    assert_eq!(gen.next(), "run-4");
}
