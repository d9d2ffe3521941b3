// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn tag_v2(state: &mut Value) {
    if let Some(obj) = state.as_object_mut() {
        obj.insert("migrated_to".to_string(), json!(2));
    }
}

fn tag_v3(state: &mut Value) {
    if let Some(obj) = state.as_object_mut() {
        obj.insert("migrated_to".to_string(), json!(3));
    }
}

#[test]
fn empty_registry_is_a_no_op() {
    let registry = MigrationRegistry::new();
    let mut state = json!({"tasks": {}});
    assert_eq!(registry.apply(1, 5, &mut state), 1);
    assert_eq!(state, json!({"tasks": {}}));
}

#[test]
fn applies_in_ascending_order() {
    let mut registry = MigrationRegistry::new();
    registry.register(3, tag_v3);
    registry.register(2, tag_v2);

    let mut state = json!({});
    let version = registry.apply(1, 3, &mut state);
    assert_eq!(version, 3);
    // v3 ran last despite being registered first
    assert_eq!(state["migrated_to"], json!(3));
}

#[test]
fn skips_migrations_at_or_below_current_version() {
    let mut registry = MigrationRegistry::new();
    registry.register(2, tag_v2);

    let mut state = json!({});
    let version = registry.apply(2, 3, &mut state);
    assert_eq!(version, 2);
    assert!(state.get("migrated_to").is_none());
}

#[test]
fn re_registering_replaces() {
    let mut registry = MigrationRegistry::new();
    registry.register(2, tag_v3);
    registry.register(2, tag_v2);

    let mut state = json!({});
    registry.apply(1, 2, &mut state);
    assert_eq!(state["migrated_to"], json!(2));
}
