// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn allocator() -> PortAllocator {
    // High range unlikely to collide with anything bound on the host
    PortAllocator::new(24100, 24199)
}

#[test]
fn allocate_is_idempotent() {
    let ports = allocator();
    let first = ports.allocate("web").unwrap();
    let second = ports.allocate("web").unwrap();
    assert_eq!(first, second);
}

#[test]
fn allocate_stays_in_range() {
    let ports = allocator();
    for name in ["a", "b", "c", "d"] {
        let p = ports.allocate(name).unwrap();
        assert!((24100..=24199).contains(&p), "out of range: {}", p);
    }
}

#[test]
fn distinct_keys_get_distinct_ports() {
    let ports = allocator();
    let a = ports.allocate("a").unwrap();
    let b = ports.allocate("b").unwrap();
    assert_ne!(a, b);
}

#[test]
fn port_returns_zero_when_absent() {
    let ports = allocator();
    assert_eq!(ports.port("ghost"), 0);
}

#[test]
fn release_frees_the_port_for_reuse() {
    let ports = PortAllocator::new(24200, 24200);
    let p = ports.allocate("a").unwrap();
    ports.release("a");
    assert_eq!(ports.port("a"), 0);
    assert_eq!(ports.allocate("b").unwrap(), p);
}

#[test]
fn release_unknown_key_is_noop() {
    let ports = allocator();
    ports.release("ghost");
}

#[test]
fn exhausted_range_fails() {
    let ports = PortAllocator::new(24300, 24301);
    ports.allocate("a").unwrap();
    ports.allocate("b").unwrap();
    assert!(matches!(ports.allocate("c"), Err(PortError::Exhausted { .. })));
}

#[test]
fn reserve_restores_prior_allocation() {
    let ports = allocator();
    ports.reserve("web", 24150).unwrap();
    assert_eq!(ports.port("web"), 24150);
    // idempotent for the same (name, port)
    ports.reserve("web", 24150).unwrap();
    assert_eq!(ports.allocate("web").unwrap(), 24150);
}

#[test]
fn reserve_fails_when_port_belongs_to_another_key() {
    let ports = allocator();
    ports.reserve("a", 24160).unwrap();
    assert_eq!(
        ports.reserve("b", 24160),
        Err(PortError::InUse { port: 24160, key: "a".to_string() })
    );
}

#[test]
fn allocate_temporary_uses_compound_key() {
    let ports = allocator();
    let primary = ports.allocate("web").unwrap();
    let temp = ports.allocate_temporary("web", "deploy").unwrap();
    assert_ne!(primary, temp);
    assert_eq!(ports.port("web__deploy"), temp);
}

#[test]
fn reassign_moves_allocation() {
    let ports = allocator();
    let temp = ports.allocate_temporary("web", "deploy").unwrap();
    ports.reassign("web__deploy", "web").unwrap();
    assert_eq!(ports.port("web"), temp);
    assert_eq!(ports.port("web__deploy"), 0);
}

#[test]
fn reassign_fails_when_target_exists() {
    let ports = allocator();
    ports.allocate("web").unwrap();
    ports.allocate_temporary("web", "deploy").unwrap();
    assert_eq!(
        ports.reassign("web__deploy", "web"),
        Err(PortError::KeyExists("web".to_string()))
    );
}

#[test]
fn reassign_fails_when_source_missing() {
    let ports = allocator();
    assert_eq!(
        ports.reassign("ghost__deploy", "ghost"),
        Err(PortError::UnknownKey("ghost__deploy".to_string()))
    );
}

#[test]
fn mappings_stay_mutually_consistent() {
    let ports = allocator();
    let a = ports.allocate("a").unwrap();
    let b = ports.allocate("b").unwrap();
    ports.release("a");
    let inner = ports.inner.lock();
    assert_eq!(inner.by_key.len(), inner.by_port.len());
    assert!(!inner.by_port.contains_key(&a));
    assert_eq!(inner.by_port.get(&b).map(String::as_str), Some("b"));
}
