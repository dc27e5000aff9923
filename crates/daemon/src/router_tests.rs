// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn route(name: &str, port: u16) -> Route {
    Route {
        name: name.to_string(),
        hostname: format!("{}.example.test", name),
        port,
        tls: false,
        tls_options: None,
    }
}

#[test]
fn generates_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");
    let router = FileRouter::new(path.clone());

    router.generate(&[route("web", 8080)]).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("web.example.test"));
    assert!(content.contains("8080"));
}

#[test]
fn generation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");
    let router = FileRouter::new(path.clone());

    let routes = [route("b", 2), route("a", 1)];
    router.generate(&routes).unwrap();
    let first = std::fs::read_to_string(&path).unwrap();
    router.generate(&routes).unwrap();
    let second = std::fs::read_to_string(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn output_is_sorted_by_name_regardless_of_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");
    let router = FileRouter::new(path.clone());

    router.generate(&[route("b", 2), route("a", 1)]).unwrap();
    let forward = std::fs::read_to_string(&path).unwrap();
    router.generate(&[route("a", 1), route("b", 2)]).unwrap();
    let reversed = std::fs::read_to_string(&path).unwrap();
    assert_eq!(forward, reversed);
}

#[test]
fn empty_route_set_still_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");
    FileRouter::new(path.clone()).generate(&[]).unwrap();
    assert!(path.exists());
}

#[test]
fn replaces_stale_routes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routes.json");
    let router = FileRouter::new(path.clone());

    router.generate(&[route("old", 1111)]).unwrap();
    router.generate(&[route("new", 2222)]).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.contains("old"));
    assert!(content.contains("new"));
}
