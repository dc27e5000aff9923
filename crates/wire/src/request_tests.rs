// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use yare::parameterized;

use super::Request;

#[test]
fn serializes_with_type_tag() {
    let json = serde_json::to_value(&Request::Ping).unwrap();
    assert_eq!(json["type"], "Ping");

    let json = serde_json::to_value(&Request::Start { name: "web".to_string() }).unwrap();
    assert_eq!(json["type"], "Start");
    assert_eq!(json["name"], "web");
}

#[test]
fn hello_token_is_omitted_when_absent() {
    let req = Request::Hello { version: "0.2.0".to_string(), token: None };
    let json = serde_json::to_string(&req).unwrap();
    assert!(!json.contains("token"));
}

#[test]
fn shutdown_orphan_defaults_to_false() {
    let req: Request = serde_json::from_str(r#"{"type":"Shutdown"}"#).unwrap();
    assert_eq!(req, Request::Shutdown { orphan: false });
}

#[test]
fn stop_timeout_is_optional() {
    let req: Request = serde_json::from_str(r#"{"type":"Stop","name":"db"}"#).unwrap();
    assert_eq!(req, Request::Stop { name: "db".to_string(), timeout_ms: None });
}

#[parameterized(
    ping = { Request::Ping },
    list = { Request::ListServices },
    get = { Request::GetService { name: "a".to_string() } },
    deploy = { Request::Deploy { name: "a".to_string(), drain_ms: None } },
    logs = { Request::Logs { name: "a".to_string(), lines: 50 } },
    reload = { Request::Reload },
    secret = { Request::SecretSet { key: "k".to_string(), value: "v".to_string() } },
)]
fn roundtrips_through_json(req: Request) {
    let json = serde_json::to_string(&req).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, req);
}
