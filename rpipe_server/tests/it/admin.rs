use crate::{body_bytes, send, test_app, VERSION};
use axum::body::Body;
use axum::http::{Method, Response};
use axum::Router;
use ed25519_dalek::{Signer, SigningKey};
use rpipe_server::admin::Admin;
use rpipe_server::app::AppState;
use rpipe_server::blocked::Blocked;
use rpipe_server::logging::LogControl;
use rpipe_server::State;
use rpipe_wire::{AdminEnvelope, AdminMessage, Version};
use std::sync::Arc;

struct AdminClient {
    key: SigningKey,
    router: Router,
}

/// An app configured to trust one ed25519 key, plus a signer for it.
fn trusted_app() -> (Arc<AppState>, AdminClient) {
    let key = SigningKey::from_bytes(&[7u8; 32]);
    let public = ssh_key::public::Ed25519PublicKey(key.verifying_key().to_bytes());
    let public = ssh_key::PublicKey::from(public);

    let dir = tempfile::tempdir().unwrap();
    let key_file = dir.path().join("admin.pub");
    std::fs::write(&key_file, public.to_openssh().unwrap()).unwrap();

    let mut admin = Admin::new();
    admin.load_keys(&[key_file]);
    let app = Arc::new(AppState {
        state: State::new(),
        blocked: Blocked::load(None).unwrap(),
        admin,
        log: LogControl::disabled(),
        log_file: None,
        favicon: None,
    });
    let router = rpipe_server::app::router(app.clone());
    (app, AdminClient { key, router })
}

impl AdminClient {
    async fn uid(&self) -> String {
        let resp = send(&self.router, Method::GET, "/admin/uid", b"").await;
        assert_eq!(resp.status(), 200);
        let uids: Vec<String> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(uids.len(), 2);
        uids.into_iter().next().unwrap()
    }

    fn envelope(&self, command: &str, body: &str, uid: &str) -> Vec<u8> {
        let message = AdminMessage {
            path: format!("/admin/{command}"),
            body: body.to_owned(),
            uid: uid.to_owned(),
        };
        let json = serde_json::to_vec(&message).unwrap();
        let signature = self.key.sign(&json);
        AdminEnvelope::encode(&Version::parse(VERSION), &signature.to_bytes(), &json)
    }

    async fn post_with_uid(&self, command: &str, body: &str, uid: &str) -> Response<Body> {
        let raw = self.envelope(command, body, uid);
        send(&self.router, Method::POST, &format!("/admin/{command}"), &raw).await
    }

    async fn post(&self, command: &str, body: &str) -> Response<Body> {
        let uid = self.uid().await;
        self.post_with_uid(command, body, &uid).await
    }
}

#[tokio::test]
async fn uid_route_needs_no_signature() {
    let (_, router) = test_app();
    let resp = send(&router, Method::GET, "/admin/uid", b"").await;
    assert_eq!(resp.status(), 200);
    let uids: Vec<String> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(uids.len(), 2);
    assert_ne!(uids[0], uids[1]);
}

#[tokio::test]
async fn debug_command_answers_and_uid_is_single_use() {
    let (app, client) = trusted_app();
    let uid = client.uid().await;

    let resp = client.post_with_uid("debug", "", &uid).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(&body_bytes(resp).await[..], b"False");

    // Replaying the same UID is refused.
    let resp = client.post_with_uid("debug", "", &uid).await;
    assert_eq!(resp.status(), 403);

    app.state.lock().unwrap().enable_debug();
    let resp = client.post("debug", "").await;
    assert_eq!(&body_bytes(resp).await[..], b"True");
}

#[tokio::test]
async fn every_attempt_is_logged() {
    let (app, client) = trusted_app();
    let uid = client.uid().await;
    client.post_with_uid("debug", "", &uid).await;
    client.post_with_uid("debug", "", &uid).await; // replay, rejected

    let state = app.state.lock().unwrap();
    assert_eq!(state.stats.admin.len(), 2);
    assert!(state.stats.admin[0].uid_valid);
    assert!(state.stats.admin[0].signer.is_some());
    assert!(!state.stats.admin[1].uid_valid);
    assert_eq!(state.stats.admin[1].command, "debug");
}

#[tokio::test]
async fn wrong_key_is_unauthorized() {
    let (_, client) = trusted_app();
    let rogue = AdminClient {
        key: SigningKey::from_bytes(&[9u8; 32]),
        router: client.router.clone(),
    };
    let resp = rogue.post("debug", "").await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn old_client_version_is_rejected() {
    let (_, client) = trusted_app();
    let uid = client.uid().await;
    let message = AdminMessage {
        path: "/admin/debug".to_owned(),
        body: String::new(),
        uid,
    };
    let json = serde_json::to_vec(&message).unwrap();
    let signature = client.key.sign(&json);
    let raw = AdminEnvelope::encode(&Version::parse("8.5.0"), &signature.to_bytes(), &json);
    let resp = send(&client.router, Method::POST, "/admin/debug", &raw).await;
    assert_eq!(resp.status(), 426);
}

#[tokio::test]
async fn malformed_envelope_is_invalid() {
    let (_, client) = trusted_app();
    let resp = send(&client.router, Method::POST, "/admin/debug", b"garbage").await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn unknown_command_is_not_found() {
    let (_, client) = trusted_app();
    let resp = client.post("reboot", "").await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn channels_lists_live_streams() {
    let (_, client) = trusted_app();
    let uri = format!("/c/chan?version={VERSION}&encrypted=True&final=True");
    send(&client.router, Method::POST, &uri, b"12345").await;

    let resp = client.post("channels", "").await;
    assert_eq!(resp.status(), 200);
    let js: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(js["chan"]["packets"], 1);
    assert_eq!(js["chan"]["size"], 5);
    assert_eq!(js["chan"]["encrypted"], true);
}

#[tokio::test]
async fn stats_reports_activity() {
    let (_, client) = trusted_app();
    let uri = format!("/c/chan?version={VERSION}&encrypted=False&final=True");
    send(&client.router, Method::POST, &uri, b"x").await;

    let resp = client.post("stats", "").await;
    assert_eq!(resp.status(), 200);
    let js: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(js["channels"]["chan"]["writes"].is_object());
    assert!(js["start"].is_string());
}

#[tokio::test]
async fn lock_blocks_delete_until_unlocked() {
    let (_, client) = trusted_app();
    let uri = format!("/c/chan?version={VERSION}&encrypted=False&final=True");
    send(&client.router, Method::POST, &uri, b"x").await;

    let resp = client
        .post("lock", r#"{"channel":"chan","lock":true}"#)
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        send(&client.router, Method::DELETE, "/c/chan", b"")
            .await
            .status(),
        423
    );

    let resp = client
        .post("lock", r#"{"channel":"chan","lock":false}"#)
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        send(&client.router, Method::DELETE, "/c/chan", b"")
            .await
            .status(),
        202
    );
}

#[tokio::test]
async fn lock_of_missing_channel_is_no_data() {
    let (_, client) = trusted_app();
    let resp = client
        .post("lock", r#"{"channel":"ghost","lock":true}"#)
        .await;
    assert_eq!(resp.status(), 410);
}

#[tokio::test]
async fn log_level_round_trip() {
    let (_, client) = trusted_app();
    let resp = client.post("log-level", "").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(&body_bytes(resp).await[..], b"WARN\nWARN");

    let resp = client.post("log-level", "DEBUG").await;
    assert_eq!(&body_bytes(resp).await[..], b"WARN\nDEBUG");

    let resp = client.post("log-level", "noise").await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn ip_command_blocks_and_lists() {
    let (_, client) = trusted_app();
    let resp = client.post("ip", r#"{"block":["4.4.4.4"]}"#).await;
    assert_eq!(resp.status(), 200);
    let banned: Vec<String> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(banned, vec!["4.4.4.4".to_owned()]);

    // The blocklist now turns that IP away at the door.
    let req = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/version")
        .header("x-forwarded-for", "4.4.4.4")
        .body(Body::empty())
        .unwrap();
    let resp = tower::ServiceExt::oneshot(client.router.clone(), req)
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client.post("ip", r#"{"unblock":["4.4.4.4"]}"#).await;
    let banned: Vec<String> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(banned.is_empty());
}

#[tokio::test]
async fn route_command_blocks_and_lists() {
    let (_, client) = trusted_app();
    let resp = client.post("route", r#"{"block":["/wp-admin.*"]}"#).await;
    assert_eq!(resp.status(), 200);
    let banned: Vec<String> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(banned, vec!["/wp-admin.*".to_owned()]);

    // An empty request is just a listing.
    let resp = client.post("route", "{}").await;
    let banned: Vec<String> = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(banned, vec!["/wp-admin.*".to_owned()]);
}
