use crate::{send, test_app};
use axum::body::Body;
use axum::http::{Method, Request};
use tower::ServiceExt;

async fn get_as(router: &axum::Router, ip: &str, path: &str) -> axum::http::StatusCode {
    let req = Request::builder()
        .method(Method::GET)
        .uri(path)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap();
    router.clone().oneshot(req).await.unwrap().status()
}

#[tokio::test]
async fn blacklisted_ip_gets_401_everywhere() {
    let (app, router) = test_app();
    app.blocked.update(|d| {
        d.ip_blacklist.insert("6.6.6.6".to_owned());
    });
    assert_eq!(get_as(&router, "6.6.6.6", "/version").await, 401);
    assert_eq!(get_as(&router, "6.6.6.6", "/c/chan").await, 401);
    assert_eq!(get_as(&router, "1.1.1.1", "/version").await, 200);
}

#[tokio::test]
async fn route_hit_escalates_to_ip_ban() {
    let (app, router) = test_app();
    app.blocked.update(|d| {
        d.route_blacklist.push("/\\.env".to_owned());
    });
    assert_eq!(get_as(&router, "2.2.2.2", "/.env").await, 401);
    // Same IP is now refused even on good paths.
    assert_eq!(get_as(&router, "2.2.2.2", "/version").await, 401);
    assert!(app
        .blocked
        .snapshot(|d| d.ip_blacklist.contains("2.2.2.2")));
}

#[tokio::test]
async fn whitelisted_ip_is_never_blocked() {
    let (app, router) = test_app();
    app.blocked.update(|d| {
        d.ip_whitelist.insert("3.3.3.3".to_owned());
        d.ip_blacklist.insert("3.3.3.3".to_owned());
    });
    assert_eq!(get_as(&router, "3.3.3.3", "/version").await, 200);
}

#[tokio::test]
async fn requests_without_forwarding_header_still_work() {
    let (_, router) = test_app();
    let resp = send(&router, Method::GET, "/version", b"").await;
    assert_eq!(resp.status(), 200);
}
