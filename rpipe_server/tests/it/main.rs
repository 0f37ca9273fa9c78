//
mod admin;
mod blocked;
mod channel;

use axum::body::{Body, Bytes};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use rpipe_server::app::AppState;
use rpipe_server::blocked::Blocked;
use rpipe_server::logging::LogControl;
use rpipe_server::{admin::Admin, State};
use std::sync::Arc;
use tower::ServiceExt;

pub(crate) const VERSION: &str = "9.12.1";

pub(crate) fn test_app() -> (Arc<AppState>, Router) {
    let app = Arc::new(AppState {
        state: State::new(),
        blocked: Blocked::load(None).unwrap(),
        admin: Admin::new(),
        log: LogControl::disabled(),
        log_file: None,
        favicon: None,
    });
    let router = rpipe_server::app::router(app.clone());
    (app, router)
}

pub(crate) async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: &[u8],
) -> Response<Body> {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_vec()))
        .unwrap();
    router.clone().oneshot(req).await.unwrap()
}

pub(crate) async fn body_bytes(resp: Response<Body>) -> Bytes {
    resp.into_body().collect().await.unwrap().to_bytes()
}

pub(crate) fn header(resp: &Response<Body>, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
