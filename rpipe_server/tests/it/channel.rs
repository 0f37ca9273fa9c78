use crate::{body_bytes, header, send, test_app, VERSION};
use axum::http::Method;

fn upload_uri(channel: &str, rest: &str) -> String {
    format!("/c/{channel}?version={VERSION}&encrypted=False{rest}")
}

fn download_uri(channel: &str, rest: &str) -> String {
    format!("/c/{channel}?version={VERSION}&delete=True{rest}")
}

#[tokio::test]
async fn hello_round_trip() {
    let (_, router) = test_app();

    let resp = send(
        &router,
        Method::POST,
        &upload_uri("c", "&final=True"),
        b"hello",
    )
    .await;
    assert_eq!(resp.status(), 201);
    assert!(header(&resp, "stream-id").is_some());
    assert_eq!(header(&resp, "max-size").unwrap(), "64000000");

    let resp = send(&router, Method::GET, &download_uri("c", ""), b"").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "final").unwrap(), "True");
    assert_eq!(header(&resp, "encrypted").unwrap(), "False");
    assert_eq!(&body_bytes(resp).await[..], b"hello");

    // The channel is gone after a final consuming read.
    let resp = send(&router, Method::GET, &download_uri("c", ""), b"").await;
    assert_eq!(resp.status(), 410);
}

#[tokio::test]
async fn chunked_upload_coalesces_on_read() {
    let (_, router) = test_app();

    let resp = send(&router, Method::POST, &upload_uri("c", "&final=False"), b"").await;
    assert_eq!(resp.status(), 201);
    let sid = header(&resp, "stream-id").unwrap();

    let uri = upload_uri("c", &format!("&final=False&stream-id={sid}"));
    assert_eq!(send(&router, Method::PUT, &uri, b"AAA").await.status(), 202);
    let uri = upload_uri("c", &format!("&final=True&stream-id={sid}"));
    assert_eq!(send(&router, Method::PUT, &uri, b"BB").await.status(), 202);

    let resp = send(&router, Method::GET, &download_uri("c", ""), b"").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "final").unwrap(), "True");
    assert_eq!(&body_bytes(resp).await[..], b"AAABB");
}

#[tokio::test]
async fn read_before_any_data_waits() {
    let (_, router) = test_app();
    send(&router, Method::POST, &upload_uri("c", "&final=False"), b"").await;
    let resp = send(&router, Method::GET, &download_uri("c", ""), b"").await;
    assert_eq!(resp.status(), 425);
}

#[tokio::test]
async fn continuation_reads_use_stream_id() {
    let (_, router) = test_app();

    let resp = send(
        &router,
        Method::POST,
        &upload_uri("c", "&final=False"),
        b"one",
    )
    .await;
    let sid = header(&resp, "stream-id").unwrap();

    // First read drains what is there but the stream stays open.
    let resp = send(&router, Method::GET, &download_uri("c", ""), b"").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "final").unwrap(), "False");
    assert_eq!(header(&resp, "stream-id").unwrap(), sid);
    assert_eq!(&body_bytes(resp).await[..], b"one");

    // Continuation with the wrong id conflicts.
    let resp = send(
        &router,
        Method::GET,
        &download_uri("c", "&stream-id=wrong"),
        b"",
    )
    .await;
    assert_eq!(resp.status(), 409);

    let put = upload_uri("c", &format!("&final=True&stream-id={sid}"));
    send(&router, Method::PUT, &put, b"two").await;

    let resp = send(
        &router,
        Method::GET,
        &download_uri("c", &format!("&stream-id={sid}")),
        b"",
    )
    .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "final").unwrap(), "True");
    assert_eq!(&body_bytes(resp).await[..], b"two");
}

#[tokio::test]
async fn second_consumer_is_rejected() {
    let (_, router) = test_app();
    send(
        &router,
        Method::POST,
        &upload_uri("c", "&final=False"),
        b"data",
    )
    .await;
    assert_eq!(
        send(&router, Method::GET, &download_uri("c", ""), b"")
            .await
            .status(),
        200
    );
    // A fresh consumer with no stream id shows up second.
    assert_eq!(
        send(&router, Method::GET, &download_uri("c", ""), b"")
            .await
            .status(),
        453
    );
}

#[tokio::test]
async fn peek_needs_a_complete_upload() {
    let (_, router) = test_app();
    send(
        &router,
        Method::POST,
        &upload_uri("c", "&final=False"),
        b"partial",
    )
    .await;
    let uri = format!("/c/c?version={VERSION}&delete=False");
    assert_eq!(send(&router, Method::GET, &uri, b"").await.status(), 452);
}

#[tokio::test]
async fn peek_does_not_consume() {
    let (_, router) = test_app();
    send(
        &router,
        Method::POST,
        &upload_uri("c", "&final=True"),
        b"peekable",
    )
    .await;
    let uri = format!("/c/c?version={VERSION}&delete=False");
    let resp = send(&router, Method::GET, &uri, b"").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "final").unwrap(), "True");
    assert_eq!(&body_bytes(resp).await[..], b"peekable");

    // Still there for the real consumer.
    let resp = send(&router, Method::GET, &download_uri("c", ""), b"").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(&body_bytes(resp).await[..], b"peekable");
}

#[tokio::test]
async fn peek_with_stream_id_is_forbidden() {
    let (_, router) = test_app();
    send(
        &router,
        Method::POST,
        &upload_uri("c", "&final=True"),
        b"x",
    )
    .await;
    let uri = format!("/c/c?version={VERSION}&delete=False&stream-id=whatever");
    assert_eq!(send(&router, Method::GET, &uri, b"").await.status(), 406);
}

#[tokio::test]
async fn put_after_final_is_forbidden() {
    let (_, router) = test_app();
    let resp = send(&router, Method::POST, &upload_uri("c", "&final=True"), b"x").await;
    let sid = header(&resp, "stream-id").unwrap();
    let uri = upload_uri("c", &format!("&final=True&stream-id={sid}"));
    assert_eq!(send(&router, Method::PUT, &uri, b"more").await.status(), 406);
}

#[tokio::test]
async fn stream_id_rules_on_upload() {
    let (_, router) = test_app();
    // POST must not carry a stream id.
    let uri = upload_uri("c", "&final=False&stream-id=nope");
    assert_eq!(send(&router, Method::POST, &uri, b"").await.status(), 422);
    // PUT must carry one.
    send(&router, Method::POST, &upload_uri("c", "&final=False"), b"").await;
    let uri = upload_uri("c", "&final=False");
    assert_eq!(send(&router, Method::PUT, &uri, b"x").await.status(), 422);
    // And it must match.
    let uri = upload_uri("c", "&final=False&stream-id=wrong");
    assert_eq!(send(&router, Method::PUT, &uri, b"x").await.status(), 409);
}

#[tokio::test]
async fn version_rules() {
    let (_, router) = test_app();
    // Too old for the server at all.
    let uri = "/c/c?version=1.0.0&encrypted=False&final=True";
    assert_eq!(send(&router, Method::POST, uri, b"x").await.status(), 426);
    // Mismatched reader version without override.
    send(&router, Method::POST, &upload_uri("c", "&final=True"), b"x").await;
    let uri = "/c/c?version=8.0.0&delete=True";
    assert_eq!(send(&router, Method::GET, uri, b"").await.status(), 412);
    // Override waves it through.
    let uri = "/c/c?version=8.0.0&delete=True&override=True";
    assert_eq!(send(&router, Method::GET, uri, b"").await.status(), 200);
}

#[tokio::test]
async fn web_client_reads_whole_pipe_but_not_encrypted() {
    let (_, router) = test_app();
    send(&router, Method::POST, &upload_uri("c", "&final=True"), b"plain").await;
    // No version parameter at all: the web sentinel.
    let resp = send(&router, Method::GET, "/c/c?delete=True", b"").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "final").unwrap(), "True");
    assert_eq!(&body_bytes(resp).await[..], b"plain");
    assert_eq!(
        send(&router, Method::GET, "/c/c?delete=True", b"")
            .await
            .status(),
        410
    );

    let uri = format!("/c/e?version={VERSION}&encrypted=True&final=True");
    send(&router, Method::POST, &uri, b"secret").await;
    assert_eq!(
        send(&router, Method::GET, "/c/e?delete=True", b"")
            .await
            .status(),
        422
    );
}

#[tokio::test]
async fn post_displaces_existing_stream() {
    let (_, router) = test_app();
    send(&router, Method::POST, &upload_uri("c", "&final=True"), b"old").await;
    send(&router, Method::POST, &upload_uri("c", "&final=True"), b"new").await;
    let resp = send(&router, Method::GET, &download_uri("c", ""), b"").await;
    assert_eq!(&body_bytes(resp).await[..], b"new");
}

#[tokio::test]
async fn delete_is_idempotent_and_respects_locks() {
    let (app, router) = test_app();
    assert_eq!(
        send(&router, Method::DELETE, "/c/none", b"").await.status(),
        204
    );

    send(&router, Method::POST, &upload_uri("c", "&final=True"), b"x").await;
    assert_eq!(
        send(&router, Method::DELETE, "/c/c", b"").await.status(),
        202
    );

    send(&router, Method::POST, &upload_uri("d", "&final=True"), b"x").await;
    app.state
        .lock()
        .unwrap()
        .streams
        .get_mut("d")
        .unwrap()
        .locked = true;
    assert_eq!(
        send(&router, Method::DELETE, "/c/d", b"").await.status(),
        423
    );
    app.state
        .lock()
        .unwrap()
        .streams
        .get_mut("d")
        .unwrap()
        .locked = false;
    assert_eq!(
        send(&router, Method::DELETE, "/c/d", b"").await.status(),
        202
    );
}

#[tokio::test]
async fn interleaved_writes_and_reads_preserve_order() {
    let (_, router) = test_app();

    let resp = send(&router, Method::POST, &upload_uri("c", "&final=False"), b"").await;
    let sid = header(&resp, "stream-id").unwrap();

    let blocks: [&[u8]; 4] = [b"alpha|", b"beta|", b"gamma|", b"delta"];
    let mut received = Vec::new();
    let mut read_sid: Option<String> = None;
    for (i, block) in blocks.iter().enumerate() {
        let last = i == blocks.len() - 1;
        let uri = upload_uri(
            "c",
            &format!("&final={}&stream-id={sid}", if last { "True" } else { "False" }),
        );
        assert_eq!(send(&router, Method::PUT, &uri, block).await.status(), 202);

        let rest = read_sid
            .as_ref()
            .map(|id| format!("&stream-id={id}"))
            .unwrap_or_default();
        let resp = send(&router, Method::GET, &download_uri("c", &rest), b"").await;
        assert_eq!(resp.status(), 200);
        assert_eq!(header(&resp, "final").unwrap() == "True", last);
        read_sid = header(&resp, "stream-id");
        received.extend_from_slice(&body_bytes(resp).await);
    }
    // Every block arrives exactly once, in order.
    assert_eq!(received, b"alpha|beta|gamma|delta");
}

#[tokio::test]
async fn put_ttl_rewrites_the_expiry() {
    let (_, router) = test_app();
    let resp = send(
        &router,
        Method::POST,
        &upload_uri("c", "&final=False&ttl=100000"),
        b"x",
    )
    .await;
    let sid = header(&resp, "stream-id").unwrap();

    let resp = send(&router, Method::GET, "/q/c", b"").await;
    let js: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let far = js["expiration"].as_str().unwrap().to_owned();

    let uri = upload_uri("c", &format!("&final=False&stream-id={sid}&ttl=10"));
    assert_eq!(send(&router, Method::PUT, &uri, b"").await.status(), 202);

    let resp = send(&router, Method::GET, "/q/c", b"").await;
    let js: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let near = js["expiration"].as_str().unwrap().to_owned();
    // RFC 3339 timestamps in UTC compare lexicographically.
    assert!(near < far, "{near} should expire before {far}");
}

#[tokio::test]
async fn query_reports_stream_state() {
    let (_, router) = test_app();
    assert_eq!(send(&router, Method::GET, "/q/c", b"").await.status(), 410);

    send(&router, Method::POST, &upload_uri("c", "&final=False"), b"abc").await;
    let resp = send(&router, Method::GET, "/q/c", b"").await;
    assert_eq!(resp.status(), 200);
    let js: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(js["new"], true);
    assert_eq!(js["upload_complete"], false);
    assert_eq!(js["size"], 3);
    assert_eq!(js["encrypted"], false);
    assert_eq!(js["version"], VERSION);
}

#[tokio::test]
async fn meta_routes() {
    let (_, router) = test_app();
    let resp = send(&router, Method::GET, "/version", b"").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(&body_bytes(resp).await[..], VERSION.as_bytes());

    let resp = send(&router, Method::GET, "/supported", b"").await;
    assert_eq!(resp.status(), 200);
    let js: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(js["min"], "6.3.0");
    assert_eq!(js["banned"], serde_json::json!([]));

    assert_eq!(send(&router, Method::GET, "/help", b"").await.status(), 200);
    assert_eq!(send(&router, Method::GET, "/", b"").await.status(), 200);
    assert_eq!(
        send(&router, Method::GET, "/nope", b"").await.status(),
        404
    );
}

#[tokio::test]
async fn shutdown_turns_requests_away() {
    let (app, router) = test_app();
    app.state.lock_for_shutdown().shutdown = true;
    let resp = send(&router, Method::GET, &download_uri("c", ""), b"").await;
    assert_eq!(resp.status(), 503);
}
