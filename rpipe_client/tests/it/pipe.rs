use crate::{config, start_server};
use rpipe_client::io::Prefetcher;
use rpipe_client::{ops, recv, send, ClientError};
use rpipe_server::admin::Admin;
use rpipe_wire::MAX_SOFT_SIZE_MIN;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

async fn push(conf: &rpipe_client::Config, data: &[u8]) -> u64 {
    let input = Prefetcher::preloaded(data.to_vec(), MAX_SOFT_SIZE_MIN);
    let opened = Arc::new(AtomicBool::new(false));
    send::send(conf, None, 3, input, &opened).await.unwrap()
}

async fn pull(conf: &rpipe_client::Config, peek: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let started = Arc::new(AtomicBool::new(false));
    recv::recv(conf, false, peek, false, &mut out, &started)
        .await
        .unwrap();
    out
}

#[tokio::test]
async fn hello_round_trip() {
    let (url, _) = start_server(Admin::new()).await;
    let conf = config(&url, "c", None);

    assert_eq!(push(&conf, b"hello").await, 5);
    assert_eq!(pull(&conf, false).await, b"hello");

    // The channel is gone afterwards.
    let err = pull_err(&conf).await;
    assert!(matches!(err, ClientError::NoData(_)));
}

async fn pull_err(conf: &rpipe_client::Config) -> ClientError {
    let mut out = Vec::new();
    let started = Arc::new(AtomicBool::new(false));
    recv::recv(conf, false, false, false, &mut out, &started)
        .await
        .unwrap_err()
}

#[tokio::test]
async fn encrypted_round_trip() {
    let (url, _) = start_server(Admin::new()).await;
    let conf = config(&url, "secret-chan", Some("hunter2"));

    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    assert_eq!(push(&conf, &data).await, data.len() as u64);
    assert_eq!(pull(&conf, false).await, data);
}

#[tokio::test]
async fn wrong_password_fails_decryption() {
    let (url, _) = start_server(Admin::new()).await;
    let conf = config(&url, "c", Some("right"));
    push(&conf, b"secret").await;

    let bad = config(&url, "c", Some("wrong"));
    let mut out = Vec::new();
    let started = Arc::new(AtomicBool::new(false));
    let err = recv::recv(&bad, false, false, false, &mut out, &started)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Other(_)));
}

#[tokio::test]
async fn encrypted_channel_needs_a_password() {
    let (url, _) = start_server(Admin::new()).await;
    let conf = config(&url, "c", Some("pw"));
    push(&conf, b"secret").await;

    let plain = config(&url, "c", None);
    let mut out = Vec::new();
    let started = Arc::new(AtomicBool::new(false));
    let err = recv::recv(&plain, false, false, false, &mut out, &started)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Usage(_)));
}

#[tokio::test]
async fn peek_leaves_the_stream() {
    let (url, _) = start_server(Admin::new()).await;
    let conf = config(&url, "c", None);
    push(&conf, b"stay").await;

    assert_eq!(pull(&conf, true).await, b"stay");
    assert_eq!(pull(&conf, true).await, b"stay");
    assert_eq!(pull(&conf, false).await, b"stay");
}

#[tokio::test]
async fn delete_clears_the_channel() {
    let (url, _) = start_server(Admin::new()).await;
    let conf = config(&url, "c", None);
    push(&conf, b"bytes").await;

    ops::delete(&conf).await.unwrap();
    assert!(matches!(pull_err(&conf).await, ClientError::NoData(_)));
    // Idempotent.
    ops::delete(&conf).await.unwrap();
}

#[tokio::test]
async fn query_reflects_the_stream() {
    let (url, _) = start_server(Admin::new()).await;
    let conf = config(&url, "c", None);

    let err = ops::query(&conf).await.unwrap_err();
    assert!(matches!(err, ClientError::NoData(_)));

    push(&conf, b"abcde").await;
    let answer = ops::query(&conf).await.unwrap();
    assert!(answer.new);
    assert!(answer.upload_complete);
    assert_eq!(answer.size, 5);
    assert!(!answer.encrypted);
}

#[tokio::test]
async fn server_version_and_supported() {
    let (url, _) = start_server(Admin::new()).await;
    let conf = config(&url, "", None);
    assert_eq!(ops::server_version(&conf).await.unwrap(), "9.12.1");
    assert!(ops::supported(&conf).await.unwrap());
    assert!(!ops::blocked(&conf).await.unwrap());
}

#[tokio::test]
async fn blocked_probe_sees_the_blocklist() {
    let (url, app) = start_server(Admin::new()).await;
    app.blocked.update(|d| {
        d.ip_blacklist.insert("127.0.0.1".to_owned());
    });
    let conf = config(&url, "", None);
    assert!(ops::blocked(&conf).await.unwrap());
}

#[tokio::test]
async fn consumed_stream_is_gone_server_side() {
    let (url, app) = start_server(Admin::new()).await;
    let conf = config(&url, "c", None);
    push(&conf, b"block").await;
    pull(&conf, false).await;
    assert!(app.state.lock().unwrap().streams.is_empty());
}
