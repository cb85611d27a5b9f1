#[path = "helpers/mod.rs"]
mod helpers;

use cairn_core::models::{FileKind, UploadMetadata};
use cairn_core::{AppError, StoreConfig};
use helpers::{setup_store, setup_store_with, test_config};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one canned HTTP response on a local port and return the base URL.
async fn serve_once(status: &'static str, content_type: &'static str, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 4096];
        let _ = socket.read(&mut request).await;
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            content_type,
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_upload_from_url_uses_remote_name_and_type() {
    let ctx = setup_store();
    let base = serve_once("200 OK", "text/plain; charset=utf-8", b"hello from afar").await;

    let outcome = ctx
        .store
        .upload_from_url(&format!("{}/docs/greeting.txt", base), UploadMetadata::default())
        .await
        .unwrap();
    let record = outcome.record();

    assert_eq!(record.original_name, "greeting.txt");
    assert_eq!(record.content_type, "text/plain");
    assert_eq!(record.kind(), FileKind::Document);
    assert_eq!(record.size_bytes, 15);
}

#[tokio::test]
async fn test_upload_from_url_rejects_error_status() {
    let ctx = setup_store();
    let base = serve_once("404 Not Found", "text/plain", b"missing").await;

    let err = ctx
        .store
        .upload_from_url(&format!("{}/nope.txt", base), UploadMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_upload_from_url_rejects_bad_urls() {
    let ctx = setup_store();
    for url in ["not a url", "ftp://example.com/file.txt", "file:///etc/passwd"] {
        let err = ctx
            .store
            .upload_from_url(url, UploadMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)), "{}", url);
    }
}

#[tokio::test]
async fn test_upload_from_url_times_out_before_taking_a_permit() {
    let ctx = setup_store_with(StoreConfig {
        url_fetch_timeout_secs: 1,
        ..test_config()
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // Accept and then never answer.
    let hold = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
    });

    let started = std::time::Instant::now();
    let err = ctx
        .store
        .upload_from_url(&format!("http://{}/slow.txt", addr), UploadMetadata::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Timeout(_)), "got {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(
        ctx.store.admission().available(),
        ctx.store.admission().limit()
    );
    assert!(ctx.store.locks().is_empty());
    hold.abort();
}
