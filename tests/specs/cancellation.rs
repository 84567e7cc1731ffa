// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-disconnect cancellation against a real listening server.

use super::support::bridge;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use wb_daemon::http::{router, serve};
use wb_engine::LogQuery;

#[tokio::test]
async fn client_disconnect_records_a_cancelled_outcome() {
    let spec = bridge().await;
    spec.worker.set_slow_delay(Duration::from_secs(5));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = tokio_util::sync::CancellationToken::new();
    let server = tokio::spawn(serve(listener, router(spec.app.clone()), shutdown.clone()));

    // Send a complete request for the slow handler, then slam the socket
    // shut before the reply.
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let body = "{}";
    let request = format!(
        "POST /v1/webhook/slow HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(stream);

    // Give the server a moment to observe the disconnect and drop the
    // handler future.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let events = spec.app.logs.query(&LogQuery::default());
        let cancelled = events.iter().any(|e| {
            e.handler_name.as_deref() == Some("slow") && e.message.contains("cancelled")
        });
        if cancelled {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no cancelled outcome was recorded; events: {events:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // No success counter increment for the cancelled call.
    let snapshot = spec.app.stats.snapshot();
    assert_eq!(snapshot.global.total_requests, 1);
    assert_eq!(snapshot.global.total_executions, 0);

    shutdown.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), server).await;
}
