// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One live connection: writer task, reader task, pending-call routing.

use super::Shared;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use wb_wire::{read_frame_unbounded, write_frame, RequestEnvelope, ResponseEnvelope, WorkerResponse};

/// One submitted call: the frame to write and where to send its reply.
pub(super) struct Outbound {
    pub envelope: RequestEnvelope,
    pub reply: oneshot::Sender<WorkerResponse>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<WorkerResponse>>>>;

/// Drive one connection until it breaks, a reconnect is forced, or the
/// channel shuts down. Returns the human-readable reason.
///
/// In-flight calls are failed by dropping their reply senders; callers
/// observe the drop as `Unavailable { submitted: true }`. A call whose
/// sender was registered here may already be on the wire, so the
/// dispatcher's idempotent retry is not allowed for it.
pub(super) async fn run_connection(
    shared: &Shared,
    stream: TcpStream,
    mut calls: mpsc::Receiver<Outbound>,
) -> String {
    let (mut read_half, mut write_half) = stream.into_split();
    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

    let writer_pending = Arc::clone(&pending);
    let writer = async move {
        while let Some(Outbound { envelope, reply }) = calls.recv().await {
            let id = envelope.id;
            writer_pending.lock().insert(id, reply);
            if let Err(e) = write_frame(&mut write_half, &envelope, WRITE_TIMEOUT).await {
                // Drop the reply sender so the caller fails immediately.
                writer_pending.lock().remove(&id);
                return format!("write failed: {e}");
            }
        }
        // Channel closing; nothing more to write.
        String::from("submit queue closed")
    };

    let reader_pending = Arc::clone(&pending);
    let reader = async move {
        loop {
            match read_frame_unbounded::<_, ResponseEnvelope>(&mut read_half).await {
                Ok(ResponseEnvelope { id, body }) => {
                    let Some(reply) = reader_pending.lock().remove(&id) else {
                        tracing::debug!(id, "reply for unknown call id (deadline passed?)");
                        continue;
                    };
                    // A dropped receiver means the caller gave up; fine.
                    let _ = reply.send(body);
                }
                Err(e) => return format!("read failed: {e}"),
            }
        }
    };

    let reason = tokio::select! {
        reason = writer => reason,
        reason = reader => reason,
        _ = shared.redial.notified() => String::from("reconnect requested"),
        _ = shared.shutdown.cancelled() => String::from("shutdown"),
    };

    // Fail every in-flight call by dropping its sender.
    pending.lock().clear();
    reason
}

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
