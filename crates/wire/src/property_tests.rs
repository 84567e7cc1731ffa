// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests for protocol serde roundtrips.
//!
//! Covers every variant of WorkerRequest and WorkerResponse with minimal
//! fixed field values, plus arbitrary envelope ids.

use proptest::prelude::*;
use std::collections::HashMap;
use wb_core::Method;

use crate::frame::{decode, encode};
use crate::message::*;

fn s() -> String {
    String::new()
}

fn all_requests() -> Vec<WorkerRequest> {
    vec![
        WorkerRequest::Hello { major: 1, minor: 0 },
        WorkerRequest::Execute { plugin: s(), method: Method::Get, data: HashMap::new() },
        WorkerRequest::ListPlugins,
        WorkerRequest::HealthCheck,
    ]
}

fn all_responses() -> Vec<WorkerResponse> {
    vec![
        WorkerResponse::Hello { major: 1, minor: 0 },
        WorkerResponse::Execute {
            status_code: 0,
            message: s(),
            data: HashMap::new(),
            error: None,
        },
        WorkerResponse::Plugins { plugins: vec![] },
        WorkerResponse::Health { status: s(), timestamp_ms: 0 },
        WorkerResponse::Error { code: s(), message: s() },
    ]
}

proptest! {
    #[test]
    fn request_envelope_roundtrip(
        id in any::<u64>(),
        body in proptest::sample::select(all_requests()),
    ) {
        let envelope = RequestEnvelope { id, body };
        let encoded = encode(&envelope).expect("encode");
        let decoded: RequestEnvelope = decode(&encoded).expect("decode");
        prop_assert_eq!(decoded, envelope);
    }

    #[test]
    fn response_envelope_roundtrip(
        id in any::<u64>(),
        body in proptest::sample::select(all_responses()),
    ) {
        let envelope = ResponseEnvelope { id, body };
        let encoded = encode(&envelope).expect("encode");
        let decoded: ResponseEnvelope = decode(&encoded).expect("decode");
        prop_assert_eq!(decoded, envelope);
    }

    #[test]
    fn execute_data_roundtrips_arbitrary_strings(
        data in proptest::collection::hash_map(".*", ".*", 0..8),
    ) {
        let req = WorkerRequest::Execute {
            plugin: "p".to_string(),
            method: Method::Post,
            data,
        };
        let encoded = encode(&req).expect("encode");
        let decoded: WorkerRequest = decode(&encoded).expect("decode");
        prop_assert_eq!(decoded, req);
    }
}
