// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level integration specs.
//!
//! Exercise the bridge end to end against an in-process fake worker that
//! speaks the real wire protocol over loopback TCP.

mod specs {
    mod support;

    mod cancellation;
    mod cli;
    mod end_to_end;
    mod recovery;
}
