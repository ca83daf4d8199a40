// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Error kinds for the ring, stream, framing and connection layers. Each
// variant corresponds to one of the error kinds named in the design:
// CLOSED, TIMEOUT, NO_SPACE, INCOMPATIBLE, SERIALIZATION, IO.

use std::io;

use thiserror::Error;

/// Unified error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The peer or this side has set `shutting_down`; expected at end of life.
    #[error("ring '{name}' is closed")]
    Closed { name: String },

    /// A read/write/acquire deadline elapsed without progress. Recoverable.
    #[error("operation on '{name}' timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    /// A write could not fit its payload within the deadline.
    #[error("no space to write {requested} bytes into '{name}'")]
    NoSpace { name: String, requested: usize },

    /// Region magic/version mismatch. Fatal; fails construction.
    #[error("'{name}' is incompatible: expected magic {expected_magic:#x} version {expected_version}, found {found_magic:#x} version {found_version}")]
    Incompatible {
        name: String,
        expected_magic: u32,
        expected_version: u32,
        found_magic: u32,
        found_version: u32,
    },

    /// Codec encode/decode failure. Non-fatal for a pump; routed to `on_error`.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Unexpected map/read/write failure. Fatal for the connection.
    #[error("io error on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl IpcError {
    /// `true` for errors a caller should treat as recoverable by retrying
    /// (`Timeout`) as opposed to tearing down the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IpcError::Timeout { .. })
    }

    /// `true` for errors that should close the connection rather than
    /// merely being logged and skipped by a pump iteration. `Closed` is
    /// fatal despite being "recoverable" in the retry sense: a mid-frame
    /// close must tear the connection down immediately and report via
    /// `on_disconnect`, not `on_error` (spec: "reported to `on_disconnect`
    /// once").
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::Closed { .. } | IpcError::Incompatible { .. } | IpcError::Io { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, IpcError>;
