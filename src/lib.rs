// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Shared-memory circular-buffer message streams for same-host IPC.
//
// A `CircularBuffer` maps a named region of shared memory and exposes a
// single-writer/single-reader ring of fixed-size nodes (component C2).
// `MessageStream` (C5) wraps one buffer as a byte stream with per-direction
// mutual exclusion (`NamedSpin`, C3) and configurable timeouts. `FrameCodec`
// (C6) adds length-prefixed message framing and pluggable `Codec<T>`
// serialization (C4). `Connection<R, W>` (C7) pairs two streams — one per
// direction — into a full-duplex, event-driven channel with background
// pump threads. `server::Listener` (C8) implements the four-step handshake
// rendezvous a well-known buffer name uses to hand out fresh per-connection
// buffer names.

pub mod shm_name;

mod platform;

pub mod mmap;
pub use mmap::{MmapRegion, ShmOpenMode};

pub mod ring;
pub use ring::CircularBuffer;

pub mod spin;
pub use spin::{NamedSpin, SpinGuard};

pub mod stream;
pub use stream::{MessageStream, StreamConfig};

pub mod codec;
pub use codec::{BincodeCodec, BytesCodec, Codec, PostcardCodec, TextCodec};

pub mod frame;
pub use frame::FrameCodec;

pub mod connection;
pub use connection::{Connection, ConnectionConfig, ConnState, Role};

pub mod server;
pub use server::{rendezvous_connect, Listener, ServiceDirectory};

mod error;
pub use error::{IpcError, Result};
