// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Byte-stream facade over `CircularBuffer` (component C5, `MessageStream`):
// enforces per-direction mutual exclusion via `NamedSpin` and exposes
// `read`/`write` with configurable timeouts.

use std::time::{Duration, Instant};

use crate::error::IpcError;
use crate::ring::CircularBuffer;
use crate::spin::{NamedSpin, DEFAULT_ACQUIRE_TIMEOUT_MS};

/// Default per-direction read/write timeout (spec §6).
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 1000;

/// Tunable knobs for a `MessageStream`; defaults match spec §6's recognized
/// configuration set.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub spin_acquire_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            spin_acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl StreamConfig {
    pub fn with_read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout_ms = d.as_millis() as u64;
        self
    }

    pub fn with_write_timeout(mut self, d: Duration) -> Self {
        self.write_timeout_ms = d.as_millis() as u64;
        self
    }

    pub fn with_spin_acquire_timeout(mut self, d: Duration) -> Self {
        self.spin_acquire_timeout_ms = d.as_millis() as u64;
        self
    }
}

/// A byte-stream adapter over one `CircularBuffer`, owning two spin names
/// (`<name>_read`, `<name>_write`) so independent streams never contend on
/// the same `NamedSpin` entry.
pub struct MessageStream {
    buffer: CircularBuffer,
    spin: NamedSpin,
    read_spin_name: String,
    write_spin_name: String,
    config: StreamConfig,
}

impl MessageStream {
    pub fn open_or_create(
        name: &str,
        node_count: u32,
        node_size: u32,
        config: StreamConfig,
    ) -> Result<Self, IpcError> {
        let buffer = CircularBuffer::open_or_create(name, node_count, node_size)?;
        Ok(Self {
            buffer,
            spin: NamedSpin::new(),
            read_spin_name: format!("{name}_read"),
            write_spin_name: format!("{name}_write"),
            config,
        })
    }

    pub fn from_buffer(buffer: CircularBuffer, config: StreamConfig) -> Self {
        let read_spin_name = format!("{}_read", buffer.name());
        let write_spin_name = format!("{}_write", buffer.name());
        Self {
            buffer,
            spin: NamedSpin::new(),
            read_spin_name,
            write_spin_name,
            config,
        }
    }

    /// Writes all of `buf`, acquiring the write spin for the duration of
    /// the call. Loops on `CircularBuffer::write` until every byte is
    /// written, the buffer reports closed, or `write_timeout_ms` elapses.
    pub fn write(&self, buf: &[u8]) -> Result<(), IpcError> {
        let _guard = self
            .spin
            .scoped(&self.write_spin_name, self.config.spin_acquire_timeout_ms)
            .ok_or_else(|| IpcError::Timeout {
                name: self.write_spin_name.clone(),
                timeout_ms: self.config.spin_acquire_timeout_ms,
            })?;

        let deadline = Instant::now() + Duration::from_millis(self.config.write_timeout_ms);
        let mut written = 0usize;
        while written < buf.len() {
            let remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64;
            match self.buffer.write(&buf[written..], remaining_ms.max(1)) {
                Ok(n) => {
                    written += n as usize;
                    if n == 0 && Instant::now() >= deadline {
                        return Err(IpcError::Timeout {
                            name: self.buffer.name().to_string(),
                            timeout_ms: self.config.write_timeout_ms,
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fills `buf` entirely, acquiring the read spin for the duration of
    /// the call. Zero bytes from one underlying `read` call on an open
    /// buffer is a legal "no data yet" outcome; this loops until `buf` is
    /// full, the buffer closes, or `read_timeout_ms` elapses overall.
    pub fn read(&self, buf: &mut [u8]) -> Result<(), IpcError> {
        let _guard = self
            .spin
            .scoped(&self.read_spin_name, self.config.spin_acquire_timeout_ms)
            .ok_or_else(|| IpcError::Timeout {
                name: self.read_spin_name.clone(),
                timeout_ms: self.config.spin_acquire_timeout_ms,
            })?;

        let deadline = Instant::now() + Duration::from_millis(self.config.read_timeout_ms);
        let mut filled = 0usize;
        while filled < buf.len() {
            let remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64;
            match self.buffer.read(&mut buf[filled..], remaining_ms.max(1)) {
                Ok(n) => {
                    filled += n as usize;
                    if n == 0 && Instant::now() >= deadline {
                        return Err(IpcError::Timeout {
                            name: self.buffer.name().to_string(),
                            timeout_ms: self.config.read_timeout_ms,
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// No-op: the ring advances cursors on every node, there is no
    /// separate buffered-write state to force out.
    pub fn flush(&self) {}

    pub fn close(&self) {
        self.buffer.close();
    }

    /// O1: returns `true` iff the underlying buffer is closed (the
    /// source's inverted `!ShuttingDown` reading is not replicated).
    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }

    /// O2: best-effort, non-blocking hint that the ring has fully drained
    /// back to empty. Never required for correctness.
    pub fn drain_hint(&self) -> bool {
        self.buffer.free_node_count() == self.buffer.node_count() - 1
    }

    pub fn name(&self) -> &str {
        self.buffer.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(prefix: &str) -> String {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        format!(
            "/ringmem_stream_test_{prefix}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn write_then_read_round_trip() {
        let name = unique_name("s1");
        let stream = MessageStream::open_or_create(&name, 512, 32, StreamConfig::default()).unwrap();
        stream.write(b"This is a test !").unwrap();
        let mut dst = vec![0u8; "This is a test !".len()];
        stream.read(&mut dst).unwrap();
        assert_eq!(dst, b"This is a test !");
        stream.close();
    }

    #[test]
    fn close_propagates_to_buffer() {
        let name = unique_name("s2");
        let stream = MessageStream::open_or_create(&name, 4, 8, StreamConfig::default()).unwrap();
        stream.close();
        assert!(stream.is_closed());
    }
}
