// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Length-prefixed framing over `MessageStream` (component C6, `FrameCodec`):
// a 4-byte big-endian length, then the `Codec<T>`-encoded payload. Read and
// write spins from `MessageStream` guarantee frames are never interleaved
// on the wire.

use crate::codec::Codec;
use crate::error::IpcError;
use crate::stream::MessageStream;

const LEN_PREFIX_BYTES: usize = 4;

/// Framing layer for typed messages over one `MessageStream`.
pub struct FrameCodec<'a> {
    stream: &'a MessageStream,
}

impl<'a> FrameCodec<'a> {
    pub fn new(stream: &'a MessageStream) -> Self {
        Self { stream }
    }

    /// Encodes `msg`, prepends its 4-byte big-endian length, and writes
    /// length then payload as two stream segments.
    pub fn write_frame<T>(&self, msg: &T, codec: &dyn Codec<T>) -> Result<(), IpcError> {
        let bytes = codec.encode(msg)?;
        let len = u32::try_from(bytes.len()).map_err(|_| IpcError::NoSpace {
            name: self.stream.name().to_string(),
            requested: bytes.len(),
        })?;

        self.stream
            .write(&len.to_be_bytes())
            .map_err(|e| to_no_space(e, &bytes))?;
        self.stream.write(&bytes).map_err(|e| to_no_space(e, &bytes))?;
        Ok(())
    }

    /// Reads one frame: accumulates 4 length bytes (zero-length frames are
    /// silently skipped and retried, matching the source's "0 means not
    /// yet" quirk — O3), then reads exactly `len` payload bytes and decodes
    /// them. Returns `Ok(None)` iff the stream closes before any bytes of
    /// a frame arrive.
    pub fn read_frame<T>(&self, codec: &dyn Codec<T>) -> Result<Option<T>, IpcError> {
        loop {
            let mut len_buf = [0u8; LEN_PREFIX_BYTES];
            match self.stream.read(&mut len_buf) {
                Ok(()) => {}
                Err(IpcError::Closed { .. }) => return Ok(None),
                Err(e) => return Err(e),
            }

            let len = u32::from_be_bytes(len_buf);
            if len == 0 {
                // Zero-length frame: legal no-op, reader skips and retries (O3).
                continue;
            }

            let mut payload = vec![0u8; len as usize];
            self.stream.read(&mut payload)?;
            return Ok(Some(codec.decode(&payload)?));
        }
    }
}

fn to_no_space(e: IpcError, bytes: &[u8]) -> IpcError {
    match e {
        IpcError::Timeout { name, .. } => IpcError::NoSpace {
            name,
            requested: bytes.len(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TextCodec;
    use crate::stream::StreamConfig;

    fn unique_name(prefix: &str) -> String {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        format!(
            "/ringmem_frame_test_{prefix}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn write_then_read_frame_round_trip_p6() {
        let name = unique_name("f1");
        let stream = MessageStream::open_or_create(&name, 512, 64, StreamConfig::default()).unwrap();
        let frame = FrameCodec::new(&stream);
        let codec = TextCodec;
        frame.write_frame(&"This is a test !".to_string(), &codec).unwrap();
        let got = frame.read_frame(&codec).unwrap().unwrap();
        assert_eq!(got, "This is a test !");
        stream.close();
    }

    #[test]
    fn read_frame_returns_none_when_closed_before_any_bytes() {
        let name = unique_name("f2");
        let stream = MessageStream::open_or_create(&name, 4, 16, StreamConfig::default()).unwrap();
        stream.close();
        let frame = FrameCodec::new(&stream);
        let codec = TextCodec;
        let got = frame.read_frame::<String>(&codec).unwrap();
        assert!(got.is_none());
    }
}
