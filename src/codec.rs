// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Pluggable object serialization for `FrameCodec` payloads. `Codec<T>` is
// the seam spec.md asks for: a trait the caller supplies rather than a
// baked-in wire format. Two concrete tiers are provided — `BincodeCodec`
// (fast, the default) and `PostcardCodec` (portable fallback) — plus
// primitive specializations that bypass serde for raw bytes/text.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::IpcError;

/// Encode/decode one message payload to/from its wire bytes.
pub trait Codec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, IpcError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, IpcError>;
}

/// Fast binary codec backed by `bincode`. The default tier: attempted
/// first by callers that want the two-tier fast/portable contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<T> Codec<T> for BincodeCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, IpcError> {
        bincode::serialize(value).map_err(|e| IpcError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, IpcError> {
        bincode::deserialize(bytes).map_err(|e| IpcError::Serialization(e.to_string()))
    }
}

/// Portable fallback codec backed by `postcard`'s stable wire format.
/// Used when a caller opts into cross-version compatibility rather than
/// raw throughput.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardCodec;

impl<T> Codec<T> for PostcardCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, IpcError> {
        postcard::to_allocvec(value).map_err(|e| IpcError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, IpcError> {
        postcard::from_bytes(bytes).map_err(|e| IpcError::Serialization(e.to_string()))
    }
}

/// Primitive specialization: raw bytes, bypassing serde entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, IpcError> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, IpcError> {
        Ok(bytes.to_vec())
    }
}

/// Primitive specialization: UTF-8 text, bypassing serde entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec<String> for TextCodec {
    fn encode(&self, value: &String) -> Result<Vec<u8>, IpcError> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, IpcError> {
        String::from_utf8(bytes.to_vec()).map_err(|e| IpcError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Timestamp {
        seconds: i64,
        millis: u16,
    }

    #[test]
    fn bincode_round_trip() {
        let codec = BincodeCodec;
        let v = Timestamp {
            seconds: 1_704_164_645,
            millis: 0,
        };
        let bytes = Codec::<Timestamp>::encode(&codec, &v).unwrap();
        let back: Timestamp = codec.decode(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn postcard_round_trip() {
        let codec = PostcardCodec;
        let v = Timestamp {
            seconds: 1_704_164_645,
            millis: 0,
        };
        let bytes = Codec::<Timestamp>::encode(&codec, &v).unwrap();
        let back: Timestamp = codec.decode(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn text_codec_round_trip() {
        let codec = TextCodec;
        let s = "This is a test !".to_string();
        let bytes = codec.encode(&s).unwrap();
        let back = codec.decode(&bytes).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn bytes_codec_round_trip() {
        let codec = BytesCodec;
        let v = vec![1u8, 2, 3, 4, 5];
        let bytes = codec.encode(&v).unwrap();
        let back = codec.decode(&bytes).unwrap();
        assert_eq!(v, back);
    }
}
