/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! The payload serializer that turns typed argument/result values into the
//! bytes carried by a [`crate::message::Message`]. The kind actually in use
//! is negotiated once, in the handshake response, and is fixed for the
//! lifetime of a connector - see `sys.serializer` in the handshake payload.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::{deserialize_failed, serialize_failed, ProtoResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerKind {
    Json,
    Protobuf,
}

impl SerializerKind {
    /// The name reported in the handshake payload's `sys.serializer` field.
    /// Must always reflect the serializer actually configured - never a
    /// hardcoded default - see the design notes on the fixed serializer-name
    /// mismatch.
    pub fn name(self) -> &'static str {
        match self {
            SerializerKind::Json => "json",
            SerializerKind::Protobuf => "protobuf",
        }
    }
}

/// Encode a serde-compatible value as JSON bytes.
pub fn encode_json<T: Serialize>(value: &T) -> ProtoResult<Bytes> {
    serde_json::to_vec(value).map(Bytes::from).map_err(serialize_failed)
}

/// Decode JSON bytes into a serde-compatible value.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> ProtoResult<T> {
    serde_json::from_slice(bytes).map_err(deserialize_failed)
}

/// Encode a protobuf message. Used for the cluster RPC envelope and for
/// game payloads when the negotiated serializer is `protobuf`.
pub fn encode_proto<T: prost::Message>(value: &T) -> ProtoResult<Bytes> {
    let mut buf = Vec::with_capacity(value.encoded_len());
    value.encode(&mut buf).map_err(serialize_failed)?;
    Ok(Bytes::from(buf))
}

pub fn decode_proto<T: prost::Message + Default>(bytes: &[u8]) -> ProtoResult<T> {
    T::decode(bytes).map_err(deserialize_failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Ping {
        n: u32,
    }

    #[test]
    fn json_round_trips() {
        let p = Ping { n: 7 };
        let bytes = encode_json(&p).unwrap();
        let decoded: Ping = decode_json(&bytes).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn serializer_kind_name_matches_handshake_vocabulary() {
        assert_eq!(SerializerKind::Json.name(), "json");
        assert_eq!(SerializerKind::Protobuf.name(), "protobuf");
    }
}
