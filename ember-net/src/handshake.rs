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

//! Builds the immutable, precomputed Handshake response and Heartbeat
//! frames a connector sends for the lifetime of its process. Both are
//! computed once at connector construction - see the design notes on
//! immutable precomputed bytes under the concurrency model.

use std::collections::HashMap;
use std::io::Write;

use bytes::Bytes;
use ember_proto::packet::Packet;
use ember_proto::serializer::SerializerKind;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::errors::NetResult;

#[derive(Serialize)]
struct SysBlock {
    heartbeat: u32,
    dict: Option<HashMap<String, u16>>,
    serializer: &'static str,
}

#[derive(Serialize)]
struct HandshakeBody {
    code: u32,
    sys: SysBlock,
}

/// Build the Handshake response packet's wire bytes once, deflating the
/// JSON body when that shrinks it. The `serializer` field always reflects
/// the serializer actually in use (see the open-question decision in
/// DESIGN.md) rather than a hardcoded name.
pub fn build_handshake_packet(
    heartbeat_secs: u32,
    dict: Option<HashMap<String, u16>>,
    serializer: SerializerKind,
    data_compression: bool,
) -> NetResult<Bytes> {
    let body = HandshakeBody { code: 200, sys: SysBlock { heartbeat: heartbeat_secs, dict, serializer: serializer.name() } };
    let mut data = serde_json::to_vec(&body).map_err(|e| ember_proto::errors::ProtoError::Serialize(e.to_string()))?;

    if data_compression {
        if let Ok(compressed) = deflate(&data) {
            if compressed.len() < data.len() {
                data = compressed;
            }
        }
    }

    Ok(Packet::handshake(data).to_bytes()?)
}

pub fn heartbeat_packet_bytes() -> NetResult<Bytes> {
    Ok(Packet::heartbeat().to_bytes()?)
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_packet_decodes_back_to_an_expected_json_body() {
        let bytes = build_handshake_packet(30, None, SerializerKind::Json, false).unwrap();
        let mut dec = ember_proto::packet::PacketDecoder::new();
        let packets = dec.push(&bytes).unwrap();
        assert_eq!(packets.len(), 1);
        let v: serde_json::Value = serde_json::from_slice(&packets[0].payload).unwrap();
        assert_eq!(v["code"], 200);
        assert_eq!(v["sys"]["heartbeat"], 30);
        assert_eq!(v["sys"]["serializer"], "json");
    }

    #[test]
    fn compression_is_skipped_when_it_does_not_shrink_the_body() {
        // a tiny body typically doesn't compress smaller once deflate's own
        // framing overhead is included; either way this must still decode.
        let bytes = build_handshake_packet(30, None, SerializerKind::Json, true).unwrap();
        let mut dec = ember_proto::packet::PacketDecoder::new();
        assert_eq!(dec.push(&bytes).unwrap().len(), 1);
    }
}
