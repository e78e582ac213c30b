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

//! The outermost framing: `kind(1) | len(3, big-endian) | payload(len)`.
//! [`PacketDecoder`] is an incremental decoder suited to a byte stream that
//! arrives in arbitrary chunks - it buffers a partial frame and yields
//! complete packets as soon as they are available.

use bytes::{Buf, Bytes, BytesMut, BufMut};

use crate::errors::{ProtoError, ProtoResult};
use crate::MAX_FRAME_LEN;

const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Handshake = 1,
    HandshakeAck = 2,
    Heartbeat = 3,
    Data = 4,
    Kick = 5,
}

impl PacketKind {
    fn from_byte(b: u8) -> ProtoResult<Self> {
        match b {
            1 => Ok(PacketKind::Handshake),
            2 => Ok(PacketKind::HandshakeAck),
            3 => Ok(PacketKind::Heartbeat),
            4 => Ok(PacketKind::Data),
            5 => Ok(PacketKind::Kick),
            other => Err(ProtoError::MalformedHeader(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(kind: PacketKind, payload: impl Into<Bytes>) -> Self {
        Packet { kind, payload: payload.into() }
    }

    pub fn handshake(payload: impl Into<Bytes>) -> Self {
        Packet::new(PacketKind::Handshake, payload)
    }

    pub fn handshake_ack() -> Self {
        Packet::new(PacketKind::HandshakeAck, Bytes::new())
    }

    pub fn heartbeat() -> Self {
        Packet::new(PacketKind::Heartbeat, Bytes::new())
    }

    pub fn data(payload: impl Into<Bytes>) -> Self {
        Packet::new(PacketKind::Data, payload)
    }

    pub fn kick(reason: impl Into<Bytes>) -> Self {
        Packet::new(PacketKind::Kick, reason)
    }

    /// Encode this packet onto `buf`, growing it as needed.
    pub fn encode(&self, buf: &mut BytesMut) -> ProtoResult<()> {
        let len = self.payload.len();
        if len > MAX_FRAME_LEN {
            return Err(ProtoError::OversizeFrame(len, MAX_FRAME_LEN));
        }
        buf.reserve(HEADER_LEN + len);
        buf.put_u8(self.kind as u8);
        buf.put_u8((len >> 16) as u8);
        buf.put_u8((len >> 8) as u8);
        buf.put_u8(len as u8);
        buf.put_slice(&self.payload);
        Ok(())
    }

    pub fn to_bytes(&self) -> ProtoResult<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Incremental decoder. Owns the trailing bytes of an in-progress frame
/// across calls to [`Self::push`].
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buf: BytesMut,
}

impl PacketDecoder {
    pub fn new() -> Self {
        PacketDecoder { buf: BytesMut::new() }
    }

    /// Feed newly-received bytes in and drain every complete packet they
    /// make available. Partial trailing bytes are retained for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> ProtoResult<Vec<Packet>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        loop {
            match self.try_decode_one()? {
                Some(packet) => out.push(packet),
                None => break,
            }
        }
        Ok(out)
    }

    fn try_decode_one(&mut self) -> ProtoResult<Option<Packet>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let kind_byte = self.buf[0];
        let len = ((self.buf[1] as usize) << 16) | ((self.buf[2] as usize) << 8) | (self.buf[3] as usize);
        if len > MAX_FRAME_LEN {
            return Err(ProtoError::OversizeFrame(len, MAX_FRAME_LEN));
        }
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        let kind = PacketKind::from_byte(kind_byte)?;
        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(len).freeze();
        Ok(Some(Packet { kind, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip_for_every_kind() {
        let packets = vec![
            Packet::handshake(Bytes::from_static(b"{}")),
            Packet::handshake_ack(),
            Packet::heartbeat(),
            Packet::data(Bytes::from_static(b"hello")),
            Packet::kick(Bytes::from_static(b"bye")),
        ];
        for p in packets {
            let bytes = p.to_bytes().unwrap();
            let mut dec = PacketDecoder::new();
            let decoded = dec.push(&bytes).unwrap();
            assert_eq!(decoded, vec![p]);
        }
    }

    #[test]
    fn push_handles_partial_frames_split_across_calls() {
        let p = Packet::data(Bytes::from_static(b"split-me"));
        let bytes = p.to_bytes().unwrap();
        let mut dec = PacketDecoder::new();
        let (first, second) = bytes.split_at(2);
        assert!(dec.push(first).unwrap().is_empty());
        let decoded = dec.push(second).unwrap();
        assert_eq!(decoded, vec![p]);
    }

    #[test]
    fn push_decodes_multiple_packets_in_one_chunk() {
        let a = Packet::heartbeat();
        let b = Packet::data(Bytes::from_static(b"x"));
        let mut buf = BytesMut::new();
        a.encode(&mut buf).unwrap();
        b.encode(&mut buf).unwrap();
        let mut dec = PacketDecoder::new();
        let decoded = dec.push(&buf).unwrap();
        assert_eq!(decoded, vec![a, b]);
    }

    #[test]
    fn unknown_kind_byte_is_malformed_header() {
        let mut dec = PacketDecoder::new();
        let err = dec.push(&[9, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtoError::MalformedHeader(9)));
    }

    #[test]
    fn oversize_frame_is_rejected_without_consuming_the_stream() {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketKind::Data as u8);
        let len = MAX_FRAME_LEN + 1;
        buf.put_u8((len >> 16) as u8);
        buf.put_u8((len >> 8) as u8);
        buf.put_u8(len as u8);
        let mut dec = PacketDecoder::new();
        let err = dec.push(&buf).unwrap_err();
        assert!(matches!(err, ProtoError::OversizeFrame(_, _)));
    }
}
