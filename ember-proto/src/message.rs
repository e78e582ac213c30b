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

//! The inner message carried inside a Data packet's payload:
//! `type(1) | id(varint, omitted for Notify/Push) | route(string or dict id) | body`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{ProtoError, ProtoResult};
use crate::route::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request = 0,
    Notify = 1,
    Response = 2,
    Push = 3,
}

impl MessageType {
    fn from_bits(b: u8) -> ProtoResult<Self> {
        match b {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Notify),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::Push),
            other => Err(ProtoError::Deserialize(format!("unknown message type bits {other}"))),
        }
    }

    fn carries_id(self) -> bool {
        matches!(self, MessageType::Request | MessageType::Response)
    }
}

/// A message's route is either the dotted string form or a dictionary id
/// negotiated during the handshake - never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRef {
    Named(String),
    Dict(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MessageType,
    pub id: u32,
    pub route: RouteRef,
    pub data: Bytes,
}

const DICT_FLAG: u8 = 0b1000;

impl Message {
    pub fn request(id: u32, route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Message { msg_type: MessageType::Request, id, route: RouteRef::Named(route.into()), data: data.into() }
    }

    pub fn notify(route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Message { msg_type: MessageType::Notify, id: 0, route: RouteRef::Named(route.into()), data: data.into() }
    }

    pub fn response(id: u32, route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Message { msg_type: MessageType::Response, id, route: RouteRef::Named(route.into()), data: data.into() }
    }

    pub fn push(route: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Message { msg_type: MessageType::Push, id: 0, route: RouteRef::Named(route.into()), data: data.into() }
    }

    /// Resolve this message's route to its dotted-string form, consulting
    /// `dict` only when the wire form used a dictionary id.
    pub fn route_str<'a>(&'a self, dict: &'a crate::dict::RouteDict) -> ProtoResult<&'a str> {
        match &self.route {
            RouteRef::Named(s) => Ok(s.as_str()),
            RouteRef::Dict(id) => dict.route_of(*id),
        }
    }

    pub fn parsed_route(&self, dict: &crate::dict::RouteDict) -> ProtoResult<Route> {
        Route::parse(self.route_str(dict)?)
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        let dict_flag = matches!(self.route, RouteRef::Dict(_));
        let type_byte = (self.msg_type as u8) | if dict_flag { DICT_FLAG } else { 0 };
        buf.put_u8(type_byte);

        if self.msg_type.carries_id() {
            put_varint(&mut buf, self.id);
        }

        match &self.route {
            RouteRef::Named(s) => {
                let bytes = s.as_bytes();
                buf.put_u8(bytes.len() as u8);
                buf.put_slice(bytes);
            }
            RouteRef::Dict(id) => {
                buf.put_u16(*id);
            }
        }

        buf.put_slice(&self.data);
        buf
    }

    pub fn decode(mut buf: Bytes) -> ProtoResult<Message> {
        if buf.is_empty() {
            return Err(ProtoError::Deserialize("empty message buffer".into()));
        }
        let type_byte = buf.get_u8();
        let dict_flag = type_byte & DICT_FLAG != 0;
        let msg_type = MessageType::from_bits(type_byte & !DICT_FLAG)?;

        let id = if msg_type.carries_id() { get_varint(&mut buf)? } else { 0 };

        let route = if dict_flag {
            if buf.remaining() < 2 {
                return Err(ProtoError::Deserialize("truncated dict route id".into()));
            }
            RouteRef::Dict(buf.get_u16())
        } else {
            if buf.remaining() < 1 {
                return Err(ProtoError::Deserialize("truncated route length".into()));
            }
            let len = buf.get_u8() as usize;
            if buf.remaining() < len {
                return Err(ProtoError::Deserialize("truncated route string".into()));
            }
            let route_bytes = buf.split_to(len);
            let s = String::from_utf8(route_bytes.to_vec())
                .map_err(|e| ProtoError::Deserialize(format!("non-utf8 route: {e}")))?;
            RouteRef::Named(s)
        };

        Ok(Message { msg_type, id, route, data: buf })
    }
}

fn put_varint(buf: &mut BytesMut, mut v: u32) {
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if v == 0 {
            break;
        }
    }
}

fn get_varint(buf: &mut Bytes) -> ProtoResult<u32> {
    let mut result: u32 = 0;
    let mut shift = 0u32;
    loop {
        if buf.remaining() < 1 {
            return Err(ProtoError::Deserialize("truncated varint".into()));
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 32 {
            return Err(ProtoError::Deserialize("varint too long".into()));
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_with_id_and_named_route() {
        let m = Message::request(42, "game.chat.send", Bytes::from_static(b"hi"));
        let encoded = m.encode().freeze();
        let decoded = Message::decode(encoded).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn notify_and_push_omit_the_id_on_the_wire() {
        let notify = Message::notify("game.chat.tick", Bytes::new());
        let encoded = notify.encode();
        // type byte + route len byte + route bytes, no id byte
        assert_eq!(encoded.len(), 1 + 1 + "game.chat.tick".len());
        let decoded = Message::decode(encoded.freeze()).unwrap();
        assert_eq!(decoded.id, 0);
        assert_eq!(decoded.msg_type, MessageType::Notify);
    }

    #[test]
    fn dict_route_round_trips_and_resolves_through_the_dictionary() {
        let mut dict = crate::dict::RouteDict::new();
        let id = dict.intern("game.chat.send".to_string());
        let m = Message { msg_type: MessageType::Notify, id: 0, route: RouteRef::Dict(id), data: Bytes::new() };
        let encoded = m.encode().freeze();
        let decoded = Message::decode(encoded).unwrap();
        assert_eq!(decoded.route, RouteRef::Dict(id));
        assert_eq!(decoded.route_str(&dict).unwrap(), "game.chat.send");
    }

    #[test]
    fn varint_round_trips_across_the_byte_boundary() {
        for v in [0u32, 1, 127, 128, 300, 16384, u32::MAX] {
            let mut buf = BytesMut::new();
            put_varint(&mut buf, v);
            let mut bytes = buf.freeze();
            assert_eq!(get_varint(&mut bytes).unwrap(), v);
        }
    }

    #[test]
    fn decoding_an_empty_buffer_is_an_error() {
        assert!(Message::decode(Bytes::new()).is_err());
    }
}
