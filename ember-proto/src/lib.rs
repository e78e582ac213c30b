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

//! Wire-level building blocks: framed packets, the inner message codec, route
//! parsing and the pluggable payload serializer. Nothing in this crate knows
//! about sessions, actors or the network transport - it only turns bytes into
//! typed values and back.

pub mod errors;
pub mod packet;
pub mod message;
pub mod route;
pub mod dict;
pub mod serializer;

pub mod prelude {
    pub use crate::errors::{ProtoError, ProtoResult};
    pub use crate::packet::{Packet, PacketKind, PacketDecoder};
    pub use crate::message::{Message, MessageType};
    pub use crate::route::Route;
    pub use crate::dict::RouteDict;
    pub use crate::serializer::{decode_json, decode_proto, encode_json, encode_proto, SerializerKind};
}

/// Upper bound on a single packet's payload. Frames larger than this are a
/// protocol violation, not a resource-exhaustion retry case.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
