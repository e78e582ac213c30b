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

use thiserror::Error;

pub type ProtoResult<T> = std::result::Result<T, ProtoError>;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("malformed packet header: kind byte {0}")]
    MalformedHeader(u8),

    #[error("frame of {0} bytes exceeds the {1} byte ceiling")]
    OversizeFrame(usize, usize),

    #[error("truncated frame, need {needed} bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    #[error("route parse error: {0}")]
    RouteParse(String),

    #[error("unknown route dictionary id {0}")]
    UnknownDictId(u16),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn serialize_failed(msg: impl ToString) -> ProtoError {
    ProtoError::Serialize(msg.to_string())
}

pub fn deserialize_failed(msg: impl ToString) -> ProtoError {
    ProtoError::Deserialize(msg.to_string())
}
