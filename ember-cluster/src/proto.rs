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

//! The cluster RPC envelope. Hand-derived `prost::Message` structs - there
//! is no `.proto` file and no `tonic-build` step, just the derive macro
//! applied directly to plain Rust structs, the way a small internal RPC
//! surface is usually wired up without a schema registry.
//!
//! `correlation_id` on [`Response`] has no counterpart in the client-facing
//! wire message (`ember-proto`'s `Message` carries its own id instead); it
//! exists purely so one TCP connection can carry many requests in flight at
//! once and still demultiplex replies that complete out of order.

#[derive(Clone, PartialEq, Default, ::prost::Message)]
pub struct Request {
    #[prost(string, tag = "1")]
    pub source: String,
    #[prost(string, tag = "2")]
    pub target: String,
    #[prost(string, tag = "3")]
    pub func_name: String,
    #[prost(bytes = "vec", tag = "4")]
    pub args: Vec<u8>,
    /// 0 means fire-and-forget: the server must still deliver the call but
    /// owes no `Response` frame back.
    #[prost(uint64, tag = "5")]
    pub correlation_id: u64,
}

#[derive(Clone, PartialEq, Default, ::prost::Message)]
pub struct Response {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub correlation_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn request_round_trips_through_prost() {
        let req = Request { source: "a/player/1".into(), target: "b/player/2".into(), func_name: "heal".into(), args: vec![1, 2, 3], correlation_id: 7 };
        let bytes = req.encode_to_vec();
        let decoded = Request::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_round_trips_through_prost() {
        let resp = Response { code: 0, data: vec![9, 9], correlation_id: 42 };
        let bytes = resp.encode_to_vec();
        let decoded = Response::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, resp);
    }
}
