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

//! Wire framing for the cluster RPC connection: an 8-byte big-endian length
//! prefix followed by a length-delimited `prost::Message`. This is the
//! same convention `ractor_cluster`'s node session uses, just with a plain
//! function pair instead of an actor wrapped around the socket.

use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub async fn write_frame<W: AsyncWrite + Unpin, M: Message>(writer: &mut W, msg: &M) -> std::io::Result<()> {
    let body = msg.encode_to_vec();
    let len = body.len() as u64;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Reads one length-prefixed frame, returning `Ok(None)` on a clean EOF at
/// the frame boundary (the peer closed the connection between frames).
pub async fn read_frame<R: AsyncRead + Unpin, M: Message + Default>(reader: &mut R) -> std::io::Result<Option<M>> {
    let mut len_buf = [0u8; 8];
    match read_n_bytes(reader, &mut len_buf).await {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u64::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("cluster frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte ceiling")));
    }
    let mut body = vec![0u8; len];
    if !read_n_bytes(reader, &mut body).await? {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed mid-frame"));
    }
    let msg = M::decode(body.as_slice()).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(Some(msg))
}

/// Loops `read()` until `buf` is full or the stream ends. Returns `Ok(false)`
/// only when zero bytes were read at all (a clean EOF at a frame boundary);
/// a partial read followed by EOF is a hard error.
async fn read_n_bytes<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 { Ok(false) } else { Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed mid-frame")) };
        }
        filled += n;
    }
    Ok(true)
}
