//! Length-prefixed JSON framing over a Unix domain socket
//! (`read_frame`/`write_frame`), supporting a multi-message-per-request
//! stream: any number of `Frame`s may flow in either direction before the
//! terminal `Frame::Status`.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Generous ceiling for a single frame — large enough for a `list`/`find`
/// reply over a big fleet, small enough to bound a malicious/corrupt
/// length prefix.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .context("reading frame length")?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        anyhow::bail!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})");
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.context("reading frame body")?;
    Ok(buf)
}

pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    let len = (data.len() as u32).to_be_bytes();
    writer.write_all(&len).await.context("writing frame length")?;
    writer.write_all(data).await.context("writing frame body")?;
    writer.flush().await.context("flushing frame")?;
    Ok(())
}

/// Serialize and send any `Frame` (or handshake message); generic over
/// the payload type so the same framing carries the pre-authentication
/// cert handshake and the post-handshake `Frame` stream.
pub async fn send_message<W: AsyncWriteExt + Unpin, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let data = serde_json::to_vec(message).context("serializing message")?;
    write_frame(writer, &data).await
}

pub async fn recv_message<R: AsyncReadExt + Unpin, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let data = read_frame(reader).await?;
    serde_json::from_slice(&data).context("deserializing message")
}
