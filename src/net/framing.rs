//! Length-prefixed JSON frames on a reliable stream
//!
//! Format: `[u32 little-endian length][JSON payload]`.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::net::protocol::{decode, encode, ClientMessage, DecodeError, EncodeError, ServerMessage};

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl FramingError {
    /// Whether the stream is unusable after this error
    ///
    /// Codec failures leave the stream aligned on a frame boundary.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FramingError::Decode(_) | FramingError::Encode(_))
    }
}

/// Read one frame
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed);
        }
        Err(e) => return Err(FramingError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }
    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::ConnectionClosed),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Write one frame and flush
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    data: &[u8],
) -> Result<(), FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }

    stream.write_all(&(data.len() as u32).to_le_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await?;

    Ok(())
}

/// Length prefix size on the wire
const HEADER_LEN: usize = 4;

/// Read and decode the next client message, with its size on the wire
///
/// A frame that fails to decode yields [`FramingError::Decode`]; the stream
/// stays aligned on the next frame.
pub async fn read_client_message<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<(ClientMessage, usize), FramingError> {
    let frame = read_message(stream).await?;
    let message = decode(&frame)?;
    Ok((message, frame.len() + HEADER_LEN))
}

/// Encode and write a server message, returning the bytes written
pub async fn write_server_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    message: &ServerMessage,
) -> Result<usize, FramingError> {
    let data = encode(message)?;
    write_message(stream, &data).await?;
    Ok(data.len() + HEADER_LEN)
}
