//! Network Module
//!
//! Handles TCP (optionally TLS) communication between nodes and clients.

mod server;
mod client;
pub mod tls;

pub use server::{CallHandler, NetworkServer};
pub use client::{AckStream, ChunkReply, GetStream, NetworkClient, PublishStream};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::replication::{FrameHeader, Message};
use crate::error::{Error, Result};

/// Byte stream a connection runs over (plain TCP, TLS, or in-memory in tests)
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Read a framed message from a reader
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    // Read header
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::from_bytes(&header_bytes);

    let length = header.length as usize;
    if length > FrameHeader::MAX_BODY {
        return Err(Error::FrameTooLarge(length));
    }

    // Read body
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    // Verify checksum
    let computed_checksum = crc32fast::hash(&body);
    if computed_checksum != header.checksum {
        return Err(Error::Network("Message checksum mismatch".into()));
    }

    let message = Message::deserialize(&body)?;
    Ok(message)
}

/// Write a framed message to a writer
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<()> {
    let body = message.serialize()?;
    if body.len() > FrameHeader::MAX_BODY {
        return Err(Error::FrameTooLarge(body.len()));
    }
    let header = FrameHeader::new(&body);

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}

/// One call's connection: a framed message stream with its peer address
pub struct Connection {
    stream: Box<dyn AsyncStream>,
    peer: String,
}

impl Connection {
    /// Wrap a stream
    pub fn new(stream: impl AsyncStream + 'static, peer: impl Into<String>) -> Self {
        Self {
            stream: Box::new(stream),
            peer: peer.into(),
        }
    }

    /// Remote address (for logging)
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        tracing::trace!("Sending {} to {}", message.type_name(), self.peer);
        write_message(&mut self.stream, message).await
    }

    /// Receive the next message, or `None` if the peer closed cleanly
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match read_message(&mut self.stream).await {
            Ok(message) => {
                tracing::trace!("Received {} from {}", message.type_name(), self.peer);
                Ok(Some(message))
            }
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Receive a message the protocol requires, turning `Error` replies into errors
    pub async fn recv_reply(&mut self) -> Result<Message> {
        match self.recv().await? {
            Some(Message::Error { code, message }) => Err(Error::Remote { code, message }),
            Some(message) => Ok(message),
            None => Err(Error::Network(format!("{} closed the connection", self.peer))),
        }
    }

    /// Flush and shut down the write side
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
