//! LDAP message transport
//!
//! LDAP over TCP carries a stream of back-to-back LDAPMessage elements with no
//! extra framing; each message is self-delimiting through its BER length.

use crate::error::{LdapError, Result};
use crate::protocol::LdapMessage;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Maximum accepted message size (16 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Reads and writes complete LDAP messages over a byte stream
pub struct LdapTransport<T> {
    inner: T,
    max_message_size: usize,
    read_buf: BytesMut,
}

impl<T> LdapTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    pub fn with_max_message_size(mut self, max_size: usize) -> Self {
        self.max_message_size = max_size;
        self
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: AsyncRead + Unpin> LdapTransport<T> {
    /// Read the raw bytes of one complete message
    pub async fn read_frame(&mut self) -> Result<Bytes> {
        let frame_length = loop {
            if let Some(length) = ldap_ber::frame_length(&self.read_buf)? {
                break length;
            }
            if self.fill_buf().await? == 0 {
                return Err(if self.read_buf.is_empty() {
                    LdapError::ConnectionClosed
                } else {
                    LdapError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "incomplete message header",
                    ))
                });
            }
        };

        if frame_length > self.max_message_size {
            return Err(LdapError::MessageTooLarge {
                size: frame_length,
                max: self.max_message_size,
            });
        }

        while self.read_buf.len() < frame_length {
            if self.fill_buf().await? == 0 {
                return Err(LdapError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "incomplete message: expected {} bytes, got {}",
                        frame_length,
                        self.read_buf.len()
                    ),
                )));
            }
        }

        Ok(self.read_buf.split_to(frame_length).freeze())
    }

    /// Read and decode one message
    pub async fn read_message(&mut self) -> Result<LdapMessage> {
        let frame = self.read_frame().await?;
        let message = LdapMessage::decode(&frame)?;
        trace!(
            message_id = message.message_id,
            op = message.op.name(),
            len = frame.len(),
            "received message"
        );
        Ok(message)
    }

    async fn fill_buf(&mut self) -> Result<usize> {
        if self.read_buf.capacity() - self.read_buf.len() < 4096 {
            self.read_buf.reserve(8192);
        }
        Ok(self.inner.read_buf(&mut self.read_buf).await?)
    }
}

impl<T: AsyncWrite + Unpin> LdapTransport<T> {
    /// Write already-encoded message bytes
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Encode and write a message
    pub async fn write_message(&mut self, message: &LdapMessage) -> Result<()> {
        let data = message.encode();
        trace!(
            message_id = message.message_id,
            op = message.op.name(),
            len = data.len(),
            "sending message"
        );
        self.write_frame(&data).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
