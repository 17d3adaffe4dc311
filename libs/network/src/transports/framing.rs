//! Length-prefixed stream framing
//!
//! Every envelope is preceded by its length as a big-endian `u32`. A length
//! above the configured maximum cannot be skipped safely, so it is reported
//! as [`TransportError::FrameTooLarge`] and the stream is abandoned.

use crate::error::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Reads whole frames from a byte stream
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
    max_frame_size: usize,
    frames_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_size: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(8 * 1024),
            max_frame_size,
            frames_read: 0,
        }
    }

    /// Next frame, or `None` when the peer closed cleanly between frames
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_SIZE {
            let read = self.reader.read(&mut prefix[filled..]).await?;
            if read == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended inside a length prefix",
                )
                .into());
            }
            filled += read;
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        // Grow with the bytes that actually arrive, not the announced length
        self.buffer.clear();
        let mut body = (&mut self.reader).take(len as u64);
        while self.buffer.len() < len {
            if body.read_buf(&mut self.buffer).await? == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream ended inside a frame",
                )
                .into());
            }
        }
        self.frames_read += 1;

        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

/// Writes length-prefixed frames
pub struct FrameWriter<W> {
    writer: W,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: BytesMut::with_capacity(8 * 1024),
        }
    }

    /// Write one frame and flush it
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
            len: payload.len(),
            max: u32::MAX as usize,
        })?;

        // Single write call for prefix and payload
        self.buffer.clear();
        self.buffer.extend_from_slice(&len.to_be_bytes());
        self.buffer.extend_from_slice(payload);

        self.writer.write_all(&self.buffer).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_survive_a_byte_stream() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server, 1024);

        let writes = tokio::spawn(async move {
            writer.write_frame(b"first").await.unwrap();
            writer.write_frame(b"").await.unwrap();
            writer.write_frame(&[7u8; 200]).await.unwrap();
            writer.shutdown().await.unwrap();
        });

        assert_eq!(reader.next_frame().await.unwrap().unwrap(), &b"first"[..]);
        assert_eq!(reader.next_frame().await.unwrap().unwrap().len(), 0);
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), &[7u8; 200][..]);
        assert!(reader.next_frame().await.unwrap().is_none());
        assert_eq!(reader.frames_read(), 3);
        writes.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversize_length_is_rejected() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&2048u32.to_be_bytes()).await.unwrap();

        let mut reader = FrameReader::new(server, 1024);
        match reader.next_frame().await {
            Err(TransportError::FrameTooLarge { len, max }) => assert_eq!((len, max), (2048, 1024)),
            other => panic!("Expected FrameTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);

        let mut reader = FrameReader::new(server, 1024);
        let err = reader.next_frame().await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_announced_length_is_not_allocated_up_front() {
        let (mut client, server) = tokio::io::duplex(64);
        let announced = 8 * 1024 * 1024u32;
        client.write_all(&announced.to_be_bytes()).await.unwrap();
        client.write_all(b"only a few bytes").await.unwrap();
        drop(client);

        let mut reader = FrameReader::new(server, 16 * 1024 * 1024);
        let err = reader.next_frame().await.unwrap_err();

        assert!(err.is_disconnect());
        assert_eq!(reader.buffer.len(), 16);
        assert!(reader.buffer.capacity() < 64 * 1024);
    }
}
