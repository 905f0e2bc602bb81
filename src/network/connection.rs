use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::network::codec::FrameCodec;
use crate::network::RecvBuffer;
use crate::{AppError, AppResult};

/// Read side of a session.
///
/// Owns the socket's read half and the receive buffer; the session's read
/// loop is the only task touching either, so the cursors need no locking.
#[derive(Debug)]
pub struct Connection<R> {
    reader: R,
    buffer: RecvBuffer,
    codec: Arc<dyn FrameCodec>,
}

impl<R> Connection<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, codec: Arc<dyn FrameCodec>) -> Connection<R> {
        let buffer = codec.new_buffer();
        Connection {
            reader,
            buffer,
            codec,
        }
    }

    pub fn buffer(&self) -> &RecvBuffer {
        &self.buffer
    }

    /// Reads the next complete frame from the connection.
    ///
    /// Frames already buffered are returned without touching the socket, so
    /// several frames arriving in one read come out one call after another.
    /// Otherwise the buffer is reclaimed and one socket read is issued.
    ///
    /// Returns `None` when the peer closed the connection. A partially
    /// received frame at that point is dropped silently, end of stream is
    /// never reported as an error.
    pub async fn read_frame(&mut self) -> AppResult<Option<Bytes>> {
        loop {
            // If the frame exceeds the size limit, terminate and close the connection.
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }
            self.buffer.reclaim()?;
            if self.buffer.free_len() == 0 {
                return Err(AppError::FrameTooLarge(self.buffer.pending()));
            }
            let n = self.reader.read(self.buffer.free_tail()).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buffer.advance(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;
    use crate::network::codec::{PlainFrameCodec, TargetedFrameCodec, WriteParams};
    use crate::service::CodecConfig;

    const HEADER: [u8; 12] = [
        0x01, 0x05, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A,
    ];

    fn targeted() -> Arc<dyn FrameCodec> {
        Arc::new(TargetedFrameCodec::new(CodecConfig::default()))
    }

    #[tokio::test]
    async fn test_header_one_byte_per_read() {
        let mut builder = Builder::new();
        for byte in HEADER.iter() {
            builder.read(std::slice::from_ref(byte));
        }
        builder.read(b"ABC");
        let mut connection = Connection::new(builder.build(), targeted());

        let frame = connection.read_frame().await.unwrap().unwrap();
        assert_eq!(&frame[..12], &HEADER[..]);
        assert_eq!(&frame[12..], b"ABC");
        assert!(connection.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fragments_match_single_read() {
        let codec = targeted();
        let mut wire = Vec::new();
        let payloads: Vec<Vec<u8>> = vec![b"hello".to_vec(), Vec::new(), vec![9u8; 300]];
        for (i, payload) in payloads.iter().enumerate() {
            let params = WriteParams::msg_type(i as u8).with_target(i as u64);
            wire.extend_from_slice(&codec.encode(Some(payload.as_slice()), &params).unwrap());
        }

        // split mid header, mid payload and across frame boundaries
        let mut builder = Builder::new();
        for chunk in wire.chunks(7) {
            builder.read(chunk);
        }
        let mut fragmented = Connection::new(builder.build(), codec.clone());
        let mut single = Connection::new(Builder::new().read(&wire).build(), codec);

        for _ in 0..payloads.len() {
            let a = fragmented.read_frame().await.unwrap().unwrap();
            let b = single.read_frame().await.unwrap().unwrap();
            assert_eq!(a, b);
        }
        assert!(fragmented.read_frame().await.unwrap().is_none());
        assert!(single.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_frame_at_eof_is_clean() {
        let reader = Builder::new().read(&HEADER[..6]).build();
        let mut connection = Connection::new(reader, targeted());
        assert!(connection.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_error() {
        let reader = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut connection = Connection::new(reader, targeted());
        let err = connection.read_frame().await.unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }

    #[tokio::test]
    async fn test_accumulated_frame_too_large() {
        let config = CodecConfig {
            recv_buffer_size: 64,
            min_free_space: 16,
            max_frame_size: 100,
            ..Default::default()
        };
        let codec: Arc<dyn FrameCodec> = Arc::new(TargetedFrameCodec::new(config));
        // declares 1000 bytes, more than max_frame_size + header
        let mut header = HEADER;
        header[2..4].copy_from_slice(&1000u16.to_be_bytes());
        // the buffer grows to 128 bytes and is filled completely
        let reader = Builder::new()
            .read(&header)
            .read(&[0u8; 40])
            .read(&[0u8; 40])
            .read(&[0u8; 36])
            .build();
        let mut connection = Connection::new(reader, codec);

        let err = connection.read_frame().await.unwrap_err();
        assert!(matches!(err, AppError::FrameTooLarge(128)));
    }

    #[tokio::test]
    async fn test_plain_frame_larger_than_initial_buffer() {
        let config = CodecConfig {
            recv_buffer_size: 64,
            min_free_space: 16,
            max_frame_size: 1024,
            ..Default::default()
        };
        let codec: Arc<dyn FrameCodec> = Arc::new(PlainFrameCodec::new(config));
        let payload = vec![3u8; 1000];
        let wire = codec.encode(Some(&payload[..]), &WriteParams::default()).unwrap();
        let mut builder = Builder::new();
        for chunk in wire.chunks(33) {
            builder.read(chunk);
        }
        let mut connection = Connection::new(builder.build(), codec);

        let frame = connection.read_frame().await.unwrap().unwrap();
        assert_eq!(&frame[..], &payload[..]);
        assert!(connection.buffer().capacity() > 64);
        assert!(connection.read_frame().await.unwrap().is_none());
    }
}
