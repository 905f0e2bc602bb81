use bytes::{BufMut, Bytes, BytesMut};

use super::{FrameCodec, WriteParams, FRAME_VERSION};
use crate::network::RecvBuffer;
use crate::service::CodecConfig;
use crate::{AppError, AppResult};

const PFH_HEAD_LEN: usize = 5;
const PFH_HEAD_VERSION_POS: usize = 0;
const PFH_HEAD_PACKETLEN_POS: usize = 1;

/// Header of a plain frame: version (1 byte) and payload length (u32, big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainHeader {
    pub version: u8,
    pub data_len: u32,
}

impl PlainHeader {
    pub const SIZE: usize = PFH_HEAD_LEN;

    pub fn read_from(buf: &[u8]) -> AppResult<PlainHeader> {
        if buf.len() < PFH_HEAD_LEN {
            return Err(AppError::MalformedFrame(format!(
                "plain header needs {} bytes, got {}",
                PFH_HEAD_LEN,
                buf.len()
            )));
        }
        let mut data_len = [0u8; 4];
        data_len.copy_from_slice(&buf[PFH_HEAD_PACKETLEN_POS..PFH_HEAD_LEN]);
        Ok(PlainHeader {
            version: buf[PFH_HEAD_VERSION_POS],
            data_len: u32::from_be_bytes(data_len),
        })
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_u8(self.version);
        dst.put_u32(self.data_len);
    }
}

#[derive(Debug, Clone)]
pub struct PlainFrameCodec {
    config: CodecConfig,
}

impl PlainFrameCodec {
    pub fn new(config: CodecConfig) -> Self {
        PlainFrameCodec { config }
    }
}

impl FrameCodec for PlainFrameCodec {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn header_len(&self) -> usize {
        PFH_HEAD_LEN
    }

    fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// The declared length is checked as soon as the header is complete, a
    /// peer announcing an oversized frame is rejected before its body arrives.
    /// Only the payload is handed out, the header is stripped.
    fn decode(&self, buffer: &mut RecvBuffer) -> AppResult<Option<Bytes>> {
        let Some(head) = buffer.peek(PFH_HEAD_LEN) else {
            return Ok(None);
        };
        let header = PlainHeader::read_from(head)?;
        let packet_len = header.data_len as usize;
        if packet_len > self.config.max_frame_size {
            return Err(AppError::FrameTooLarge(packet_len));
        }
        let frame_len = PFH_HEAD_LEN + packet_len;
        if buffer.pending() < frame_len {
            return Ok(None);
        }
        let frame = buffer.take_frame(frame_len)?;
        Ok(Some(frame.slice(PFH_HEAD_LEN..)))
    }

    /// A missing payload is an error here, unlike the targeted layout.
    fn encode(&self, payload: Option<&[u8]>, _params: &WriteParams) -> AppResult<Bytes> {
        let payload = payload.ok_or(AppError::EmptyPayload)?;
        if payload.len() > self.config.max_frame_size {
            return Err(AppError::PayloadTooLarge(payload.len()));
        }
        let data_len =
            u32::try_from(payload.len()).map_err(|_| AppError::PayloadTooLarge(payload.len()))?;
        let header = PlainHeader {
            version: FRAME_VERSION,
            data_len,
        };
        let mut dst = BytesMut::with_capacity(PFH_HEAD_LEN + payload.len());
        header.write_to(&mut dst);
        dst.put_slice(payload);
        Ok(dst.freeze())
    }
}
