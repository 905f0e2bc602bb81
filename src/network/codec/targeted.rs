use bytes::{BufMut, Bytes, BytesMut};

use super::{FrameCodec, WriteParams, FRAME_VERSION};
use crate::network::RecvBuffer;
use crate::service::CodecConfig;
use crate::{AppError, AppResult};

const HEAD_LEN: usize = 12;
const HEAD_VERSION_POS: usize = 0;
const HEAD_MSGTYPE_POS: usize = 1;
const HEAD_PACKETLEN_POS: usize = 2;
const HEAD_TARGETID_POS: usize = 4;

/// Header of a targeted frame, big-endian on the wire.
///
/// ```text
/// +---------+---------+----------+-----------+---------+
/// | version | msgtype | data len | target id | payload |
/// | 1 byte  | 1 byte  | 2 bytes  | 8 bytes   | data len|
/// +---------+---------+----------+-----------+---------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub msg_type: u8,
    pub data_len: u16,
    pub target_id: u64,
}

impl FrameHeader {
    pub const SIZE: usize = HEAD_LEN;

    pub fn read_from(buf: &[u8]) -> AppResult<FrameHeader> {
        if buf.len() < HEAD_LEN {
            return Err(AppError::MalformedFrame(format!(
                "targeted header needs {} bytes, got {}",
                HEAD_LEN,
                buf.len()
            )));
        }
        let data_len = u16::from_be_bytes([
            buf[HEAD_PACKETLEN_POS],
            buf[HEAD_PACKETLEN_POS + 1],
        ]);
        let mut target_id = [0u8; 8];
        target_id.copy_from_slice(&buf[HEAD_TARGETID_POS..HEAD_LEN]);
        Ok(FrameHeader {
            version: buf[HEAD_VERSION_POS],
            msg_type: buf[HEAD_MSGTYPE_POS],
            data_len,
            target_id: u64::from_be_bytes(target_id),
        })
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_u8(self.version);
        dst.put_u8(self.msg_type);
        dst.put_u16(self.data_len);
        dst.put_u64(self.target_id);
    }

    /// Splits a delivered frame into its header and payload.
    pub fn split(frame: &Bytes) -> AppResult<(FrameHeader, Bytes)> {
        let header = FrameHeader::read_from(frame)?;
        let end = HEAD_LEN + header.data_len as usize;
        if frame.len() < end {
            return Err(AppError::MalformedFrame(format!(
                "frame of {} bytes shorter than declared {}",
                frame.len(),
                end
            )));
        }
        Ok((header, frame.slice(HEAD_LEN..end)))
    }
}

#[derive(Debug, Clone)]
pub struct TargetedFrameCodec {
    config: CodecConfig,
}

impl TargetedFrameCodec {
    pub fn new(config: CodecConfig) -> Self {
        TargetedFrameCodec { config }
    }
}

impl FrameCodec for TargetedFrameCodec {
    fn name(&self) -> &'static str {
        "targeted"
    }

    fn header_len(&self) -> usize {
        HEAD_LEN
    }

    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn decode(&self, buffer: &mut RecvBuffer) -> AppResult<Option<Bytes>> {
        let Some(head) = buffer.peek(HEAD_LEN) else {
            return Ok(None);
        };
        let packet_len =
            u16::from_be_bytes([head[HEAD_PACKETLEN_POS], head[HEAD_PACKETLEN_POS + 1]]);
        let frame_len = HEAD_LEN + packet_len as usize;
        if buffer.pending() < frame_len {
            return Ok(None);
        }
        buffer.take_frame(frame_len).map(Some)
    }

    /// An absent payload is allowed, producing a header-only frame that
    /// carries just the message type.
    fn encode(&self, payload: Option<&[u8]>, params: &WriteParams) -> AppResult<Bytes> {
        let msg_type = params
            .msg_type
            .ok_or(AppError::MissingParameter("msg_type"))?;
        let payload = payload.unwrap_or_default();
        let data_len =
            u16::try_from(payload.len()).map_err(|_| AppError::PayloadTooLarge(payload.len()))?;

        let header = FrameHeader {
            version: FRAME_VERSION,
            msg_type,
            data_len,
            target_id: params.target_id,
        };
        let mut dst = BytesMut::with_capacity(HEAD_LEN + payload.len());
        header.write_to(&mut dst);
        dst.put_slice(payload);
        Ok(dst.freeze())
    }
}
