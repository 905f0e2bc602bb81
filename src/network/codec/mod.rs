//! Frame codecs
//!
//! A codec knows one wire layout: how long its header is, where the length
//! field lives, what part of a complete frame the application sees, and how
//! to put a header in front of an outgoing payload. Codecs are stateless; the
//! per-session state (the receive buffer and its cursors) lives in
//! [`RecvBuffer`] owned by the session's read loop.
//!
//! Two layouts ship with the crate:
//! - [`TargetedFrameCodec`]: 12 byte header carrying a message type and a
//!   target id, suited to IM style transparent forwarding. The whole frame,
//!   header included, is delivered.
//! - [`PlainFrameCodec`]: 5 byte header, only the payload is delivered.

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;

use crate::network::RecvBuffer;
use crate::service::{CodecConfig, CodecKind};
use crate::AppResult;

pub use plain::{PlainFrameCodec, PlainHeader};
pub use targeted::{FrameHeader, TargetedFrameCodec};

mod plain;
mod targeted;

/// Version byte written into every outgoing header.
pub const FRAME_VERSION: u8 = 1;

/// Extra arguments for [`FrameCodec::encode`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteParams {
    /// required by the targeted layout, ignored by the plain one
    pub msg_type: Option<u8>,
    pub target_id: u64,
}

impl WriteParams {
    pub fn msg_type(msg_type: u8) -> Self {
        WriteParams {
            msg_type: Some(msg_type),
            target_id: 0,
        }
    }

    pub fn with_target(mut self, target_id: u64) -> Self {
        self.target_id = target_id;
        self
    }
}

pub trait FrameCodec: Debug + Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn header_len(&self) -> usize;

    fn config(&self) -> &CodecConfig;

    /// Extracts the next complete frame from the front of `buffer`.
    ///
    /// Returns `Ok(None)` while the header or the body is still incomplete.
    /// An error is fatal to the session.
    fn decode(&self, buffer: &mut RecvBuffer) -> AppResult<Option<Bytes>>;

    /// Builds header and payload into one contiguous buffer so the session can
    /// hand it to the socket in a single write.
    fn encode(&self, payload: Option<&[u8]>, params: &WriteParams) -> AppResult<Bytes>;

    fn new_buffer(&self) -> RecvBuffer {
        RecvBuffer::new(self.config(), self.header_len())
    }
}

/// Creates the codec of a newly accepted session.
pub trait CodecFactory: Send + Sync {
    fn create(&self) -> Arc<dyn FrameCodec>;
}

impl<F> CodecFactory for F
where
    F: Fn() -> Arc<dyn FrameCodec> + Send + Sync,
{
    fn create(&self) -> Arc<dyn FrameCodec> {
        self()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetedCodecFactory {
    config: CodecConfig,
}

impl TargetedCodecFactory {
    pub fn new(config: CodecConfig) -> Self {
        TargetedCodecFactory { config }
    }
}

impl CodecFactory for TargetedCodecFactory {
    fn create(&self) -> Arc<dyn FrameCodec> {
        Arc::new(TargetedFrameCodec::new(self.config))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlainCodecFactory {
    config: CodecConfig,
}

impl PlainCodecFactory {
    pub fn new(config: CodecConfig) -> Self {
        PlainCodecFactory { config }
    }
}

impl CodecFactory for PlainCodecFactory {
    fn create(&self) -> Arc<dyn FrameCodec> {
        Arc::new(PlainFrameCodec::new(self.config))
    }
}

/// Drains every complete frame currently buffered.
///
/// Stops at the first error; frames extracted before it are dropped with the
/// session anyway, callers needing them one by one use
/// [`FrameCodec::decode`] directly.
pub fn split_package(codec: &dyn FrameCodec, buffer: &mut RecvBuffer) -> AppResult<Vec<Bytes>> {
    let mut frames = Vec::new();
    while let Some(frame) = codec.decode(buffer)? {
        frames.push(frame);
    }
    Ok(frames)
}

pub fn codec_factory(config: &CodecConfig) -> Arc<dyn CodecFactory> {
    match config.kind {
        CodecKind::Targeted => Arc::new(TargetedCodecFactory::new(*config)),
        CodecKind::Plain => Arc::new(PlainCodecFactory::new(*config)),
    }
}
