//! Network Module Implementation
//!
//! This module turns accepted TCP sockets into sessions that deliver whole
//! frames to application code.
//!
//! # Architecture
//!
//! The network module is built on tokio's async I/O primitives and consists of:
//! - Frame codecs describing the two supported wire layouts
//! - A receive buffer with amortized compaction, one per session
//! - Sessions with idempotent close and data/close/error hooks
//! - The heart wheel closing sessions that went silent
//!
//! # Components
//!
//! - `Connection`: Owns the read half of a socket and extracts frames
//! - `Session`: Shared handle for writing, closing and per-session attributes
//! - `HeartTimeWheel`: Liveness tracking with O(1) refresh and sweep
//!
//! # Features
//!
//! - Pipelined frames are delivered without extra reads
//! - Oversized frames are rejected before they are buffered
//! - Close hooks fire once, on the read task, no matter who closes first

pub use address::parse_listen_address;
pub use attributes::Attributes;
pub use buffer::RecvBuffer;
pub use codec::{
    codec_factory, split_package, CodecFactory, FrameCodec, FrameHeader, PlainCodecFactory,
    PlainFrameCodec, PlainHeader, TargetedCodecFactory, TargetedFrameCodec, WriteParams,
    FRAME_VERSION,
};
pub use connection::Connection;
pub use heartbeat::HeartTimeWheel;
pub use session::{BoxedWriter, Session, SessionHandler};

mod address;
mod attributes;
mod buffer;
pub mod codec;
mod connection;
mod heartbeat;
mod session;
