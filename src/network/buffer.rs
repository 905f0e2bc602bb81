use bytes::Bytes;
use tracing::trace;

use crate::service::CodecConfig;
use crate::{AppError, AppResult};

/// Per-session receive buffer.
///
/// Bytes are read from the socket into the free tail `[read_limit, capacity)`
/// and consumed from the front `[data_start, read_limit)` as frames complete.
/// The unconsumed region is moved back to offset 0 only when the free tail
/// drops below `min_free_space`, so the copy cost is paid once per many reads
/// instead of once per frame.
///
/// Invariant: `0 <= data_start <= read_limit <= capacity`.
#[derive(Debug)]
pub struct RecvBuffer {
    buf: Vec<u8>,
    data_start: usize,
    read_limit: usize,
    min_free_space: usize,
    /// largest number of pending bytes tolerated
    pending_limit: usize,
    /// the buffer never grows beyond this
    max_capacity: usize,
}

impl RecvBuffer {
    /// `header_len` is added on top of `max_frame_size` so a payload of
    /// exactly `max_frame_size` bytes still fits together with its header.
    pub fn new(config: &CodecConfig, header_len: usize) -> RecvBuffer {
        let pending_limit = config.max_frame_size + header_len;
        let max_capacity = (pending_limit + config.min_free_space).max(config.recv_buffer_size);
        RecvBuffer {
            buf: vec![0; config.recv_buffer_size],
            data_start: 0,
            read_limit: 0,
            min_free_space: config.min_free_space,
            pending_limit,
            max_capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes read from the socket that have not been consumed as a frame yet.
    pub fn pending(&self) -> usize {
        self.read_limit - self.data_start
    }

    pub fn data_start(&self) -> usize {
        self.data_start
    }

    pub fn read_limit(&self) -> usize {
        self.read_limit
    }

    pub fn free_len(&self) -> usize {
        self.capacity() - self.read_limit
    }

    pub fn unconsumed(&self) -> &[u8] {
        &self.buf[self.data_start..self.read_limit]
    }

    /// Makes room for the next socket read.
    ///
    /// Compacts when the free tail is below the low-water mark and grows the
    /// buffer when compaction alone cannot restore it (a frame larger than the
    /// initial capacity is being accumulated). Fails with `FrameTooLarge` once
    /// the pending bytes exceed the frame ceiling.
    pub fn reclaim(&mut self) -> AppResult<()> {
        if self.free_len() < self.min_free_space {
            self.buf.copy_within(self.data_start..self.read_limit, 0);
            self.read_limit -= self.data_start;
            self.data_start = 0;

            if self.free_len() < self.min_free_space && self.capacity() < self.max_capacity {
                let new_capacity = (self.capacity() * 2)
                    .max(self.read_limit + self.min_free_space)
                    .min(self.max_capacity);
                trace!(
                    "grow receive buffer from {} to {} bytes",
                    self.capacity(),
                    new_capacity
                );
                self.buf.resize(new_capacity, 0);
            }
        }
        if self.pending() > self.pending_limit {
            return Err(AppError::FrameTooLarge(self.pending()));
        }
        Ok(())
    }

    /// The writable tail the next socket read fills.
    pub fn free_tail(&mut self) -> &mut [u8] {
        &mut self.buf[self.read_limit..]
    }

    /// Marks `n` bytes of the free tail as written.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.free_len());
        self.read_limit = (self.read_limit + n).min(self.capacity());
    }

    /// Copies as much of `data` as fits into the free tail, returns the number
    /// of bytes taken.
    pub fn put_slice(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free_len());
        self.free_tail()[..n].copy_from_slice(&data[..n]);
        self.advance(n);
        n
    }

    /// The first `len` pending bytes, `None` until that many are buffered.
    pub fn peek(&self, len: usize) -> Option<&[u8]> {
        if self.pending() < len {
            return None;
        }
        Some(&self.buf[self.data_start..self.data_start + len])
    }

    /// Consumes `len` bytes from the front as one complete frame.
    pub fn take_frame(&mut self, len: usize) -> AppResult<Bytes> {
        if len > self.pending() {
            return Err(AppError::MalformedFrame(format!(
                "frame of {} bytes exceeds {} pending bytes",
                len,
                self.pending()
            )));
        }
        let frame_end = self.data_start + len;
        let frame = Bytes::copy_from_slice(&self.buf[self.data_start..frame_end]);
        self.data_start = frame_end;
        Ok(frame)
    }
}
