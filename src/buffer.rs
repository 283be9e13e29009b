// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Capture buffers and the callbacks returning them to their owner.
//!
//! A [`CaptureBuffer`] only describes memory owned elsewhere: its bus
//! address is what the VI writes to. The buffer value itself moves through
//! the pipeline by ownership transfer, so at any time it is either with the
//! owner, in the pending queue, or with exactly one capture worker.

use std::fmt;
use tracing::trace;
use unix_ts::Timestamp;

/// One contiguous, DMA-addressable frame buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureBuffer {
    index: u32,
    addr: u64,
    size: usize,
    port: Option<u8>,
    payload: usize,
}

impl CaptureBuffer {
    /// Describes buffer `index` of `size` bytes at bus address `addr`.
    pub fn new(index: u32, addr: u64, size: usize) -> Self {
        Self {
            index,
            addr,
            size,
            port: None,
            payload: 0,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Port of the channel the buffer was last submitted to.
    pub fn port(&self) -> Option<u8> {
        self.port
    }

    /// Bytes written by the last capture.
    pub fn payload(&self) -> usize {
        self.payload
    }

    pub(crate) fn bind(&mut self, port: u8) {
        self.port = Some(port);
        self.payload = 0;
    }

    pub(crate) fn set_payload(&mut self, payload: usize) {
        self.payload = payload.min(self.size);
    }
}

impl fmt::Display for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "buf{} addr:{:#x} size:{}", self.index, self.addr, self.size)
    }
}

/// Receives every submitted buffer back exactly once.
pub trait BufferOwner: Send + Sync {
    /// The frame was captured.
    fn retire_done(&self, buffer: CaptureBuffer, sequence: u32, timestamp: Timestamp);

    /// The frame timed out in hardware or was never issued.
    fn retire_error(&self, buffer: CaptureBuffer);
}

/// How a buffer left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done { sequence: u32, timestamp: Timestamp },
    Error,
}

#[derive(Debug)]
pub struct Retired {
    pub buffer: CaptureBuffer,
    pub outcome: Outcome,
}

impl Retired {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, Outcome::Done { .. })
    }
}

/// [`BufferOwner`] forwarding retired buffers over a channel, for
/// applications that dequeue frames rather than take callbacks.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    tx: kanal::Sender<Retired>,
}

impl FrameQueue {
    /// Returns the owner and the receiving end retired frames arrive on.
    pub fn new() -> (Self, kanal::Receiver<Retired>) {
        // Unbounded: the number of buffers in flight is bounded by the
        // pending queue depth, and a worker must never block on the owner.
        let (tx, rx) = kanal::unbounded();
        (Self { tx }, rx)
    }

    fn push(&self, retired: Retired) {
        if self.tx.send(retired).is_err() {
            trace!("frame receiver dropped, buffer released");
        }
    }
}

impl BufferOwner for FrameQueue {
    fn retire_done(&self, buffer: CaptureBuffer, sequence: u32, timestamp: Timestamp) {
        self.push(Retired {
            buffer,
            outcome: Outcome::Done {
                sequence,
                timestamp,
            },
        });
    }

    fn retire_error(&self, buffer: CaptureBuffer) {
        self.push(Retired {
            buffer,
            outcome: Outcome::Error,
        });
    }
}

/// Current `CLOCK_MONOTONIC` time, the clock frame timestamps use.
pub fn monotonic_now() -> Timestamp {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC is always available on Linux.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    Timestamp::new(ts.tv_sec as i64, ts.tv_nsec as u32)
}
