// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Error type shared by the capture channel control plane.
//!
//! Frame wait timeouts never fail a control call: the timed out frame is
//! retired to its owner marked as errored.

use std::io;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The channel (or an upstream device it shares) is in use.
    #[error("device busy: {0}")]
    Busy(String),

    /// An upstream device refused the candidate geometry.
    #[error("format rejected by {device}: {reason}")]
    FormatRejected { device: String, reason: String },

    /// An upstream device failed a power or stream request.
    #[error("subdevice {device} failed: {reason}")]
    Subdevice { device: String, reason: String },

    /// A sensor register write still failed after the retry budget.
    #[error("sensor bus write to 0x{addr:04x} failed: {source}")]
    Bus {
        addr: u16,
        #[source]
        source: io::Error,
    },

    /// A capture worker thread could not be created.
    #[error("failed to start capture worker: {0}")]
    WorkerSpawn(#[source] io::Error),

    #[error("buffer of {size} bytes is smaller than the image size {required}")]
    BufferTooSmall { size: usize, required: usize },

    #[error("pending queue is full ({0} buffers)")]
    QueueFull(usize),

    #[error("channel is not open")]
    NotOpen,

    #[error("index {0} out of range")]
    InvalidIndex(u32),
}

impl Error {
    pub(crate) fn subdev(device: &str, reason: impl ToString) -> Self {
        Error::Subdevice {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }
}
