// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The two capture workers of a streaming channel.
//!
//! The issue worker takes buffers from the pending queue, programs the
//! surface address, arms a frame start sync point increment and fires a
//! single shot capture. Once the frame started it also reserves the memory
//! write acknowledge threshold, so both reservations on the shared sync
//! point follow the order the hardware raises them, and hands the buffer to
//! the complete worker over a bounded kanal channel. The complete worker
//! only arms the acknowledge condition, waits for it, stamps the buffer and
//! returns it to its owner.
//!
//! A frame start that never comes resets the pixel parser and accounts for
//! the lost increment on the host, so one dropped frame does not push the
//! rest of the session out of step.
//!
//! The VI has one active capture slot per port, so the FIFO handoff keeps
//! buffers finalized in the order they were issued, timeouts included.

use crate::{
    buffer::{monotonic_now, BufferOwner, CaptureBuffer},
    queue::{PendingQueue, StopSignal},
    regs::{self, RegisterBank},
    syncpt::{self, SyncPoint, SyncptTimeout},
};
use std::{
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, debug_span, error, warn};
use unix_ts::Timestamp;

/// Register banks and sync point a channel's workers drive.
pub(crate) struct Hardware {
    pub port: u8,
    pub vi: Arc<dyn RegisterBank>,
    pub csi: Arc<dyn RegisterBank>,
    pub syncpt: Arc<dyn SyncPoint>,
    pub timeout: Duration,
}

impl Hardware {
    /// Routes the next increment of the channel sync point to `cond`.
    fn arm(&self, cond: u32) {
        self.vi.write(
            regs::VI_CFG_VI_INCR_SYNCPT,
            regs::vi_incr_syncpt_cond(cond) | self.syncpt.id(),
        );
    }

    fn capture_error(&self) {
        let status = self.csi.read(regs::CSI_ERROR_STATUS);
        error!(port = self.port, "CSI error status 0x{status:08x}");
    }

    /// Brings the port back in step after the frame start reserved at
    /// `thresh` timed out.
    fn recover(&self, thresh: u32) {
        self.csi.write(regs::CSI_SW_RESET, regs::SW_RESET_PIXEL_PARSER);
        self.csi.write(regs::CSI_SW_RESET, 0);
        // A start that slipped in before the reset was already counted.
        if !syncpt::expired(self.syncpt.read(), thresh) {
            self.syncpt.cpu_incr();
        }
        warn!(port = self.port, thresh, "pixel parser reset");
    }
}

/// Returns buffers to their owner and counts those still in the pipeline.
pub(crate) struct Retirer {
    owner: Arc<dyn BufferOwner>,
    outstanding: AtomicUsize,
}

impl Retirer {
    pub fn new(owner: Arc<dyn BufferOwner>) -> Self {
        Self {
            owner,
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn track(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Undoes [`Retirer::track`] for a buffer handed back to the caller.
    pub fn untrack(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn done(&self, buffer: CaptureBuffer, sequence: u32, timestamp: Timestamp) {
        self.owner.retire_done(buffer, sequence, timestamp);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn error(&self, buffer: CaptureBuffer) {
        self.owner.retire_error(buffer);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Work passed from the issue worker to the complete worker.
pub(crate) enum Handoff {
    /// Programmed into hardware. `ack` is the threshold reserved for the
    /// write acknowledge, `None` when the frame never started.
    Issued {
        buffer: CaptureBuffer,
        ack: Option<u32>,
    },
    /// Drained from the pending queue on stop, never reached hardware.
    Aborted(CaptureBuffer),
    /// Last message of a session.
    Finish,
}

pub(crate) struct IssueWorker {
    pub hw: Arc<Hardware>,
    pub pending: Arc<PendingQueue>,
    pub stop: Arc<StopSignal>,
    pub handoff: kanal::Sender<Handoff>,
    pub stride: u32,
}

impl IssueWorker {
    pub fn run(self) {
        debug!(port = self.hw.port, "capture issue started");

        while let Some(buffer) = self.pending.dequeue(&self.stop) {
            // This frame's acknowledge comes before the next start, so it is
            // reserved here rather than by the complete worker.
            let ack = match self.capture_frame(&buffer) {
                Ok(()) => Some(self.hw.syncpt.incr_max(1)),
                Err(_) => None,
            };
            self.hand_off(Handoff::Issued { buffer, ack });
        }

        // Stop requested: whatever is still pending is handed over in order
        // so the complete worker retires it behind the frames in flight.
        for buffer in self.pending.drain() {
            debug!(port = self.hw.port, "abort {buffer}");
            self.hand_off(Handoff::Aborted(buffer));
        }
        self.hand_off(Handoff::Finish);

        debug!(port = self.hw.port, "capture issue stopped");
    }

    fn capture_frame(&self, buffer: &CaptureBuffer) -> Result<(), SyncptTimeout> {
        let hw = &self.hw;
        let _span = debug_span!("capture_frame", port = hw.port, index = buffer.index()).entered();

        hw.csi
            .write(regs::CSI_SURFACE0_OFFSET_MSB, (buffer.addr() >> 32) as u32);
        hw.csi
            .write(regs::CSI_SURFACE0_OFFSET_LSB, buffer.addr() as u32);
        hw.csi.write(regs::CSI_SURFACE0_STRIDE, self.stride);

        let thresh = hw.syncpt.incr_max(1);
        hw.arm(regs::vi_csi_pp_frame_start(hw.port));
        hw.csi.write(regs::CSI_SINGLE_SHOT, regs::SINGLE_SHOT_CAPTURE);

        let res = hw.syncpt.wait(thresh, hw.timeout);
        if let Err(err) = res {
            error!(port = hw.port, "frame start syncpt timeout: {err}");
            hw.capture_error();
            hw.recover(thresh);
        }
        res
    }

    fn hand_off(&self, handoff: Handoff) {
        // The controller keeps a receiver alive until Finish is consumed.
        if self.handoff.send(handoff).is_err() {
            warn!(port = self.hw.port, "capture handoff closed");
        }
    }
}

pub(crate) struct CompleteWorker {
    pub hw: Arc<Hardware>,
    pub handoff: kanal::Receiver<Handoff>,
    pub retirer: Arc<Retirer>,
    pub sequence: Arc<AtomicU32>,
    pub sizeimage: usize,
}

impl CompleteWorker {
    pub fn run(self) {
        debug!(port = self.hw.port, "capture complete started");

        while let Ok(handoff) = self.handoff.recv() {
            match handoff {
                Handoff::Issued { buffer, ack } => self.capture_done(buffer, ack),
                Handoff::Aborted(buffer) => self.retirer.error(buffer),
                Handoff::Finish => break,
            }
        }

        debug!(port = self.hw.port, "capture complete stopped");
    }

    fn capture_done(&self, mut buffer: CaptureBuffer, ack: Option<u32>) {
        let hw = &self.hw;
        let _span = debug_span!("capture_done", port = hw.port, index = buffer.index()).entered();

        let written = match ack {
            Some(ack) => {
                hw.arm(regs::vi_csi_mw_ack_done(hw.port));
                match hw.syncpt.wait(ack, hw.timeout) {
                    Ok(()) => true,
                    Err(err) => {
                        error!(port = hw.port, "MW_ACK_DONE syncpt timeout: {err}");
                        false
                    }
                }
            }
            None => false,
        };

        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel);
        let timestamp = monotonic_now();
        buffer.set_payload(self.sizeimage);

        if written {
            debug!(port = hw.port, sequence, "frame {buffer}");
            self.retirer.done(buffer, sequence, timestamp);
        } else {
            warn!(port = hw.port, sequence, "frame {buffer} failed");
            self.retirer.error(buffer);
        }
    }
}

/// Retires everything handed off until `Finish`, as errors. Used when the
/// complete worker could not be started.
pub(crate) fn retire_handoffs(handoff: &kanal::Receiver<Handoff>, retirer: &Retirer) {
    while let Ok(handoff) = handoff.recv() {
        match handoff {
            Handoff::Issued { buffer, .. } | Handoff::Aborted(buffer) => retirer.error(buffer),
            Handoff::Finish => break,
        }
    }
}
