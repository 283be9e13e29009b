// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Capture channel: one VI port, its upstream chain and its buffers.
//!
//! Control operations (open, close, format, start, stop, submit) are
//! serialized by the channel's control lock. While streaming, two worker
//! threads (see [`crate::capture`]) move buffers through hardware; they
//! never take the control lock, so `stop` can join them while holding it.
//!
//! Stream start runs, in order: claim the upstream devices in the shared
//! [`Topology`], enable streaming sensor first, program the image registers,
//! reset the sequence counter, start the issue worker, start the complete
//! worker. Any failure unwinds the steps already taken and returns every
//! pending buffer to its owner as errored.

use crate::{
    buffer::{BufferOwner, CaptureBuffer},
    capture::{retire_handoffs, CompleteWorker, Handoff, Hardware, IssueWorker, Retirer},
    error::{Error, Result},
    format::{self, FormatSet, FourCC, FrameLimits, PixFormat, VideoFormat},
    negotiate::{negotiate, Negotiated},
    queue::{PendingQueue, StopSignal},
    regs::{self, RegisterBank},
    subdev::{SubdevChain, Topology, TopologyGuard},
    syncpt::SyncPoint,
};
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, error, info, warn};

pub const CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const CAP_STREAMING: u32 = 0x0400_0000;
pub const CAP_DEVICE_CAPS: u32 = 0x8000_0000;

/// Static configuration of a channel, fixed at attach time.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Name of the VI device, used in capability strings.
    pub device: String,
    pub port: u8,
    pub lanes: u8,
    /// DMA transfer alignment in bytes.
    pub align: u32,
    /// Maximum number of buffers waiting for capture.
    pub queue_depth: usize,
    /// Bound on every sync point wait.
    pub syncpt_timeout: Duration,
    pub limits: FrameLimits,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            device: "vi".to_string(),
            port: 0,
            lanes: 2,
            align: 64,
            queue_depth: 8,
            syncpt_timeout: Duration::from_millis(200),
            limits: FrameLimits::default(),
        }
    }
}

impl ChannelConfig {
    /// Lane counts a CSI brick can be configured for.
    pub const LANES: [u8; 3] = [1, 2, 4];

    /// Brings every field into a range the hardware accepts: alignment of
    /// at least one byte, ordered frame limits, a non-empty queue and a
    /// supported lane count (the next one up, at most four).
    pub fn validated(mut self) -> Self {
        if self.align == 0 {
            warn!(port = self.port, "alignment 0, using byte alignment");
            self.align = 1;
        }
        let limits = self.limits.ordered();
        if limits != self.limits {
            warn!(port = self.port, "inverted frame limits {:?}", self.limits);
            self.limits = limits;
        }
        if self.queue_depth == 0 {
            warn!(port = self.port, "queue depth 0, using 1");
            self.queue_depth = 1;
        }
        if !Self::LANES.contains(&self.lanes) {
            let lanes = Self::LANES
                .into_iter()
                .find(|&n| n >= self.lanes)
                .unwrap_or(4);
            warn!(port = self.port, "{} lanes unsupported, using {lanes}", self.lanes);
            self.lanes = lanes;
        }
        self
    }
}

/// Register banks and sync point handed to a channel at attach time.
pub struct ChannelHardware {
    pub vi: Arc<dyn RegisterBank>,
    pub csi: Arc<dyn RegisterBank>,
    pub syncpt: Arc<dyn SyncPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub device_caps: u32,
    pub capabilities: u32,
}

/// A submission the channel refused; the buffer is handed back.
#[derive(thiserror::Error, Debug)]
#[error("buffer {} rejected: {error}", .buffer.index())]
pub struct Rejected {
    pub buffer: CaptureBuffer,
    #[source]
    pub error: Error,
}

struct Session {
    topology: TopologyGuard,
    stop: Arc<StopSignal>,
    issue: JoinHandle<()>,
    complete: JoinHandle<()>,
}

struct Control {
    state: StreamState,
    format: PixFormat,
    info: &'static VideoFormat,
    formats: FormatSet,
    users: u32,
    session: Option<Session>,
}

pub struct Channel {
    config: ChannelConfig,
    hw: Arc<Hardware>,
    chain: SubdevChain,
    topology: Arc<Topology>,
    pending: Arc<PendingQueue>,
    retirer: Arc<Retirer>,
    sequence: Arc<AtomicU32>,
    control: Mutex<Control>,
}

impl Channel {
    /// Attaches a channel to its port.
    ///
    /// `chain` lists the upstream devices nearest first; `topology` is the
    /// graph ownership shared with every other channel of the same VI.
    pub fn new(
        config: ChannelConfig,
        hardware: ChannelHardware,
        chain: SubdevChain,
        topology: Arc<Topology>,
        owner: Arc<dyn BufferOwner>,
    ) -> Self {
        let config = config.validated();
        let hw = Arc::new(Hardware {
            port: config.port,
            vi: hardware.vi,
            csi: hardware.csi,
            syncpt: hardware.syncpt,
            timeout: config.syncpt_timeout,
        });

        let (info, formats, width, height) = init_formats(&chain);
        let mut format = PixFormat::new(info.fourcc, width, height);
        format::align(&mut format, config.align, info.bpp, &config.limits);

        info!(
            port = config.port,
            lanes = config.lanes,
            syncpt = hw.syncpt.id(),
            "attached channel {} upstream {:?} format {}",
            card_name(&config),
            chain,
            format
        );

        Self {
            pending: Arc::new(PendingQueue::new(config.queue_depth)),
            config,
            hw,
            chain,
            topology,
            retirer: Arc::new(Retirer::new(owner)),
            sequence: Arc::new(AtomicU32::new(0)),
            control: Mutex::new(Control {
                state: StreamState::Idle,
                format,
                info,
                formats,
                users: 0,
                session: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn port(&self) -> u8 {
        self.config.port
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn chain(&self) -> &SubdevChain {
        &self.chain
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// Buffers submitted and not yet retired.
    pub fn outstanding(&self) -> usize {
        self.retirer.outstanding()
    }

    /// Active format as last set.
    pub fn format(&self) -> PixFormat {
        self.lock().format
    }

    pub fn video_format(&self) -> &'static VideoFormat {
        self.lock().info
    }

    pub fn capabilities(&self) -> Capabilities {
        let device_caps = CAP_VIDEO_CAPTURE | CAP_STREAMING;
        Capabilities {
            driver: "tegra-video".to_string(),
            card: card_name(&self.config),
            bus_info: format!("platform:{}:{}", self.config.device, self.config.port),
            device_caps,
            capabilities: device_caps | CAP_DEVICE_CAPS,
        }
    }

    /// FourCC of the `index`-th format the sensor can deliver.
    pub fn enum_format(&self, index: u32) -> Result<FourCC> {
        self.lock()
            .formats
            .nth(index as usize)
            .map(|f| f.fourcc)
            .ok_or(Error::InvalidIndex(index))
    }

    /// Geometry currently active on the nearest negotiating upstream device.
    pub fn get_format(&self) -> Result<PixFormat> {
        let ctl = self.lock();
        let Some((_, pad)) = self.chain.first_format_pad() else {
            return Ok(ctl.format);
        };
        let mf = pad.active()?;
        let bytesperline = mf.width * ctl.info.bpp;
        Ok(PixFormat {
            pixelformat: ctl.format.pixelformat,
            width: mf.width,
            height: mf.height,
            bytesperline,
            sizeimage: bytesperline * mf.height,
        })
    }

    /// Negotiates `request` without changing any state.
    pub fn try_format(&self, request: &PixFormat) -> Result<PixFormat> {
        let _ctl = self.lock();
        self.negotiate(request, false).map(|n| n.format)
    }

    /// Negotiates `request` and makes it the channel format.
    ///
    /// Fails with [`Error::Busy`] while streaming or while buffers are
    /// still in the pipeline; the previous format is kept on any error.
    pub fn set_format(&self, request: &PixFormat) -> Result<PixFormat> {
        let mut ctl = self.lock();
        if ctl.session.is_some() || self.retirer.outstanding() > 0 {
            return Err(Error::Busy(format!(
                "port {} has buffers queued",
                self.config.port
            )));
        }

        let negotiated = self.negotiate(request, true)?;
        ctl.format = negotiated.format;
        ctl.info = negotiated.info;
        info!(port = self.config.port, "format {}", negotiated.format);
        Ok(negotiated.format)
    }

    /// Negotiation as [`negotiate`] with this channel's alignment and
    /// limits.
    pub fn negotiate(&self, request: &PixFormat, commit: bool) -> Result<Negotiated> {
        negotiate(
            &self.chain,
            request,
            self.config.align,
            &self.config.limits,
            commit,
        )
    }

    /// Checks a buffer request: `size`, if given, must hold a full image.
    /// Returns the buffer count (two when zero is asked) and the size.
    pub fn queue_setup(&self, count: u32, size: Option<u32>) -> Result<(u32, u32)> {
        let sizeimage = self.lock().format.sizeimage;
        let size = match size {
            Some(size) if size < sizeimage => {
                return Err(Error::BufferTooSmall {
                    size: size as usize,
                    required: sizeimage as usize,
                })
            }
            Some(size) => size,
            None => sizeimage,
        };
        let count = if count == 0 { 2 } else { count };
        Ok((count.min(self.config.queue_depth as u32), size))
    }

    /// Powers the VI path and the upstream chain on first open.
    pub fn open(&self) -> Result<()> {
        let mut ctl = self.lock();
        if ctl.users == 0 {
            self.chain.power_on()?;
            debug!(port = self.config.port, "powered on");
        }
        ctl.users += 1;
        Ok(())
    }

    /// Drops one user; the last close stops streaming, returns every queued
    /// buffer as errored and powers down.
    pub fn close(&self) -> Result<()> {
        let mut ctl = self.lock();
        if ctl.users == 0 {
            return Err(Error::NotOpen);
        }
        ctl.users -= 1;
        if ctl.users == 0 {
            if let Err(err) = self.stop_locked(&mut ctl) {
                warn!(port = self.config.port, "stop on close: {err}");
            }
            // Never streamed, or submitted after the last stop.
            self.retire_pending();
            if let Err(err) = self.chain.power_off() {
                error!(port = self.config.port, "failed to power off subdevices: {err}");
            }
            debug!(port = self.config.port, "powered off");
        }
        Ok(())
    }

    /// Queues a buffer for capture. Buffers may be queued before streaming
    /// starts; they are captured in submission order.
    pub fn submit(&self, mut buffer: CaptureBuffer) -> std::result::Result<(), Rejected> {
        let ctl = self.lock();
        if ctl.users == 0 {
            return Err(Rejected {
                buffer,
                error: Error::NotOpen,
            });
        }
        let required = ctl.format.sizeimage as usize;
        if buffer.size() < required {
            let size = buffer.size();
            return Err(Rejected {
                buffer,
                error: Error::BufferTooSmall { size, required },
            });
        }

        buffer.bind(self.config.port);
        self.retirer.track();
        if let Err((buffer, error)) = self.pending.enqueue(buffer) {
            self.retirer.untrack();
            return Err(Rejected { buffer, error });
        }
        Ok(())
    }

    /// Starts streaming. Starting an already streaming channel is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut ctl = self.lock();
        if ctl.session.is_some() {
            return Ok(());
        }
        if ctl.users == 0 {
            return Err(Error::NotOpen);
        }

        ctl.state = StreamState::Starting;
        match self.start_session(&ctl) {
            Ok(session) => {
                ctl.session = Some(session);
                ctl.state = StreamState::Streaming;
                info!(port = self.config.port, "streaming {}", ctl.format);
                Ok(())
            }
            Err(err) => {
                ctl.state = StreamState::Idle;
                self.retire_pending();
                error!(port = self.config.port, "stream start failed: {err}");
                Err(err)
            }
        }
    }

    /// Stops streaming and returns once every submitted buffer has been
    /// retired. Stopping an idle channel is a no-op.
    pub fn stop(&self) -> Result<()> {
        let mut ctl = self.lock();
        self.stop_locked(&mut ctl)
    }

    fn start_session(&self, ctl: &Control) -> Result<Session> {
        let port = self.config.port;
        let topology = self.topology.acquire(port, &self.chain)?;

        // On error past this point `topology` is dropped, releasing the
        // upstream devices.
        self.chain.stream_on()?;

        self.capture_setup(&ctl.format, ctl.info);
        self.sequence.store(0, Ordering::Release);

        let stop = Arc::new(StopSignal::new());
        let (handoff_tx, handoff_rx) = kanal::bounded::<Handoff>(self.config.queue_depth.max(1));

        let issue = IssueWorker {
            hw: self.hw.clone(),
            pending: self.pending.clone(),
            stop: stop.clone(),
            handoff: handoff_tx,
            stride: ctl.format.bytesperline,
        };
        let issue = match thread::Builder::new()
            .name(format!("vi-issue-{port}"))
            .spawn(move || issue.run())
        {
            Ok(handle) => handle,
            Err(err) => {
                self.stream_off();
                return Err(Error::WorkerSpawn(err));
            }
        };

        let complete = CompleteWorker {
            hw: self.hw.clone(),
            handoff: handoff_rx.clone(),
            retirer: self.retirer.clone(),
            sequence: self.sequence.clone(),
            sizeimage: ctl.format.sizeimage as usize,
        };
        let complete = match thread::Builder::new()
            .name(format!("vi-done-{port}"))
            .spawn(move || complete.run())
        {
            Ok(handle) => handle,
            Err(err) => {
                // Nobody finalizes frames: stop the issue worker and retire
                // what it hands over until it finishes.
                stop.request();
                self.pending.wake();
                retire_handoffs(&handoff_rx, &self.retirer);
                if issue.join().is_err() {
                    error!(port, "capture issue worker panicked");
                }
                self.stream_off();
                return Err(Error::WorkerSpawn(err));
            }
        };

        Ok(Session {
            topology,
            stop,
            issue,
            complete,
        })
    }

    fn stop_locked(&self, ctl: &mut Control) -> Result<()> {
        let Some(session) = ctl.session.take() else {
            return Ok(());
        };
        let port = self.config.port;
        ctl.state = StreamState::Stopping;

        // Issue first so nothing new reaches hardware, then let the complete
        // worker finalize what was handed to it.
        session.stop.request();
        self.pending.wake();
        if session.issue.join().is_err() {
            error!(port, "capture issue worker panicked");
        }
        if session.complete.join().is_err() {
            error!(port, "capture complete worker panicked");
        }

        let result = self.chain.stream_off();
        drop(session.topology);

        // Buffers submitted while the workers were shutting down.
        self.retire_pending();

        ctl.state = StreamState::Idle;
        info!(port, "stream stopped");
        result
    }

    fn capture_setup(&self, format: &PixFormat, info: &VideoFormat) {
        let csi = &self.hw.csi;
        csi.write(regs::CSI_ERROR_STATUS, regs::CSI_ERROR_STATUS_CLEAR);
        csi.write(
            regs::CSI_IMAGE_DEF,
            (1 << regs::BYPASS_PXL_TRANSFORM_OFFSET)
                | (info.img_fmt << regs::IMAGE_DEF_FORMAT_OFFSET)
                | regs::IMAGE_DEF_DEST_MEM,
        );
        csi.write(regs::CSI_IMAGE_DT, info.img_dt);
        csi.write(
            regs::CSI_IMAGE_SIZE_WC,
            format::word_count(format.width, info),
        );
        csi.write(
            regs::CSI_IMAGE_SIZE,
            (format.height << regs::IMAGE_SIZE_HEIGHT_OFFSET) | format.width,
        );
    }

    fn stream_off(&self) {
        if let Err(err) = self.chain.stream_off() {
            warn!(port = self.config.port, "stream off during rollback: {err}");
        }
    }

    fn retire_pending(&self) {
        for buffer in self.pending.drain() {
            debug!(port = self.config.port, "return {buffer}");
            self.retirer.error(buffer);
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let mut ctl = self.lock();
        if let Err(err) = self.stop_locked(&mut ctl) {
            warn!(port = self.config.port, "stop on detach: {err}");
        }
        drop(ctl);
        self.retire_pending();
        debug!(port = self.config.port, "detached, syncpt {} released", self.hw.syncpt.id());
    }
}

fn card_name(config: &ChannelConfig) -> String {
    format!("{}-output-{}", config.device, config.port)
}

/// Formats the sensor can deliver, and the default format and geometry.
fn init_formats(chain: &SubdevChain) -> (&'static VideoFormat, FormatSet, u32, u32) {
    let mut formats = FormatSet::default();
    let mut info = None;
    let mut width = format::DEFAULT_WIDTH;
    let mut height = format::DEFAULT_HEIGHT;

    let pad = chain
        .sensor()
        .and_then(|sensor| sensor.format_pad())
        .or_else(|| chain.first_format_pad().map(|(_, pad)| pad));

    if let Some(pad) = pad {
        for code in pad.codes() {
            if let Some(index) = format::index_by_code(code) {
                formats.insert(index);
                info.get_or_insert(&format::FORMATS[index]);
            }
        }
        if info.is_some() {
            if let Ok(active) = pad.active() {
                width = active.width;
                height = active.height;
            }
        }
    }

    let info = info.unwrap_or_else(format::default_format);
    if formats.is_empty() {
        if let Some(index) = format::index_by_code(info.code) {
            formats.insert(index);
        }
    }
    (info, formats, width, height)
}
