// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_capture::{
    format::CSI_DT_RAW10,
    regs,
    sensor::Imx219,
    sim::{SimI2c, SimVi},
    CaptureBuffer, Channel, ChannelConfig, Error, FourCC, FrameLimits, FrameQueue, Outcome,
    PixFormat, Retired, StreamState, SubdevChain, Subdevice, Topology,
};
use serial_test::serial;
use std::{
    error::Error as StdError,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

type TestResult = Result<(), Box<dyn StdError>>;

/// CSI receiver stand-in whose stream on can be made to fail.
struct Csi {
    name: String,
    fail_stream: AtomicBool,
    streaming: AtomicBool,
}

impl Csi {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_stream: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
        })
    }
}

impl Subdevice for Csi {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_stream(&self, enable: bool) -> edgefirst_capture::Result<()> {
        if enable && self.fail_stream.load(Ordering::SeqCst) {
            return Err(Error::Subdevice {
                device: self.name.clone(),
                reason: "lane sync lost".to_string(),
            });
        }
        self.streaming.store(enable, Ordering::SeqCst);
        Ok(())
    }
}

fn sensor() -> Arc<Imx219> {
    Arc::new(Imx219::new("imx219 6-0010", Arc::new(SimI2c::new())))
}

fn attach(
    sim: &SimVi,
    port: u8,
    chain: SubdevChain,
    topology: Arc<Topology>,
    timeout: Duration,
) -> (Arc<Channel>, kanal::Receiver<Retired>) {
    let (owner, frames) = FrameQueue::new();
    let config = ChannelConfig {
        port,
        syncpt_timeout: timeout,
        ..Default::default()
    };
    let channel = Channel::new(config, sim.hardware(port), chain, topology, Arc::new(owner));
    (Arc::new(channel), frames)
}

fn buffers(channel: &Channel, count: u32) -> Vec<CaptureBuffer> {
    let size = channel.format().sizeimage as usize;
    (0..count)
        .map(|i| CaptureBuffer::new(i, 0x8000_0000 + (i as u64) * 0x0100_0000, size))
        .collect()
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

fn retired(frames: &kanal::Receiver<Retired>) -> Vec<Retired> {
    let mut out = Vec::new();
    while let Ok(Some(frame)) = frames.try_recv() {
        out.push(frame);
    }
    out
}

fn sequences(frames: &[Retired]) -> Vec<Option<u32>> {
    frames
        .iter()
        .map(|f| match f.outcome {
            Outcome::Done { sequence, .. } => Some(sequence),
            Outcome::Error => None,
        })
        .collect()
}

#[test]
#[serial]
fn test_fifo_exactly_once() -> TestResult {
    let sim = SimVi::new();
    let (channel, frames) = attach(
        &sim,
        0,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_secs(1),
    );
    channel.open()?;
    let sizeimage = channel.format().sizeimage as usize;

    for buffer in buffers(&channel, 4) {
        channel.submit(buffer)?;
    }
    channel.start()?;
    assert_eq!(channel.state(), StreamState::Streaming);
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));

    let done = retired(&frames);
    assert_eq!(done.len(), 4);
    assert!(done.iter().all(Retired::is_done));
    assert_eq!(
        done.iter().map(|f| f.buffer.index()).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert_eq!(sequences(&done), vec![Some(0), Some(1), Some(2), Some(3)]);
    for frame in done.iter() {
        assert_eq!(frame.buffer.port(), Some(0));
        assert_eq!(frame.buffer.payload(), sizeimage);
    }

    // Requeued buffers keep counting within the session.
    for frame in done {
        channel.submit(frame.buffer)?;
    }
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));
    assert_eq!(
        sequences(&retired(&frames)),
        vec![Some(4), Some(5), Some(6), Some(7)]
    );

    // A new session starts from zero again.
    channel.stop()?;
    assert_eq!(channel.state(), StreamState::Idle);
    for buffer in buffers(&channel, 2) {
        channel.submit(buffer)?;
    }
    channel.start()?;
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));
    channel.stop()?;
    assert_eq!(sequences(&retired(&frames)), vec![Some(0), Some(1)]);
    assert_eq!(sim.single_shots(0), 10);

    channel.close()?;
    Ok(())
}

#[test]
#[serial]
fn test_stop_before_last_issued() -> TestResult {
    let sim = SimVi::new();
    let (channel, frames) = attach(
        &sim,
        0,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_secs(2),
    );
    channel.open()?;
    sim.hold_after(0, 1);

    for buffer in buffers(&channel, 3) {
        channel.submit(buffer)?;
    }
    channel.start()?;

    // Second frame is in hardware, third still pending.
    assert!(wait_until(Duration::from_secs(5), || sim.single_shots(0) == 2));
    let stopper = {
        let channel = channel.clone();
        thread::spawn(move || channel.stop())
    };
    thread::sleep(Duration::from_millis(50));
    sim.release(0);
    stopper.join().map_err(|_| "stop panicked")??;

    let done = retired(&frames);
    assert_eq!(
        done.iter().map(|f| f.buffer.index()).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(sequences(&done), vec![Some(0), Some(1), None]);
    assert_eq!(sim.single_shots(0), 2);
    assert_eq!(channel.outstanding(), 0);
    assert_eq!(channel.state(), StreamState::Idle);
    Ok(())
}

#[test]
#[serial]
fn test_stop_idle_workers() -> TestResult {
    let sim = SimVi::new();
    let (channel, frames) = attach(
        &sim,
        0,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_millis(200),
    );
    channel.open()?;
    channel.start()?;
    channel.start()?;
    thread::sleep(Duration::from_millis(10));
    channel.stop()?;
    channel.stop()?;
    assert!(retired(&frames).is_empty());
    assert_eq!(sim.single_shots(0), 0);
    Ok(())
}

#[test]
#[serial]
fn test_start_failure_rolls_back() -> TestResult {
    let sim = SimVi::new();
    let topology = Topology::new();
    let csi = Csi::new("nvcsi-0");
    let imx219 = sensor();
    csi.fail_stream.store(true, Ordering::SeqCst);

    let (channel, frames) = attach(
        &sim,
        0,
        SubdevChain::new(vec![csi.clone() as Arc<dyn Subdevice>, imx219.clone()]),
        topology.clone(),
        Duration::from_millis(200),
    );
    channel.open()?;
    for buffer in buffers(&channel, 2) {
        channel.submit(buffer)?;
    }

    let err = channel.start().unwrap_err();
    assert!(matches!(err, Error::Subdevice { ref device, .. } if device == "nvcsi-0"));
    assert_eq!(channel.state(), StreamState::Idle);
    assert!(!imx219.is_streaming());
    assert!(!topology.is_claimed("nvcsi-0"));
    assert!(!topology.is_claimed("imx219 6-0010"));

    // Pending buffers are handed back rather than kept for a later start.
    let failed = retired(&frames);
    assert_eq!(sequences(&failed), vec![None, None]);
    assert_eq!(channel.outstanding(), 0);
    assert_eq!(sim.single_shots(0), 0);

    csi.fail_stream.store(false, Ordering::SeqCst);
    for frame in failed {
        channel.submit(frame.buffer)?;
    }
    channel.start()?;
    assert!(topology.is_claimed("nvcsi-0"));
    assert!(imx219.is_streaming());
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));
    channel.stop()?;

    assert_eq!(sequences(&retired(&frames)), vec![Some(0), Some(1)]);
    assert!(!topology.is_claimed("nvcsi-0"));
    assert!(!csi.streaming.load(Ordering::SeqCst));
    Ok(())
}

#[test]
#[serial]
fn test_timeout_retires_error() -> TestResult {
    let sim = SimVi::new();
    let (channel, frames) = attach(
        &sim,
        0,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_millis(50),
    );
    channel.open()?;
    sim.drop_frames(0, 1);
    sim.set_error_status(0, 0x0000_0004);

    for buffer in buffers(&channel, 1) {
        channel.submit(buffer)?;
    }
    channel.start()?;
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));
    assert!(channel.is_streaming());
    channel.stop()?;

    let done = retired(&frames);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].outcome, Outcome::Error);
    assert_eq!(done[0].buffer.index(), 0);
    Ok(())
}

#[test]
#[serial]
fn test_dropped_frame_recovers() -> TestResult {
    let sim = SimVi::new();
    let (channel, frames) = attach(
        &sim,
        0,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_millis(50),
    );
    channel.open()?;
    sim.drop_frames(0, 1);

    for buffer in buffers(&channel, 4) {
        channel.submit(buffer)?;
    }
    channel.start()?;
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));
    channel.stop()?;

    let done = retired(&frames);
    assert_eq!(
        done.iter().map(|f| f.buffer.index()).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert_eq!(sequences(&done), vec![None, Some(1), Some(2), Some(3)]);
    assert!(sim
        .csi_writes(0)
        .contains(&(regs::CSI_SW_RESET, regs::SW_RESET_PIXEL_PARSER)));
    assert_eq!(sim.syncpt(0).pending(), 0);

    // The next session is unaffected.
    for frame in done {
        channel.submit(frame.buffer)?;
    }
    channel.start()?;
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));
    channel.stop()?;
    assert_eq!(
        sequences(&retired(&frames)),
        vec![Some(0), Some(1), Some(2), Some(3)]
    );
    Ok(())
}

#[test]
#[serial]
fn test_close_returns_queued_buffers() -> TestResult {
    let sim = SimVi::new();
    let (channel, frames) = attach(
        &sim,
        0,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_millis(200),
    );
    channel.open()?;
    channel.open()?;
    for buffer in buffers(&channel, 2) {
        channel.submit(buffer)?;
    }

    // Another user still holds the channel.
    channel.close()?;
    assert_eq!(channel.outstanding(), 2);
    assert!(retired(&frames).is_empty());

    channel.close()?;
    assert_eq!(channel.outstanding(), 0);
    let done = retired(&frames);
    assert_eq!(
        done.iter().map(|f| f.buffer.index()).collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert!(done.iter().all(|f| f.outcome == Outcome::Error));
    assert_eq!(sim.single_shots(0), 0);

    // Nothing left outstanding, so the format may change after reopening.
    channel.open()?;
    channel.set_format(&channel.format())?;
    channel.close()?;
    Ok(())
}

#[test]
fn test_config_is_validated() -> TestResult {
    let sim = SimVi::new();
    let (owner, _frames) = FrameQueue::new();
    let config = ChannelConfig {
        align: 0,
        lanes: 3,
        queue_depth: 0,
        limits: FrameLimits {
            min_width: 8192,
            max_width: 64,
            min_height: 1080,
            max_height: 32,
        },
        ..Default::default()
    };
    let channel = Channel::new(
        config,
        sim.hardware(0),
        SubdevChain::default(),
        Topology::new(),
        Arc::new(owner),
    );

    let config = channel.config();
    assert_eq!(config.align, 1);
    assert_eq!(config.lanes, 4);
    assert_eq!(config.queue_depth, 1);
    assert_eq!(
        config.limits,
        FrameLimits {
            min_width: 64,
            max_width: 8192,
            min_height: 32,
            max_height: 1080,
        }
    );

    let pix = channel.format();
    assert_eq!((pix.width, pix.height), (1920, 1080));
    assert_eq!(pix.bytesperline, 3840);

    let pix = channel.try_format(&PixFormat::new(FourCC(*b"RG10"), 8000, 4000))?;
    assert_eq!((pix.width, pix.height), (4096, 1080));
    Ok(())
}

#[test]
#[serial]
fn test_set_format_busy() -> TestResult {
    let sim = SimVi::new();
    let (channel, frames) = attach(
        &sim,
        0,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_secs(1),
    );
    channel.open()?;
    let before = channel.format();
    let request = edgefirst_capture::PixFormat::new(FourCC(*b"RG10"), 1280, 720);

    channel.submit(buffers(&channel, 1).remove(0))?;
    assert!(matches!(channel.set_format(&request), Err(Error::Busy(_))));
    assert_eq!(channel.format(), before);

    channel.start()?;
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));
    assert!(matches!(channel.set_format(&request), Err(Error::Busy(_))));
    channel.stop()?;
    assert_eq!(retired(&frames).len(), 1);

    let format = channel.set_format(&request)?;
    assert_eq!(format.width, 1280);
    assert_eq!(format.height, 720);
    assert_eq!(format.bytesperline, 2560);
    assert_eq!(channel.format(), format);
    assert_eq!(channel.get_format()?.width, 1280);
    Ok(())
}

#[test]
#[serial]
fn test_topology_shared_between_ports() -> TestResult {
    let sim = SimVi::new();
    let topology = Topology::new();
    let imx219 = sensor() as Arc<dyn Subdevice>;

    let (first, _frames0) = attach(
        &sim,
        0,
        SubdevChain::new(vec![imx219.clone()]),
        topology.clone(),
        Duration::from_millis(200),
    );
    let (second, _frames1) = attach(
        &sim,
        1,
        SubdevChain::new(vec![imx219]),
        topology.clone(),
        Duration::from_millis(200),
    );
    first.open()?;
    second.open()?;

    first.start()?;
    assert!(matches!(second.start(), Err(Error::Busy(_))));
    assert_eq!(second.state(), StreamState::Idle);

    first.stop()?;
    second.start()?;
    assert!(topology.is_claimed("imx219 6-0010"));
    second.stop()?;
    assert!(!topology.is_claimed("imx219 6-0010"));
    Ok(())
}

#[test]
#[serial]
fn test_submit_checks() -> TestResult {
    let sim = SimVi::new();
    let (owner, _frames) = FrameQueue::new();
    let config = ChannelConfig {
        queue_depth: 2,
        ..Default::default()
    };
    let channel = Channel::new(
        config,
        sim.hardware(0),
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Arc::new(owner),
    );
    let size = channel.format().sizeimage as usize;

    let rejected = channel.submit(CaptureBuffer::new(0, 0, size)).unwrap_err();
    assert!(matches!(rejected.error, Error::NotOpen));
    assert_eq!(rejected.buffer.index(), 0);

    channel.open()?;
    let rejected = channel
        .submit(CaptureBuffer::new(1, 0, size - 1))
        .unwrap_err();
    assert!(matches!(rejected.error, Error::BufferTooSmall { .. }));

    channel.submit(CaptureBuffer::new(2, 0, size))?;
    channel.submit(CaptureBuffer::new(3, 0, size))?;
    let rejected = channel.submit(CaptureBuffer::new(4, 0, size)).unwrap_err();
    assert!(matches!(rejected.error, Error::QueueFull(2)));
    assert_eq!(channel.outstanding(), 2);

    assert_eq!(channel.queue_setup(0, None)?, (2, size as u32));
    assert!(matches!(
        channel.queue_setup(4, Some(size as u32 - 1)),
        Err(Error::BufferTooSmall { .. })
    ));
    Ok(())
}

#[test]
#[serial]
fn test_capture_setup_registers() -> TestResult {
    let sim = SimVi::new();
    let (channel, frames) = attach(
        &sim,
        2,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_secs(1),
    );
    channel.open()?;
    let format = channel.format();

    let bufs = buffers(&channel, 1);
    let addr = bufs[0].addr();
    for buffer in bufs {
        channel.submit(buffer)?;
    }
    channel.start()?;
    assert!(wait_until(Duration::from_secs(5), || channel.outstanding() == 0));
    channel.stop()?;
    assert!(retired(&frames)[0].is_done());

    let writes = sim.csi_writes(2);
    assert_eq!(
        writes[0],
        (regs::CSI_ERROR_STATUS, regs::CSI_ERROR_STATUS_CLEAR)
    );
    assert_eq!(sim.csi_reg(2, regs::CSI_IMAGE_DT), CSI_DT_RAW10);
    assert_eq!(
        sim.csi_reg(2, regs::CSI_IMAGE_SIZE),
        (format.height << 16) | format.width
    );
    assert_eq!(sim.csi_reg(2, regs::CSI_IMAGE_SIZE_WC), format.width * 10 / 8);
    assert_eq!(sim.csi_reg(2, regs::CSI_SURFACE0_OFFSET_LSB), addr as u32);
    assert_eq!(sim.csi_reg(2, regs::CSI_SURFACE0_OFFSET_MSB), 0);
    assert_eq!(sim.csi_reg(2, regs::CSI_SURFACE0_STRIDE), format.bytesperline);
    Ok(())
}

#[test]
#[serial]
fn test_enum_format_and_capabilities() -> TestResult {
    let sim = SimVi::new();
    let (channel, _frames) = attach(
        &sim,
        1,
        SubdevChain::new(vec![sensor() as Arc<dyn Subdevice>]),
        Topology::new(),
        Duration::from_millis(200),
    );

    assert_eq!(channel.enum_format(0)?, FourCC(*b"RG10"));
    assert!(matches!(channel.enum_format(1), Err(Error::InvalidIndex(1))));

    let caps = channel.capabilities();
    assert_eq!(caps.driver, "tegra-video");
    assert_eq!(caps.card, "vi-output-1");
    assert_eq!(caps.bus_info, "platform:vi:1");
    assert_ne!(caps.device_caps & edgefirst_capture::channel::CAP_STREAMING, 0);

    assert!(matches!(channel.close(), Err(Error::NotOpen)));
    assert!(matches!(channel.start(), Err(Error::NotOpen)));
    Ok(())
}
