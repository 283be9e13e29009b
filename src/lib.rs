// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst VI Capture Library
//!
//! Capture channel pipeline for the Tegra Video Input (VI) unit. A
//! [`Channel`] binds one VI port to its upstream chain of devices (CSI
//! receiver, sensor, ...), negotiates the frame format with them and moves
//! caller-owned buffers through the hardware while streaming.
//!
//! ## Features
//!
//! - **Format Negotiation**: FourCC catalog, DMA alignment and per-device
//!   adjustment along the upstream chain.
//! - **Two-Stage Capture**: one worker issues single shot captures, a second
//!   one waits for the memory write and retires buffers in FIFO order.
//! - **Sensor Support**: register table protocol over `i2c-dev` and an
//!   IMX219 sensor driver.
//! - **Simulation**: a software VI and I2C bus to run the full pipeline
//!   without hardware.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_capture::{
//!     sensor::Imx219, sim::{SimI2c, SimVi}, Channel, ChannelConfig, FrameQueue,
//!     CaptureBuffer, SubdevChain, Subdevice, Topology,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let vi = SimVi::new();
//! let sensor: Arc<dyn Subdevice> = Arc::new(Imx219::new("imx219 6-0010", Arc::new(SimI2c::new())));
//! let (owner, frames) = FrameQueue::new();
//!
//! let channel = Channel::new(
//!     ChannelConfig::default(),
//!     vi.hardware(0),
//!     SubdevChain::new(vec![sensor]),
//!     Topology::new(),
//!     Arc::new(owner),
//! );
//! channel.open()?;
//! let size = channel.format().sizeimage as usize;
//! channel.submit(CaptureBuffer::new(0, 0x8000_0000, size))?;
//! channel.start()?;
//! let frame = frames.recv()?;
//! println!("{} {:?}", frame.buffer, frame.outcome);
//! channel.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
mod capture;
pub mod channel;
pub mod error;
pub mod format;
pub mod negotiate;
pub mod queue;
pub mod regs;
pub mod sensor;
pub mod sim;
pub mod subdev;
pub mod syncpt;

pub use buffer::{BufferOwner, CaptureBuffer, FrameQueue, Outcome, Retired};
pub use channel::{Capabilities, Channel, ChannelConfig, ChannelHardware, StreamState};
pub use error::{Error, Result};
pub use format::{FourCC, FrameLimits, PixFormat};
pub use subdev::{SubdevChain, Subdevice, Topology};
