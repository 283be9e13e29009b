// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_capture::{ChannelConfig, FourCC};
use std::{path::PathBuf, time::Duration};

/// Command-line arguments for the EdgeFirst VI capture node.
///
/// Arguments can be given on the command line or through the environment.
///
/// # Example
///
/// ```bash
/// # Capture 100 frames of 1280x720 RAW10 from port 2
/// edgefirst-capture --port 2 --size 1280 720 --frames 100
///
/// # Via environment variables
/// export PORT=2
/// export FORMAT=RG10
/// edgefirst-capture
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// VI port (CSI brick) to capture from
    #[arg(short, long, env = "PORT", default_value = "0")]
    pub port: u8,

    /// Number of CSI data lanes used by the sensor
    #[arg(long, env = "LANES", default_value = "2")]
    pub lanes: u8,

    /// Capture pixel format as a FourCC (e.g., RG10, YUYV)
    #[arg(short, long, env = "FORMAT", default_value = "RG10")]
    pub format: FourCC,

    /// Capture resolution in pixels (width height)
    #[arg(
        long,
        env = "SIZE",
        default_value = "3280 2464",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub size: Vec<u32>,

    /// Line stride in bytes, 0 picks the minimum for the width
    #[arg(long, env = "STRIDE", default_value = "0")]
    pub stride: u32,

    /// Number of capture buffers kept in flight
    #[arg(short, long, env = "BUFFERS", default_value = "4")]
    pub buffers: u32,

    /// Stop after this many frames, 0 captures until interrupted
    #[arg(long, env = "FRAMES", default_value = "0")]
    pub frames: u64,

    /// Sync point wait timeout in milliseconds
    #[arg(long, env = "SYNCPT_TIMEOUT", default_value = "200")]
    pub syncpt_timeout: u64,

    /// Simulated frame latency in milliseconds
    #[arg(long, env = "FRAME_LATENCY", default_value = "33")]
    pub frame_latency: u64,

    /// i2c-dev adapter of the sensor (e.g., /dev/i2c-6), simulated if unset
    #[arg(long, env = "I2C")]
    pub i2c: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl From<&Args> for ChannelConfig {
    fn from(args: &Args) -> Self {
        ChannelConfig {
            port: args.port,
            lanes: args.lanes,
            queue_depth: args.buffers.max(1) as usize,
            syncpt_timeout: Duration::from_millis(args.syncpt_timeout),
            ..Default::default()
        }
    }
}
