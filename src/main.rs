// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_capture::{
    sensor::{I2cDevice, Imx219, SensorBus},
    sim::{SimI2c, SimVi},
    CaptureBuffer, Channel, ChannelConfig, FrameQueue, Outcome, PixFormat, SubdevChain,
    Subdevice, Topology,
};
use std::{
    error::Error,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer};

/// 7-bit I2C address of the IMX219.
const SENSOR_ADDR: u16 = 0x10;
/// Bus address of the first simulated capture buffer.
const BUFFER_BASE: u64 = 0x8000_0000;

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stdout = tracing_subscriber::fmt::layer().with_filter(level);
    let journald = tracing_journald::layer()
        .ok()
        .map(|layer| layer.with_filter(level));
    let console = args
        .tokio_console
        .then(console_subscriber::spawn::<tracing_subscriber::Registry>);
    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(level))
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(console)
        .with(stdout)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn update_fps(prev: &mut Instant, history: &mut [i64], index: &mut usize) -> i64 {
    let now = Instant::now();

    let elapsed = now.duration_since(*prev);
    *prev = now;

    history[*index] = 1e9 as i64 / elapsed.as_nanos().max(1) as i64;
    *index = (*index + 1) % history.len();

    (history.iter().sum::<i64>() as f64 / history.len() as f64).round() as i64
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let bus: Arc<dyn SensorBus> = match &args.i2c {
        Some(path) => Arc::new(I2cDevice::open(path, SENSOR_ADDR)?),
        None => Arc::new(SimI2c::new()),
    };
    let sensor: Arc<dyn Subdevice> = Arc::new(Imx219::new(
        format!("imx219 {}-{:04x}", args.port, SENSOR_ADDR),
        bus,
    ));

    let vi = SimVi::new();
    if args.frame_latency > 0 {
        vi.set_latency(args.port, Some(Duration::from_millis(args.frame_latency)));
    }

    let (owner, frames) = FrameQueue::new();
    let channel = Arc::new(Channel::new(
        ChannelConfig::from(&args),
        vi.hardware(args.port),
        SubdevChain::new(vec![sensor]),
        Topology::new(),
        Arc::new(owner),
    ));
    let caps = channel.capabilities();
    info!("{} {} {}", caps.driver, caps.card, caps.bus_info);

    channel.open()?;

    let request = PixFormat::new(args.format, args.size[0], args.size[1]).with_stride(args.stride);
    let format = channel.set_format(&request)?;
    if format.width != args.size[0] || format.height != args.size[1] {
        warn!(
            "requested {}x{} but channel set {}x{}",
            args.size[0], args.size[1], format.width, format.height
        );
    }

    let (count, size) = channel.queue_setup(args.buffers, None)?;
    for index in 0..count {
        let addr = BUFFER_BASE + index as u64 * size as u64;
        channel.submit(CaptureBuffer::new(index, addr, size as usize))?;
    }

    let ch = channel.clone();
    tokio::task::spawn_blocking(move || ch.start()).await??;

    let frames = frames.to_async();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut captured = 0u64;
    let mut errors = 0u64;
    let mut prev = Instant::now();
    let mut history = vec![0; 30];
    let mut index = 0;
    loop {
        let retired = tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            retired = frames.recv() => retired?,
        };

        match retired.outcome {
            Outcome::Done {
                sequence,
                timestamp,
            } => {
                let fps = update_fps(&mut prev, &mut history, &mut index);
                if args.verbose {
                    info!(
                        sequence,
                        "frame {} at {}.{:09} fps: {}",
                        retired.buffer,
                        timestamp.seconds(),
                        timestamp.subsec(9),
                        fps
                    );
                }
            }
            Outcome::Error => {
                errors += 1;
                warn!("frame {} failed", retired.buffer);
            }
        }

        captured += 1;
        if args.frames > 0 && captured >= args.frames {
            break;
        }
        if let Err(rejected) = channel.submit(retired.buffer) {
            error!("requeue: {rejected}");
        }
    }

    let ch = channel.clone();
    tokio::task::spawn_blocking(move || ch.stop()).await??;
    channel.close()?;

    info!("captured {captured} frames, {errors} errors");
    Ok(())
}
