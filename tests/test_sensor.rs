// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_capture::{
    format::MEDIA_BUS_FMT_SRGGB10_1X10,
    sensor::{self, imx219_tables, Imx219, Reg, SensorBus, MAX_RETRIES},
    sim::{SimI2c, SimVi},
    subdev::MbusFormat,
    CaptureBuffer, Channel, ChannelConfig, Error, FrameQueue, StreamState, SubdevChain,
    Subdevice, Topology,
};
use serial_test::serial;
use std::{
    error::Error as StdError,
    sync::Arc,
    time::{Duration, Instant},
};

type TestResult = Result<(), Box<dyn StdError>>;

fn register_writes(table: &[Reg]) -> Vec<(u16, u8)> {
    table
        .iter()
        .take_while(|r| r.addr != sensor::TABLE_END)
        .filter(|r| r.addr != sensor::TABLE_WAIT_MS)
        .map(|r| (r.addr, r.val))
        .collect()
}

#[test]
fn test_table_sentinels() -> TestResult {
    let bus = SimI2c::new();
    let table = [
        Reg::new(0x3000, 0x01),
        Reg::wait(5),
        Reg::new(0x3001, 0x02),
        Reg::END,
        Reg::new(0x3002, 0x03),
    ];

    let start = Instant::now();
    sensor::write_table(&bus, &table)?;
    assert!(start.elapsed() >= Duration::from_millis(5));
    assert_eq!(bus.writes(), vec![(0x3000, 0x01), (0x3001, 0x02)]);
    assert_eq!(bus.read_reg(0x3001)?, 0x02);
    Ok(())
}

#[test]
fn test_retry_budget() -> TestResult {
    let bus = SimI2c::new();

    bus.fail_next(MAX_RETRIES - 1);
    sensor::write_reg(&bus, 0x0100, 0x01)?;
    assert_eq!(bus.writes(), vec![(0x0100, 0x01)]);

    bus.clear();
    bus.fail_next(MAX_RETRIES);
    let err = sensor::write_reg(&bus, 0x0100, 0x01).unwrap_err();
    assert!(matches!(err, Error::Bus { addr: 0x0100, .. }));
    assert!(bus.writes().is_empty());

    // The bus recovered, the failure did not stick.
    sensor::write_reg(&bus, 0x0100, 0x00)?;
    assert_eq!(bus.writes(), vec![(0x0100, 0x00)]);
    Ok(())
}

#[test]
fn test_stream_writes_mode_table() -> TestResult {
    let bus = Arc::new(SimI2c::new());
    let imx219 = Imx219::new("imx219 6-0010", bus.clone());

    let err = imx219.set_stream(true).unwrap_err();
    assert!(matches!(err, Error::Subdevice { .. }));
    assert!(bus.writes().is_empty());

    imx219.set_power(true)?;
    imx219.set_stream(true)?;
    assert!(imx219.is_streaming());
    let writes = bus.writes();
    assert_eq!(writes, register_writes(&imx219_tables::MODE_3280X2464));
    assert_eq!(writes.first(), Some(&(0x0103, 0x01)));
    assert_eq!(writes.last(), Some(&(0x0100, 0x01)));

    bus.clear();
    imx219.set_stream(false)?;
    assert!(!imx219.is_streaming());
    assert_eq!(bus.writes(), vec![(0x0100, 0x00)]);
    Ok(())
}

#[test]
fn test_mode_selection() -> TestResult {
    let bus = Arc::new(SimI2c::new());
    let imx219 = Imx219::new("imx219 6-0010", bus.clone());
    let pad = imx219.format_pad().ok_or("no format pad")?;
    assert_eq!(pad.codes(), vec![MEDIA_BUS_FMT_SRGGB10_1X10]);

    let mut fmt = MbusFormat {
        code: 0,
        width: 1280,
        height: 720,
    };
    pad.try_format(&mut fmt)?;
    assert_eq!((fmt.code, fmt.width, fmt.height), (MEDIA_BUS_FMT_SRGGB10_1X10, 1280, 720));
    assert_eq!(pad.active()?.width, 3280);

    let mut odd = MbusFormat {
        code: MEDIA_BUS_FMT_SRGGB10_1X10,
        width: 640,
        height: 480,
    };
    pad.try_format(&mut odd)?;
    assert_eq!((odd.width, odd.height), (3280, 2464));

    pad.set_format(&fmt)?;
    assert_eq!(pad.active()?, fmt);

    imx219.set_power(true)?;
    imx219.set_stream(true)?;
    assert_eq!(
        bus.writes(),
        register_writes(&imx219_tables::MODE_1280X720)
    );
    assert!(matches!(pad.set_format(&odd), Err(Error::Busy(_))));
    Ok(())
}

#[test]
#[serial]
fn test_bus_failure_aborts_start() -> TestResult {
    let sim = SimVi::new();
    let bus = Arc::new(SimI2c::new());
    let imx219 = Arc::new(Imx219::new("imx219 6-0010", bus.clone()));
    let topology = Topology::new();
    let (owner, frames) = FrameQueue::new();
    let channel = Channel::new(
        ChannelConfig::default(),
        sim.hardware(0),
        SubdevChain::new(vec![imx219.clone() as Arc<dyn Subdevice>]),
        topology.clone(),
        Arc::new(owner),
    );
    channel.open()?;
    let size = channel.format().sizeimage as usize;
    channel.submit(CaptureBuffer::new(0, 0x8000_0000, size))?;

    // Software reset is the first register of the mode table.
    bus.fail_next(MAX_RETRIES);
    let err = channel.start().unwrap_err();
    assert!(matches!(err, Error::Bus { addr: 0x0103, .. }));
    assert_eq!(channel.state(), StreamState::Idle);
    assert!(!imx219.is_streaming());
    assert!(!topology.is_claimed("imx219 6-0010"));

    let failed = frames.try_recv()?.ok_or("buffer not returned")?;
    assert!(!failed.is_done());
    assert_eq!(channel.outstanding(), 0);
    Ok(())
}
