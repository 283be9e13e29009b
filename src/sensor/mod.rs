// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Image sensors and the register bus they are programmed over.
//!
//! Sensors are configured by replaying register tables. A table is a list of
//! 16-bit address / 8-bit value pairs where two reserved addresses act as
//! commands: [`TABLE_WAIT_MS`] sleeps for `val` milliseconds and
//! [`TABLE_END`] terminates the table.

mod imx219;
pub mod imx219_tables;

pub use imx219::{Imx219, Mode, MODES};

use crate::error::{Error, Result};
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::fd::AsRawFd,
    path::Path,
    sync::Mutex,
    thread,
    time::Duration,
};
use tracing::{trace, warn};

pub const TABLE_WAIT_MS: u16 = 0;
pub const TABLE_END: u16 = 1;
/// Attempts per register write before giving up.
pub const MAX_RETRIES: u32 = 3;
/// Back-off between attempts, and settle time after stream on.
pub const WAIT_MS: u8 = 3;

/// One register table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg {
    pub addr: u16,
    pub val: u8,
}

impl Reg {
    pub const END: Reg = Reg {
        addr: TABLE_END,
        val: 0,
    };

    pub const fn new(addr: u16, val: u8) -> Self {
        Self { addr, val }
    }

    pub const fn wait(ms: u8) -> Self {
        Self {
            addr: TABLE_WAIT_MS,
            val: ms,
        }
    }
}

/// Register access to a sensor: 16-bit addresses, 8-bit values.
pub trait SensorBus: Send + Sync {
    fn write_reg(&self, addr: u16, val: u8) -> io::Result<()>;
    fn read_reg(&self, addr: u16) -> io::Result<u8>;
}

/// Writes `addr`, retrying transient failures up to [`MAX_RETRIES`] times.
pub fn write_reg(bus: &dyn SensorBus, addr: u16, val: u8) -> Result<()> {
    let mut attempt = 1;
    loop {
        match bus.write_reg(addr, val) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < MAX_RETRIES => {
                warn!("write 0x{addr:04x}=0x{val:02x} failed ({err}), retry {attempt}");
                attempt += 1;
                thread::sleep(Duration::from_millis(WAIT_MS as u64));
            }
            Err(source) => return Err(Error::Bus { addr, source }),
        }
    }
}

/// Replays `table` up to its end marker.
pub fn write_table(bus: &dyn SensorBus, table: &[Reg]) -> Result<()> {
    for reg in table {
        match reg.addr {
            TABLE_END => break,
            TABLE_WAIT_MS => thread::sleep(Duration::from_millis(reg.val as u64)),
            addr => write_reg(bus, addr, reg.val)?,
        }
    }
    trace!("wrote table of {} entries", table.len());
    Ok(())
}

const I2C_SLAVE: u16 = 0x0703;

/// Sensor on a Linux `i2c-dev` adapter.
pub struct I2cDevice {
    file: Mutex<File>,
    addr: u16,
}

impl I2cDevice {
    /// Opens `path` (for example `/dev/i2c-6`) and binds slave `addr`.
    pub fn open(path: impl AsRef<Path>, addr: u16) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, addr as libc::c_ulong) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            file: Mutex::new(file),
            addr,
        })
    }

    pub fn addr(&self) -> u16 {
        self.addr
    }

    fn file(&self) -> std::sync::MutexGuard<'_, File> {
        self.file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SensorBus for I2cDevice {
    fn write_reg(&self, addr: u16, val: u8) -> io::Result<()> {
        let [hi, lo] = addr.to_be_bytes();
        self.file().write_all(&[hi, lo, val])
    }

    fn read_reg(&self, addr: u16) -> io::Result<u8> {
        let mut file = self.file();
        file.write_all(&addr.to_be_bytes())?;
        let mut val = [0u8; 1];
        file.read_exact(&mut val)?;
        Ok(val[0])
    }
}
