// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::{imx219_tables as tables, write_table, Reg, SensorBus};
use crate::{
    error::{Error, Result},
    format::MEDIA_BUS_FMT_SRGGB10_1X10,
    subdev::{FormatPad, MbusFormat, Subdevice},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// A sensor readout mode and the table that programs it.
#[derive(Debug)]
pub struct Mode {
    pub width: u32,
    pub height: u32,
    pub table: &'static [Reg],
}

pub static MODES: [Mode; 2] = [
    Mode {
        width: 3280,
        height: 2464,
        table: &tables::MODE_3280X2464,
    },
    Mode {
        width: 1280,
        height: 720,
        table: &tables::MODE_1280X720,
    },
];

#[derive(Debug, Default)]
struct State {
    mode: usize,
    powered: bool,
    streaming: bool,
}

/// Sony IMX219 8MP sensor, RAW10 RGGB output.
pub struct Imx219 {
    name: String,
    bus: Arc<dyn SensorBus>,
    state: Mutex<State>,
}

impl Imx219 {
    pub fn new(name: impl Into<String>, bus: Arc<dyn SensorBus>) -> Self {
        Self {
            name: name.into(),
            bus,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mode the next stream on programs.
    pub fn mode(&self) -> &'static Mode {
        &MODES[self.state().mode]
    }

    pub fn is_streaming(&self) -> bool {
        self.state().streaming
    }

    /// Exact size match, otherwise the full resolution mode.
    fn find_mode(width: u32, height: u32) -> usize {
        MODES
            .iter()
            .position(|m| m.width == width && m.height == height)
            .unwrap_or(0)
    }
}

impl Subdevice for Imx219 {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_power(&self, on: bool) -> Result<()> {
        let mut state = self.state();
        state.powered = on;
        if !on {
            state.streaming = false;
        }
        debug!(device = %self.name, "power {}", if on { "on" } else { "off" });
        Ok(())
    }

    fn set_stream(&self, enable: bool) -> Result<()> {
        let mut state = self.state();
        if !enable {
            write_table(self.bus.as_ref(), &tables::STREAM_OFF)?;
            state.streaming = false;
            return Ok(());
        }

        if !state.powered {
            return Err(Error::subdev(&self.name, "stream on while powered off"));
        }
        let mode = &MODES[state.mode];
        write_table(self.bus.as_ref(), mode.table)?;
        state.streaming = true;
        info!(device = %self.name, "streaming {}x{}", mode.width, mode.height);
        Ok(())
    }

    fn format_pad(&self) -> Option<&dyn FormatPad> {
        Some(self)
    }
}

impl FormatPad for Imx219 {
    fn codes(&self) -> Vec<u32> {
        vec![MEDIA_BUS_FMT_SRGGB10_1X10]
    }

    fn active(&self) -> Result<MbusFormat> {
        let mode = self.mode();
        Ok(MbusFormat {
            code: MEDIA_BUS_FMT_SRGGB10_1X10,
            width: mode.width,
            height: mode.height,
        })
    }

    fn try_format(&self, fmt: &mut MbusFormat) -> Result<()> {
        let mode = &MODES[Self::find_mode(fmt.width, fmt.height)];
        fmt.code = MEDIA_BUS_FMT_SRGGB10_1X10;
        fmt.width = mode.width;
        fmt.height = mode.height;
        Ok(())
    }

    fn set_format(&self, fmt: &MbusFormat) -> Result<()> {
        let mut state = self.state();
        if state.streaming {
            return Err(Error::Busy(format!("{} is streaming", self.name)));
        }
        state.mode = Self::find_mode(fmt.width, fmt.height);
        debug!(device = %self.name, "mode {}x{}", fmt.width, fmt.height);
        Ok(())
    }
}
