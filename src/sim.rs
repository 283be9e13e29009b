// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Software model of the VI unit and of a sensor I2C bus.
//!
//! [`SimVi`] hands out register banks and sync points that behave like the
//! hardware as far as a capture channel can observe: arming a condition
//! through `VI_CFG_VI_INCR_SYNCPT` and firing a single shot makes the port's
//! sync point advance once for frame start and once for the memory write
//! acknowledge. Frames can be held back, dropped or delayed to exercise the
//! timeout and shutdown paths.

use crate::{
    channel::ChannelHardware,
    regs::{self, RegisterBank},
    sensor::SensorBus,
    syncpt::{HostSyncpt, SyncPoint},
};
use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};
use tracing::trace;

/// First sync point id handed out; port `n` uses `SYNCPT_BASE + n`.
pub const SYNCPT_BASE: u32 = 16;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct RegFile {
    values: HashMap<u32, u32>,
    writes: Vec<(u32, u32)>,
}

impl RegFile {
    fn write(&mut self, offset: u32, val: u32) {
        self.values.insert(offset, val);
        self.writes.push((offset, val));
    }

    fn read(&self, offset: u32) -> u32 {
        self.values.get(&offset).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Engine {
    frame_start_armed: u32,
    mw_ack_armed: u32,
    /// Frames written before their acknowledge was armed.
    written: u32,
    shots: u32,
    hold_after: Option<u32>,
    held: u32,
    drop: u32,
    latency: Option<Duration>,
}

/// One VI port: its CSI registers, its sync point and the frame engine.
struct Port {
    id: u8,
    syncpt: Arc<HostSyncpt>,
    regs: Mutex<RegFile>,
    engine: Mutex<Engine>,
}

impl Port {
    fn new(id: u8) -> Arc<Self> {
        Arc::new(Self {
            id,
            syncpt: Arc::new(HostSyncpt::new(SYNCPT_BASE + id as u32)),
            regs: Mutex::new(RegFile::default()),
            engine: Mutex::new(Engine::default()),
        })
    }

    fn single_shot(self: &Arc<Self>) {
        let mut engine = lock(&self.engine);
        engine.shots += 1;
        trace!(port = self.id, shot = engine.shots, "single shot");

        if engine.drop > 0 {
            engine.drop -= 1;
            return;
        }
        if engine.hold_after.is_some_and(|n| engine.shots > n) {
            engine.held += 1;
            return;
        }
        let latency = engine.latency;
        match latency {
            Some(latency) => {
                drop(engine);
                let port = self.clone();
                thread::spawn(move || {
                    thread::sleep(latency);
                    port.frame();
                });
            }
            None => self.frame_locked(&mut engine),
        }
    }

    fn frame(&self) {
        let mut engine = lock(&self.engine);
        self.frame_locked(&mut engine);
    }

    fn frame_locked(&self, engine: &mut Engine) {
        if engine.frame_start_armed > 0 {
            engine.frame_start_armed -= 1;
            self.syncpt.incr();
        }
        if engine.mw_ack_armed > 0 {
            engine.mw_ack_armed -= 1;
            self.syncpt.incr();
        } else {
            engine.written += 1;
        }
    }

    /// Pixel parser reset: pending frame start conditions and held frames
    /// are gone. Memory writes already done still await their acknowledge.
    fn reset(&self) {
        let mut engine = lock(&self.engine);
        trace!(port = self.id, armed = engine.frame_start_armed, held = engine.held, "reset");
        engine.frame_start_armed = 0;
        engine.held = 0;
    }

    fn arm_frame_start(&self) {
        lock(&self.engine).frame_start_armed += 1;
    }

    fn arm_mw_ack(&self) {
        let mut engine = lock(&self.engine);
        if engine.written > 0 {
            engine.written -= 1;
            self.syncpt.incr();
        } else {
            engine.mw_ack_armed += 1;
        }
    }
}

struct CsiBank {
    port: Arc<Port>,
}

impl RegisterBank for CsiBank {
    fn write(&self, offset: u32, val: u32) {
        lock(&self.port.regs).write(offset, val);
        match offset {
            regs::CSI_SINGLE_SHOT if val & regs::SINGLE_SHOT_CAPTURE != 0 => {
                self.port.single_shot()
            }
            regs::CSI_SW_RESET if val & regs::SW_RESET_PIXEL_PARSER != 0 => self.port.reset(),
            _ => {}
        }
    }

    fn read(&self, offset: u32) -> u32 {
        lock(&self.port.regs).read(offset)
    }
}

type Ports = Mutex<HashMap<u8, Arc<Port>>>;

struct ViBank {
    regs: Mutex<RegFile>,
    ports: Arc<Ports>,
}

impl RegisterBank for ViBank {
    fn write(&self, offset: u32, val: u32) {
        lock(&self.regs).write(offset, val);
        if offset != regs::VI_CFG_VI_INCR_SYNCPT {
            return;
        }

        let cond = (val >> 8) & 0xff;
        let id = val & 0xff;
        let ports = lock(&self.ports);
        let Some(port) = ports.values().find(|p| p.syncpt.id() == id) else {
            trace!(cond, id, "increment armed on unknown port");
            return;
        };
        if cond == regs::vi_csi_pp_frame_start(port.id) {
            port.arm_frame_start();
        } else if cond == regs::vi_csi_mw_ack_done(port.id) {
            port.arm_mw_ack();
        }
    }

    fn read(&self, offset: u32) -> u32 {
        lock(&self.regs).read(offset)
    }
}

/// Simulated VI instance with any number of ports.
pub struct SimVi {
    vi: Arc<ViBank>,
    ports: Arc<Ports>,
}

impl Default for SimVi {
    fn default() -> Self {
        Self::new()
    }
}

impl SimVi {
    pub fn new() -> Self {
        let ports = Arc::new(Mutex::new(HashMap::new()));
        Self {
            vi: Arc::new(ViBank {
                regs: Mutex::new(RegFile::default()),
                ports: ports.clone(),
            }),
            ports,
        }
    }

    fn port(&self, id: u8) -> Arc<Port> {
        lock(&self.ports).entry(id).or_insert_with(|| Port::new(id)).clone()
    }

    /// Register banks and sync point for channel `port`.
    pub fn hardware(&self, port: u8) -> ChannelHardware {
        let port = self.port(port);
        ChannelHardware {
            vi: self.vi.clone(),
            syncpt: port.syncpt.clone(),
            csi: Arc::new(CsiBank { port }),
        }
    }

    pub fn syncpt(&self, port: u8) -> Arc<HostSyncpt> {
        self.port(port).syncpt.clone()
    }

    /// Single shots fired on `port` so far.
    pub fn single_shots(&self, port: u8) -> u32 {
        lock(&self.port(port).engine).shots
    }

    /// Last value written to CSI register `offset` of `port`.
    pub fn csi_reg(&self, port: u8, offset: u32) -> u32 {
        lock(&self.port(port).regs).read(offset)
    }

    /// Every CSI register write of `port`, oldest first.
    pub fn csi_writes(&self, port: u8) -> Vec<(u32, u32)> {
        lock(&self.port(port).regs).writes.clone()
    }

    /// Latches bits into the CSI error status, as a receiver fault would.
    pub fn set_error_status(&self, port: u8, status: u32) {
        lock(&self.port(port).regs).values.insert(regs::CSI_ERROR_STATUS, status);
    }

    /// Frames after the first `n` single shots are held until [`SimVi::release`].
    pub fn hold_after(&self, port: u8, n: u32) {
        lock(&self.port(port).engine).hold_after = Some(n);
    }

    /// Completes every held frame and stops holding.
    pub fn release(&self, port: u8) {
        let port = self.port(port);
        let mut engine = lock(&port.engine);
        engine.hold_after = None;
        for _ in 0..std::mem::take(&mut engine.held) {
            port.frame_locked(&mut engine);
        }
    }

    /// The next `n` single shots produce no events at all.
    pub fn drop_frames(&self, port: u8, n: u32) {
        lock(&self.port(port).engine).drop += n;
    }

    /// Delay between a single shot and its events.
    pub fn set_latency(&self, port: u8, latency: Option<Duration>) {
        lock(&self.port(port).engine).latency = latency;
    }
}

#[derive(Debug, Default)]
struct Bus {
    regs: HashMap<u16, u8>,
    writes: Vec<(u16, u8)>,
    fail: u32,
}

/// Simulated sensor bus recording every write.
#[derive(Debug, Default)]
pub struct SimI2c {
    bus: Mutex<Bus>,
}

impl SimI2c {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` accesses fail with a timeout.
    pub fn fail_next(&self, n: u32) {
        lock(&self.bus).fail = n;
    }

    pub fn writes(&self) -> Vec<(u16, u8)> {
        lock(&self.bus).writes.clone()
    }

    pub fn clear(&self) {
        lock(&self.bus).writes.clear();
    }

    fn check(bus: &mut Bus, addr: u16) -> io::Result<()> {
        if bus.fail > 0 {
            bus.fail -= 1;
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no ack for 0x{addr:04x}"),
            ));
        }
        Ok(())
    }
}

impl SensorBus for SimI2c {
    fn write_reg(&self, addr: u16, val: u8) -> io::Result<()> {
        let mut bus = lock(&self.bus);
        Self::check(&mut bus, addr)?;
        bus.regs.insert(addr, val);
        bus.writes.push((addr, val));
        Ok(())
    }

    fn read_reg(&self, addr: u16) -> io::Result<u8> {
        let mut bus = lock(&self.bus);
        Self::check(&mut bus, addr)?;
        Ok(bus.regs.get(&addr).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_shot_signals_armed_conditions() {
        let sim = SimVi::new();
        let hw = sim.hardware(1);
        let id = hw.syncpt.id();

        let fs = hw.syncpt.incr_max(1);
        hw.vi.write(
            regs::VI_CFG_VI_INCR_SYNCPT,
            regs::vi_incr_syncpt_cond(regs::vi_csi_pp_frame_start(1)) | id,
        );
        hw.csi.write(regs::CSI_SINGLE_SHOT, regs::SINGLE_SHOT_CAPTURE);
        assert_eq!(hw.syncpt.read(), fs);

        let ack = hw.syncpt.incr_max(1);
        hw.vi.write(
            regs::VI_CFG_VI_INCR_SYNCPT,
            regs::vi_incr_syncpt_cond(regs::vi_csi_mw_ack_done(1)) | id,
        );
        assert_eq!(hw.syncpt.read(), ack);
        assert_eq!(sim.single_shots(1), 1);
    }

    #[test]
    fn reset_disarms_dropped_frame_start() {
        let sim = SimVi::new();
        let hw = sim.hardware(0);
        let fs = regs::vi_incr_syncpt_cond(regs::vi_csi_pp_frame_start(0)) | hw.syncpt.id();
        sim.drop_frames(0, 1);

        hw.syncpt.incr_max(1);
        hw.vi.write(regs::VI_CFG_VI_INCR_SYNCPT, fs);
        hw.csi.write(regs::CSI_SINGLE_SHOT, regs::SINGLE_SHOT_CAPTURE);
        assert_eq!(hw.syncpt.read(), 0);

        hw.csi.write(regs::CSI_SW_RESET, regs::SW_RESET_PIXEL_PARSER);
        hw.syncpt.cpu_incr();

        // The stale condition does not fire on the next frame.
        let next = hw.syncpt.incr_max(1);
        hw.vi.write(regs::VI_CFG_VI_INCR_SYNCPT, fs);
        hw.csi.write(regs::CSI_SINGLE_SHOT, regs::SINGLE_SHOT_CAPTURE);
        assert_eq!(hw.syncpt.read(), next);
    }

    #[test]
    fn held_frames_complete_on_release() {
        let sim = SimVi::new();
        let hw = sim.hardware(0);
        sim.hold_after(0, 0);

        hw.syncpt.incr_max(1);
        hw.vi.write(
            regs::VI_CFG_VI_INCR_SYNCPT,
            regs::vi_incr_syncpt_cond(regs::vi_csi_pp_frame_start(0)) | hw.syncpt.id(),
        );
        hw.csi.write(regs::CSI_SINGLE_SHOT, regs::SINGLE_SHOT_CAPTURE);
        assert_eq!(hw.syncpt.read(), 0);

        sim.release(0);
        assert_eq!(hw.syncpt.read(), 1);
    }
}
