// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Upstream devices feeding a capture channel.
//!
//! Between the sensor and the VI sit any number of intermediate stages (a
//! CSI receiver, a serializer, ...). The chain is discovered once when the
//! channel is attached and stored nearest-first: index 0 feeds the channel
//! directly and the last entry is the sensor.
//!
//! Each stage may implement power control, stream control and format
//! negotiation. A missing capability is not an error: power and stream
//! requests default to doing nothing and a stage without a [`FormatPad`]
//! is skipped during negotiation.

use crate::error::{Error, Result};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, warn};

/// Geometry on a media bus link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbusFormat {
    pub code: u32,
    pub width: u32,
    pub height: u32,
}

/// Format negotiation capability of an upstream device.
pub trait FormatPad: Send + Sync {
    /// Bus codes the device can output, in preference order.
    fn codes(&self) -> Vec<u32>;

    /// Active geometry on the source pad.
    fn active(&self) -> Result<MbusFormat>;

    /// Adjusts `fmt` to the closest geometry the device supports, without
    /// changing the active configuration. Returns an error to reject.
    fn try_format(&self, fmt: &mut MbusFormat) -> Result<()>;

    /// Makes `fmt` the active configuration.
    fn set_format(&self, fmt: &MbusFormat) -> Result<()>;
}

pub trait Subdevice: Send + Sync {
    /// Entity name, unique within a media graph.
    fn name(&self) -> &str;

    fn set_power(&self, _on: bool) -> Result<()> {
        Ok(())
    }

    fn set_stream(&self, _enable: bool) -> Result<()> {
        Ok(())
    }

    fn format_pad(&self) -> Option<&dyn FormatPad> {
        None
    }
}

/// Ordered chain of upstream devices, nearest to the channel first.
#[derive(Clone, Default)]
pub struct SubdevChain {
    devices: Vec<Arc<dyn Subdevice>>,
}

impl fmt::Debug for SubdevChain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.devices.iter().map(|d| d.name()))
            .finish()
    }
}

impl SubdevChain {
    /// Builds a chain from devices listed nearest-first.
    pub fn new(devices: Vec<Arc<dyn Subdevice>>) -> Self {
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices in nearest-first order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn Subdevice>> {
        self.devices.iter()
    }

    /// The device farthest from the channel.
    pub fn sensor(&self) -> Option<&Arc<dyn Subdevice>> {
        self.devices.last()
    }

    /// Nearest device able to negotiate formats.
    pub fn first_format_pad(&self) -> Option<(&str, &dyn FormatPad)> {
        self.devices
            .iter()
            .find_map(|d| d.format_pad().map(|pad| (d.name(), pad)))
    }

    /// Enables streaming sensor first. On failure the devices already
    /// enabled are disabled again before the error is returned.
    pub fn stream_on(&self) -> Result<()> {
        for (i, dev) in self.devices.iter().enumerate().rev() {
            if let Err(err) = dev.set_stream(true) {
                warn!(device = dev.name(), "stream on failed: {err}");
                for enabled in self.devices[i + 1..].iter() {
                    if let Err(err) = enabled.set_stream(false) {
                        warn!(device = enabled.name(), "stream off failed: {err}");
                    }
                }
                return Err(err);
            }
            debug!(device = dev.name(), "stream on");
        }
        Ok(())
    }

    /// Disables streaming nearest first. Every device is visited, the first
    /// error is reported.
    pub fn stream_off(&self) -> Result<()> {
        let mut result = Ok(());
        for dev in self.devices.iter() {
            if let Err(err) = dev.set_stream(false) {
                warn!(device = dev.name(), "stream off failed: {err}");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Powers the chain up sensor first, rolling back on failure.
    pub fn power_on(&self) -> Result<()> {
        for (i, dev) in self.devices.iter().enumerate().rev() {
            if let Err(err) = dev.set_power(true) {
                for powered in self.devices[i + 1..].iter() {
                    if let Err(err) = powered.set_power(false) {
                        warn!(device = powered.name(), "power off failed: {err}");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn power_off(&self) -> Result<()> {
        let mut result = Ok(());
        for dev in self.devices.iter() {
            if let Err(err) = dev.set_power(false) {
                warn!(device = dev.name(), "power off failed: {err}");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

/// Media graph ownership: which channel currently streams through each
/// upstream device.
///
/// One `Topology` is shared by every channel of a VI instance. Starting a
/// stream claims every device of the channel's chain; a device claimed by
/// another port makes the start fail with [`Error::Busy`].
#[derive(Debug, Default)]
pub struct Topology {
    claimed: Mutex<HashMap<String, u8>>,
}

impl Topology {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquire(self: &Arc<Self>, port: u8, chain: &SubdevChain) -> Result<TopologyGuard> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);

        for dev in chain.iter() {
            if let Some(owner) = claimed.get(dev.name()) {
                return Err(Error::Busy(format!(
                    "{} is streaming for port {}",
                    dev.name(),
                    owner
                )));
            }
        }

        let names: Vec<String> = chain.iter().map(|d| d.name().to_string()).collect();
        for name in names.iter() {
            claimed.insert(name.clone(), port);
        }

        Ok(TopologyGuard {
            topology: self.clone(),
            names,
        })
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

/// Releases the claimed devices when dropped.
#[derive(Debug)]
pub struct TopologyGuard {
    topology: Arc<Topology>,
    names: Vec<String>,
}

impl Drop for TopologyGuard {
    fn drop(&mut self) {
        let mut claimed = self
            .topology
            .claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for name in self.names.iter() {
            claimed.remove(name);
        }
    }
}
