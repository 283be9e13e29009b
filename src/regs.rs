// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Register access for the video input (VI) unit.
//!
//! The VI exposes two address spaces a channel writes to: the global
//! capture-unit bank (sync point increment conditions) and one CSI bank per
//! port (image definition, surface address, single shot trigger). Both are
//! handed to a channel as owned handles; nothing in this crate reaches for
//! a global mapping.

/// Blocking 32-bit access to one register bank.
///
/// Offsets are in bytes relative to the start of the bank. Accesses are
/// posted writes and plain reads, like `writel`/`readl`, and cannot fail.
pub trait RegisterBank: Send + Sync {
    fn write(&self, offset: u32, val: u32);
    fn read(&self, offset: u32) -> u32;
}

/// Global VI register: arm a sync point increment on a hardware condition.
pub const VI_CFG_VI_INCR_SYNCPT: u32 = 0x000;

/// Encodes the condition field of [`VI_CFG_VI_INCR_SYNCPT`].
pub const fn vi_incr_syncpt_cond(cond: u32) -> u32 {
    cond << 8
}

/// Byte offset of the CSI bank for `port` within the VI aperture.
pub const fn vi_csi_base(port: u8) -> u32 {
    0x100 + port as u32 * 0x100
}

/// Frame start condition for `port`.
pub const fn vi_csi_pp_frame_start(port: u8) -> u32 {
    5 + port as u32 * 4
}

/// Memory write acknowledged condition for `port`.
pub const fn vi_csi_mw_ack_done(port: u8) -> u32 {
    7 + port as u32 * 4
}

// Per-port CSI bank.
pub const CSI_SW_RESET: u32 = 0x000;
pub const CSI_SINGLE_SHOT: u32 = 0x004;
pub const CSI_IMAGE_DEF: u32 = 0x00c;
pub const CSI_IMAGE_SIZE: u32 = 0x018;
pub const CSI_IMAGE_SIZE_WC: u32 = 0x01c;
pub const CSI_IMAGE_DT: u32 = 0x020;
pub const CSI_SURFACE0_OFFSET_MSB: u32 = 0x024;
pub const CSI_SURFACE0_OFFSET_LSB: u32 = 0x028;
pub const CSI_SURFACE0_STRIDE: u32 = 0x060;
pub const CSI_ERROR_STATUS: u32 = 0x084;

pub const SINGLE_SHOT_CAPTURE: u32 = 0x1;
/// Resets the pixel parser, dropping any armed frame condition.
pub const SW_RESET_PIXEL_PARSER: u32 = 0x1;
pub const BYPASS_PXL_TRANSFORM_OFFSET: u32 = 24;
pub const IMAGE_DEF_FORMAT_OFFSET: u32 = 16;
pub const IMAGE_DEF_DEST_MEM: u32 = 0x1;
pub const IMAGE_SIZE_HEIGHT_OFFSET: u32 = 16;

/// Writing all ones to [`CSI_ERROR_STATUS`] clears every latched error.
pub const CSI_ERROR_STATUS_CLEAR: u32 = 0xffff_ffff;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_conditions_do_not_overlap() {
        for a in 0..6u8 {
            for b in 0..6u8 {
                assert_ne!(vi_csi_pp_frame_start(a), vi_csi_mw_ack_done(b));
            }
        }
        assert_eq!(vi_csi_base(0), 0x100);
        assert_eq!(vi_csi_base(2), 0x300);
    }
}
