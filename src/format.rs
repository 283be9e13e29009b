// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel format catalog and geometry alignment.
//!
//! Every format the VI can write to memory is described once in [`FORMATS`].
//! A descriptor pairs the userspace FourCC with the media bus code a sensor
//! reports, and carries what the capture unit must be programmed with: the
//! image format enumerant, the CSI-2 data type, and the pixel sizes on the
//! bus and in memory.

use core::fmt;

/// Four character pixel format code as used by V4L2.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl From<u32> for FourCC {
    fn from(value: u32) -> Self {
        FourCC(value.to_le_bytes())
    }
}

impl From<FourCC> for u32 {
    fn from(value: FourCC) -> Self {
        u32::from_le_bytes(value.0)
    }
}

impl std::str::FromStr for FourCC {
    type Err = String;

    /// Parses exactly four ASCII characters. Codes that are not in the
    /// catalog are still valid FourCCs, negotiation replaces them later.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("fourcc must be 4 characters: {s:?}"))?;
        Ok(FourCC(bytes))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

// Media bus codes reported by sensors.
pub const MEDIA_BUS_FMT_RGB888_1X24: u32 = 0x100a;
pub const MEDIA_BUS_FMT_UYVY8_1X16: u32 = 0x200f;
pub const MEDIA_BUS_FMT_YUYV8_1X16: u32 = 0x2011;
pub const MEDIA_BUS_FMT_SBGGR8_1X8: u32 = 0x3001;
pub const MEDIA_BUS_FMT_SGRBG8_1X8: u32 = 0x3002;
pub const MEDIA_BUS_FMT_SBGGR10_1X10: u32 = 0x3007;
pub const MEDIA_BUS_FMT_SBGGR12_1X12: u32 = 0x3008;
pub const MEDIA_BUS_FMT_SGRBG10_1X10: u32 = 0x300a;
pub const MEDIA_BUS_FMT_SGBRG10_1X10: u32 = 0x300e;
pub const MEDIA_BUS_FMT_SRGGB10_1X10: u32 = 0x300f;
pub const MEDIA_BUS_FMT_SGBRG12_1X12: u32 = 0x3010;
pub const MEDIA_BUS_FMT_SGRBG12_1X12: u32 = 0x3011;
pub const MEDIA_BUS_FMT_SRGGB12_1X12: u32 = 0x3012;
pub const MEDIA_BUS_FMT_SGBRG8_1X8: u32 = 0x3013;
pub const MEDIA_BUS_FMT_SRGGB8_1X8: u32 = 0x3014;

// VI memory image formats.
pub const T_L8: u32 = 16;
pub const T_R16_I: u32 = 32;
pub const T_A8R8G8B8: u32 = 65;
pub const T_U8_Y8__V8_Y8: u32 = 193;
pub const T_Y8_U8__Y8_V8: u32 = 194;

// CSI-2 data types.
pub const CSI_DT_YUV422_8: u32 = 0x1e;
pub const CSI_DT_RGB888: u32 = 0x24;
pub const CSI_DT_RAW8: u32 = 0x2a;
pub const CSI_DT_RAW10: u32 = 0x2b;
pub const CSI_DT_RAW12: u32 = 0x2c;

/// Immutable description of one supported pixel layout.
#[derive(Debug, PartialEq, Eq)]
pub struct VideoFormat {
    /// Media bus code the upstream devices negotiate with.
    pub code: u32,
    /// Bits per pixel on the CSI bus, used for the word count.
    pub bus_width: u32,
    /// Bytes per pixel in memory.
    pub bpp: u32,
    pub img_fmt: u32,
    pub img_dt: u32,
    pub fourcc: FourCC,
    pub description: &'static str,
}

const fn video_format(
    code: u32,
    bus_width: u32,
    bpp: u32,
    img_fmt: u32,
    img_dt: u32,
    fourcc: &[u8; 4],
    description: &'static str,
) -> VideoFormat {
    VideoFormat {
        code,
        bus_width,
        bpp,
        img_fmt,
        img_dt,
        fourcc: FourCC(*fourcc),
        description,
    }
}

#[rustfmt::skip]
pub static FORMATS: [VideoFormat; 15] = [
    video_format(MEDIA_BUS_FMT_SBGGR8_1X8, 8, 1, T_L8, CSI_DT_RAW8, b"BA81", "BGBG.. GRGR.."),
    video_format(MEDIA_BUS_FMT_SGBRG8_1X8, 8, 1, T_L8, CSI_DT_RAW8, b"GBRG", "GBGB.. RGRG.."),
    video_format(MEDIA_BUS_FMT_SGRBG8_1X8, 8, 1, T_L8, CSI_DT_RAW8, b"GRBG", "GRGR.. BGBG.."),
    video_format(MEDIA_BUS_FMT_SRGGB8_1X8, 8, 1, T_L8, CSI_DT_RAW8, b"RGGB", "RGRG.. GBGB.."),
    video_format(MEDIA_BUS_FMT_SBGGR10_1X10, 10, 2, T_R16_I, CSI_DT_RAW10, b"BG10", "BGBG.. GRGR.."),
    video_format(MEDIA_BUS_FMT_SGBRG10_1X10, 10, 2, T_R16_I, CSI_DT_RAW10, b"GB10", "GBGB.. RGRG.."),
    video_format(MEDIA_BUS_FMT_SGRBG10_1X10, 10, 2, T_R16_I, CSI_DT_RAW10, b"BA10", "GRGR.. BGBG.."),
    video_format(MEDIA_BUS_FMT_SRGGB10_1X10, 10, 2, T_R16_I, CSI_DT_RAW10, b"RG10", "RGRG.. GBGB.."),
    video_format(MEDIA_BUS_FMT_SBGGR12_1X12, 12, 2, T_R16_I, CSI_DT_RAW12, b"BG12", "BGBG.. GRGR.."),
    video_format(MEDIA_BUS_FMT_SGBRG12_1X12, 12, 2, T_R16_I, CSI_DT_RAW12, b"GB12", "GBGB.. RGRG.."),
    video_format(MEDIA_BUS_FMT_SGRBG12_1X12, 12, 2, T_R16_I, CSI_DT_RAW12, b"BA12", "GRGR.. BGBG.."),
    video_format(MEDIA_BUS_FMT_SRGGB12_1X12, 12, 2, T_R16_I, CSI_DT_RAW12, b"RG12", "RGRG.. GBGB.."),
    video_format(MEDIA_BUS_FMT_RGB888_1X24, 24, 4, T_A8R8G8B8, CSI_DT_RGB888, b"RGB4", "RGB-8-8-8-8"),
    video_format(MEDIA_BUS_FMT_UYVY8_1X16, 16, 2, T_U8_Y8__V8_Y8, CSI_DT_YUV422_8, b"UYVY", "YUV 4:2:2"),
    video_format(MEDIA_BUS_FMT_YUYV8_1X16, 16, 2, T_Y8_U8__Y8_V8, CSI_DT_YUV422_8, b"YUYV", "YUV 4:2:2"),
];

/// Bus code of the format used when a request names an unknown FourCC.
pub const DEFAULT_CODE: u32 = MEDIA_BUS_FMT_SRGGB10_1X10;

pub fn index_by_code(code: u32) -> Option<usize> {
    FORMATS.iter().position(|f| f.code == code)
}

pub fn by_code(code: u32) -> Option<&'static VideoFormat> {
    FORMATS.iter().find(|f| f.code == code)
}

pub fn by_fourcc(fourcc: FourCC) -> Option<&'static VideoFormat> {
    FORMATS.iter().find(|f| f.fourcc == fourcc)
}

pub fn default_format() -> &'static VideoFormat {
    // DEFAULT_CODE is a catalog entry, index 7.
    by_code(DEFAULT_CODE).unwrap_or(&FORMATS[7])
}

/// Number of bus words the CSI receiver expects per line.
pub const fn word_count(width: u32, fmt: &VideoFormat) -> u32 {
    width * fmt.bus_width / 8
}

/// Geometry exchanged with the format control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFormat {
    pub pixelformat: FourCC,
    pub width: u32,
    pub height: u32,
    /// Stride in bytes; zero lets the negotiator pick the minimum.
    pub bytesperline: u32,
    pub sizeimage: u32,
}

impl PixFormat {
    pub fn new(pixelformat: FourCC, width: u32, height: u32) -> Self {
        Self {
            pixelformat,
            width,
            height,
            bytesperline: 0,
            sizeimage: 0,
        }
    }

    pub fn with_stride(mut self, bytesperline: u32) -> Self {
        self.bytesperline = bytesperline;
        self
    }
}

impl fmt::Display for PixFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {} stride:{} size:{}",
            self.width, self.height, self.pixelformat, self.bytesperline, self.sizeimage
        )
    }
}

/// Hardware frame bounds. Widths are counted in bytes per line, the unit the
/// VI write engine works in; heights are in lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            min_width: 32,
            max_width: 32768,
            min_height: 32,
            max_height: 32768,
        }
    }
}

impl FrameLimits {
    /// Same bounds with any inverted min/max pair swapped.
    pub fn ordered(self) -> Self {
        Self {
            min_width: self.min_width.min(self.max_width),
            max_width: self.min_width.max(self.max_width),
            min_height: self.min_height.min(self.max_height),
            max_height: self.min_height.max(self.max_height),
        }
    }
}

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

pub const fn lcm(a: u32, b: u32) -> u32 {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}

const fn round_up(v: u32, align: u32) -> u32 {
    let r = (v as u64).div_ceil(align as u64) * align as u64;
    if r > u32::MAX as u64 {
        round_down(u32::MAX, align)
    } else {
        r as u32
    }
}

const fn round_down(v: u32, align: u32) -> u32 {
    v / align * align
}

/// Rounds and clamps `pix` to what the VI can write for a format of `bpp`
/// bytes per pixel on a channel whose DMA requires `channel_align` bytes.
///
/// The result satisfies `bytesperline % channel_align == 0` and
/// `sizeimage == bytesperline * height`, with width and height inside
/// `limits`. A zero or too small stride is raised to `width * bpp`.
pub fn align(pix: &mut PixFormat, channel_align: u32, bpp: u32, limits: &FrameLimits) {
    let limits = &limits.ordered();
    let channel_align = channel_align.max(1);
    let bpp = bpp.max(1);
    let align = lcm(channel_align, bpp);
    let min_width = round_up(limits.min_width, align);
    let max_width = round_down(limits.max_width, align).max(min_width);
    let width = round_up(pix.width.saturating_mul(bpp), align);

    pix.width = width.clamp(min_width, max_width) / bpp;
    pix.height = pix.height.clamp(limits.min_height, limits.max_height);

    let min_bpl = pix.width * bpp;
    let max_bpl = round_down(limits.max_width, channel_align).max(min_bpl);
    let bpl = round_up(pix.bytesperline, channel_align);

    pix.bytesperline = bpl.clamp(min_bpl, max_bpl);
    pix.sizeimage = pix.bytesperline * pix.height;
}

/// Set of catalog entries, one bit per index into [`FORMATS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatSet(u64);

impl FormatSet {
    pub fn insert(&mut self, index: usize) {
        if index < FORMATS.len() {
            self.0 |= 1 << index;
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index < FORMATS.len() && self.0 & (1 << index) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The `n`-th format of the set, in catalog order.
    pub fn nth(&self, n: usize) -> Option<&'static VideoFormat> {
        FORMATS
            .iter()
            .enumerate()
            .filter(|(i, _)| self.contains(*i))
            .map(|(_, f)| f)
            .nth(n)
    }
}
