// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Format negotiation between userspace, the VI and the upstream chain.

use crate::{
    error::{Error, Result},
    format::{self, FrameLimits, PixFormat, VideoFormat},
    subdev::{MbusFormat, SubdevChain},
};
use tracing::debug;

/// Result of a negotiation: the adjusted geometry and the catalog entry
/// the channel will capture with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub format: PixFormat,
    pub info: &'static VideoFormat,
}

/// Resolves `request` against the format catalog, the channel alignment and
/// the upstream chain.
///
/// An unknown FourCC is replaced by the default format rather than refused.
/// The nearest device implementing format negotiation decides the final
/// geometry; devices without it are skipped, and a chain where none
/// implements it accepts the aligned geometry as is. With `commit` the
/// deciding device also makes the geometry active, otherwise nothing is
/// changed and repeated calls return the same result.
pub fn negotiate(
    chain: &SubdevChain,
    request: &PixFormat,
    channel_align: u32,
    limits: &FrameLimits,
    commit: bool,
) -> Result<Negotiated> {
    let info = format::by_fourcc(request.pixelformat).unwrap_or_else(format::default_format);

    let mut pix = *request;
    pix.pixelformat = info.fourcc;
    format::align(&mut pix, channel_align, info.bpp, limits);

    let mut mf = MbusFormat {
        code: info.code,
        width: pix.width,
        height: pix.height,
    };

    for dev in chain.iter() {
        let Some(pad) = dev.format_pad() else {
            continue;
        };

        pad.try_format(&mut mf).map_err(|err| match err {
            Error::FormatRejected { .. } => err,
            other => Error::FormatRejected {
                device: dev.name().to_string(),
                reason: other.to_string(),
            },
        })?;

        pix.width = mf.width;
        pix.height = mf.height;
        format::align(&mut pix, channel_align, info.bpp, limits);

        if commit {
            pad.set_format(&mf)?;
        }

        debug!(device = dev.name(), commit, "negotiated {pix}");
        return Ok(Negotiated { format: pix, info });
    }

    debug!(commit, "no upstream format negotiation, accepted {pix}");
    Ok(Negotiated { format: pix, info })
}
