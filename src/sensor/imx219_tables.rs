// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! IMX219 mode tables, RAW10 output.

use super::{Reg, WAIT_MS};

pub static MODE_3280X2464: [Reg; 51] = [
    Reg::wait(10),
    // software reset
    Reg::new(0x0103, 0x01),
    // global settings
    Reg::new(0x30eb, 0x05),
    Reg::new(0x30eb, 0x0c),
    Reg::new(0x300a, 0xff),
    Reg::new(0x300b, 0xff),
    Reg::new(0x30eb, 0x05),
    Reg::new(0x30eb, 0x09),
    Reg::new(0x0114, 0x01),
    Reg::new(0x0128, 0x00),
    Reg::new(0x012a, 0x0c),
    Reg::new(0x012b, 0x00),
    Reg::new(0x0160, 0x09),
    Reg::new(0x0161, 0xc3),
    Reg::new(0x0162, 0x0d),
    Reg::new(0x0163, 0x78),
    Reg::new(0x0164, 0x00),
    Reg::new(0x0165, 0x00),
    Reg::new(0x0166, 0x0c),
    Reg::new(0x0167, 0xcf),
    Reg::new(0x0168, 0x00),
    Reg::new(0x0169, 0x00),
    Reg::new(0x016a, 0x09),
    Reg::new(0x016b, 0x9f),
    Reg::new(0x016c, 0x0c),
    Reg::new(0x016d, 0xd0),
    Reg::new(0x016e, 0x09),
    Reg::new(0x016f, 0xa0),
    Reg::new(0x0170, 0x01),
    Reg::new(0x0171, 0x01),
    Reg::new(0x0174, 0x00),
    Reg::new(0x0175, 0x00),
    Reg::new(0x018c, 0x0a),
    Reg::new(0x018d, 0x0a),
    Reg::new(0x0301, 0x05),
    Reg::new(0x0303, 0x01),
    Reg::new(0x0304, 0x02),
    Reg::new(0x0305, 0x02),
    Reg::new(0x0306, 0x00),
    Reg::new(0x0307, 0x4c),
    Reg::new(0x0309, 0x0a),
    Reg::new(0x030b, 0x01),
    Reg::new(0x030c, 0x00),
    Reg::new(0x030d, 0x98),
    Reg::new(0x4767, 0x0f),
    Reg::new(0x4750, 0x14),
    Reg::new(0x47b4, 0x14),
    Reg::new(0x5041, 0x00),
    // stream on
    Reg::new(0x0100, 0x01),
    Reg::wait(WAIT_MS),
    Reg::END,
];

pub static MODE_1280X720: [Reg; 82] = [
    Reg::wait(10),
    // software reset
    Reg::new(0x0103, 0x01),
    // global settings
    Reg::new(0x30eb, 0x05),
    Reg::new(0x30eb, 0x0c),
    Reg::new(0x300a, 0xff),
    Reg::new(0x300b, 0xff),
    Reg::new(0x30eb, 0x05),
    Reg::new(0x30eb, 0x09),
    Reg::new(0x0114, 0x03),
    Reg::new(0x0128, 0x00),
    Reg::new(0x012a, 0x18),
    Reg::new(0x012b, 0x00),
    // bank A
    Reg::new(0x0160, 0x02),
    Reg::new(0x0161, 0x8c),
    Reg::new(0x0162, 0x0d),
    Reg::new(0x0163, 0xe8),
    Reg::new(0x0164, 0x01),
    Reg::new(0x0165, 0x68),
    Reg::new(0x0166, 0x0b),
    Reg::new(0x0167, 0x67),
    Reg::new(0x0168, 0x02),
    Reg::new(0x0169, 0x00),
    Reg::new(0x016a, 0x07),
    Reg::new(0x016b, 0x9f),
    Reg::new(0x016c, 0x05),
    Reg::new(0x016d, 0x00),
    Reg::new(0x016e, 0x02),
    Reg::new(0x016f, 0xd0),
    Reg::new(0x0170, 0x01),
    Reg::new(0x0171, 0x01),
    Reg::new(0x0174, 0x03),
    Reg::new(0x0175, 0x03),
    Reg::new(0x018c, 0x0a),
    Reg::new(0x018d, 0x0a),
    // bank B
    Reg::new(0x0260, 0x02),
    Reg::new(0x0261, 0x8c),
    Reg::new(0x0262, 0x0d),
    Reg::new(0x0263, 0xe8),
    Reg::new(0x0264, 0x01),
    Reg::new(0x0265, 0x68),
    Reg::new(0x0266, 0x0b),
    Reg::new(0x0267, 0x67),
    Reg::new(0x0268, 0x02),
    Reg::new(0x0269, 0x00),
    Reg::new(0x026a, 0x07),
    Reg::new(0x026b, 0x9f),
    Reg::new(0x026c, 0x05),
    Reg::new(0x026d, 0x00),
    Reg::new(0x026e, 0x02),
    Reg::new(0x026f, 0xd0),
    Reg::new(0x0270, 0x01),
    Reg::new(0x0271, 0x01),
    Reg::new(0x0274, 0x03),
    Reg::new(0x0275, 0x03),
    Reg::new(0x028c, 0x0a),
    Reg::new(0x028d, 0x0a),
    // clock setting
    Reg::new(0x0301, 0x05),
    Reg::new(0x0303, 0x01),
    Reg::new(0x0304, 0x03),
    Reg::new(0x0305, 0x03),
    Reg::new(0x0306, 0x00),
    Reg::new(0x0307, 0x57),
    Reg::new(0x0309, 0x0a),
    Reg::new(0x030b, 0x01),
    Reg::new(0x030c, 0x00),
    Reg::new(0x030d, 0x5a),
    Reg::new(0x455e, 0x00),
    Reg::new(0x471e, 0x4b),
    Reg::new(0x4767, 0x0f),
    Reg::new(0x4750, 0x14),
    Reg::new(0x4540, 0x00),
    Reg::new(0x47b4, 0x14),
    Reg::new(0x4713, 0x30),
    Reg::new(0x478b, 0x10),
    Reg::new(0x478f, 0x10),
    Reg::new(0x4793, 0x10),
    Reg::new(0x4797, 0x0e),
    Reg::new(0x479b, 0x0e),
    Reg::new(0x5041, 0x00),
    // stream on
    Reg::new(0x0100, 0x01),
    Reg::wait(WAIT_MS),
    Reg::END,
];

pub static STREAM_OFF: [Reg; 2] = [Reg::new(0x0100, 0x00), Reg::END];
