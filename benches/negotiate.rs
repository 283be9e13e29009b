// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_capture::{
    format::{FrameLimits, FORMATS},
    negotiate::negotiate,
    sensor::Imx219,
    sim::SimI2c,
    FourCC, PixFormat, SubdevChain, Subdevice,
};
use std::{hint::black_box, sync::Arc};

pub fn benchmark_negotiate(c: &mut Criterion) {
    let dims = [(640, 480), (1280, 720), (1920, 1080), (3280, 2464)];
    let limits = FrameLimits::default();
    let sensor: Arc<dyn Subdevice> = Arc::new(Imx219::new("imx219 6-0010", Arc::new(SimI2c::new())));
    let chains = [
        ("none", SubdevChain::default()),
        ("imx219", SubdevChain::new(vec![sensor])),
    ];

    for (name, chain) in chains.iter() {
        let mut group = c.benchmark_group(format!("negotiate/{name}"));
        for fourcc in [FORMATS[0].fourcc, FORMATS[7].fourcc, FourCC(*b"XXXX")] {
            for dim in dims.iter() {
                let request = PixFormat::new(fourcc, dim.0, dim.1);
                group.bench_with_input(
                    format!("{}-{}x{}", fourcc, dim.0, dim.1),
                    &request,
                    |b, request| {
                        b.iter(|| negotiate(chain, black_box(request), 64, &limits, false))
                    },
                );
            }
        }
        group.finish();
    }
}

criterion_group!(benches, benchmark_negotiate);
criterion_main!(benches);
