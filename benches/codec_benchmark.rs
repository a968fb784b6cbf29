//! Criterion benchmarks for zenvp8 encoding and decoding.
//!
//! Tracks performance across:
//! - Methods 0-6 (speed/quality tradeoff)
//! - Quality levels (50, 75, 90)
//! - Content types (smooth gradient, noise)

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use zenvp8::{decode_frame, encode_frame, EncoderConfig, YuvImage};

const WIDTH: u16 = 256;
const HEIGHT: u16 = 256;

/// Synthetic 4:2:0 planes.
struct Planes {
    name: &'static str,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl Planes {
    fn image(&self) -> YuvImage<'_> {
        YuvImage::new(WIDTH, HEIGHT, &self.y, &self.u, &self.v)
    }
}

fn gradient() -> Planes {
    let (w, h) = (usize::from(WIDTH), usize::from(HEIGHT));
    let (cw, ch) = (w / 2, h / 2);
    Planes {
        name: "gradient",
        y: (0..w * h).map(|i| ((i % w + i / w) / 2) as u8).collect(),
        u: (0..cw * ch).map(|i| (64 + (i % cw) / 2) as u8).collect(),
        v: (0..cw * ch).map(|i| (192 - (i / cw) / 2) as u8).collect(),
    }
}

fn noise() -> Planes {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let (w, h) = (usize::from(WIDTH), usize::from(HEIGHT));
    let c = (w / 2) * (h / 2);
    Planes {
        name: "noise",
        y: (0..w * h).map(|_| rng.gen()).collect(),
        u: (0..c).map(|_| rng.gen_range(100..156)).collect(),
        v: (0..c).map(|_| rng.gen_range(100..156)).collect(),
    }
}

fn bench_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_methods");
    group.throughput(Throughput::Elements(u64::from(WIDTH) * u64::from(HEIGHT)));
    group.sample_size(20);

    for planes in [gradient(), noise()] {
        for method in 0..=6u8 {
            let config = EncoderConfig::new().with_quality(75.0).with_method(method);
            group.bench_with_input(
                BenchmarkId::new(planes.name, format!("m{method}")),
                &config,
                |b, config| b.iter(|| encode_frame(black_box(&planes.image()), config)),
            );
        }
    }
    group.finish();
}

fn bench_quality(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_quality");
    group.throughput(Throughput::Elements(u64::from(WIDTH) * u64::from(HEIGHT)));
    group.sample_size(20);

    let planes = noise();
    for quality in [50.0f32, 75.0, 90.0] {
        let config = EncoderConfig::new().with_quality(quality);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("q{quality}")),
            &config,
            |b, config| b.iter(|| encode_frame(black_box(&planes.image()), config)),
        );
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(u64::from(WIDTH) * u64::from(HEIGHT)));

    for planes in [gradient(), noise()] {
        for (label, config) in [
            ("normal_filter", EncoderConfig::new()),
            ("simple_filter", EncoderConfig::new().with_simple_filter(true)),
            ("partitions4", EncoderConfig::new().with_partitions(2)),
        ] {
            let Ok(frame) = encode_frame(&planes.image(), &config) else {
                continue;
            };
            group.bench_with_input(
                BenchmarkId::new(planes.name, label),
                &frame,
                |b, frame| b.iter(|| decode_frame(black_box(frame))),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_methods, bench_quality, bench_decode);
criterion_main!(benches);
