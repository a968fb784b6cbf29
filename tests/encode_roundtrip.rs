//! Encoder output decoded back with the crate's own decoder.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zenvp8::{
    decode_frame, encode_frame, encode_frame_with_stats, DecodedFrame, EncodeError, EncoderConfig,
    YuvImage,
};

struct Planes {
    width: u16,
    height: u16,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl Planes {
    fn new(width: u16, height: u16, f: impl Fn(usize, usize) -> [u8; 3]) -> Self {
        let (w, h) = (usize::from(width), usize::from(height));
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let y = (0..w * h).map(|i| f(i % w, i / w)[0]).collect();
        let u = (0..cw * ch).map(|i| f(i % cw * 2, i / cw * 2)[1]).collect();
        let v = (0..cw * ch).map(|i| f(i % cw * 2, i / cw * 2)[2]).collect();
        Self {
            width,
            height,
            y,
            u,
            v,
        }
    }

    fn noise(width: u16, height: u16, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let (w, h) = (usize::from(width), usize::from(height));
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        Self {
            width,
            height,
            y: (0..w * h).map(|_| rng.gen()).collect(),
            u: (0..cw * ch).map(|_| rng.gen_range(96..160)).collect(),
            v: (0..cw * ch).map(|_| rng.gen_range(96..160)).collect(),
        }
    }

    fn image(&self) -> YuvImage<'_> {
        YuvImage::new(self.width, self.height, &self.y, &self.u, &self.v)
    }
}

fn gradient(x: usize, y: usize) -> [u8; 3] {
    [
        (x * 3 + y * 2).min(255) as u8,
        (96 + x / 2) as u8,
        (160 - y / 2) as u8,
    ]
}

fn psnr(a: &[u8], b: &[u8]) -> f64 {
    assert_eq!(a.len(), b.len());
    let sse: f64 = a
        .iter()
        .zip(b)
        .map(|(&p, &q)| {
            let d = f64::from(p) - f64::from(q);
            d * d
        })
        .sum();
    if sse == 0.0 {
        return 99.0;
    }
    10.0 * (255.0 * 255.0 * a.len() as f64 / sse).log10()
}

fn roundtrip(planes: &Planes, config: &EncoderConfig) -> DecodedFrame {
    let frame = encode_frame(&planes.image(), config).unwrap();
    decode_frame(&frame).unwrap()
}

#[test]
fn flat_macroblock_at_quantizer_20_is_lossless() {
    let planes = Planes::new(16, 16, |_, _| [128, 128, 128]);
    let config = EncoderConfig::new().with_quality(79.5).with_segments(1);
    let (frame, stats) = encode_frame_with_stats(&planes.image(), &config).unwrap();
    assert_eq!(stats.segment_quant[0], 20);
    assert_eq!(stats.block_count_i16, 1);
    assert_eq!(stats.block_count_skip, 1);

    let decoded = decode_frame(&frame).unwrap();
    assert_eq!((decoded.width, decoded.height), (16, 16));
    assert!(decoded.y.iter().all(|&p| p == 128));
    assert!(decoded.u.iter().all(|&p| p == 128));
    assert!(decoded.v.iter().all(|&p| p == 128));
}

#[test]
fn smooth_content_survives_at_high_quality() {
    let planes = Planes::new(64, 48, gradient);
    let decoded = roundtrip(&planes, &EncoderConfig::new().with_quality(90.0));
    let p = psnr(&planes.y, &decoded.y);
    assert!(p > 30.0, "luma PSNR {p:.2}");
}

#[test]
fn odd_dimensions_are_cropped() {
    let planes = Planes::new(37, 23, gradient);
    let decoded = roundtrip(&planes, &EncoderConfig::new());
    assert_eq!((decoded.width, decoded.height), (37, 23));
    assert_eq!(decoded.y.len(), 37 * 23);
    assert_eq!(decoded.u.len(), 19 * 12);
    assert_eq!(decoded.v.len(), 19 * 12);
    assert!(psnr(&planes.y, &decoded.y) > 25.0);
}

#[test]
fn every_method_produces_a_decodable_frame() {
    let planes = Planes::noise(48, 40, 7);
    for method in 0..=6 {
        let config = EncoderConfig::new().with_method(method);
        let (frame, stats) = encode_frame_with_stats(&planes.image(), &config).unwrap();
        let decoded = decode_frame(&frame).unwrap();
        assert_eq!(decoded.y.len(), 48 * 40, "method {method}");
        assert_eq!(stats.block_count_i4 + stats.block_count_i16, 9);
    }
}

#[test]
fn lower_quality_gives_smaller_frames() {
    let planes = Planes::noise(64, 64, 11);
    let small = encode_frame(&planes.image(), &EncoderConfig::new().with_quality(20.0)).unwrap();
    let large = encode_frame(&planes.image(), &EncoderConfig::new().with_quality(95.0)).unwrap();
    assert!(small.len() < large.len(), "{} vs {}", small.len(), large.len());
}

#[test]
fn partition_count_does_not_change_the_picture() {
    let planes = Planes::new(48, 80, |x, y| {
        let [l, u, v] = gradient(x, y);
        [l ^ ((x * y) as u8 & 0x1f), u, v]
    });
    let reference = roundtrip(&planes, &EncoderConfig::new());
    for log2 in 1..=3 {
        let config = EncoderConfig::new().with_partitions(log2);
        let (frame, stats) = encode_frame_with_stats(&planes.image(), &config).unwrap();
        assert_eq!(stats.partition_bytes.len(), 1 << log2);
        assert_eq!(decode_frame(&frame).unwrap(), reference, "{log2}");
    }
}

#[test]
fn reported_psnr_matches_the_unfiltered_decode() {
    let planes = Planes::noise(32, 32, 3);
    let config = EncoderConfig::new().with_filter_strength(0);
    let (frame, stats) = encode_frame_with_stats(&planes.image(), &config).unwrap();
    let decoded = decode_frame(&frame).unwrap();
    let measured = psnr(&planes.y, &decoded.y);
    assert!(
        (f64::from(stats.psnr[0]) - measured).abs() < 0.01,
        "{} vs {measured}",
        stats.psnr[0]
    );
    assert_eq!(stats.segment_level, [0; 4]);
}

#[test]
fn simple_filter_frames_decode() {
    let planes = Planes::noise(40, 40, 5);
    let config = EncoderConfig::new()
        .with_simple_filter(true)
        .with_filter_strength(100)
        .with_filter_sharpness(4);
    let decoded = roundtrip(&planes, &config);
    assert_eq!(decoded.y.len(), 40 * 40);
}

#[test]
fn higher_psnr_targets_need_higher_quality() {
    let planes = Planes::new(64, 64, |x, y| {
        let [l, u, v] = gradient(x, y);
        [l.wrapping_add(((x * 31 + y * 17) % 23) as u8), u, v]
    });
    let search = |target: f32| {
        let config = EncoderConfig::new().with_target_psnr(target);
        encode_frame_with_stats(&planes.image(), &config).unwrap().1
    };
    let low = search(28.0);
    let high = search(45.0);
    assert!(low.passes >= 2);
    assert!(high.quality >= low.quality, "{} vs {}", high.quality, low.quality);
    assert!(high.psnr[3] >= low.psnr[3]);
}

#[test]
fn invalid_input_is_rejected() {
    let planes = Planes::new(16, 16, gradient);
    let empty = YuvImage::new(0, 16, &planes.y, &planes.u, &planes.v);
    assert!(matches!(
        encode_frame(&empty, &EncoderConfig::new()),
        Err(EncodeError::InvalidDimensions)
    ));

    let short = YuvImage::new(16, 16, &planes.y[..100], &planes.u, &planes.v);
    assert!(matches!(
        encode_frame(&short, &EncoderConfig::new()),
        Err(EncodeError::InvalidBufferSize(_))
    ));

    let mut config = EncoderConfig::new();
    config.quality = f32::NAN;
    assert!(matches!(
        encode_frame(&planes.image(), &config),
        Err(EncodeError::InvalidParameter(_))
    ));
}
