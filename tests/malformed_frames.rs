//! Decoder behaviour on damaged input.

use zenvp8::{
    decode_frame, decode_frame_with_limits, encode_frame, DecodeError, DecodeLimits,
    EncoderConfig, YuvImage,
};

fn sample_frame(partitions: u8) -> Vec<u8> {
    let (w, h) = (48usize, 48usize);
    let y: Vec<u8> = (0..w * h).map(|i| ((i * 37) % 255) as u8).collect();
    let uv: Vec<u8> = (0..24 * 24).map(|i| (100 + i % 50) as u8).collect();
    let image = YuvImage::new(48, 48, &y, &uv, &uv);
    encode_frame(&image, &EncoderConfig::new().with_partitions(partitions)).unwrap()
}

fn first_partition_size(frame: &[u8]) -> usize {
    let tag = u32::from(frame[0]) | u32::from(frame[1]) << 8 | u32::from(frame[2]) << 16;
    (tag >> 5) as usize
}

#[test]
fn truncated_headers_are_rejected() {
    let frame = sample_frame(0);
    assert!(matches!(
        decode_frame(&frame[..6]),
        Err(DecodeError::NotEnoughInitData)
    ));
    // the first partition no longer fits
    let p0 = first_partition_size(&frame);
    assert!(matches!(
        decode_frame(&frame[..10 + p0 / 2]),
        Err(DecodeError::MalformedBitstream(_))
    ));
}

#[test]
fn wrong_start_code_is_reported() {
    let mut frame = sample_frame(0);
    frame[4] ^= 0xff;
    assert!(matches!(
        decode_frame(&frame),
        Err(DecodeError::Vp8MagicInvalid(_))
    ));
}

#[test]
fn partition_table_beyond_the_data_is_malformed() {
    let frame = sample_frame(2);
    let p0 = first_partition_size(&frame);
    let table = 10 + p0;
    // cut inside the size table
    assert!(matches!(
        decode_frame(&frame[..table + 4]),
        Err(DecodeError::MalformedBitstream(_))
    ));
    // a first token partition claiming more than what follows
    let mut bad = frame.clone();
    bad[table..table + 3].copy_from_slice(&[0xff, 0xff, 0x7f]);
    assert!(matches!(
        decode_frame(&bad),
        Err(DecodeError::MalformedBitstream(_))
    ));
}

#[test]
fn limits_are_checked_before_decoding() {
    let frame = sample_frame(0);
    let limits = DecodeLimits::default().max_dimensions(32, 32);
    assert!(matches!(
        decode_frame_with_limits(&frame, &limits),
        Err(DecodeError::ImageTooLarge)
    ));
    assert!(decode_frame_with_limits(&frame, &DecodeLimits::none()).is_ok());
}

#[test]
fn corrupted_tokens_never_panic() {
    let frame = sample_frame(1);
    let p0 = first_partition_size(&frame);
    for i in (10 + p0 + 3..frame.len()).step_by(3) {
        let mut damaged = frame.clone();
        damaged[i] = damaged[i].wrapping_mul(31).wrapping_add(7);
        // either outcome is fine, as long as it is not a panic
        if let Ok(decoded) = decode_frame(&damaged) {
            assert_eq!(decoded.y.len(), 48 * 48);
        }
    }
}
