// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Target-size compression

use fleet_vision_capture::vision::{ImagePreprocessor, NormalizeOptions, RawFrame};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

fn detailed_jpeg(w: u32, h: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(w, h, |x, y| {
        let v = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) as u8;
        Rgb([v, v.rotate_left(3), (x + y) as u8])
    });
    let mut buf = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 98))
        .unwrap();
    buf
}

#[test]
fn test_compress_is_idempotent_in_effect() {
    let bytes = detailed_jpeg(640, 480);
    let preprocessor = ImagePreprocessor::inline();
    let options = NormalizeOptions::default();
    let target = bytes.len() / 4;

    let first = preprocessor
        .compress_to_target_size_blocking(RawFrame::from_upload(bytes.clone(), "image/jpeg"), target, &options)
        .unwrap();
    let second = preprocessor
        .compress_to_target_size_blocking(RawFrame::from_upload(bytes, "image/jpeg"), target, &options)
        .unwrap();

    let a = first.image.byte_size() as f64;
    let b = second.image.byte_size() as f64;
    assert!((a - b).abs() / a.max(b) <= 0.01);
    assert_eq!(first.quality_used, second.quality_used);
}

#[test]
fn test_compress_meets_reachable_target() {
    let bytes = detailed_jpeg(640, 480);
    let target = bytes.len() / 3;
    let outcome = ImagePreprocessor::inline()
        .compress_to_target_size_blocking(
            RawFrame::from_upload(bytes, "image/jpeg"),
            target,
            &NormalizeOptions::default(),
        )
        .unwrap();
    assert!(outcome.met_target);
    assert!(outcome.image.byte_size() <= target);
    assert!(outcome.quality_used <= 0.85);
}

#[tokio::test]
async fn test_unreachable_target_is_best_effort() {
    let bytes = detailed_jpeg(320, 240);
    let outcome = ImagePreprocessor::new()
        .compress_to_target_size(
            RawFrame::from_upload(bytes.clone(), "image/jpeg"),
            64,
            &NormalizeOptions::default(),
        )
        .await
        .unwrap();
    assert!(!outcome.met_target);
    assert!(outcome.image.byte_size() < bytes.len());
}
