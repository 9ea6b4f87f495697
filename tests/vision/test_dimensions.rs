// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Resize clamping and the end-to-end upload scenario

use fleet_vision_capture::vision::exif::{embed_segment, orientation_segment};
use fleet_vision_capture::vision::{
    ImagePreprocessor, NormalizeOptions, Orientation, OutputFormat, RawFrame,
};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

fn gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        let grain = ((x * 31 + y * 17) % 13) as u8;
        Rgb([
            ((x * 255) / w.max(1)) as u8 ^ grain,
            ((y * 255) / h.max(1)) as u8,
            128u8.wrapping_add(grain),
        ])
    })
}

/// Smooth gradient, keeps the 12 MP JPEG well under the input size limit
fn smooth(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, 96]))
}

fn png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

#[test]
fn test_output_fits_bounds_and_keeps_aspect() {
    let preprocessor = ImagePreprocessor::inline();
    let cases = [
        ((800, 600), (400, 400)),
        ((600, 800), (400, 400)),
        ((1000, 250), (300, 1000)),
        ((333, 777), (100, 50)),
        ((640, 480), (1920, 1920)),
    ];

    for ((w, h), (max_w, max_h)) in cases {
        let options = NormalizeOptions {
            max_width: max_w,
            max_height: max_h,
            format: OutputFormat::Png,
            ..Default::default()
        };
        let frame = RawFrame::from_upload(png(&gradient(w, h)), "image/png");
        let image = preprocessor.normalize_blocking(frame, &options).unwrap();

        assert!(image.width() <= max_w && image.height() <= max_h, "{w}x{h} in {max_w}x{max_h}");
        assert!(image.width() <= w && image.height() <= h, "never upscales");
        let input_ratio = w as f64 / h as f64;
        let output_ratio = image.width() as f64 / image.height() as f64;
        // one pixel of rounding on the short edge
        let tolerance = input_ratio / image.width().min(image.height()) as f64 + 1e-9;
        assert!(
            (input_ratio - output_ratio).abs() <= tolerance.max(0.02),
            "aspect {input_ratio} vs {output_ratio}"
        );
    }
}

#[test]
fn test_large_rotated_jpeg_upload() {
    let mut jpeg = Vec::new();
    smooth(4000, 3000)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, 95))
        .unwrap();
    let jpeg = embed_segment(&jpeg, &orientation_segment(Orientation::Rotate90)).unwrap();
    let input_size = jpeg.len();

    let frame = RawFrame::from_upload(jpeg, "image/jpeg");
    assert_eq!(frame.orientation(), Some(Orientation::Rotate90));
    assert_eq!((frame.width(), frame.height()), (4000, 3000));

    let options = NormalizeOptions {
        max_width: 1920,
        quality: 0.85,
        auto_rotate: true,
        ..Default::default()
    };
    let image = ImagePreprocessor::inline().normalize_blocking(frame, &options).unwrap();

    assert!(image.width() <= 1920);
    assert!(image.height() > image.width(), "portrait after rotation");
    assert!(image.rotated());
    assert_eq!(image.orientation_applied().exif_value(), 6);
    assert!(image.byte_size() < input_size);
    assert_eq!(image.original_byte_size(), input_size);
    let ratio = image.compression_ratio();
    assert!(ratio > 1.0, "ratio {ratio}");
    let expected = input_size as f64 / image.byte_size() as f64;
    assert!((ratio - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_offloaded_normalize_matches_inline() {
    let bytes = png(&gradient(300, 200));
    let options = NormalizeOptions {
        max_width: 150,
        format: OutputFormat::Png,
        ..Default::default()
    };
    let offloaded = ImagePreprocessor::new()
        .normalize(RawFrame::from_upload(bytes.clone(), "image/png"), &options)
        .await
        .unwrap();
    let inline = ImagePreprocessor::inline()
        .normalize_blocking(RawFrame::from_upload(bytes, "image/png"), &options)
        .unwrap();
    assert_eq!(offloaded.bytes(), inline.bytes());
}
