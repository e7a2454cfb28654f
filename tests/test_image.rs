// tests/test_image.rs -- Integration tests for Image<T>, BgrImage<T> and conversions.
//
// Runs with `cargo test --test test_image`. Only the public API is visible
// here, which keeps the frame containers honest for downstream callers.

use lipflip::convert;
use lipflip::image::{interpolate_bilinear, resize_bgr, resize_bilinear, BgrImage, Image};
use lipflip::Error;

// ===== Image construction & access =====

#[test]
fn image_from_vec_layout() {
    // 3×2, row-major:
    //  [10, 20, 30]
    //  [40, 50, 60]
    let img = Image::from_vec(3, 2, vec![10u8, 20, 30, 40, 50, 60]);
    assert_eq!(img.get(0, 0), 10);
    assert_eq!(img.get(2, 0), 30);
    assert_eq!(img.get(0, 1), 40);
    assert_eq!(img.get(2, 1), 60);
}

#[test]
fn sub_image_rows_skip_parent_padding() {
    // A 2x2 view of a 4-wide image steps over the parent's row length.
    let img = Image::from_fn(4, 3, |x, y| (y * 4 + x) as u8);
    let view = img.sub_image(1, 1, 2, 2);
    assert_eq!(view.get(0, 0), 5);
    assert_eq!(view.get(1, 1), 10);

    let pixels: Vec<_> = img.pixels().take(5).collect();
    assert_eq!(pixels, vec![(0, 0, 0), (1, 0, 1), (2, 0, 2), (3, 0, 3), (0, 1, 4)]);
}

#[test]
fn paste_writes_only_inside_target() {
    let mut canvas: Image<u8> = Image::new(6, 4);
    let patch = Image::filled(2, 2, 9u8);
    canvas.paste(&patch, 3, 1);

    for (x, y, v) in canvas.pixels() {
        let inside = (3..5).contains(&x) && (1..3).contains(&y);
        assert_eq!(v, if inside { 9 } else { 0 }, "at ({x}, {y})");
    }
}

#[test]
fn sub_image_to_owned_decoupled() {
    let img = Image::from_vec(4, 4, (0..16).collect::<Vec<u8>>());
    let owned = img.sub_image(1, 1, 2, 2).to_owned_image();
    assert_eq!(owned.dimensions(), (2, 2));
    assert_eq!(owned.stride(), 2);
    assert_eq!(owned.get(0, 0), 5);
    assert_eq!(owned.get(1, 1), 10);
}

#[test]
fn empty_image_reports_empty() {
    let img: Image<u8> = Image::new(0, 5);
    assert!(img.is_empty());
    assert_eq!(img.pixels().count(), 0);
}

// ===== Color frames =====

#[test]
fn bgr_interleaved_is_split_into_planes() {
    // 2×1 frame: pixel 0 = (1, 2, 3), pixel 1 = (4, 5, 6) in B, G, R order.
    let frame = BgrImage::from_interleaved(2, 1, &[1u8, 2, 3, 4, 5, 6]);
    assert_eq!(frame.plane(0).row(0), &[1, 4]);
    assert_eq!(frame.plane(1).row(0), &[2, 5]);
    assert_eq!(frame.plane(2).row(0), &[3, 6]);
    assert_eq!(frame.get(1, 0), [4, 5, 6]);
}

#[test]
fn bgr_from_planes_rejects_mismatched_sizes() {
    let result = BgrImage::from_planes(
        Image::<u8>::new(4, 4),
        Image::new(4, 4),
        Image::new(4, 3),
    );
    assert!(matches!(result, Err(Error::SizeMismatch { .. })));
}

#[test]
fn bgr_crop_then_paste_restores_region() {
    let frame = BgrImage::from_fn(8, 6, |x, y| [x as u8, y as u8, (x + y) as u8]);
    let crop = frame.crop(2, 1, 3, 4);
    assert_eq!(crop.dimensions(), (3, 4));
    assert_eq!(crop.get(0, 0), [2, 1, 3]);

    let mut blank = BgrImage::<u8>::new(8, 6);
    blank.paste(&crop, 2, 1);
    assert_eq!(blank.get(4, 4), frame.get(4, 4));
    assert_eq!(blank.get(5, 4), [0, 0, 0]);
}

#[test]
fn bgr_map_applies_to_every_plane() {
    let frame = BgrImage::filled(3, 2, [10u8, 20, 30]);
    let doubled = frame.map(|v| v as f32 * 2.0);
    assert!(doubled.pixels().all(|px| px == [20.0, 40.0, 60.0]));
}

// ===== Conversions =====

#[test]
fn normalized_roundtrip_preserves_extremes() {
    let data = vec![0u8, 1, 127, 128, 254, 255];
    let img = Image::from_vec(6, 1, data.clone());
    let back = convert::f32_normalized_to_u8(&convert::u8_to_f32_normalized(&img));
    assert_eq!(back.row(0), data.as_slice());
}

#[test]
fn raw_bgr_conversion_clamps() {
    let frame = BgrImage::from_fn(3, 1, |x, _| {
        let v = [-12.0f32, 127.4, 300.0][x];
        [v, v, v]
    });
    let out = convert::bgr_f32_raw_to_u8(&frame);
    assert_eq!(out.plane(0).row(0), &[0, 127, 255]);
}

#[test]
fn gray_uses_bt601_weights() {
    let frame = BgrImage::filled(1, 1, [100u8, 50, 200]);
    let gray = convert::bgr_to_gray(&frame);
    let expected = 0.299 * 200.0 + 0.587 * 50.0 + 0.114 * 100.0;
    assert!((gray.get(0, 0) - expected).abs() < 1e-3);
}

// ===== Bilinear interpolation & resize =====

#[test]
fn bilinear_linear_gradient() {
    let img = Image::from_fn(10, 10, |x, y| x as f32 * 3.0 + y as f32 * 7.0);
    for (px, py) in [(0.5, 0.5), (2.3, 4.7), (7.9, 1.1), (0.0, 8.0)] {
        let expected = px * 3.0 + py * 7.0;
        let actual = interpolate_bilinear(&img, px, py);
        assert!(
            (actual - expected).abs() < 1e-4,
            "bilinear({px}, {py}): expected {expected}, got {actual}"
        );
    }
}

#[test]
fn resize_constant_stays_constant() {
    let img = Image::filled(7, 5, 0.25f32);
    let up = resize_bilinear(&img, 13, 9);
    assert_eq!(up.dimensions(), (13, 9));
    assert!(up.pixels().all(|(_, _, v)| (v - 0.25).abs() < 1e-6));
}

#[test]
fn resize_same_size_is_identity() {
    let img = Image::from_fn(6, 4, |x, y| (x * 4 + y) as f32);
    let same = resize_bilinear(&img, 6, 4);
    for (x, y, v) in img.pixels() {
        assert!((same.get(x, y) - v).abs() < 1e-5);
    }
}

#[test]
fn resize_bgr_scales_every_plane() {
    let frame = BgrImage::filled(4, 4, [10u8, 20, 30]);
    let half = resize_bgr(&frame, 2, 2);
    assert_eq!(half.dimensions(), (2, 2));
    assert_eq!(half.get(1, 1), [10, 20, 30]);
}
