use std::sync::atomic::AtomicBool;

use image::{Rgb, RgbImage};
use logo_unblend::{Mode, ProcessOptions, ProcessOutcome, Region, WatermarkEngine, WatermarkSize};

fn textured(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    for (x, y, px) in img.enumerate_pixels_mut() {
        let h = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(2_246_822_519);
        let n = ((h ^ (h >> 15)).wrapping_mul(3_266_489_917) >> 27) as u8;
        *px = Rgb([40 + n, 80 + n, 120 + n]);
    }
    img
}

fn max_channel_diff(a: &RgbImage, b: &RgbImage) -> i32 {
    a.pixels()
        .zip(b.pixels())
        .flat_map(|(p, q)| (0..3).map(move |c| (i32::from(p[c]) - i32::from(q[c])).abs()))
        .max()
        .unwrap_or(0)
}

fn mean_abs_diff(a: &RgbImage, b: &RgbImage) -> f64 {
    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .flat_map(|(p, q)| (0..3).map(move |c| u64::from(p[c].abs_diff(q[c]))))
        .sum();
    total as f64 / f64::from(a.width() * a.height() * 3)
}

#[test]
fn engine_initializes_successfully() {
    let engine = WatermarkEngine::new();
    assert!(engine.is_ok());
}

#[test]
fn detect_returns_low_confidence_for_blank_image() {
    let engine = WatermarkEngine::new().unwrap();
    let img = RgbImage::new(200, 200);
    let result = engine.detect(&img, None);

    assert!(!result.detected);
    assert!(result.confidence < 0.1);
}

#[test]
fn detect_returns_low_confidence_for_large_blank_image() {
    let engine = WatermarkEngine::new().unwrap();
    let img = RgbImage::new(2048, 2048);
    let result = engine.detect(&img, None);

    assert!(!result.detected);
    assert_eq!(result.size, WatermarkSize::Large);
}

#[test]
fn detect_finds_watermark_added_by_engine() {
    let engine = WatermarkEngine::new().unwrap();
    let mut img = textured(640, 480);
    engine.add(&mut img, None).unwrap();

    let result = engine.detect(&img, None);
    assert!(result.detected, "confidence {}", result.confidence);
    assert_eq!(result.region, Region::new(560, 400, 48, 48));
}

#[test]
fn remove_undoes_add_on_large_image() {
    let engine = WatermarkEngine::new().unwrap();
    let original = textured(1100, 1100);
    let mut img = original.clone();

    engine.add(&mut img, None).unwrap();
    assert!(max_channel_diff(&img, &original) > 20);
    engine.remove(&mut img, None).unwrap();
    assert!(max_channel_diff(&img, &original) <= 1);
}

#[test]
fn remove_on_tiny_image_stays_in_bounds() {
    let engine = WatermarkEngine::new().unwrap();
    let mut img = RgbImage::from_pixel(40, 30, Rgb([200, 200, 200]));
    let before = img.clone();

    // The standard box lies entirely above and left of the image.
    engine.remove(&mut img, None).unwrap();
    assert_eq!(img, before);
    let result = engine.detect(&img, Some(WatermarkSize::Large));
    assert!(!result.detected);
}

#[test]
fn custom_region_partially_outside_is_clipped() {
    let engine = WatermarkEngine::new().unwrap();
    let original = textured(100, 100);
    let mut img = original.clone();
    let region = Region::new(70, -20, 60, 60);

    engine.add_custom(&mut img, region).unwrap();
    engine.remove_custom(&mut img, region).unwrap();
    assert!(max_channel_diff(&img, &original) <= 1);
}

#[test]
fn guided_locate_finds_logo_near_user_region() {
    let engine = WatermarkEngine::new().unwrap();
    let mut img = textured(400, 300);
    let truth = Region::new(250, 150, 64, 64);
    engine.add_custom(&mut img, truth).unwrap();

    let result = engine.guided_locate(&img, Region::new(220, 120, 128, 128), None, 16, 64);
    assert!(result.found);
    assert_eq!(result.detected_size, 64);
    assert!((result.match_region.x - truth.x).abs() <= 1, "{:?}", result.match_region);
    assert!((result.match_region.y - truth.y).abs() <= 1, "{:?}", result.match_region);
}

#[test]
fn guided_locate_honours_cancellation() {
    let engine = WatermarkEngine::new().unwrap();
    let img = textured(300, 300);
    let cancel = AtomicBool::new(true);

    let result = engine.guided_locate(&img, Region::new(0, 0, 300, 300), Some(&cancel), 16, 200);
    assert!(result.was_cancelled);
    assert!(!result.found);
    assert!(result.scales_searched < result.total_scales);
}

#[test]
fn snapping_improves_misaligned_region() {
    let engine = WatermarkEngine::new().unwrap();
    let original = textured(400, 300);
    let mut marked = original.clone();
    engine.add_custom(&mut marked, Region::new(200, 120, 64, 64)).unwrap();

    let misaligned = ProcessOptions {
        region: Some(Region::new(195, 116, 64, 64)),
        ..ProcessOptions::default()
    };
    let snapped = ProcessOptions {
        snap: true,
        ..misaligned.clone()
    };

    let mut plain = marked.clone();
    engine.process(&mut plain, &misaligned).unwrap();
    let mut refined = marked.clone();
    let outcome = engine.process(&mut refined, &snapped).unwrap();

    assert!(matches!(outcome, ProcessOutcome::Processed { confidence: Some(_) }));
    let plain_err = mean_abs_diff(&plain, &original);
    let refined_err = mean_abs_diff(&refined, &original);
    assert!(
        refined_err * 2.0 < plain_err,
        "snapped error {refined_err:.3} vs unsnapped {plain_err:.3}"
    );
}

#[test]
fn process_file_writes_cleaned_png() {
    let engine = WatermarkEngine::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("marked.png");
    let output = dir.path().join("out").join("marked_cleaned.png");

    let original = textured(320, 240);
    let mut marked = original.clone();
    engine.add(&mut marked, None).unwrap();
    marked.save(&input).unwrap();

    let result = engine.process_file(&input, &output, &ProcessOptions::default());
    assert!(result.success, "{}", result.message);
    assert!(!result.skipped);
    assert!(result.confidence >= 0.25);

    let cleaned = image::open(&output).unwrap().to_rgb8();
    assert!(max_channel_diff(&cleaned, &original) <= 1);
}

#[test]
fn process_file_skips_clean_image_without_writing() {
    let engine = WatermarkEngine::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clean.png");
    let output = dir.path().join("clean_cleaned.png");
    RgbImage::from_pixel(200, 200, Rgb([10, 20, 30]))
        .save(&input)
        .unwrap();

    let result = engine.process_file(&input, &output, &ProcessOptions::default());
    assert!(result.success);
    assert!(result.skipped);
    assert!(!output.exists());
}

#[test]
fn process_file_reports_unreadable_input() {
    let engine = WatermarkEngine::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.png");
    std::fs::write(&input, b"definitely not a png").unwrap();

    let result = engine.process_file(&input, &dir.path().join("x.png"), &ProcessOptions::default());
    assert!(!result.success);
    assert!(result.message.starts_with("Failed to load"));
}

#[test]
fn process_directory_continues_past_failures() {
    let engine = WatermarkEngine::new().unwrap();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    textured(200, 150).save(input.path().join("a.png")).unwrap();
    textured(200, 150).save(input.path().join("b.bmp")).unwrap();
    std::fs::write(input.path().join("c.jpg"), b"garbage").unwrap();
    std::fs::write(input.path().join("notes.txt"), b"ignored").unwrap();

    let opts = ProcessOptions {
        mode: Mode::Add,
        ..ProcessOptions::default()
    };
    let results = engine.process_directory(input.path(), output.path(), &opts);

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);
    assert!(output.path().join("a.png").exists());
    assert!(output.path().join("b.bmp").exists());
    assert!(!output.path().join("c.jpg").exists());
}

#[test]
fn process_directory_reports_missing_input() {
    let engine = WatermarkEngine::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let results = engine.process_directory(
        &dir.path().join("missing"),
        &dir.path().join("out"),
        &ProcessOptions::default(),
    );
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
}

#[test]
fn jpeg_and_webp_outputs_are_written() {
    let engine = WatermarkEngine::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    textured(120, 100).save(&input).unwrap();

    let opts = ProcessOptions {
        force: true,
        ..ProcessOptions::default()
    };
    for name in ["out.jpg", "out.webp"] {
        let output = dir.path().join(name);
        let result = engine.process_file(&input, &output, &opts);
        assert!(result.success, "{name}: {}", result.message);
        let decoded = image::open(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 100));
    }
}

#[test]
fn external_captures_build_equivalent_engine() {
    let dir = tempfile::tempdir().unwrap();
    let embedded = WatermarkEngine::new().unwrap();

    let to_capture = |size: WatermarkSize| {
        let map = embedded.alpha_map(size);
        RgbImage::from_fn(map.width(), map.height(), |x, y| {
            let alpha = map.as_slice()[(y * map.width() + x) as usize];
            let v = (alpha * 255.0).round() as u8;
            Rgb([v, v, v])
        })
    };
    let small = dir.path().join("small.png");
    let large = dir.path().join("large.png");
    to_capture(WatermarkSize::Small).save(&small).unwrap();
    to_capture(WatermarkSize::Large).save(&large).unwrap();

    let loaded = WatermarkEngine::from_paths(&small, &large).unwrap();
    let mut a = textured(300, 200);
    let mut b = a.clone();
    embedded.add(&mut a, None).unwrap();
    loaded.add(&mut b, None).unwrap();
    assert!(max_channel_diff(&a, &b) <= 1);

    assert!(WatermarkEngine::from_paths(&dir.path().join("nope.png"), &large).is_err());
}
