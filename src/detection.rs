//! Three-stage watermark detection algorithm.
//!
//! Detects the presence of the logo using a weighted ensemble:
//! 1. **Spatial NCC** (50%): normalized cross-correlation with the alpha map
//! 2. **Gradient NCC** (30%): edge signature matching via Sobel operators
//! 3. **Variance Analysis** (20%): texture dampening detection
//!
//! A cheap circuit breaker on stage 1 skips stages 2 and 3 when the spatial
//! correlation already rules the logo out.

use image::RgbImage;
use tracing::debug;

use crate::alpha::AlphaMap;
use crate::correlation::{ncc, GrayPlane};
use crate::geometry::{Region, WatermarkSize};

/// Detection weight: spatial NCC.
const SPATIAL_WEIGHT: f32 = 0.50;
/// Detection weight: gradient NCC.
const GRADIENT_WEIGHT: f32 = 0.30;
/// Detection weight: variance analysis.
const VARIANCE_WEIGHT: f32 = 0.20;
/// Circuit breaker: if spatial NCC < this, reject early.
pub const SPATIAL_CIRCUIT_BREAKER: f32 = 0.25;
/// Confidence at or above which [`DetectionResult::detected`] is set.
pub const DETECTION_THRESHOLD: f32 = 0.35;
/// Minimum reference strip height for variance analysis.
const MIN_REF_HEIGHT: u32 = 8;
/// Minimum reference stddev to compute variance score (in normalized [0,1] space).
const MIN_REF_STDDEV: f32 = 5.0 / 255.0;

/// Result of watermark detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    /// Whether confidence reached [`DETECTION_THRESHOLD`].
    pub detected: bool,
    /// Overall confidence score in `[0, 1]`.
    pub confidence: f32,
    /// Candidate region that was scored (unclipped).
    pub region: Region,
    /// Size class the candidate was scored as.
    pub size: WatermarkSize,
    /// Stage 1: spatial NCC score.
    pub spatial_score: f32,
    /// Stage 2: gradient NCC score. Zero when the circuit breaker fired.
    pub gradient_score: f32,
    /// Stage 3: variance analysis score. Zero when skipped.
    pub variance_score: f32,
}

/// Reflect-101 border index (`-1 -> 1`, `n -> n - 2`), matching the usual
/// Sobel border handling.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let r = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    r.clamp(0, n - 1) as usize
}

/// Compute Sobel gradient magnitude for a 2D float array.
///
/// Uses 3x3 Sobel kernels with reflected borders.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn sobel_magnitude(data: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut result = vec![0.0_f32; width * height];
    if width == 0 || height == 0 {
        return result;
    }

    for y in 0..height {
        for x in 0..width {
            let at = |dy: isize, dx: isize| -> f32 {
                let yy = reflect(y as isize + dy, height);
                let xx = reflect(x as isize + dx, width);
                data[yy * width + xx]
            };

            let gx = -at(-1, -1) + at(-1, 1) - 2.0 * at(0, -1) + 2.0 * at(0, 1) - at(1, -1)
                + at(1, 1);

            let gy = -at(-1, -1) - 2.0 * at(-1, 0) - at(-1, 1)
                + at(1, -1)
                + 2.0 * at(1, 0)
                + at(1, 1);

            result[y * width + x] = (gx * gx + gy * gy).sqrt();
        }
    }

    result
}

/// Compute standard deviation of a float slice.
pub(crate) fn stddev(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = data.len() as f32;
    let mean = data.iter().sum::<f32>() / n;
    let variance = data.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    variance.sqrt()
}

/// Detect whether the logo is present in `region`.
///
/// The alpha map must have the same size as `region`; `size` selects the
/// height of the reference strip used by stage 3. The region is clipped to
/// the image and an empty intersection yields a zeroed result.
///
/// Stages:
/// 1. **Spatial NCC** (50%): correlation between region brightness and alpha map.
///    Below 0.25 the search stops and confidence is `spatial * 0.5`.
/// 2. **Gradient NCC** (30%): edge signature matching via Sobel operators
/// 3. **Variance Analysis** (20%): the logo flattens texture relative to the
///    strip directly above it
#[must_use]
pub fn detect_watermark(
    image: &RgbImage,
    alpha_map: &AlphaMap,
    region: Region,
    size: WatermarkSize,
) -> DetectionResult {
    let mut result = DetectionResult {
        region,
        size,
        ..DetectionResult::default()
    };

    let footprint = Region::new(region.x, region.y, alpha_map.width(), alpha_map.height());
    let Some(clip) = footprint.clip(image.width(), image.height()) else {
        debug!("detection: region {region} outside {}x{} image", image.width(), image.height());
        return result;
    };

    let gray_region = GrayPlane::from_region(image, &clip);
    let alpha_region = alpha_map.crop(clip.offset_x, clip.offset_y, clip.width, clip.height);

    // Stage 1: Spatial NCC
    let spatial_score = ncc(&gray_region.data, &alpha_region).max(0.0);
    result.spatial_score = spatial_score;

    if spatial_score < SPATIAL_CIRCUIT_BREAKER {
        result.confidence = spatial_score * 0.5;
        debug!(
            "detection: spatial={spatial_score:.3} < {SPATIAL_CIRCUIT_BREAKER:.2}, rejected"
        );
        return result;
    }

    // Stage 2: Gradient NCC
    let w = clip.width as usize;
    let h = clip.height as usize;
    let img_grad = sobel_magnitude(&gray_region.data, w, h);
    let alpha_grad = sobel_magnitude(&alpha_region, w, h);
    let gradient_score = ncc(&img_grad, &alpha_grad).max(0.0);
    result.gradient_score = gradient_score;

    // Stage 3: Variance Analysis against the strip above the region
    let mut variance_score = 0.0_f32;
    let ref_h = clip.y.min(size.logo_side());
    if ref_h >= MIN_REF_HEIGHT {
        let strip = Region::new(
            i64::from(clip.x),
            i64::from(clip.y - ref_h),
            clip.width,
            ref_h,
        );
        if let Some(strip_clip) = strip.clip(image.width(), image.height()) {
            let reference = GrayPlane::from_region(image, &strip_clip);
            let wm_stddev = stddev(&gray_region.data);
            let ref_stddev = stddev(&reference.data);

            if ref_stddev > MIN_REF_STDDEV {
                variance_score = (1.0 - wm_stddev / ref_stddev).clamp(0.0, 1.0);
            }
        }
    }
    result.variance_score = variance_score;

    // Weighted ensemble
    let confidence = SPATIAL_WEIGHT * spatial_score
        + GRADIENT_WEIGHT * gradient_score
        + VARIANCE_WEIGHT * variance_score;

    result.confidence = confidence.clamp(0.0, 1.0);
    result.detected = result.confidence >= DETECTION_THRESHOLD;

    debug!(
        "detection: spatial={spatial_score:.3}, grad={gradient_score:.3}, var={variance_score:.3} \
         -> conf={:.3} ({})",
        result.confidence,
        if result.detected { "DETECTED" } else { "not detected" }
    );

    result
}
