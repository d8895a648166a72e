//! Alpha blending math for watermark removal and addition.
//!
//! The logo is applied via forward alpha blending:
//! `watermarked = alpha * logo + (1 - alpha) * original`
//!
//! Removal applies the algebraic inverse to recover original pixels.

use image::{DynamicImage, RgbImage};

use crate::alpha::AlphaMap;
use crate::geometry::Region;

/// Alpha threshold: ignore pixels with negligible watermark effect (noise).
const ALPHA_THRESHOLD: f32 = 0.002;

/// Maximum alpha: clamp to avoid division by near-zero in reverse blending.
const MAX_ALPHA: f32 = 0.99;

/// Convert any decoded image to 8-bit, 3-channel RGB.
///
/// Alpha channels are dropped and grayscale is replicated to all channels.
#[must_use]
pub fn normalize_channels(image: &DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb.clone(),
        other => other.to_rgb8(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Visit every pixel covered by both the alpha map placed at `(pos_x, pos_y)`
/// and the image, passing the pixel and its alpha.
fn for_each_covered(
    image: &mut RgbImage,
    alpha_map: &AlphaMap,
    pos_x: i64,
    pos_y: i64,
    mut f: impl FnMut(&mut image::Rgb<u8>, f32),
) {
    let footprint = Region::new(pos_x, pos_y, alpha_map.width(), alpha_map.height());
    let Some(clip) = footprint.clip(image.width(), image.height()) else {
        return;
    };

    for dy in 0..clip.height {
        for dx in 0..clip.width {
            let alpha = alpha_map.get(clip.offset_x + dx, clip.offset_y + dy);
            if alpha < ALPHA_THRESHOLD {
                continue;
            }
            f(image.get_pixel_mut(clip.x + dx, clip.y + dy), alpha);
        }
    }
}

/// Remove a watermark from an image using reverse alpha blending.
///
/// Applies the formula: `original = (watermarked - alpha * logo_value) / (1 - alpha)`
///
/// Operates in-place on the intersection of the alpha map footprint at
/// `(pos_x, pos_y)` and the image. Pixels with alpha below 0.002 are left
/// unchanged and alpha is capped at 0.99 so the division stays bounded.
pub fn remove_watermark_alpha_blend(
    image: &mut RgbImage,
    alpha_map: &AlphaMap,
    pos_x: i64,
    pos_y: i64,
    logo_value: f32,
) {
    for_each_covered(image, alpha_map, pos_x, pos_y, |px, alpha| {
        let alpha = alpha.min(MAX_ALPHA);
        let inv_alpha = 1.0 - alpha;
        for ch in px.0.iter_mut() {
            let watermarked = f32::from(*ch);
            *ch = to_u8((watermarked - alpha * logo_value) / inv_alpha);
        }
    });
}

/// Composite the logo onto an image using forward alpha blending.
///
/// Applies the formula: `watermarked = alpha * logo_value + (1 - alpha) * original`
/// over the same clipped footprint as [`remove_watermark_alpha_blend`].
pub fn add_watermark_alpha_blend(
    image: &mut RgbImage,
    alpha_map: &AlphaMap,
    pos_x: i64,
    pos_y: i64,
    logo_value: f32,
) {
    for_each_covered(image, alpha_map, pos_x, pos_y, |px, alpha| {
        for ch in px.0.iter_mut() {
            let original = f32::from(*ch);
            *ch = to_u8(alpha * logo_value + (1.0 - alpha) * original);
        }
    });
}
