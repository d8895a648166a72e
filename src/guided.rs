//! Guided multi-scale search for a logo of unknown size inside a region.
//!
//! Raw NCC favours small templates: a 24x24 patch correlates with some part
//! of almost any logo. Every score is therefore rescaled by
//! `min(1, sqrt(scale / 96))` before candidates are compared, so a 96x96 match
//! at NCC 0.30 beats a 24x24 match at NCC 0.58.
//!
//! The search runs in two phases:
//! 1. **Coarse**: every 8th size in `[min_size, max_size]` plus the standard
//!    48 and 96 sizes, keeping the five best positions.
//! 2. **Fine**: sizes within ±10 px of each coarse candidate in steps of 2.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info};

use crate::alpha::AlphaMap;
use crate::correlation::{match_template, GrayPlane, TemplateMatch};
use crate::geometry::Region;

/// Template size the size weighting is normalised against.
pub const REFERENCE_SIZE: f32 = 96.0;
/// Adjusted score a candidate must exceed to be kept or reported.
pub const MIN_ADJUSTED_SCORE: f32 = 0.08;
/// Smallest template size ever searched.
pub const MIN_TEMPLATE_SIZE: u32 = 16;
/// Smallest search region side that is searched at all.
const MIN_SEARCH_SIDE: u32 = 8;
const COARSE_SCALE_STEP: u32 = 8;
const FINE_SCALE_STEP: u32 = 2;
const FINE_SCALE_RANGE: u32 = 10;
const TOP_K: usize = 5;
/// Standard logo sizes, always part of the coarse sweep when in range.
const STANDARD_SIZES: [u32; 2] = [48, 96];

/// Result of a guided search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuidedDetectionResult {
    /// Whether a match above [`MIN_ADJUSTED_SCORE`] was found.
    pub found: bool,
    /// Size-adjusted score of the best match.
    pub confidence: f32,
    /// Raw NCC of the best match.
    pub raw_ncc: f32,
    /// Best match in absolute image coordinates.
    pub match_region: Region,
    /// Side length of the best match.
    pub detected_size: u32,
    /// Coarse scales evaluated before finishing or cancelling.
    pub scales_searched: u32,
    /// Coarse scales planned.
    pub total_scales: u32,
    /// Whether the search stopped because of the cancel flag.
    pub was_cancelled: bool,
}

/// Weight a raw NCC score by template size: `raw * min(1, sqrt(scale / 96))`.
#[must_use]
pub fn size_adjusted_score(raw_ncc: f32, scale: u32) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let weight = (scale as f32 / REFERENCE_SIZE).sqrt().min(1.0);
    raw_ncc * weight
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    x: u32,
    y: u32,
    scale: u32,
    raw_score: f32,
    adjusted_score: f32,
}

impl Candidate {
    fn new(m: TemplateMatch, scale: u32) -> Self {
        Self {
            x: m.x,
            y: m.y,
            scale,
            raw_score: m.score,
            adjusted_score: size_adjusted_score(m.score, scale),
        }
    }
}

/// Bounded list of the best candidates, highest adjusted score first.
#[derive(Debug, Default)]
struct TopCandidates(Vec<Candidate>);

impl TopCandidates {
    fn offer(&mut self, c: Candidate) {
        if self.0.len() < TOP_K {
            self.0.push(c);
        } else if self
            .0
            .last()
            .is_some_and(|worst| c.adjusted_score > worst.adjusted_score)
        {
            let last = self.0.len() - 1;
            self.0[last] = c;
        } else {
            return;
        }
        self.0
            .sort_by(|a, b| b.adjusted_score.total_cmp(&a.adjusted_score));
    }
}

/// Coarse scale list: `min..=max` by 8, plus 48/96 unless a sampled size is
/// already within 2 px of them. Sorted ascending.
fn coarse_scales(min_size: u32, max_size: u32) -> Vec<u32> {
    let mut scales: Vec<u32> = (min_size..=max_size)
        .step_by(COARSE_SCALE_STEP as usize)
        .collect();
    for std_size in STANDARD_SIZES {
        if (min_size..=max_size).contains(&std_size)
            && !scales.iter().any(|&s| s.abs_diff(std_size) <= 2)
        {
            scales.push(std_size);
        }
    }
    scales.sort_unstable();
    scales
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Resize the source map to `scale` and find its best placement in `gray`.
fn match_at_scale(gray: &GrayPlane, source: &AlphaMap, scale: u32) -> Option<Candidate> {
    let template = source.resized(scale, scale);
    match_template(gray, template.as_slice(), scale, scale).map(|m| Candidate::new(m, scale))
}

/// Search `search` for the best-matching logo between `min_size` and
/// `max_size` pixels on a side.
///
/// `source` is the high-resolution alpha map every template is resampled
/// from. The cancel flag is polled before each coarse scale and each fine
/// refinement; a cancelled search reports `was_cancelled` and whatever it
/// found so far.
///
/// Degenerate inputs (search region under 8x8 after clipping, or
/// `max(min_size, 16) > min(max_size, region side)`) return an empty result.
#[must_use]
pub fn guided_detect(
    image: &RgbImage,
    source: &AlphaMap,
    search: Region,
    cancel: Option<&AtomicBool>,
    min_size: u32,
    max_size: u32,
) -> GuidedDetectionResult {
    let start = Instant::now();
    let mut result = GuidedDetectionResult::default();

    let Some(clip) = search.clip(image.width(), image.height()) else {
        return result;
    };
    if clip.width < MIN_SEARCH_SIDE || clip.height < MIN_SEARCH_SIDE {
        return result;
    }

    let min_size = min_size.max(MIN_TEMPLATE_SIZE);
    let max_size = max_size.min(clip.width.min(clip.height));
    if min_size > max_size {
        debug!("guided_detect: min_size {min_size} > max_size {max_size}, no search possible");
        return result;
    }

    let gray = GrayPlane::from_region(image, &clip);
    let scales = coarse_scales(min_size, max_size);
    #[allow(clippy::cast_possible_truncation)]
    let total_scales = scales.len() as u32;
    result.total_scales = total_scales;

    debug!(
        "guided_detect: searching {} scales [{min_size}-{max_size}] in {}x{} region",
        scales.len(),
        clip.width,
        clip.height
    );

    // Phase 1: coarse sweep
    let mut top = TopCandidates::default();
    for &scale in &scales {
        if is_cancelled(cancel) {
            result.was_cancelled = true;
            debug!("guided_detect: cancelled at scale {scale}");
            break;
        }
        result.scales_searched += 1;

        let Some(candidate) = match_at_scale(&gray, source, scale) else {
            continue;
        };
        debug!(
            "  scale {scale:3}: raw_ncc={:.3} adjusted={:.3}",
            candidate.raw_score, candidate.adjusted_score
        );
        if candidate.adjusted_score > MIN_ADJUSTED_SCORE {
            top.offer(candidate);
        }
    }

    if top.0.is_empty() {
        info!(
            "guided_detect: no candidates found in {:?} ({} scales)",
            start.elapsed(),
            result.scales_searched
        );
        return result;
    }

    // Phase 2: refine size around each coarse candidate
    let mut best: Option<Candidate> = None;
    'refine: for coarse in &top.0 {
        let lo = min_size.max(coarse.scale.saturating_sub(FINE_SCALE_RANGE));
        let hi = max_size.min(coarse.scale + FINE_SCALE_RANGE);
        for scale in (lo..=hi).step_by(FINE_SCALE_STEP as usize) {
            if is_cancelled(cancel) {
                result.was_cancelled = true;
                break 'refine;
            }
            let Some(candidate) = match_at_scale(&gray, source, scale) else {
                continue;
            };
            if best.is_none_or(|b| candidate.adjusted_score > b.adjusted_score) {
                best = Some(candidate);
            }
        }
    }

    // A refinement cancelled before its first scale still has the coarse winner.
    let best = match best {
        Some(fine) if fine.adjusted_score >= top.0[0].adjusted_score => fine,
        _ => top.0[0],
    };

    if best.adjusted_score > MIN_ADJUSTED_SCORE {
        result.found = true;
        result.confidence = best.adjusted_score;
        result.raw_ncc = best.raw_score;
        result.match_region = Region::new(
            i64::from(clip.x + best.x),
            i64::from(clip.y + best.y),
            best.scale,
            best.scale,
        );
        result.detected_size = best.scale;

        info!(
            "guided_detect: found at ({},{}) size {s}x{s} raw_ncc={:.3} adjusted={:.3} \
             in {:?} ({} coarse scales, {} candidates refined)",
            result.match_region.x,
            result.match_region.y,
            best.raw_score,
            best.adjusted_score,
            start.elapsed(),
            result.scales_searched,
            top.0.len(),
            s = best.scale,
        );
    } else {
        info!("guided_detect: no match above threshold in {:?}", start.elapsed());
    }

    result
}
