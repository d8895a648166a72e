//! Grayscale planes and normalized cross-correlation.

use image::RgbImage;

use crate::geometry::Clip;

/// Row-major single-channel float image with samples in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GrayPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl GrayPlane {
    /// Convert a clipped RGB region to grayscale.
    ///
    /// Uses luminance formula: `0.299*R + 0.587*G + 0.114*B`.
    pub fn from_region(img: &RgbImage, clip: &Clip) -> Self {
        let mut data = Vec::with_capacity((clip.width * clip.height) as usize);
        for dy in 0..clip.height {
            for dx in 0..clip.width {
                let px = img.get_pixel(clip.x + dx, clip.y + dy);
                let lum = 0.299 * f32::from(px[0])
                    + 0.587 * f32::from(px[1])
                    + 0.114 * f32::from(px[2]);
                data.push(lum / 255.0);
            }
        }
        Self {
            width: clip.width,
            height: clip.height,
            data,
        }
    }
}

/// Normalized Cross-Correlation between two equal-length float slices.
///
/// `NCC = sum((a-mean_a)*(b-mean_b)) / sqrt(sum((a-mean_a)^2) * sum((b-mean_b)^2))`
pub(crate) fn ncc(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f32;
    if n < 1.0 {
        return 0.0;
    }

    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let mut numerator = 0.0_f32;
    let mut denom_a = 0.0_f32;
    let mut denom_b = 0.0_f32;

    for (va, vb) in a.iter().zip(b.iter()) {
        let da = va - mean_a;
        let db = vb - mean_b;
        numerator += da * db;
        denom_a += da * da;
        denom_b += db * db;
    }

    let denom = (denom_a * denom_b).sqrt();
    if denom < 1e-10 {
        0.0
    } else {
        numerator / denom
    }
}

/// Best placement of a template inside a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TemplateMatch {
    /// Left edge of the best window, relative to the plane.
    pub x: u32,
    /// Top edge of the best window, relative to the plane.
    pub y: u32,
    /// Zero-mean NCC at that window, in `[-1, 1]`.
    pub score: f32,
}

/// Summed-area tables of values and squared values, `(w + 1) x (h + 1)`.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl Integral {
    fn new(plane: &GrayPlane) -> Self {
        let w = plane.width as usize;
        let h = plane.height as usize;
        let stride = w + 1;
        let mut sum = vec![0.0_f64; stride * (h + 1)];
        let mut sq_sum = vec![0.0_f64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0_f64;
            let mut row_sq = 0.0_f64;
            for x in 0..w {
                let v = f64::from(plane.data[y * w + x]);
                row += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sq_sum[(y + 1) * stride + x + 1] = sq_sum[y * stride + x + 1] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    fn window(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.stride;
        table[(y + h) * s + x + w] - table[y * s + x + w] - table[(y + h) * s + x] + table[y * s + x]
    }
}

/// Slide a `tw` x `th` template over `plane` and return the window with the
/// highest zero-mean NCC (OpenCV's `TM_CCOEFF_NORMED`).
///
/// Returns `None` if the template is empty or does not fit. Flat windows
/// score 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn match_template(
    plane: &GrayPlane,
    template: &[f32],
    tw: u32,
    th: u32,
) -> Option<TemplateMatch> {
    if tw == 0 || th == 0 || tw > plane.width || th > plane.height {
        return None;
    }
    let (tw, th) = (tw as usize, th as usize);
    debug_assert_eq!(template.len(), tw * th);

    let n = (tw * th) as f64;
    let t_mean = template.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let centered: Vec<f64> = template.iter().map(|&v| f64::from(v) - t_mean).collect();
    let t_norm = centered.iter().map(|v| v * v).sum::<f64>();

    let integral = Integral::new(plane);
    let pw = plane.width as usize;
    let mut best: Option<TemplateMatch> = None;

    for y in 0..=(plane.height as usize - th) {
        for x in 0..=(pw - tw) {
            let mut score = 0.0_f64;
            if t_norm > 1e-12 {
                let sum = integral.window(&integral.sum, x, y, tw, th);
                let sq = integral.window(&integral.sq_sum, x, y, tw, th);
                let w_norm = sq - sum * sum / n;
                if w_norm > 1e-9 {
                    // sum(T' * I) == sum(T' * (I - mean_I)) because sum(T') == 0.
                    let mut cross = 0.0_f64;
                    for (row, t_row) in centered.chunks_exact(tw).enumerate() {
                        let start = (y + row) * pw + x;
                        for (&t, &v) in t_row.iter().zip(&plane.data[start..start + tw]) {
                            cross += t * f64::from(v);
                        }
                    }
                    score = (cross / (t_norm * w_norm).sqrt()).clamp(-1.0, 1.0);
                }
            }

            let score = score as f32;
            if best.is_none_or(|b| score > b.score) {
                best = Some(TemplateMatch {
                    x: x as u32,
                    y: y as u32,
                    score,
                });
            }
        }
    }

    best
}
