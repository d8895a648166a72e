//! Alpha maps: per-pixel logo opacity derived from reference captures.
//!
//! A reference capture is the logo rendered over a pure black background, so
//! each captured sample equals `alpha * 255`. The alpha at each pixel is
//! recovered as `max(R, G, B) / 255`.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Single-channel float plane used for resampling through `image::imageops`.
type AlphaPlane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel opacity grid with values in `[0, 1]`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl AlphaMap {
    /// Wrap raw row-major alpha values.
    ///
    /// Returns `None` if `data.len() != width * height`. Values are clamped to
    /// `[0, 1]`.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, mut data: Vec<f32>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        for a in &mut data {
            *a = a.clamp(0.0, 1.0);
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Build a `side` x `side` alpha map from a decoded reference capture.
    ///
    /// Captures of a different size are resampled to exactly `side` pixels
    /// (area averaging when shrinking, bilinear when enlarging).
    #[must_use]
    pub fn from_capture(capture: &DynamicImage, side: u32) -> Self {
        let rgb = capture.to_rgb8();
        let data = rgb
            .pixels()
            .map(|px| f32::from(px[0].max(px[1]).max(px[2])) / 255.0)
            .collect();
        let native = Self {
            width: rgb.width(),
            height: rgb.height(),
            data,
        };

        if native.width == side && native.height == side {
            return native;
        }
        warn!(
            "reference capture is {}x{}, expected {side}x{side}; resampling",
            native.width, native.height
        );
        native.resized(side, side)
    }

    /// Decode an encoded capture (PNG, JPEG, ...) and build its alpha map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlphaMapDecode`] if the bytes cannot be decoded.
    pub fn from_encoded(bytes: &[u8], side: u32) -> Result<Self> {
        let capture = image::load_from_memory(bytes).map_err(Error::AlphaMapDecode)?;
        Ok(Self::from_capture(&capture, side))
    }

    /// Load a capture from disk and build its alpha map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlphaMapDecode`] if the file cannot be read or decoded.
    pub fn from_path(path: &Path, side: u32) -> Result<Self> {
        let capture = image::open(path).map_err(Error::AlphaMapDecode)?;
        Ok(Self::from_capture(&capture, side))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major alpha values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Alpha at `(x, y)`. Callers pass coordinates from a `Clip` of this map.
    #[must_use]
    pub(crate) fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// Smallest and largest alpha value.
    #[must_use]
    pub fn range(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &a| (lo.min(a), hi.max(a)))
    }

    /// Copy out the `w` x `h` window starting at `(x, y)`, which must lie
    /// inside the map.
    #[must_use]
    pub(crate) fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Vec<f32> {
        if x == 0 && y == 0 && w == self.width && h == self.height {
            return self.data.clone();
        }
        let mut out = Vec::with_capacity((w * h) as usize);
        for row in y..y + h {
            let start = (row * self.width + x) as usize;
            out.extend_from_slice(&self.data[start..start + w as usize]);
        }
        out
    }

    /// Resample to `width` x `height`.
    ///
    /// Bilinear when either side grows, area averaging when shrinking.
    /// Returns a clone when the size already matches.
    #[must_use]
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        if width == 0 || height == 0 || self.data.is_empty() {
            return Self {
                width,
                height,
                data: vec![0.0; width as usize * height as usize],
            };
        }

        let enlarging = width > self.width || height > self.height;
        let data = if enlarging {
            self.resize_linear(width, height)
        } else {
            self.resize_area(width, height)
        };

        debug!(
            "resampled alpha map {}x{} -> {width}x{height} ({})",
            self.width,
            self.height,
            if enlarging { "bilinear" } else { "area" }
        );

        Self {
            width,
            height,
            data,
        }
    }

    fn resize_linear(&self, width: u32, height: u32) -> Vec<f32> {
        // Lengths match by construction, so the buffer always builds.
        let plane = AlphaPlane::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| AlphaPlane::new(self.width, self.height));
        imageops::resize(&plane, width, height, FilterType::Triangle)
            .into_raw()
            .into_iter()
            .map(|a| a.clamp(0.0, 1.0))
            .collect()
    }

    fn resize_area(&self, width: u32, height: u32) -> Vec<f32> {
        let wx = area_weights(self.width, width);
        let wy = area_weights(self.height, height);
        let src_w = self.width as usize;

        // Horizontal pass: src_h rows of `width` samples.
        let mut horizontal = Vec::with_capacity(width as usize * self.height as usize);
        for row in self.data.chunks_exact(src_w) {
            for taps in &wx {
                horizontal.push(taps.iter().map(|&(i, w)| row[i] * w).sum::<f32>());
            }
        }

        // Vertical pass.
        let dst_w = width as usize;
        let mut out = Vec::with_capacity(dst_w * height as usize);
        for taps in &wy {
            for x in 0..dst_w {
                let v: f32 = taps.iter().map(|&(j, w)| horizontal[j * dst_w + x] * w).sum();
                out.push(v.clamp(0.0, 1.0));
            }
        }
        out
    }
}

/// Per-destination-pixel source taps for area resampling along one axis.
///
/// Destination pixel `d` covers the source interval `[d * s, (d + 1) * s)` with
/// `s = src / dst`; each tap is weighted by its overlap, normalised to 1.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn area_weights(src: u32, dst: u32) -> Vec<Vec<(usize, f32)>> {
    let scale = f64::from(src) / f64::from(dst);
    (0..dst)
        .map(|d| {
            let start = f64::from(d) * scale;
            let end = start + scale;
            let (first, last) = (
                start.floor() as usize,
                (end.ceil() as usize).min(src as usize),
            );
            (first..last)
                .filter_map(|i| {
                    let (lo, hi) = (i as f64, (i + 1) as f64);
                    let overlap = hi.min(end) - lo.max(start);
                    (overlap > 1e-9).then(|| (i, (overlap / scale) as f32))
                })
                .collect()
        })
        .collect()
}
