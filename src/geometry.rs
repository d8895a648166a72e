//! Watermark geometry: size classes, placement rules and region clipping.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Images must exceed this on both sides to carry the large watermark.
const LARGE_IMAGE_THRESHOLD: u32 = 1024;

/// Watermark size classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WatermarkSize {
    /// 48x48 watermark, 32px margin (images where either dimension <= 1024).
    #[default]
    Small,
    /// 96x96 watermark, 64px margin (images where both dimensions > 1024).
    Large,
}

impl WatermarkSize {
    /// Classify an image by its dimensions.
    ///
    /// - **Large**: both width AND height > 1024
    /// - **Small**: otherwise (including 1024x1024)
    #[must_use]
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        if width > LARGE_IMAGE_THRESHOLD && height > LARGE_IMAGE_THRESHOLD {
            Self::Large
        } else {
            Self::Small
        }
    }

    /// Side length of the logo in pixels.
    #[must_use]
    pub fn logo_side(self) -> u32 {
        match self {
            Self::Small => 48,
            Self::Large => 96,
        }
    }

    /// Standard placement for this size.
    #[must_use]
    pub fn position(self) -> WatermarkPosition {
        match self {
            Self::Small => WatermarkPosition {
                margin_right: 32,
                margin_bottom: 32,
                logo_side: 48,
            },
            Self::Large => WatermarkPosition {
                margin_right: 64,
                margin_bottom: 64,
                logo_side: 96,
            },
        }
    }
}

impl fmt::Display for WatermarkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = self.logo_side();
        write!(f, "{side}x{side}")
    }
}

/// Placement rule: logo anchored to the bottom-right corner by fixed margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkPosition {
    /// Distance from the right edge of the image to the logo.
    pub margin_right: u32,
    /// Distance from the bottom edge of the image to the logo.
    pub margin_bottom: u32,
    /// Side length of the square logo.
    pub logo_side: u32,
}

impl WatermarkPosition {
    /// Top-left corner of the logo box. May be negative for tiny images;
    /// clipping happens when the region is used.
    #[must_use]
    pub fn top_left(&self, width: u32, height: u32) -> (i64, i64) {
        let side = i64::from(self.logo_side);
        (
            i64::from(width) - i64::from(self.margin_right) - side,
            i64::from(height) - i64::from(self.margin_bottom) - side,
        )
    }

    /// Full (unclipped) logo box for an image of the given size.
    #[must_use]
    pub fn region(&self, width: u32, height: u32) -> Region {
        let (x, y) = self.top_left(width, height);
        Region::new(x, y, self.logo_side, self.logo_side)
    }
}

/// Axis-aligned rectangle in image coordinates.
///
/// The origin may lie outside the image; use [`Region::clip`] before indexing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Region {
    /// Left edge.
    pub x: i64,
    /// Top edge.
    pub y: i64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Region {
    /// Create a region.
    #[must_use]
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect with an image of `img_w` x `img_h` pixels.
    ///
    /// Returns `None` when the intersection is empty.
    #[must_use]
    pub fn clip(&self, img_w: u32, img_h: u32) -> Option<Clip> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.x.saturating_add(i64::from(self.width)).min(i64::from(img_w));
        let y2 = self.y.saturating_add(i64::from(self.height)).min(i64::from(img_h));
        if x1 >= x2 || y1 >= y2 {
            return None;
        }

        // Every value lies in [0, u32::MAX] once clamped to the image.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let clip = Clip {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
            offset_x: (x1 - self.x) as u32,
            offset_y: (y1 - self.y) as u32,
        };
        Some(clip)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidRegion(s.to_string());
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, w, h] = parts.as_slice() else {
            return Err(invalid());
        };
        Ok(Self {
            x: x.parse().map_err(|_| invalid())?,
            y: y.parse().map_err(|_| invalid())?,
            width: w.parse().map_err(|_| invalid())?,
            height: h.parse().map_err(|_| invalid())?,
        })
    }
}

/// A non-empty region clipped to image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    /// Left edge inside the image.
    pub x: u32,
    /// Top edge inside the image.
    pub y: u32,
    /// Visible width.
    pub width: u32,
    /// Visible height.
    pub height: u32,
    /// Horizontal offset of the visible part inside the original region.
    pub offset_x: u32,
    /// Vertical offset of the visible part inside the original region.
    pub offset_y: u32,
}
