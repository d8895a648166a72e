//! Reference captures embedded in the binary.
//!
//! Both images show the logo composited over pure black, so every sample
//! encodes `alpha * 255`.

/// 48x48 capture used for the small watermark.
pub(crate) const BG_48_PNG: &[u8] = include_bytes!("../assets/bg_48.png");

/// 96x96 capture used for the large watermark and every custom size.
pub(crate) const BG_96_PNG: &[u8] = include_bytes!("../assets/bg_96.png");
