//! Detect, locate and remove semi-transparent logo watermarks via reverse
//! alpha blending.
//!
//! A logo composited as `watermarked = alpha * logo + (1 - alpha) * original`
//! can be undone exactly when `alpha` is known. This crate derives `alpha`
//! from 48x48 and 96x96 reference captures (embedded in the binary) and
//! inverts the equation to recover the original pixels.
//!
//! # Quick Start
//!
//! ```no_run
//! use logo_unblend::WatermarkEngine;
//!
//! let engine = WatermarkEngine::new().expect("failed to init engine");
//! let mut img = image::open("photo.jpg").unwrap().to_rgb8();
//! engine.remove(&mut img, None).unwrap();
//! img.save("cleaned.jpg").unwrap();
//! ```
//!
//! # Detection
//!
//! Before removal, a three-stage detection algorithm checks whether a watermark
//! is present (spatial NCC, gradient NCC, variance analysis). Images without
//! detected watermarks can be automatically skipped to protect originals.
//!
//! ```no_run
//! use logo_unblend::{ProcessOptions, ProcessOutcome, WatermarkEngine};
//!
//! let engine = WatermarkEngine::new().expect("failed to init engine");
//! let mut img = image::open("photo.jpg").unwrap().to_rgb8();
//! let result = engine.detect(&img, None);
//! println!("Detected: {}, confidence: {:.0}%", result.detected, result.confidence * 100.0);
//!
//! match engine.process(&mut img, &ProcessOptions::default()).unwrap() {
//!     ProcessOutcome::Processed { .. } => println!("removed"),
//!     ProcessOutcome::Skipped { detection } => println!("skipped at {:.2}", detection.confidence),
//! }
//! ```
//!
//! # Logos of unknown size
//!
//! [`WatermarkEngine::guided_locate`] searches a rough region for the logo at
//! any size, and [`WatermarkEngine::remove_custom`] removes it from an
//! arbitrary box.
//!
//! ```no_run
//! use logo_unblend::{Region, WatermarkEngine};
//!
//! let engine = WatermarkEngine::new().expect("failed to init engine");
//! let mut img = image::open("photo.png").unwrap().to_rgb8();
//! let found = engine.guided_locate(&img, Region::new(600, 400, 200, 200), None, 16, 160);
//! if found.found {
//!     engine.remove_custom(&mut img, found.match_region).unwrap();
//! }
//! ```

#![deny(missing_docs)]

pub mod alpha;
mod alpha_maps;
pub mod blending;
mod correlation;
pub mod detection;
mod engine;
pub mod error;
pub mod geometry;
pub mod guided;

pub use alpha::AlphaMap;
pub use detection::DetectionResult;
pub use engine::{
    default_output_path, is_supported_image, save_image, Mode, ProcessOptions, ProcessOutcome,
    ProcessResult, WatermarkEngine, WatermarkLocation,
};
pub use error::{Error, Result};
pub use geometry::{Region, WatermarkPosition, WatermarkSize};
pub use guided::GuidedDetectionResult;
