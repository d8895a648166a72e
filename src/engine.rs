//! Core watermark engine: size-aware removal, addition, detection and
//! per-file processing.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::{debug, info, warn};

use crate::alpha::AlphaMap;
use crate::alpha_maps;
use crate::blending;
use crate::detection::{self, DetectionResult};
use crate::error::{Error, Result};
use crate::geometry::{Region, WatermarkSize};
use crate::guided::{self, GuidedDetectionResult};

/// Custom regions with a side beyond this multiple of the image's longer
/// side are ignored.
const MAX_CUSTOM_SCALE: u32 = 4;

/// Whether to strip the logo or composite it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Reverse alpha blending.
    #[default]
    Remove,
    /// Forward alpha blending.
    Add,
}

/// Options controlling watermark processing behavior.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Remove or add the logo.
    pub mode: Mode,
    /// Skip watermark detection, process unconditionally.
    pub force: bool,
    /// Detection confidence below which removal is skipped (0.0-1.0).
    pub threshold: f32,
    /// Force a specific watermark size instead of auto-detecting.
    pub force_size: Option<WatermarkSize>,
    /// Process this region instead of the standard corner position.
    pub region: Option<Region>,
    /// Refine `region` with the guided locator before processing.
    pub snap: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Remove,
            force: false,
            threshold: 0.25,
            force_size: None,
            region: None,
            snap: false,
        }
    }
}

/// What [`WatermarkEngine::process`] did to an image.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The image was modified. Carries the detection or snap confidence when
    /// one was computed.
    Processed {
        /// Confidence that justified processing, if any was measured.
        confidence: Option<f32>,
    },
    /// Detection confidence was below the threshold; the image is untouched.
    Skipped {
        /// The detection that caused the skip.
        detection: DetectionResult,
    },
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the file was skipped (no watermark detected).
    pub skipped: bool,
    /// Detection confidence score.
    pub confidence: f32,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn failed(path: &Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            skipped: false,
            confidence: 0.0,
            message,
        }
    }
}

/// Where the watermark is expected, and whether detection backs it up.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkLocation {
    /// Standard box for the image size.
    pub region: Region,
    /// Size class used.
    pub size: WatermarkSize,
    /// Detection confidence at `region`.
    pub confidence: f32,
    /// `true` when confidence is below the caller's threshold, i.e. the box
    /// is a geometric guess rather than a verified detection.
    pub is_fallback: bool,
}

/// The watermark engine holding pre-computed alpha maps.
///
/// Create once with [`WatermarkEngine::new()`] and reuse for multiple images.
/// The alpha maps are never modified after construction, so a shared engine
/// can serve many threads at once.
#[derive(Debug, Clone)]
pub struct WatermarkEngine {
    alpha_map_small: AlphaMap,
    alpha_map_large: AlphaMap,
    logo_value: f32,
}

impl WatermarkEngine {
    /// Create a new engine from the embedded reference captures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlphaMapDecode`] if the embedded PNGs cannot be decoded.
    pub fn new() -> Result<Self> {
        Self::from_captures(alpha_maps::BG_48_PNG, alpha_maps::BG_96_PNG)
    }

    /// Create an engine from encoded 48x48 and 96x96 reference captures.
    ///
    /// Captures of another size are resampled to the expected side length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlphaMapDecode`] if either capture cannot be decoded.
    pub fn from_captures(small: &[u8], large: &[u8]) -> Result<Self> {
        Ok(Self {
            alpha_map_small: AlphaMap::from_encoded(small, WatermarkSize::Small.logo_side())?,
            alpha_map_large: AlphaMap::from_encoded(large, WatermarkSize::Large.logo_side())?,
            logo_value: 255.0,
        })
    }

    /// Create an engine from reference capture files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlphaMapDecode`] if either file cannot be read or
    /// decoded.
    pub fn from_paths(small: &Path, large: &Path) -> Result<Self> {
        Ok(Self {
            alpha_map_small: AlphaMap::from_path(small, WatermarkSize::Small.logo_side())?,
            alpha_map_large: AlphaMap::from_path(large, WatermarkSize::Large.logo_side())?,
            logo_value: 255.0,
        })
    }

    /// Set the logo brightness (default 255, a white logo).
    ///
    /// Values are clamped to `[0, 255]`; NaN keeps the current value.
    #[must_use]
    pub fn with_logo_value(mut self, logo_value: f32) -> Self {
        if logo_value.is_nan() {
            warn!("ignoring NaN logo value, keeping {}", self.logo_value);
        } else {
            self.logo_value = logo_value.clamp(0.0, 255.0);
        }
        self
    }

    /// Logo brightness used by every blend.
    #[must_use]
    pub fn logo_value(&self) -> f32 {
        self.logo_value
    }

    /// Determine watermark size based on image dimensions.
    ///
    /// - **Large** (96x96, 64px margin): both width AND height > 1024
    /// - **Small** (48x48, 32px margin): otherwise (including 1024x1024)
    #[must_use]
    #[allow(clippy::unused_self)] // method on `self` for API consistency
    pub fn watermark_size_for(&self, width: u32, height: u32) -> WatermarkSize {
        WatermarkSize::for_dimensions(width, height)
    }

    /// The precomputed alpha map for a size class.
    #[must_use]
    pub fn alpha_map(&self, size: WatermarkSize) -> &AlphaMap {
        match size {
            WatermarkSize::Small => &self.alpha_map_small,
            WatermarkSize::Large => &self.alpha_map_large,
        }
    }

    fn resolve_size(
        &self,
        width: u32,
        height: u32,
        force_size: Option<WatermarkSize>,
    ) -> WatermarkSize {
        force_size.unwrap_or_else(|| self.watermark_size_for(width, height))
    }

    /// Standard watermark box for an image, before any detection.
    #[must_use]
    pub fn fallback_region(
        &self,
        width: u32,
        height: u32,
        force_size: Option<WatermarkSize>,
    ) -> Region {
        self.resolve_size(width, height, force_size)
            .position()
            .region(width, height)
    }

    /// Detect watermark in an image at its standard position.
    ///
    /// Returns a [`DetectionResult`] with confidence scores from the
    /// three-stage detection algorithm. An empty image yields a zeroed result.
    #[must_use]
    pub fn detect(&self, image: &RgbImage, force_size: Option<WatermarkSize>) -> DetectionResult {
        if image.width() == 0 || image.height() == 0 {
            return DetectionResult::default();
        }
        let size = self.resolve_size(image.width(), image.height(), force_size);
        let region = size.position().region(image.width(), image.height());
        detection::detect_watermark(image, self.alpha_map(size), region, size)
    }

    /// Standard box plus whether detection confirms it at `threshold`.
    #[must_use]
    pub fn locate(
        &self,
        image: &RgbImage,
        force_size: Option<WatermarkSize>,
        threshold: f32,
    ) -> WatermarkLocation {
        let size = self.resolve_size(image.width(), image.height(), force_size);
        let region = size.position().region(image.width(), image.height());
        let detection = self.detect(image, Some(size));
        WatermarkLocation {
            region,
            size,
            confidence: detection.confidence,
            is_fallback: detection.confidence < threshold,
        }
    }

    /// Remove watermark from an image in-place.
    ///
    /// Applies reverse alpha blending at the standard watermark position.
    /// The `force_size` parameter overrides automatic size detection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] if the image has no pixels.
    pub fn remove(&self, image: &mut RgbImage, force_size: Option<WatermarkSize>) -> Result<()> {
        ensure_not_empty(image)?;
        let size = self.resolve_size(image.width(), image.height(), force_size);
        let (x, y) = size.position().top_left(image.width(), image.height());
        debug!("removing {size} watermark at ({x},{y})");
        blending::remove_watermark_alpha_blend(image, self.alpha_map(size), x, y, self.logo_value);
        Ok(())
    }

    /// Composite the watermark onto an image in-place at the standard position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] if the image has no pixels.
    pub fn add(&self, image: &mut RgbImage, force_size: Option<WatermarkSize>) -> Result<()> {
        ensure_not_empty(image)?;
        let size = self.resolve_size(image.width(), image.height(), force_size);
        let (x, y) = size.position().top_left(image.width(), image.height());
        debug!("adding {size} watermark at ({x},{y})");
        blending::add_watermark_alpha_blend(image, self.alpha_map(size), x, y, self.logo_value);
        Ok(())
    }

    /// Alpha map for an arbitrary region: the standard maps for exact 48x48
    /// and 96x96 boxes, otherwise the 96x96 map resampled to fit.
    ///
    /// `None` when the region misses the image or is more than
    /// [`MAX_CUSTOM_SCALE`] times the image's longer side; nothing is
    /// resampled in either case.
    fn custom_alpha(&self, image: &RgbImage, region: Region) -> Option<Cow<'_, AlphaMap>> {
        region.clip(image.width(), image.height())?;
        let limit = image.width().max(image.height()).saturating_mul(MAX_CUSTOM_SCALE);
        if region.width > limit || region.height > limit {
            warn!(
                "custom region {region} exceeds {limit}px for a {}x{} image, ignoring it",
                image.width(),
                image.height()
            );
            return None;
        }
        Some(match (region.width, region.height) {
            (48, 48) => Cow::Borrowed(&self.alpha_map_small),
            (96, 96) => Cow::Borrowed(&self.alpha_map_large),
            (w, h) => Cow::Owned(self.alpha_map_large.resized(w, h)),
        })
    }

    /// Remove a watermark occupying `region`, which may be any size.
    ///
    /// Regions that miss the image, or are far larger than it, leave the
    /// image untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] if the image has no pixels.
    pub fn remove_custom(&self, image: &mut RgbImage, region: Region) -> Result<()> {
        ensure_not_empty(image)?;
        let Some(alpha) = self.custom_alpha(image, region) else {
            debug!("custom region {region} does not overlap the image");
            return Ok(());
        };
        info!("removing watermark in custom region {region}");
        blending::remove_watermark_alpha_blend(image, &alpha, region.x, region.y, self.logo_value);
        Ok(())
    }

    /// Composite the watermark scaled to fill `region`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] if the image has no pixels.
    pub fn add_custom(&self, image: &mut RgbImage, region: Region) -> Result<()> {
        ensure_not_empty(image)?;
        let Some(alpha) = self.custom_alpha(image, region) else {
            debug!("custom region {region} does not overlap the image");
            return Ok(());
        };
        info!("adding watermark in custom region {region}");
        blending::add_watermark_alpha_blend(image, &alpha, region.x, region.y, self.logo_value);
        Ok(())
    }

    /// [`remove`](Self::remove) for any decoded image. The image is replaced
    /// by its 8-bit RGB version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] if the image has no pixels.
    pub fn remove_dynamic(
        &self,
        image: &mut DynamicImage,
        force_size: Option<WatermarkSize>,
    ) -> Result<()> {
        let mut rgb = blending::normalize_channels(image);
        self.remove(&mut rgb, force_size)?;
        *image = DynamicImage::ImageRgb8(rgb);
        Ok(())
    }

    /// [`add`](Self::add) for any decoded image. The image is replaced by its
    /// 8-bit RGB version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] if the image has no pixels.
    pub fn add_dynamic(
        &self,
        image: &mut DynamicImage,
        force_size: Option<WatermarkSize>,
    ) -> Result<()> {
        let mut rgb = blending::normalize_channels(image);
        self.add(&mut rgb, force_size)?;
        *image = DynamicImage::ImageRgb8(rgb);
        Ok(())
    }

    /// Search `search` for a logo between `min_size` and `max_size` pixels.
    ///
    /// Templates are resampled from the 96x96 map. See
    /// [`guided::guided_detect`] for the search and cancellation rules.
    #[must_use]
    pub fn guided_locate(
        &self,
        image: &RgbImage,
        search: Region,
        cancel: Option<&AtomicBool>,
        min_size: u32,
        max_size: u32,
    ) -> GuidedDetectionResult {
        guided::guided_detect(image, &self.alpha_map_large, search, cancel, min_size, max_size)
    }

    /// Refine a user-drawn region: search an area padded by half the
    /// region's longer side for a logo between half and 1.5x that side.
    fn snap_region(&self, image: &RgbImage, region: Region) -> (Region, Option<f32>) {
        let side = region.width.max(region.height);
        let pad = side / 2;
        let search = Region::new(
            region.x.saturating_sub(i64::from(pad)),
            region.y.saturating_sub(i64::from(pad)),
            region.width.saturating_add(2 * pad),
            region.height.saturating_add(2 * pad),
        );
        let guided = self.guided_locate(image, search, None, pad, side.saturating_add(pad));
        if guided.found {
            info!(
                "snapped region {region} -> {} (confidence {:.2})",
                guided.match_region, guided.confidence
            );
            (guided.match_region, Some(guided.confidence))
        } else {
            debug!("snap found nothing near {region}, keeping it");
            (region, None)
        }
    }

    /// Process an in-memory image according to `opts`.
    ///
    /// In remove mode without `force`, the standard position is checked by
    /// the detector first and the image is left untouched when confidence is
    /// below `opts.threshold`. Custom regions are processed unconditionally,
    /// after snapping when `opts.snap` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyImage`] if the image has no pixels.
    pub fn process(&self, image: &mut RgbImage, opts: &ProcessOptions) -> Result<ProcessOutcome> {
        ensure_not_empty(image)?;

        if let Some(region) = opts.region {
            let (region, confidence) = if opts.snap {
                self.snap_region(image, region)
            } else {
                (region, None)
            };
            match opts.mode {
                Mode::Remove => self.remove_custom(image, region)?,
                Mode::Add => self.add_custom(image, region)?,
            }
            return Ok(ProcessOutcome::Processed { confidence });
        }

        match opts.mode {
            Mode::Add => {
                self.add(image, opts.force_size)?;
                Ok(ProcessOutcome::Processed { confidence: None })
            }
            Mode::Remove if opts.force => {
                self.remove(image, opts.force_size)?;
                Ok(ProcessOutcome::Processed { confidence: None })
            }
            Mode::Remove => {
                let detection = self.detect(image, opts.force_size);
                if detection.confidence < opts.threshold {
                    debug!(
                        "confidence {:.3} below threshold {:.2}, leaving image untouched",
                        detection.confidence, opts.threshold
                    );
                    return Ok(ProcessOutcome::Skipped { detection });
                }
                self.remove(image, opts.force_size)?;
                Ok(ProcessOutcome::Processed {
                    confidence: Some(detection.confidence),
                })
            }
        }
    }

    /// Process a single image file: load, detect, remove or add, save.
    ///
    /// Returns a [`ProcessResult`] indicating success, skip, or failure.
    #[must_use]
    pub fn process_file(
        &self,
        input: &Path,
        output: &Path,
        opts: &ProcessOptions,
    ) -> ProcessResult {
        let mut result = ProcessResult::failed(input, String::new());

        let dyn_img = match image::open(input) {
            Ok(img) => img,
            Err(e) => {
                result.message = format!("Failed to load: {e}");
                return result;
            }
        };
        let mut rgb_img = blending::normalize_channels(&dyn_img);

        let outcome = match self.process(&mut rgb_img, opts) {
            Ok(outcome) => outcome,
            Err(e) => {
                result.message = format!("Failed to process: {e}");
                return result;
            }
        };

        match outcome {
            ProcessOutcome::Skipped { detection } => {
                result.skipped = true;
                result.success = true;
                result.confidence = detection.confidence;
                result.message = format!(
                    "No watermark detected ({:.0}% confidence, spatial={:.2}, grad={:.2}, var={:.2})",
                    detection.confidence * 100.0,
                    detection.spatial_score,
                    detection.gradient_score,
                    detection.variance_score,
                );
                return result;
            }
            ProcessOutcome::Processed { confidence } => {
                result.confidence = confidence.unwrap_or_default();
            }
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match save_image(&rgb_img, output) {
            Ok(()) => {
                result.success = true;
                result.message = match opts.mode {
                    Mode::Remove => "Watermark removed".to_string(),
                    Mode::Add => "Watermark added".to_string(),
                };
            }
            Err(e) => {
                result.message = format!("Failed to save: {e}");
            }
        }

        result
    }

    /// Process all supported images in a directory.
    ///
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon).
    /// Returns a [`ProcessResult`] for each image found; one failure does
    /// not stop the rest.
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult> {
        let mut entries: Vec<_> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_ok_and(|ft| ft.is_file()))
                .filter(|e| is_supported_image(e.path().as_path()))
                .collect(),
            Err(e) => {
                return vec![ProcessResult::failed(
                    input_dir,
                    format!("Failed to read directory: {e}"),
                )];
            }
        };
        entries.sort_by_key(std::fs::DirEntry::file_name);

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![ProcessResult::failed(
                    output_dir,
                    format!("Failed to create output directory: {e}"),
                )];
            }
        }

        debug!(
            "processing {} images from {}",
            entries.len(),
            input_dir.display()
        );

        let process_entry = |entry: &std::fs::DirEntry| {
            let output_path = output_dir.join(entry.file_name());
            self.process_file(&entry.path(), &output_path, opts)
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            entries.par_iter().map(process_entry).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            entries.iter().map(process_entry).collect()
        }
    }
}

fn ensure_not_empty(image: &RgbImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::EmptyImage);
    }
    Ok(())
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// JPEG is written at quality 100, PNG with default compression and adaptive
/// filtering, WebP losslessly and BMP as-is.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let writer = BufWriter::new(File::create(path)?);
            img.write_with_encoder(JpegEncoder::new_with_quality(writer, 100))?;
        }
        ImageFormat::Png => {
            let writer = BufWriter::new(File::create(path)?);
            let encoder =
                PngEncoder::new_with_quality(writer, CompressionType::Default, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        ImageFormat::WebP => {
            let writer = BufWriter::new(File::create(path)?);
            img.write_with_encoder(WebPEncoder::new_lossless(writer))?;
        }
        ImageFormat::Bmp => {
            img.save_with_format(path, ImageFormat::Bmp)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.jpg"` becomes `"photo_cleaned.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_cleaned.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn textured(width: u32, height: u32) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let h = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263);
            let v = 60 + ((h ^ (h >> 13)).wrapping_mul(1_274_126_177) >> 28) as u8;
            *px = Rgb([v, v.wrapping_add(10), v.wrapping_add(20)]);
        }
        img
    }

    #[test]
    fn watermark_size_small_when_either_dim_lte_1024() {
        let engine = WatermarkEngine::new().unwrap();
        assert_eq!(engine.watermark_size_for(800, 600), WatermarkSize::Small);
        assert_eq!(engine.watermark_size_for(1024, 1024), WatermarkSize::Small);
        assert_eq!(engine.watermark_size_for(2048, 512), WatermarkSize::Small);
        assert_eq!(engine.watermark_size_for(512, 2048), WatermarkSize::Small);
    }

    #[test]
    fn watermark_size_large_when_both_dims_gt_1024() {
        let engine = WatermarkEngine::new().unwrap();
        assert_eq!(engine.watermark_size_for(1025, 1025), WatermarkSize::Large);
        assert_eq!(engine.watermark_size_for(2048, 2048), WatermarkSize::Large);
    }

    #[test]
    fn embedded_alpha_maps_have_standard_sizes() {
        let engine = WatermarkEngine::new().unwrap();
        assert_eq!(engine.alpha_map(WatermarkSize::Small).width(), 48);
        assert_eq!(engine.alpha_map(WatermarkSize::Large).height(), 96);
        assert!((engine.logo_value() - 255.0).abs() < f32::EPSILON);
    }

    #[test]
    fn bad_capture_bytes_fail_construction() {
        let err = WatermarkEngine::from_captures(b"not an image", alpha_maps::BG_96_PNG)
            .unwrap_err();
        assert!(matches!(err, Error::AlphaMapDecode(_)));
    }

    #[test]
    fn fallback_region_follows_margin_rule() {
        let engine = WatermarkEngine::new().unwrap();
        assert_eq!(engine.fallback_region(800, 600, None), Region::new(720, 520, 48, 48));
        assert_eq!(
            engine.fallback_region(800, 600, Some(WatermarkSize::Large)),
            Region::new(640, 440, 96, 96)
        );
    }

    #[test]
    fn empty_image_is_rejected_by_mutating_ops() {
        let engine = WatermarkEngine::new().unwrap();
        let mut empty = RgbImage::new(0, 0);
        assert!(matches!(engine.remove(&mut empty, None), Err(Error::EmptyImage)));
        assert!(matches!(engine.add(&mut empty, None), Err(Error::EmptyImage)));
        assert!(matches!(
            engine.remove_custom(&mut empty, Region::new(0, 0, 10, 10)),
            Err(Error::EmptyImage)
        ));
        assert!(matches!(
            engine.process(&mut empty, &ProcessOptions::default()),
            Err(Error::EmptyImage)
        ));
        assert_eq!(engine.detect(&empty, None), DetectionResult::default());
    }

    #[test]
    fn custom_48_region_matches_forced_small_removal() {
        let engine = WatermarkEngine::new().unwrap();
        let mut standard = textured(300, 200);
        engine.add(&mut standard, None).unwrap();
        let mut custom = standard.clone();

        engine.remove(&mut standard, Some(WatermarkSize::Small)).unwrap();
        engine
            .remove_custom(&mut custom, Region::new(220, 120, 48, 48))
            .unwrap();
        assert_eq!(standard, custom);
    }

    #[test]
    fn custom_96_region_matches_forced_large_removal() {
        let engine = WatermarkEngine::new().unwrap();
        let mut standard = textured(400, 300);
        engine.add(&mut standard, Some(WatermarkSize::Large)).unwrap();
        let mut custom = standard.clone();

        engine.remove(&mut standard, Some(WatermarkSize::Large)).unwrap();
        engine
            .remove_custom(&mut custom, Region::new(240, 140, 96, 96))
            .unwrap();
        assert_eq!(standard, custom);
    }

    #[test]
    fn custom_region_round_trips_at_arbitrary_size() {
        let engine = WatermarkEngine::new().unwrap();
        let original = textured(200, 200);
        let mut img = original.clone();
        let region = Region::new(50, 60, 70, 70);

        engine.add_custom(&mut img, region).unwrap();
        assert_ne!(img, original);
        engine.remove_custom(&mut img, region).unwrap();

        for (a, b) in img.pixels().zip(original.pixels()) {
            for ch in 0..3 {
                assert!((i32::from(a[ch]) - i32::from(b[ch])).abs() <= 1);
            }
        }
    }

    #[test]
    fn process_skips_clean_image_and_keeps_pixels() {
        let engine = WatermarkEngine::new().unwrap();
        let mut img = RgbImage::from_pixel(300, 200, Rgb([120, 130, 140]));
        let before = img.clone();

        let outcome = engine.process(&mut img, &ProcessOptions::default()).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Skipped { .. }));
        assert_eq!(img, before);
    }

    #[test]
    fn process_removes_detected_watermark() {
        let engine = WatermarkEngine::new().unwrap();
        let original = textured(300, 200);
        let mut img = original.clone();
        engine.add(&mut img, None).unwrap();

        let outcome = engine.process(&mut img, &ProcessOptions::default()).unwrap();
        let ProcessOutcome::Processed { confidence: Some(c) } = outcome else {
            panic!("expected removal, got {outcome:?}");
        };
        assert!(c >= 0.25, "confidence {c}");
        for (a, b) in img.pixels().zip(original.pixels()) {
            for ch in 0..3 {
                assert!((i32::from(a[ch]) - i32::from(b[ch])).abs() <= 1);
            }
        }
    }

    #[test]
    fn process_force_and_add_skip_detection() {
        let engine = WatermarkEngine::new().unwrap();
        let mut img = RgbImage::from_pixel(300, 200, Rgb([50, 50, 50]));
        let before = img.clone();

        let add = ProcessOptions {
            mode: Mode::Add,
            ..ProcessOptions::default()
        };
        assert_eq!(
            engine.process(&mut img, &add).unwrap(),
            ProcessOutcome::Processed { confidence: None }
        );
        assert_ne!(img, before);

        let mut flat = before.clone();
        let forced = ProcessOptions {
            force: true,
            ..ProcessOptions::default()
        };
        assert_eq!(
            engine.process(&mut flat, &forced).unwrap(),
            ProcessOutcome::Processed { confidence: None }
        );
    }

    #[test]
    fn off_image_custom_region_is_a_cheap_noop() {
        let engine = WatermarkEngine::new().unwrap();
        let mut img = textured(100, 100);
        let before = img.clone();

        let start = std::time::Instant::now();
        engine
            .remove_custom(&mut img, Region::new(50_000, 50_000, 8000, 8000))
            .unwrap();
        engine
            .add_custom(&mut img, Region::new(-9000, 20, 8000, 8000))
            .unwrap();
        assert!(
            start.elapsed() < std::time::Duration::from_secs(1),
            "took {:?}",
            start.elapsed()
        );
        assert_eq!(img, before);
    }

    #[test]
    fn oversized_custom_region_is_ignored() {
        let engine = WatermarkEngine::new().unwrap();
        let mut img = textured(100, 100);
        let before = img.clone();

        engine
            .remove_custom(&mut img, Region::new(0, 0, 50_000, 50_000))
            .unwrap();
        assert_eq!(img, before);

        // Up to four times the longer side is still processed.
        engine
            .add_custom(&mut img, Region::new(-150, -150, 400, 400))
            .unwrap();
        assert_ne!(img, before);
    }

    #[test]
    fn snap_with_extreme_origin_does_not_overflow() {
        let engine = WatermarkEngine::new().unwrap();
        let mut img = textured(100, 100);
        let before = img.clone();

        for origin in [i64::MIN, i64::MAX] {
            let opts = ProcessOptions {
                region: Some(Region::new(origin, origin, 64, 64)),
                snap: true,
                ..ProcessOptions::default()
            };
            let outcome = engine.process(&mut img, &opts).unwrap();
            assert_eq!(outcome, ProcessOutcome::Processed { confidence: None });
        }
        assert_eq!(img, before);
    }

    #[test]
    fn gate_threshold_above_detection_threshold_skips_detected_image() {
        let engine = WatermarkEngine::new().unwrap();
        let mut img = textured(300, 200);
        engine.add(&mut img, None).unwrap();
        let before = img.clone();

        let opts = ProcessOptions {
            threshold: 0.95,
            ..ProcessOptions::default()
        };
        let outcome = engine.process(&mut img, &opts).unwrap();
        let ProcessOutcome::Skipped { detection } = outcome else {
            panic!("expected skip, got {outcome:?}");
        };
        assert!(detection.detected, "confidence {}", detection.confidence);
        assert!(detection.confidence < 0.95);
        assert_eq!(img, before);
    }

    #[test]
    fn gate_processes_undetected_image_above_default_threshold() {
        let engine = WatermarkEngine::new().unwrap();
        let base = RgbImage::from_fn(300, 200, |x, y| {
            let h = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(2_246_822_519);
            let v = 88 + ((h ^ (h >> 15)).wrapping_mul(3_266_489_917) >> 26) as u8;
            Rgb([v, v, v])
        });

        // Raise the logo brightness until detection lands between the default
        // gate (0.25) and the detected flag (0.35).
        let faint = (121..=255u8).find_map(|v| {
            let mut img = base.clone();
            engine
                .clone()
                .with_logo_value(f32::from(v))
                .add(&mut img, None)
                .unwrap();
            let detection = engine.detect(&img, None);
            (detection.confidence >= 0.25 && !detection.detected).then_some((img, detection))
        });
        let (mut img, detection) = faint.expect("a logo strength scoring in [0.25, 0.35)");
        assert!(detection.confidence < crate::detection::DETECTION_THRESHOLD);
        let before = img.clone();

        let outcome = engine.process(&mut img, &ProcessOptions::default()).unwrap();
        assert_eq!(
            outcome,
            ProcessOutcome::Processed {
                confidence: Some(detection.confidence)
            }
        );
        assert_ne!(img, before);
    }

    #[test]
    fn nan_logo_value_is_ignored() {
        let engine = WatermarkEngine::new().unwrap().with_logo_value(f32::NAN);
        assert!((engine.logo_value() - 255.0).abs() < f32::EPSILON);
        let engine = engine.with_logo_value(300.0).with_logo_value(f32::NAN);
        assert!((engine.logo_value() - 255.0).abs() < f32::EPSILON);
        assert!(engine.with_logo_value(-4.0).logo_value().abs() < f32::EPSILON);
    }

    #[test]
    fn locate_flags_unverified_box_as_fallback() {
        let engine = WatermarkEngine::new().unwrap();
        let clean = RgbImage::from_pixel(300, 200, Rgb([90, 90, 90]));
        let location = engine.locate(&clean, None, 0.25);
        assert!(location.is_fallback);
        assert_eq!(location.region, Region::new(220, 120, 48, 48));

        let mut marked = textured(300, 200);
        engine.add(&mut marked, None).unwrap();
        let location = engine.locate(&marked, None, 0.25);
        assert!(!location.is_fallback, "confidence {}", location.confidence);
    }

    #[test]
    fn dynamic_entry_points_normalise_to_rgb8() {
        let engine = WatermarkEngine::new().unwrap();
        let mut img = DynamicImage::new_luma8(120, 100);
        engine.add_dynamic(&mut img, None).unwrap();
        assert!(matches!(img, DynamicImage::ImageRgb8(_)));

        let mut rgba = DynamicImage::new_rgba16(120, 100);
        engine.remove_dynamic(&mut rgba, None).unwrap();
        assert!(matches!(rgba, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn default_output_path_appends_cleaned_suffix() {
        let p = default_output_path(Path::new("/tmp/photo.jpg"));
        assert_eq!(p, PathBuf::from("/tmp/photo_cleaned.jpg"));

        let p = default_output_path(Path::new("image.png"));
        assert_eq!(
            p.file_name().unwrap().to_str().unwrap(),
            "image_cleaned.png"
        );
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }

    #[test]
    fn save_image_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::new(4, 4);
        assert!(matches!(
            save_image(&img, &dir.path().join("out.xyz")),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
