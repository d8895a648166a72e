//! Error types for the logo-unblend crate.

/// Errors that can occur while building the engine or processing images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to decode a reference capture used to build an alpha map.
    #[error("failed to decode reference capture: {0}")]
    AlphaMapDecode(image::ImageError),

    /// The image buffer has no pixels.
    #[error("empty image provided")]
    EmptyImage,

    /// A region string could not be parsed.
    #[error("invalid region {0:?}: expected X,Y,WIDTH,HEIGHT")]
    InvalidRegion(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
