//! Error types for the awit-watermark crate.

use crate::loader::ByteSize;

/// Reasons an uploaded file is rejected by the image loader.
///
/// Every variant is user-facing and recoverable: the caller shows the
/// message and the user may retry with another file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The file exceeds the byte limit for its role.
    #[error("file is too large ({size}), the limit is {limit}")]
    TooLarge {
        /// Size of the rejected file.
        size: ByteSize,
        /// Maximum accepted size.
        limit: ByteSize,
    },

    /// The declared MIME type (or the sniffed content) is not JPEG, PNG, GIF or WebP.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The bytes could not be decoded as an image.
    #[error("corrupt or unreadable image: {0}")]
    Corrupt(String),

    /// The decoded image is below the minimum dimension on some axis.
    #[error("image is too small ({width}x{height}), minimum is {min}x{min} pixels")]
    TooSmall {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Minimum accepted size per axis.
        min: u32,
    },

    /// The decoded image exceeds the maximum dimension on some axis.
    #[error("image is too big ({width}x{height}), maximum is {max}x{max} pixels")]
    TooBig {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Maximum accepted size per axis.
        max: u32,
    },
}

/// Failures inside a single overlay draw.
///
/// The compositor never propagates these: the affected overlay is skipped,
/// the error is logged, and the layers already drawn are kept.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DrawError {
    /// A geometric or style parameter was NaN or infinite.
    #[error("non-finite value for {0}")]
    NonFinite(&'static str),

    /// A text mask or drawing layer would exceed the supported size.
    #[error("mask of {width}x{height} pixels exceeds the rasteriser limit")]
    MaskTooLarge {
        /// Requested mask width.
        width: u64,
        /// Requested mask height.
        height: u64,
    },

    /// A drawing surface of the given size could not be allocated.
    #[error("cannot allocate a {width}x{height} drawing surface")]
    Surface {
        /// Requested surface width.
        width: u32,
        /// Requested surface height.
        height: u32,
    },

    /// A font face failed to produce glyph metrics.
    #[error("font error: {0}")]
    Font(String),
}

/// Failures while turning a composited bitmap into a downloadable file.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// No photo has been loaded, so there is nothing to export.
    #[error("no image loaded")]
    NoImage,

    /// PNG encoding failed.
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),

    /// Writing the exported file failed.
    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the crate's public operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An uploaded file was rejected.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Export failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// A watermark setting is outside its accepted range.
    #[error("invalid watermark setting `{field}`: {reason}")]
    InvalidSpec {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },

    /// A font file could not be parsed.
    #[error("failed to load font: {0}")]
    Font(String),

    /// An I/O error occurred while reading input files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
