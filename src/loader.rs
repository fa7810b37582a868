//! Validating image loader.
//!
//! Turns user-supplied file bytes into a [`Bitmap`] after checking, in order:
//! byte size, declared MIME type, sniffed content format, and decoded
//! dimensions. Decoding is attempted exactly once per call.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use image::{ImageFormat, ImageReader, RgbaImage};
use tracing::debug;

use crate::error::{Error, LoadError, Result};

/// Smallest accepted width or height, in pixels.
pub const MIN_DIMENSION: u32 = 10;

/// Largest accepted width or height, in pixels.
pub const MAX_DIMENSION: u32 = 10_000;

const MIB: u64 = 1024 * 1024;

/// A byte count that displays the way file pickers show it (`"1.5 MB"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

        if self.0 == 0 {
            return f.write_str("0 Bytes");
        }

        let mut unit = 0;
        #[allow(clippy::cast_precision_loss)]
        let mut value = self.0 as f64;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }

        let rounded = format!("{value:.2}");
        let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
        write!(f, "{trimmed} {}", UNITS[unit])
    }
}

/// Image types accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMime {
    /// `image/jpeg`
    Jpeg,
    /// `image/png`
    Png,
    /// `image/gif`
    Gif,
    /// `image/webp`
    WebP,
}

impl ImageMime {
    /// The canonical MIME string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Guess the MIME type from a file extension, the way a browser file
    /// picker labels a file before upload.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }
}

impl FromStr for ImageMime {
    type Err = LoadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            "image/gif" => Ok(Self::Gif),
            "image/webp" => Ok(Self::WebP),
            other => Err(LoadError::UnsupportedFormat(if other.is_empty() {
                "unknown type".to_string()
            } else {
                other.to_string()
            })),
        }
    }
}

impl fmt::Display for ImageMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upload limits for one image role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadLimits {
    /// Maximum file size in bytes.
    pub max_bytes: u64,
    /// Minimum width and height in pixels.
    pub min_dimension: u32,
    /// Maximum width and height in pixels.
    pub max_dimension: u32,
}

impl LoadLimits {
    /// Limits for the photo being watermarked (10 MB).
    pub const BASE_IMAGE: Self = Self {
        max_bytes: 10 * MIB,
        min_dimension: MIN_DIMENSION,
        max_dimension: MAX_DIMENSION,
    };

    /// Limits for an uploaded watermark logo (5 MB).
    pub const WATERMARK_IMAGE: Self = Self {
        max_bytes: 5 * MIB,
        min_dimension: MIN_DIMENSION,
        max_dimension: MAX_DIMENSION,
    };

    fn check_dimensions(&self, width: u32, height: u32) -> std::result::Result<(), LoadError> {
        if width < self.min_dimension || height < self.min_dimension {
            return Err(LoadError::TooSmall {
                width,
                height,
                min: self.min_dimension,
            });
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(LoadError::TooBig {
                width,
                height,
                max: self.max_dimension,
            });
        }
        Ok(())
    }
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self::BASE_IMAGE
    }
}

/// A decoded RGBA raster, 10..=10000 pixels on each axis.
///
/// Immutable once constructed; the compositor reads it and produces a new
/// bitmap rather than mutating its input.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pixels: RgbaImage,
}

impl Bitmap {
    /// Wrap an RGBA buffer, enforcing the global dimension bounds.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::TooSmall`] or [`LoadError::TooBig`] when either
    /// axis falls outside `10..=10000`.
    pub fn new(pixels: RgbaImage) -> std::result::Result<Self, LoadError> {
        LoadLimits::BASE_IMAGE.check_dimensions(pixels.width(), pixels.height())?;
        Ok(Self { pixels })
    }

    /// Wrap a buffer whose dimensions are already known to be valid
    /// (a canvas sized from an existing bitmap).
    pub(crate) fn from_canvas(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Borrow the pixel buffer.
    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Take ownership of the pixel buffer.
    #[must_use]
    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}

/// Metadata reported alongside a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Size of the uploaded file.
    pub byte_size: ByteSize,
    /// Format detected from the file content.
    pub mime: ImageMime,
}

/// A decoded bitmap plus its metadata.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The decoded pixels.
    pub bitmap: Bitmap,
    /// Dimensions, byte size and format.
    pub info: ImageInfo,
}

/// Validate and decode an uploaded image.
///
/// Checks run in order: byte size against `limits.max_bytes`, the declared
/// MIME type, the sniffed content format, then the dimensions from the image
/// header. Pixel decoding happens only after every check has passed, so an
/// oversized image is rejected without allocating its buffer.
///
/// # Errors
///
/// Returns the first [`LoadError`] encountered.
pub fn load(
    bytes: &[u8],
    declared_mime: &str,
    limits: &LoadLimits,
) -> std::result::Result<LoadedImage, LoadError> {
    let size = ByteSize(bytes.len() as u64);
    if size.0 > limits.max_bytes {
        return Err(LoadError::TooLarge {
            size,
            limit: ByteSize(limits.max_bytes),
        });
    }

    let declared: ImageMime = declared_mime.parse()?;

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LoadError::Corrupt(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| LoadError::Corrupt("unrecognised image data".to_string()))?;
    let mime = ImageMime::from_format(format)
        .ok_or_else(|| LoadError::UnsupportedFormat(format!("{format:?} content")))?;
    if mime != declared {
        debug!(%declared, detected = %mime, "declared type differs from content, decoding as content");
    }

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| LoadError::Corrupt(e.to_string()))?;
    limits.check_dimensions(width, height)?;

    let pixels = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| LoadError::Corrupt(e.to_string()))?
        .to_rgba8();

    debug!(width, height, size = %size, %mime, "image decoded");

    Ok(LoadedImage {
        bitmap: Bitmap { pixels },
        info: ImageInfo {
            width,
            height,
            byte_size: size,
            mime,
        },
    })
}

/// Read a file from disk and [`load`] it, taking the declared type from the
/// file extension.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read, or [`Error::Load`] if it
/// fails validation. Files without a recognised extension fail with
/// [`LoadError::UnsupportedFormat`].
pub fn load_path(path: &Path, limits: &LoadLimits) -> Result<LoadedImage> {
    let mime = ImageMime::from_path(path).ok_or_else(|| {
        LoadError::UnsupportedFormat(
            path.extension()
                .map_or_else(|| "no extension".to_string(), |e| e.to_string_lossy().into_owned()),
        )
    })?;

    let len = std::fs::metadata(path)?.len();
    if len > limits.max_bytes {
        return Err(Error::Load(LoadError::TooLarge {
            size: ByteSize(len),
            limit: ByteSize(limits.max_bytes),
        }));
    }

    let bytes = std::fs::read(path)?;
    Ok(load(&bytes, mime.as_str(), limits)?)
}
