//! PNG export of composited bitmaps.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};
use tracing::info;

use crate::error::ExportError;
use crate::loader::Bitmap;

/// Prefix of every exported file name.
pub const FILENAME_PREFIX: &str = "awit_watermarked_";

/// An encoded export ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedImage {
    /// Suggested file name, e.g. `awit_watermarked_20240131T120000.png`.
    pub filename: String,
    /// Lossless PNG bytes.
    pub bytes: Vec<u8>,
}

impl ExportedImage {
    /// Write the export into `dir` under its file name and return the path.
    ///
    /// The file is written under a temporary name and renamed into place, so
    /// a failed write leaves no partial file behind.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] if the directory cannot be created or the
    /// file cannot be written.
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(dir)?;
        let target = dir.join(&self.filename);
        let partial = dir.join(format!(".{}.part", self.filename));

        if let Err(e) = fs::write(&partial, &self.bytes).and_then(|()| fs::rename(&partial, &target)) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        info!(path = %target.display(), bytes = self.bytes.len(), "export written");
        Ok(target)
    }
}

/// File name for an export made at `now`, with second granularity.
#[must_use]
pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("{FILENAME_PREFIX}{}.png", now.format("%Y%m%dT%H%M%S"))
}

/// Encode `bitmap` as PNG.
///
/// # Errors
///
/// Returns [`ExportError::Encode`] if the encoder fails.
pub fn export(bitmap: &Bitmap, now: DateTime<Utc>) -> Result<ExportedImage, ExportError> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(bitmap.pixels().clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

    Ok(ExportedImage {
        filename: export_filename(now),
        bytes,
    })
}
