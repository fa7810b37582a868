//! One editing session: the current photo, the watermark being edited, the
//! subscription and the preview toggle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::engine::{Compositor, RenderFlags};
use crate::error::{ExportError, LoadError};
use crate::export::{self, ExportedImage};
use crate::loader::{self, Bitmap, ImageInfo, LoadLimits, LoadedImage};
use crate::subscription::{Plan, SubscriptionState};
use crate::watermark::WatermarkSpec;

/// State owned by a single user while editing one photo.
///
/// Every mutation goes through `&mut self`, so the compositor only ever sees
/// a consistent snapshot.
#[derive(Debug)]
pub struct Session {
    compositor: Compositor,
    base: Option<LoadedImage>,
    spec: WatermarkSpec,
    subscription: SubscriptionState,
    preview: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Compositor::new())
    }
}

impl Session {
    /// A fresh session: no photo, factory watermark, free tier, preview on.
    #[must_use]
    pub fn new(compositor: Compositor) -> Self {
        Self {
            compositor,
            base: None,
            spec: WatermarkSpec::default(),
            subscription: SubscriptionState::free(),
            preview: true,
        }
    }

    /// Replace the photo. On failure the previous photo is kept.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] from validation or decoding.
    pub fn load_image(&mut self, bytes: &[u8], mime: &str) -> Result<ImageInfo, LoadError> {
        let loaded = loader::load(bytes, mime, &LoadLimits::BASE_IMAGE)?;
        let info = loaded.info;
        self.set_image(loaded);
        Ok(info)
    }

    /// Replace the photo with one that has already been loaded.
    pub fn set_image(&mut self, image: LoadedImage) {
        info!(
            width = image.info.width,
            height = image.info.height,
            size = %image.info.byte_size,
            "photo loaded"
        );
        self.base = Some(image);
    }

    /// Load the logo used by image watermarks. The watermark kind is left as
    /// it is.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] from validation or decoding; the previous
    /// logo is kept.
    pub fn load_watermark_image(&mut self, bytes: &[u8], mime: &str) -> Result<ImageInfo, LoadError> {
        let loaded = loader::load(bytes, mime, &LoadLimits::WATERMARK_IMAGE)?;
        self.spec.image.bitmap = Some(Arc::new(loaded.bitmap));
        Ok(loaded.info)
    }

    /// The current photo, if one is loaded.
    #[must_use]
    pub fn image(&self) -> Option<&LoadedImage> {
        self.base.as_ref()
    }

    /// The watermark being edited.
    #[must_use]
    pub fn spec(&self) -> &WatermarkSpec {
        &self.spec
    }

    /// Mutable access for per-field edits.
    pub fn spec_mut(&mut self) -> &mut WatermarkSpec {
        &mut self.spec
    }

    /// Replace the whole watermark.
    pub fn set_spec(&mut self, spec: WatermarkSpec) {
        self.spec = spec;
    }

    /// Restore the factory watermark, dropping any loaded logo.
    pub fn reset_spec(&mut self) {
        debug!("watermark reset to defaults");
        self.spec = WatermarkSpec::default();
    }

    /// Whether overlays are shown.
    #[must_use]
    pub fn preview(&self) -> bool {
        self.preview
    }

    /// Show or hide overlays.
    pub fn set_preview(&mut self, enabled: bool) {
        self.preview = enabled;
    }

    /// The subscription.
    #[must_use]
    pub fn subscription(&self) -> &SubscriptionState {
        &self.subscription
    }

    /// Buy `plan` at `now`.
    pub fn subscribe(&mut self, plan: Plan, now: DateTime<Utc>) {
        self.subscription.activate(plan, now);
    }

    /// Render the current frame, or `None` without a photo.
    #[must_use]
    pub fn render(&self) -> Option<Bitmap> {
        let base = self.base.as_ref()?;
        let flags = RenderFlags {
            preview_enabled: self.preview,
        };
        Some(
            self.compositor
                .render(&base.bitmap, &self.spec, &self.subscription, flags),
        )
    }

    /// Run `f` with preview forced on, then put the previous preview flag
    /// back. The flag is restored on every exit path, including a panic
    /// inside `f`.
    pub fn with_forced_preview<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        struct Restore<'a> {
            session: &'a mut Session,
            prior: bool,
        }

        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.session.preview = self.prior;
            }
        }

        let prior = self.preview;
        self.preview = true;
        let mut guard = Restore {
            session: self,
            prior,
        };
        let out = f(&mut *guard.session);
        drop(guard);
        out
    }

    /// Encode the current photo with overlays as PNG, whatever the preview
    /// toggle says.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::NoImage`] without a photo, or
    /// [`ExportError::Encode`] if encoding fails.
    pub fn export(&mut self, now: DateTime<Utc>) -> Result<ExportedImage, ExportError> {
        let exported = self.with_forced_preview(|session| {
            let frame = session.render().ok_or(ExportError::NoImage)?;
            export::export(&frame, now)
        })?;
        info!(filename = %exported.filename, bytes = exported.bytes.len(), "image exported");
        Ok(exported)
    }
}
