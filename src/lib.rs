//! Composite text or image watermarks onto photos and export them as PNG.
//!
//! A photo is validated and decoded by the [`loader`], a [`WatermarkSpec`]
//! describes what to draw, and the [`Compositor`] turns both into a new
//! bitmap: the base photo, the user's watermark (once, or tiled as a
//! pattern), and a small branding mark on top unless the subscription is Pro.
//! Rendering is a pure function of its inputs.
//!
//! # Quick Start
//!
//! ```no_run
//! use awit_watermark::{export, loader, Compositor, LoadLimits, RenderFlags, SubscriptionState, WatermarkSpec};
//!
//! let photo = loader::load_path("photo.jpg".as_ref(), &LoadLimits::BASE_IMAGE)?;
//! let spec = WatermarkSpec::text("© Jane Doe");
//! let frame = Compositor::new().render(
//!     &photo.bitmap,
//!     &spec,
//!     &SubscriptionState::free(),
//!     RenderFlags::default(),
//! );
//! let png = export::export(&frame, chrono::Utc::now())?;
//! png.save_to_dir("out".as_ref())?;
//! # Ok::<(), awit_watermark::Error>(())
//! ```
//!
//! # Sessions
//!
//! [`Session`] bundles the state an editor keeps between renders: the current
//! photo, the watermark being edited, the subscription and the preview
//! toggle. Its [`export`](Session::export) always includes overlays, even when
//! preview is switched off.
//!
//! ```no_run
//! use awit_watermark::{Anchor, Session, Tiling, WatermarkSpec};
//!
//! let mut session = Session::default();
//! session.load_image(&std::fs::read("photo.png")?, "image/png")?;
//! session.set_spec(WatermarkSpec::text("DRAFT").with_anchor(Anchor::Center));
//! session.spec_mut().tiling = Tiling::Pattern { spacing: 150 };
//! session.set_preview(false);
//! let png = session.export(chrono::Utc::now())?;
//! std::fs::write(&png.filename, &png.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]

pub mod blending;
mod branding;
pub mod canvas;
pub mod color;
mod engine;
pub mod error;
pub mod export;
pub mod font;
pub mod loader;
mod session;
pub mod subscription;
pub mod watermark;

pub use branding::BRAND_TEXT;
pub use engine::{Compositor, PatternGrid, RenderFlags, MIN_PATTERN_CELLS, PATTERN_OPACITY_FACTOR};
pub use error::{DrawError, Error, ExportError, LoadError, Result};
pub use export::ExportedImage;
pub use font::FontBook;
pub use loader::{Bitmap, ByteSize, ImageInfo, ImageMime, LoadLimits, LoadedImage};
pub use session::Session;
pub use subscription::{Plan, SubscriptionState, PLANS, PRO_MONTHLY, PRO_YEARLY};
pub use watermark::{
    Anchor, FontFamily, FontWeight, Geometry, ImageWatermark, Shadow, Stroke, TextAlign,
    TextStyle, Tiling, WatermarkKind, WatermarkSpec,
};
