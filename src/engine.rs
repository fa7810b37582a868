//! Core watermark compositing engine.

use std::ops::RangeInclusive;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tiny_skia::Pixmap;
use tracing::{debug, warn};

use crate::blending;
use crate::branding;
use crate::canvas::{Canvas, ShadowStyle};
use crate::error::DrawError;
use crate::font::{FontBook, FontRequest, TextBaseline, TextMask};
use crate::loader::Bitmap;
use crate::subscription::SubscriptionState;
use crate::watermark::{
    Tiling, WatermarkKind, WatermarkSpec, FONT_SIZE_RANGE, IMAGE_SIZE_RANGE, PATTERN_SPACING_RANGE,
    SHADOW_BLUR_RANGE, SHADOW_OFFSET_RANGE, STROKE_WIDTH_RANGE,
};

/// Opacity multiplier applied to every instance in pattern mode.
pub const PATTERN_OPACITY_FACTOR: f32 = 0.6;

/// Minimum number of pattern cells per axis.
pub const MIN_PATTERN_CELLS: u32 = 2;

/// Per-render switches derived from UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderFlags {
    /// When `false`, the render returns the base image untouched.
    pub preview_enabled: bool,
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            preview_enabled: true,
        }
    }
}

impl RenderFlags {
    /// Overlays on.
    #[must_use]
    pub fn preview() -> Self {
        Self {
            preview_enabled: true,
        }
    }

    /// Overlays off: the base image only.
    #[must_use]
    pub fn original() -> Self {
        Self {
            preview_enabled: false,
        }
    }
}

/// The tile grid used by pattern mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternGrid {
    /// Cell edge length in pixels.
    pub spacing: u32,
    /// Number of columns.
    pub cols: u32,
    /// Number of rows.
    pub rows: u32,
}

impl PatternGrid {
    /// Grid for a canvas: `max(2, ceil(dimension / spacing))` cells per axis.
    /// A spacing of zero is treated as one.
    #[must_use]
    pub fn new(width: u32, height: u32, spacing: u32) -> Self {
        let spacing = spacing.max(1);
        Self {
            spacing,
            cols: width.div_ceil(spacing).max(MIN_PATTERN_CELLS),
            rows: height.div_ceil(spacing).max(MIN_PATTERN_CELLS),
        }
    }

    /// Total number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Whether the grid has no cells (never true for grids built by [`new`](Self::new)).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instance anchors in row-major order.
    ///
    /// Each anchor sits at its cell centre, shifted right by a quarter cell
    /// on odd rows and down by a quarter cell on odd columns.
    pub fn anchors(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        #[allow(clippy::cast_precision_loss)]
        let s = self.spacing as f32;
        let quarter = s / 4.0;
        (0..self.rows).flat_map(move |row| {
            (0..self.cols).map(move |col| {
                #[allow(clippy::cast_precision_loss)]
                let (cx, cy) = (col as f32 * s + s / 2.0, row as f32 * s + s / 2.0);
                let jitter_x = if row % 2 == 1 { quarter } else { 0.0 };
                let jitter_y = if col % 2 == 1 { quarter } else { 0.0 };
                (cx + jitter_x, cy + jitter_y)
            })
        })
    }
}

impl Tiling {
    /// Opacity each instance is drawn with, given the watermark opacity.
    #[must_use]
    pub fn instance_opacity(self, opacity: f32) -> f32 {
        match self {
            Tiling::Single => opacity,
            Tiling::Pattern { .. } => opacity * PATTERN_OPACITY_FACTOR,
        }
    }
}

/// One watermark instance, prepared once per render and stamped at every
/// anchor.
enum Stamp {
    Text {
        fill: TextMask,
        fill_color: image::Rgba<u8>,
        stroke: Option<(TextMask, image::Rgba<u8>)>,
        shadow: Option<ShadowStyle>,
    },
    Image {
        pixels: Pixmap,
        size: f32,
    },
}

/// Pull a finite value into `range`; `what` names it in the error.
fn clamped(
    value: f32,
    range: &RangeInclusive<f32>,
    what: &'static str,
) -> Result<f32, DrawError> {
    if !value.is_finite() {
        return Err(DrawError::NonFinite(what));
    }
    Ok(value.clamp(*range.start(), *range.end()))
}

impl Stamp {
    /// Build the stamp for a spec. `Ok(None)` means there is nothing to draw
    /// (empty text, or an image watermark without a decoded image).
    ///
    /// Sizes, stroke and shadow values outside their control ranges are
    /// clamped into them.
    fn prepare(spec: &WatermarkSpec, fonts: &FontBook) -> Result<Option<Self>, DrawError> {
        match spec.kind {
            WatermarkKind::Text => {
                let text = &spec.text;
                let font = FontRequest {
                    family: text.family,
                    weight: text.weight,
                    size: clamped(text.size, &FONT_SIZE_RANGE, "font size")?,
                };
                let Some(fill) = fonts.layout(&text.content, font, text.align, TextBaseline::Middle)?
                else {
                    return Ok(None);
                };

                let stroke = match text.stroke {
                    Some(s) => {
                        let width = clamped(s.width, &STROKE_WIDTH_RANGE, "stroke width")?;
                        if width > 0.0 {
                            Some((fill.dilated(width / 2.0)?, s.color))
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                let shadow = match text.shadow {
                    Some(s) => {
                        let blur = clamped(s.blur, &SHADOW_BLUR_RANGE, "shadow blur")?;
                        (blur > 0.0).then_some(ShadowStyle {
                            color: s.color,
                            blur,
                            offset_x: clamped(s.offset_x, &SHADOW_OFFSET_RANGE, "shadow offset")?,
                            offset_y: clamped(s.offset_y, &SHADOW_OFFSET_RANGE, "shadow offset")?,
                        })
                    }
                    None => None,
                };

                Ok(Some(Stamp::Text {
                    fill,
                    fill_color: text.color,
                    stroke,
                    shadow,
                }))
            }
            WatermarkKind::Image => {
                let Some(bitmap) = spec.image.bitmap.as_ref() else {
                    debug!("image watermark selected without a decoded image, skipping");
                    return Ok(None);
                };
                let edge = spec
                    .image
                    .size
                    .clamp(*IMAGE_SIZE_RANGE.start(), *IMAGE_SIZE_RANGE.end());
                #[allow(clippy::cast_precision_loss)]
                let size = edge as f32;
                Ok(Some(Stamp::Image {
                    pixels: blending::pixmap_from_rgba(&stretch_to_square(bitmap, edge))?,
                    size,
                }))
            }
        }
    }

    /// Draw at the canvas origin with `opacity` as the global alpha.
    fn draw(&self, canvas: &mut Canvas, opacity: f32) -> Result<(), DrawError> {
        canvas.set_global_alpha(opacity);
        match self {
            Stamp::Text {
                fill,
                fill_color,
                stroke,
                shadow,
            } => {
                canvas.set_shadow(*shadow);
                if let Some((outline, color)) = stroke {
                    canvas.fill_mask(outline, *color)?;
                }
                canvas.fill_mask(fill, *fill_color)
            }
            Stamp::Image { pixels, size } => {
                let half = size / 2.0;
                canvas.draw_pixmap(pixels.as_ref(), -half, -half, *size, *size)
            }
        }
    }
}

/// Resample the logo to `size x size`, ignoring its aspect ratio.
fn stretch_to_square(bitmap: &Arc<Bitmap>, size: u32) -> RgbaImage {
    let pixels = bitmap.pixels();
    if pixels.width() == size && pixels.height() == size {
        return pixels.clone();
    }
    imageops::resize(pixels, size, size, FilterType::Lanczos3)
}

/// The compositing engine.
///
/// Holds the font faces used for text; rendering itself keeps no state
/// between calls, so one compositor can serve any number of renders.
#[derive(Debug, Default)]
pub struct Compositor {
    fonts: FontBook,
}

impl Compositor {
    /// A compositor using only the built-in bitmap face.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A compositor using the given font faces.
    #[must_use]
    pub fn with_fonts(fonts: FontBook) -> Self {
        Self { fonts }
    }

    /// The registered font faces.
    #[must_use]
    pub fn fonts(&self) -> &FontBook {
        &self.fonts
    }

    /// Composite a watermark over `base`.
    ///
    /// Always returns a bitmap the size of `base`. With preview disabled the
    /// result equals `base`. Otherwise the user watermark is drawn (single or
    /// pattern), then, unless `subscription` is Pro, the branding mark on
    /// top. A layer that fails to draw is skipped and logged; earlier layers
    /// are kept.
    #[must_use]
    pub fn render(
        &self,
        base: &Bitmap,
        spec: &WatermarkSpec,
        subscription: &SubscriptionState,
        flags: RenderFlags,
    ) -> Bitmap {
        if !flags.preview_enabled {
            return base.clone();
        }
        let mut canvas = match Canvas::from_bitmap(base) {
            Ok(canvas) => canvas,
            Err(e) => {
                warn!(error = %e, "cannot open a canvas, returning the base image");
                return base.clone();
            }
        };

        if let Err(e) = self.draw_watermark(&mut canvas, spec) {
            warn!(error = %e, "watermark layer skipped");
        }

        if !subscription.is_pro() {
            if let Err(e) = branding::draw(&mut canvas, &self.fonts) {
                warn!(error = %e, "branding mark skipped");
            }
        }

        canvas.into_bitmap()
    }

    fn draw_watermark(&self, canvas: &mut Canvas, spec: &WatermarkSpec) -> Result<(), DrawError> {
        let geometry = spec.geometry;
        if ![geometry.x, geometry.y, geometry.rotation, spec.opacity]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(DrawError::NonFinite("geometry"));
        }

        let Some(stamp) = Stamp::prepare(spec, &self.fonts)? else {
            return Ok(());
        };

        let opacity = spec.tiling.instance_opacity(spec.opacity.clamp(0.0, 1.0));

        match spec.tiling {
            Tiling::Single => {
                #[allow(clippy::cast_precision_loss)]
                let (x, y) = (
                    geometry.x / 100.0 * canvas.width() as f32,
                    geometry.y / 100.0 * canvas.height() as f32,
                );
                debug!(x, y, rotation = geometry.rotation, "drawing single watermark");
                canvas.with_saved(|c| {
                    c.translate(x, y);
                    c.rotate(geometry.rotation);
                    stamp.draw(c, opacity)
                })
            }
            Tiling::Pattern { spacing } => {
                let spacing =
                    spacing.clamp(*PATTERN_SPACING_RANGE.start(), *PATTERN_SPACING_RANGE.end());
                let grid = PatternGrid::new(canvas.width(), canvas.height(), spacing);
                debug!(cols = grid.cols, rows = grid.rows, spacing = grid.spacing, "drawing watermark pattern");
                for (x, y) in grid.anchors() {
                    canvas.with_saved(|c| {
                        c.translate(x, y);
                        c.rotate(geometry.rotation);
                        stamp.draw(c, opacity)
                    })?;
                }
                Ok(())
            }
        }
    }
}
