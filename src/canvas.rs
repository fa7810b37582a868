//! A small 2D drawing surface over a `tiny_skia` pixmap.
//!
//! Provides the primitives the compositor needs and nothing more:
//! save/restore of drawing state, translate/rotate of the coordinate origin,
//! a global alpha, a device-space drop shadow, drawing a pixmap into a local
//! rectangle, and filling a [`TextMask`] with a colour.
//!
//! Sprites are drawn with bilinear filtering through the current transform
//! and composited source-over.

use image::{imageops, GrayImage, Rgba};
use tiny_skia::{BlendMode, FilterQuality, Pixmap, PixmapPaint, PixmapRef, Point, Transform};

use crate::blending;
use crate::error::DrawError;
use crate::font::{check_mask_size, TextMask};
use crate::loader::Bitmap;

/// A drop shadow applied to mask fills, in device pixels.
///
/// Offsets are not affected by the current transform, so a shadow keeps its
/// direction when the text is rotated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowStyle {
    /// Shadow colour; its alpha scales the shadow.
    pub color: Rgba<u8>,
    /// Blur radius in pixels.
    pub blur: f32,
    /// Horizontal offset in pixels.
    pub offset_x: f32,
    /// Vertical offset in pixels.
    pub offset_y: f32,
}

impl ShadowStyle {
    fn is_visible(&self) -> bool {
        self.color[3] > 0 && (self.blur > 0.0 || self.offset_x != 0.0 || self.offset_y != 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DrawState {
    transform: Transform,
    global_alpha: f32,
    shadow: Option<ShadowStyle>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            global_alpha: 1.0,
            shadow: None,
        }
    }
}

/// The drawing surface.
pub struct Canvas {
    pixmap: Pixmap,
    state: DrawState,
    stack: Vec<DrawState>,
}

impl Canvas {
    /// Start a canvas holding a copy of `base`.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::Surface`] if the pixmap cannot be allocated.
    pub fn from_bitmap(base: &Bitmap) -> Result<Self, DrawError> {
        Ok(Self {
            pixmap: blending::pixmap_from_rgba(base.pixels())?,
            state: DrawState::default(),
            stack: Vec::new(),
        })
    }

    /// Canvas width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Canvas height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Finish drawing and hand back the pixels.
    #[must_use]
    pub fn into_bitmap(self) -> Bitmap {
        Bitmap::from_canvas(blending::rgba_from_pixmap(&self.pixmap))
    }

    /// Push the current drawing state.
    pub fn save(&mut self) {
        self.stack.push(self.state);
    }

    /// Pop the most recently saved state (no-op on an empty stack).
    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    /// Run `f` between [`save`](Self::save) and [`restore`](Self::restore),
    /// restoring even when `f` fails.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn with_saved<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, DrawError>,
    ) -> Result<T, DrawError> {
        self.save();
        let result = f(self);
        self.restore();
        result
    }

    /// Move the coordinate origin.
    pub fn translate(&mut self, tx: f32, ty: f32) {
        self.state.transform = self.state.transform.pre_translate(tx, ty);
    }

    /// Rotate the coordinate system clockwise (on screen) around the
    /// current origin.
    pub fn rotate(&mut self, degrees: f32) {
        self.state.transform = self.state.transform.pre_rotate(degrees);
    }

    /// The current local-to-device transform.
    #[must_use]
    pub fn transform(&self) -> Transform {
        self.state.transform
    }

    /// Set the alpha multiplier for subsequent draws, clamped to `0..=1`.
    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.state.global_alpha = if alpha.is_finite() {
            alpha.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// The current alpha multiplier.
    #[must_use]
    pub fn global_alpha(&self) -> f32 {
        self.state.global_alpha
    }

    /// Set or clear the drop shadow for subsequent mask fills.
    pub fn set_shadow(&mut self, shadow: Option<ShadowStyle>) {
        self.state.shadow = shadow;
    }

    /// Draw `image` stretched into the local rectangle `(x, y, w, h)`.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::NonFinite`] if the transform cannot be inverted
    /// or the rectangle is not finite.
    pub fn draw_pixmap(
        &mut self,
        image: PixmapRef<'_>,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) -> Result<(), DrawError> {
        if ![x, y, w, h].iter().all(|v| v.is_finite()) {
            return Err(DrawError::NonFinite("image rectangle"));
        }
        let transform = self.checked_transform()?;
        if w <= 0.0 || h <= 0.0 || self.state.global_alpha <= 0.0 {
            return Ok(());
        }

        #[allow(clippy::cast_precision_loss)]
        let (sx, sy) = (w / image.width() as f32, h / image.height() as f32);
        let placed = transform.pre_translate(x, y).pre_scale(sx, sy);
        let paint = self.paint();
        self.pixmap.draw_pixmap(0, 0, image, &paint, placed, None);
        Ok(())
    }

    /// Fill a text mask (positioned in local coordinates) with `color`,
    /// casting the current shadow first when one is set.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::NonFinite`] if the transform cannot be inverted
    /// or the shadow parameters are not finite, and
    /// [`DrawError::MaskTooLarge`] if the shadow layer would exceed the
    /// rasteriser limits.
    pub fn fill_mask(&mut self, mask: &TextMask, color: Rgba<u8>) -> Result<(), DrawError> {
        let transform = self.checked_transform()?;
        let coverage = mask.coverage();
        if self.state.global_alpha <= 0.0 || coverage.width() == 0 || coverage.height() == 0 {
            return Ok(());
        }

        let (ox, oy) = mask.origin();
        let placed = transform.pre_translate(ox, oy);

        if let Some(shadow) = self.state.shadow.filter(ShadowStyle::is_visible) {
            self.cast_shadow(coverage, placed, shadow)?;
        }

        let sprite = blending::tinted(coverage, color)?;
        let paint = self.paint();
        self.pixmap.draw_pixmap(0, 0, sprite.as_ref(), &paint, placed, None);
        Ok(())
    }

    /// Render the coverage into a device-space layer, blur it, and draw it
    /// tinted with the shadow colour at the shadow offset.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn cast_shadow(
        &mut self,
        coverage: &GrayImage,
        placed: Transform,
        shadow: ShadowStyle,
    ) -> Result<(), DrawError> {
        if ![shadow.blur, shadow.offset_x, shadow.offset_y].iter().all(|v| v.is_finite()) {
            return Err(DrawError::NonFinite("shadow"));
        }
        let blur = shadow.blur.max(0.0);
        let (dx, dy) = (shadow.offset_x.round(), shadow.offset_y.round());
        let reach = (blur * 1.5).ceil();

        let (mw, mh) = (coverage.width() as f32, coverage.height() as f32);
        let mut corners = [
            Point::from_xy(0.0, 0.0),
            Point::from_xy(mw, 0.0),
            Point::from_xy(0.0, mh),
            Point::from_xy(mw, mh),
        ];
        placed.map_points(&mut corners);
        let (mut x0, mut y0) = (f32::INFINITY, f32::INFINITY);
        let (mut x1, mut y1) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in &corners {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }

        // Only the part that can land on the canvas once shifted.
        let (cw, ch) = (self.width() as f32, self.height() as f32);
        let x0 = (x0 - reach).max(-dx - reach).floor();
        let y0 = (y0 - reach).max(-dy - reach).floor();
        let x1 = (x1 + reach).min(cw - dx + reach).ceil();
        let y1 = (y1 + reach).min(ch - dy + reach).ceil();
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }

        let (lw, lh) = (f64::from(x1 - x0) as u64, f64::from(y1 - y0) as u64);
        check_mask_size(lw, lh)?;
        let (lw, lh) = (lw as u32, lh as u32);
        let mut layer = Pixmap::new(lw, lh).ok_or(DrawError::Surface {
            width: lw,
            height: lh,
        })?;

        let ink = blending::tinted(coverage, Rgba([255, 255, 255, 255]))?;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        layer.draw_pixmap(0, 0, ink.as_ref(), &paint, placed.post_translate(-x0, -y0), None);

        let mut alpha = blending::alpha_channel(&layer);
        if blur > 0.0 {
            alpha = imageops::blur(&alpha, blur / 2.0);
        }
        let tinted = blending::tinted(&alpha, shadow.color)?;
        let paint = self.paint();
        self.pixmap.draw_pixmap(
            0,
            0,
            tinted.as_ref(),
            &paint,
            Transform::from_translate(x0 + dx, y0 + dy),
            None,
        );
        Ok(())
    }

    fn paint(&self) -> PixmapPaint {
        PixmapPaint {
            opacity: self.state.global_alpha,
            blend_mode: BlendMode::SourceOver,
            quality: FilterQuality::Bilinear,
        }
    }

    fn checked_transform(&self) -> Result<Transform, DrawError> {
        let transform = self.state.transform;
        if !transform.is_finite() || transform.invert().is_none() {
            return Err(DrawError::NonFinite("transform"));
        }
        Ok(transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{FontBook, FontRequest, TextBaseline};
    use crate::watermark::{FontFamily, FontWeight, TextAlign};
    use image::RgbaImage;

    fn black_canvas(w: u32, h: u32) -> Canvas {
        let base = Bitmap::new(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]))).unwrap();
        Canvas::from_bitmap(&base).unwrap()
    }

    fn white_square(size: u32) -> Pixmap {
        blending::pixmap_from_rgba(&RgbaImage::from_pixel(size, size, Rgba([255, 255, 255, 255])))
            .unwrap()
    }

    fn letter(text: &str, size: f32) -> TextMask {
        FontBook::builtin()
            .layout(
                text,
                FontRequest {
                    family: FontFamily::Arial,
                    weight: FontWeight::Normal,
                    size,
                },
                TextAlign::Left,
                TextBaseline::Top,
            )
            .unwrap()
            .unwrap()
    }

    fn mapped(t: Transform, x: f32, y: f32) -> (f32, f32) {
        let mut p = [Point::from_xy(x, y)];
        t.map_points(&mut p);
        (p[0].x, p[0].y)
    }

    #[test]
    fn translate_then_rotate_turns_about_the_new_origin() {
        let mut canvas = black_canvas(10, 10);
        canvas.translate(10.0, 20.0);
        canvas.rotate(90.0);
        let (x, y) = mapped(canvas.transform(), 1.0, 0.0);
        assert!((x - 10.0).abs() < 1e-4 && (y - 21.0).abs() < 1e-4, "({x}, {y})");
    }

    #[test]
    fn quarter_turn_rotates_clockwise_on_screen() {
        let mut canvas = black_canvas(10, 10);
        canvas.rotate(90.0);
        let (x, y) = mapped(canvas.transform(), 1.0, 0.0);
        assert!(x.abs() < 1e-6 && (y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn save_restore_round_trips_state() {
        let mut canvas = black_canvas(20, 20);
        canvas.save();
        canvas.translate(5.0, 5.0);
        canvas.set_global_alpha(0.25);
        canvas.restore();
        assert_eq!(canvas.transform(), Transform::identity());
        assert!((canvas.global_alpha() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn with_saved_restores_on_error() {
        let mut canvas = black_canvas(20, 20);
        let result: Result<(), DrawError> = canvas.with_saved(|c| {
            c.translate(3.0, 3.0);
            Err(DrawError::NonFinite("test"))
        });
        assert!(result.is_err());
        assert_eq!(canvas.transform(), Transform::identity());
    }

    #[test]
    fn draw_pixmap_fills_target_rectangle() {
        let mut canvas = black_canvas(40, 40);
        canvas.translate(20.0, 20.0);
        canvas
            .draw_pixmap(white_square(10).as_ref(), -5.0, -5.0, 10.0, 10.0)
            .unwrap();
        let out = canvas.into_bitmap();
        assert_eq!(out.pixels().get_pixel(20, 20), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.pixels().get_pixel(15, 15), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.pixels().get_pixel(14, 14), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.pixels().get_pixel(25, 25), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn global_alpha_scales_pixmap_draw() {
        let mut canvas = black_canvas(20, 20);
        canvas.set_global_alpha(0.5);
        canvas
            .draw_pixmap(white_square(20).as_ref(), 0.0, 0.0, 20.0, 20.0)
            .unwrap();
        let out = canvas.into_bitmap();
        let px = out.pixels().get_pixel(10, 10);
        assert!((127..=128).contains(&px[0]), "{px:?}");
        assert_eq!(px[3], 255);
    }

    #[test]
    fn off_canvas_draw_is_a_no_op() {
        let mut canvas = black_canvas(20, 20);
        canvas.translate(500.0, 500.0);
        canvas
            .draw_pixmap(white_square(10).as_ref(), 0.0, 0.0, 10.0, 10.0)
            .unwrap();
        let out = canvas.into_bitmap();
        assert!(out.pixels().pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn non_finite_transform_is_a_draw_error() {
        let mut canvas = black_canvas(20, 20);
        canvas.translate(f32::NAN, 0.0);
        assert_eq!(
            canvas.draw_pixmap(white_square(4).as_ref(), 0.0, 0.0, 4.0, 4.0),
            Err(DrawError::NonFinite("transform"))
        );
    }

    #[test]
    fn shadow_darkens_pixels_beside_text() {
        let mask = letter("H", 32.0);
        let white = Bitmap::new(RgbaImage::from_pixel(80, 80, Rgba([255, 255, 255, 255]))).unwrap();

        let mut plain = Canvas::from_bitmap(&white).unwrap();
        plain.translate(10.0, 10.0);
        plain.fill_mask(&mask, Rgba([255, 255, 255, 255])).unwrap();
        let plain = plain.into_bitmap();
        assert_eq!(plain, white, "white text on white leaves no trace");

        let mut shadowed = Canvas::from_bitmap(&white).unwrap();
        shadowed.translate(10.0, 10.0);
        shadowed.set_shadow(Some(ShadowStyle {
            color: Rgba([0, 0, 0, 255]),
            blur: 4.0,
            offset_x: 3.0,
            offset_y: 3.0,
        }));
        shadowed.fill_mask(&mask, Rgba([255, 255, 255, 255])).unwrap();
        let shadowed = shadowed.into_bitmap();
        assert!(shadowed.pixels().pixels().any(|p| p[0] < 200));
    }

    #[test]
    fn oversized_shadow_layer_is_refused() {
        let mask = letter("H", 32.0);
        let mut canvas = black_canvas(80, 80);
        canvas.set_shadow(Some(ShadowStyle {
            color: Rgba([0, 0, 0, 255]),
            blur: 1.0e9,
            offset_x: 0.0,
            offset_y: 0.0,
        }));
        assert!(matches!(
            canvas.fill_mask(&mask, Rgba([255, 255, 255, 255])),
            Err(DrawError::MaskTooLarge { .. })
        ));
    }

    #[test]
    fn far_offset_shadow_is_skipped() {
        let mask = letter("H", 32.0);
        let white = Bitmap::new(RgbaImage::from_pixel(80, 80, Rgba([255, 255, 255, 255]))).unwrap();
        let mut canvas = Canvas::from_bitmap(&white).unwrap();
        canvas.set_shadow(Some(ShadowStyle {
            color: Rgba([0, 0, 0, 255]),
            blur: 2.0,
            offset_x: 5000.0,
            offset_y: 0.0,
        }));
        canvas.fill_mask(&mask, Rgba([255, 255, 255, 255])).unwrap();
        assert_eq!(canvas.into_bitmap(), white);
    }
}
