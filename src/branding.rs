//! The mandatory branding mark drawn on renders without a Pro subscription.
//!
//! Kept apart from the user watermark path: nothing here reads a
//! [`WatermarkSpec`](crate::WatermarkSpec), and the compositor draws it last.

use image::Rgba;

use crate::canvas::Canvas;
use crate::error::DrawError;
use crate::font::{FontBook, FontRequest, TextBaseline};
use crate::watermark::{FontFamily, FontWeight, TextAlign};

/// Text of the branding mark.
pub const BRAND_TEXT: &str = "AWiT";

/// Distance from the right and bottom canvas edges, in pixels.
const MARGIN: f32 = 10.0;
const SIZE: f32 = 12.0;
const COLOR: Rgba<u8> = Rgba([0x66, 0x66, 0x66, 255]);
const OPACITY: f32 = 0.8;

/// Draw the branding mark in the bottom-right corner.
pub(crate) fn draw(canvas: &mut Canvas, fonts: &FontBook) -> Result<(), DrawError> {
    let font = FontRequest {
        family: FontFamily::Arial,
        weight: FontWeight::Normal,
        size: SIZE,
    };
    let Some(mask) = fonts.layout(BRAND_TEXT, font, TextAlign::Right, TextBaseline::Bottom)? else {
        return Ok(());
    };

    #[allow(clippy::cast_precision_loss)]
    let (x, y) = (
        canvas.width() as f32 - MARGIN,
        canvas.height() as f32 - MARGIN,
    );
    canvas.with_saved(|c| {
        c.translate(x, y);
        c.set_shadow(None);
        c.set_global_alpha(OPACITY);
        c.fill_mask(&mask, COLOR)
    })
}
