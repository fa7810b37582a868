//! Conversions between straight-alpha `image` buffers and premultiplied
//! `tiny_skia` pixmaps.
//!
//! Photos, logos and text masks live in `image` buffers; all compositing
//! happens on [`Pixmap`]s, which `tiny_skia` keeps premultiplied.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use tiny_skia::{ColorU8, IntSize, Pixmap, PremultipliedColorU8};

use crate::error::DrawError;

/// Copy a straight-alpha RGBA image into a new premultiplied pixmap.
///
/// # Errors
///
/// Returns [`DrawError::Surface`] for an empty image.
pub fn pixmap_from_rgba(img: &RgbaImage) -> Result<Pixmap, DrawError> {
    let data = img
        .pixels()
        .flat_map(|p| premultiplied_bytes(ColorU8::from_rgba(p[0], p[1], p[2], p[3]).premultiply()))
        .collect();
    pixmap_from_vec(data, img.width(), img.height())
}

/// Demultiply a pixmap back into a straight-alpha RGBA image.
#[must_use]
pub fn rgba_from_pixmap(pixmap: &Pixmap) -> RgbaImage {
    RgbaImage::from_fn(pixmap.width(), pixmap.height(), |x, y| {
        pixmap.pixel(x, y).map_or(Rgba([0, 0, 0, 0]), |p| {
            let c = p.demultiply();
            Rgba([c.red(), c.green(), c.blue(), c.alpha()])
        })
    })
}

/// Turn a coverage mask into a sprite of `color`, each pixel's alpha being
/// the colour's alpha scaled by its coverage.
///
/// # Errors
///
/// Returns [`DrawError::Surface`] for an empty mask.
pub fn tinted(mask: &GrayImage, color: Rgba<u8>) -> Result<Pixmap, DrawError> {
    let data = mask
        .pixels()
        .flat_map(|cov| {
            let alpha = scale_u8(color[3], cov[0]);
            premultiplied_bytes(ColorU8::from_rgba(color[0], color[1], color[2], alpha).premultiply())
        })
        .collect();
    pixmap_from_vec(data, mask.width(), mask.height())
}

/// The alpha channel of a pixmap as a coverage mask.
#[must_use]
pub fn alpha_channel(pixmap: &Pixmap) -> GrayImage {
    GrayImage::from_fn(pixmap.width(), pixmap.height(), |x, y| {
        Luma([pixmap.pixel(x, y).map_or(0, |p| p.alpha())])
    })
}

fn pixmap_from_vec(data: Vec<u8>, width: u32, height: u32) -> Result<Pixmap, DrawError> {
    IntSize::from_wh(width, height)
        .and_then(|size| Pixmap::from_vec(data, size))
        .ok_or(DrawError::Surface { width, height })
}

fn premultiplied_bytes(c: PremultipliedColorU8) -> [u8; 4] {
    [c.red(), c.green(), c.blue(), c.alpha()]
}

/// `a * b / 255`, rounded.
fn scale_u8(a: u8, b: u8) -> u8 {
    let v = u16::from(a) * u16::from(b) + 128;
    #[allow(clippy::cast_possible_truncation)]
    {
        ((v + (v >> 8)) >> 8) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_pixels_survive_the_round_trip() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([200, 100, 50, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(2, 0, Rgba([255, 255, 255, 255]));
        let pixmap = pixmap_from_rgba(&img).unwrap();
        assert_eq!(rgba_from_pixmap(&pixmap), img);
    }

    #[test]
    fn transparent_pixels_lose_their_colour() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 0]));
        let pixmap = pixmap_from_rgba(&img).unwrap();
        assert!(rgba_from_pixmap(&pixmap).pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn tint_scales_alpha_by_coverage() {
        let mut mask = GrayImage::new(3, 1);
        mask.put_pixel(1, 0, Luma([255]));
        mask.put_pixel(2, 0, Luma([128]));
        let sprite = tinted(&mask, Rgba([255, 0, 0, 255])).unwrap();
        let alpha = alpha_channel(&sprite);
        assert_eq!(alpha.as_raw(), &vec![0, 255, 128]);

        let straight = rgba_from_pixmap(&sprite);
        assert_eq!(straight.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(straight.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn tint_respects_colour_alpha() {
        let mask = GrayImage::from_pixel(1, 1, Luma([255]));
        let sprite = tinted(&mask, Rgba([0, 0, 0, 102])).unwrap();
        assert_eq!(alpha_channel(&sprite).get_pixel(0, 0), &Luma([102]));
    }

    #[test]
    fn empty_buffers_cannot_become_pixmaps() {
        assert_eq!(
            pixmap_from_rgba(&RgbaImage::new(0, 4)).unwrap_err(),
            DrawError::Surface { width: 0, height: 4 }
        );
        assert!(tinted(&GrayImage::new(5, 0), Rgba([0, 0, 0, 255])).is_err());
    }

    #[test]
    fn byte_scaling_rounds() {
        assert_eq!(scale_u8(255, 255), 255);
        assert_eq!(scale_u8(255, 0), 0);
        assert_eq!(scale_u8(255, 128), 128);
        assert_eq!(scale_u8(128, 128), 64);
    }
}
