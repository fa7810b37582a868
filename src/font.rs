//! Font faces and text rasterisation.
//!
//! A [`FontBook`] holds TrueType faces rasterised with `fontdue`. Families
//! without a registered face fall back to a sibling of the same generic
//! class, then to a built-in 8x8 bitmap face, so text always renders and
//! renders identically on every machine when no faces are installed.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use font8x8::UnicodeFonts;
use image::{GrayImage, Luma};
use tracing::{debug, warn};

use crate::error::{DrawError, Error, Result};
use crate::watermark::{FontFamily, FontWeight, TextAlign};

/// Largest text mask edge the rasteriser will allocate, in pixels.
const MAX_MASK_EDGE: u64 = 32_768;
/// Largest text mask area the rasteriser will allocate, in pixels.
const MAX_MASK_AREA: u64 = 64 * 1024 * 1024;

/// Refuse a `width x height` coverage buffer beyond the rasteriser limits.
pub(crate) fn check_mask_size(width: u64, height: u64) -> std::result::Result<(), DrawError> {
    if width > MAX_MASK_EDGE || height > MAX_MASK_EDGE || width.saturating_mul(height) > MAX_MASK_AREA {
        return Err(DrawError::MaskTooLarge { width, height });
    }
    Ok(())
}

/// Built-in face: share of the em height above the baseline.
const BUILTIN_ASCENT: f32 = 0.75;
/// Built-in face: glyph cell width as a share of the em height.
const BUILTIN_ADVANCE: f32 = 0.75;
/// Supersampling grid per axis when rasterising built-in glyphs.
const BUILTIN_SUPERSAMPLE: u32 = 4;

/// File names recognised by [`FontBook::load_dir`], lower-cased.
const KNOWN_FILES: &[(FontFamily, FontWeight, &[&str])] = &[
    (FontFamily::Arial, FontWeight::Normal, &["arial.ttf", "liberationsans-regular.ttf"]),
    (FontFamily::Arial, FontWeight::Bold, &["arialbd.ttf", "arial bold.ttf", "liberationsans-bold.ttf"]),
    (FontFamily::Georgia, FontWeight::Normal, &["georgia.ttf"]),
    (FontFamily::Georgia, FontWeight::Bold, &["georgiab.ttf", "georgia bold.ttf"]),
    (FontFamily::TimesNewRoman, FontWeight::Normal, &["times.ttf", "times new roman.ttf", "liberationserif-regular.ttf"]),
    (FontFamily::TimesNewRoman, FontWeight::Bold, &["timesbd.ttf", "times new roman bold.ttf", "liberationserif-bold.ttf"]),
    (FontFamily::CourierNew, FontWeight::Normal, &["cour.ttf", "courier new.ttf", "liberationmono-regular.ttf"]),
    (FontFamily::CourierNew, FontWeight::Bold, &["courbd.ttf", "courier new bold.ttf", "liberationmono-bold.ttf"]),
    (FontFamily::Verdana, FontWeight::Normal, &["verdana.ttf"]),
    (FontFamily::Verdana, FontWeight::Bold, &["verdanab.ttf", "verdana bold.ttf"]),
    (FontFamily::Helvetica, FontWeight::Normal, &["helvetica.ttf"]),
    (FontFamily::Helvetica, FontWeight::Bold, &["helvetica-bold.ttf", "helvetica bold.ttf"]),
    (FontFamily::Impact, FontWeight::Normal, &["impact.ttf"]),
];

/// Vertical placement of the text relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextBaseline {
    /// The top of the em box sits on the anchor.
    Top,
    /// The em box is centred on the anchor.
    Middle,
    /// The bottom of the em box sits on the anchor.
    Bottom,
}

/// Font selection for one text draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontRequest {
    /// Requested family.
    pub family: FontFamily,
    /// Requested weight.
    pub weight: FontWeight,
    /// Size in pixels.
    pub size: f32,
}

/// Rasterised text as an 8-bit coverage mask positioned in local
/// (pre-transform) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMask {
    coverage: GrayImage,
    origin_x: f32,
    origin_y: f32,
}

impl TextMask {
    /// Coverage values, `255` meaning fully inside a glyph.
    #[must_use]
    pub fn coverage(&self) -> &GrayImage {
        &self.coverage
    }

    /// Local coordinates of the mask's top-left corner relative to the
    /// text anchor.
    #[must_use]
    pub fn origin(&self) -> (f32, f32) {
        (self.origin_x, self.origin_y)
    }

    /// Grow the mask by a disk of `radius` pixels, producing the region an
    /// outline of width `2 * radius` covers outside the glyphs.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::NonFinite`] for a NaN or infinite radius and
    /// [`DrawError::MaskTooLarge`] when the grown mask would exceed the
    /// rasteriser limits.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn dilated(&self, radius: f32) -> std::result::Result<Self, DrawError> {
        if !radius.is_finite() {
            return Err(DrawError::NonFinite("dilation radius"));
        }
        if radius <= 0.0 {
            return Ok(self.clone());
        }

        let (sw, sh) = self.coverage.dimensions();
        let reach_f = (radius + 1.0).ceil();
        let grown = |edge: u32| (f64::from(edge) + 2.0 * f64::from(reach_f)) as u64;
        check_mask_size(grown(sw), grown(sh))?;
        let kernel_edge = (2.0 * f64::from(reach_f) + 1.0) as u64;
        check_mask_size(kernel_edge, kernel_edge)?;

        let reach = reach_f as i64;
        let mut kernel = Vec::new();
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let d = ((dx * dx + dy * dy) as f32).sqrt();
                let w = (radius + 1.0 - d).clamp(0.0, 1.0);
                if w > 0.0 {
                    kernel.push((dx, dy, w));
                }
            }
        }

        let pad = reach as u32;
        let (src_w, src_h) = (i64::from(sw), i64::from(sh));
        let mut out = GrayImage::new(sw + 2 * pad, sh + 2 * pad);
        for (x, y, px) in out.enumerate_pixels_mut() {
            let mut best = 0.0_f32;
            for &(dx, dy, w) in &kernel {
                let sx = i64::from(x) - reach + dx;
                let sy = i64::from(y) - reach + dy;
                if sx < 0 || sy < 0 || sx >= src_w || sy >= src_h {
                    continue;
                }
                let v = f32::from(self.coverage.get_pixel(sx as u32, sy as u32)[0]) * w;
                best = best.max(v);
            }
            *px = Luma([best.round().min(255.0) as u8]);
        }

        let shift = reach as f32;
        Ok(Self {
            coverage: out,
            origin_x: self.origin_x - shift,
            origin_y: self.origin_y - shift,
        })
    }
}

/// One rasterised glyph, positioned relative to the pen on the baseline
/// (y grows downwards).
struct Glyph {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
    coverage: Vec<u8>,
    advance: f32,
}

enum Face<'a> {
    TrueType(&'a fontdue::Font),
    Builtin,
}

impl Face<'_> {
    /// `(ascent, descent)` in pixels, descent negative.
    fn line_metrics(&self, size: f32) -> std::result::Result<(f32, f32), DrawError> {
        match self {
            Face::TrueType(font) => font
                .horizontal_line_metrics(size)
                .map(|m| (m.ascent, m.descent))
                .ok_or_else(|| DrawError::Font("face has no horizontal metrics".to_string())),
            Face::Builtin => Ok((size * BUILTIN_ASCENT, -size * (1.0 - BUILTIN_ASCENT))),
        }
    }

    fn kern(&self, prev: char, ch: char, size: f32) -> f32 {
        match self {
            Face::TrueType(font) => font.horizontal_kern(prev, ch, size).unwrap_or(0.0),
            Face::Builtin => 0.0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn advance(&self, ch: char, size: f32) -> f32 {
        match self {
            Face::TrueType(font) => font.metrics(ch, size).advance_width,
            Face::Builtin => builtin_cell(size).0 as f32,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn glyph(&self, ch: char, size: f32) -> Glyph {
        match self {
            Face::TrueType(font) => {
                let (m, coverage) = font.rasterize(ch, size);
                Glyph {
                    left: m.xmin,
                    top: -(m.ymin + m.height as i32),
                    width: m.width as u32,
                    height: m.height as u32,
                    coverage,
                    advance: m.advance_width,
                }
            }
            Face::Builtin => builtin_glyph(ch, size),
        }
    }
}

fn builtin_bits(ch: char) -> [u8; 8] {
    font8x8::BASIC_FONTS
        .get(ch)
        .or_else(|| font8x8::LATIN_FONTS.get(ch))
        .or_else(|| font8x8::GREEK_FONTS.get(ch))
        .or_else(|| font8x8::BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Built-in glyph cell `(width, height)` for a font size.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn builtin_cell(size: f32) -> (u32, u32) {
    (
        ((size * BUILTIN_ADVANCE).round() as u32).max(1),
        (size.round() as u32).max(1),
    )
}

/// Rasterise an 8x8 bitmap glyph scaled to `size` pixels of em height,
/// box-filtered over a supersampling grid.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
fn builtin_glyph(ch: char, size: f32) -> Glyph {
    let (width, height) = builtin_cell(size);
    let bits = builtin_bits(ch);
    let samples = BUILTIN_SUPERSAMPLE * BUILTIN_SUPERSAMPLE;

    let mut coverage = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let mut hits = 0u32;
            for sy in 0..BUILTIN_SUPERSAMPLE {
                for sx in 0..BUILTIN_SUPERSAMPLE {
                    let row = ((y * BUILTIN_SUPERSAMPLE + sy) * 8) / (height * BUILTIN_SUPERSAMPLE);
                    let col = ((x * BUILTIN_SUPERSAMPLE + sx) * 8) / (width * BUILTIN_SUPERSAMPLE);
                    if bits[row as usize] & (1 << col) != 0 {
                        hits += 1;
                    }
                }
            }
            coverage.push((hits * 255 / samples) as u8);
        }
    }

    Glyph {
        left: 0,
        top: -((height as f32 * BUILTIN_ASCENT).round() as i32),
        width,
        height,
        coverage,
        advance: width as f32,
    }
}

/// The registry of font faces available to text draws.
#[derive(Default)]
pub struct FontBook {
    faces: HashMap<(FontFamily, FontWeight), fontdue::Font>,
}

impl fmt::Debug for FontBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.faces.keys().collect();
        keys.sort_by_key(|(family, weight)| (family.name(), format!("{weight:?}")));
        f.debug_struct("FontBook").field("faces", &keys).finish()
    }
}

impl FontBook {
    /// A book with no TrueType faces; all text uses the built-in face.
    #[must_use]
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Register a TrueType/OpenType face from raw font bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Font`] if the bytes are not a parseable font.
    pub fn insert(&mut self, family: FontFamily, weight: FontWeight, bytes: &[u8]) -> Result<()> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| Error::Font(format!("{family} {weight:?}: {e}")))?;
        self.faces.insert((family, weight), font);
        Ok(())
    }

    /// Scan a directory for well-known font file names (`arial.ttf`,
    /// `LiberationSans-Bold.ttf`, ...) and register every face found.
    ///
    /// Files that match a known name but fail to parse are skipped with a
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be read.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut book = Self::default();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_lowercase();
            let Some((family, weight)) = KNOWN_FILES
                .iter()
                .find(|(_, _, names)| names.contains(&name.as_str()))
                .map(|&(family, weight, _)| (family, weight))
            else {
                continue;
            };
            if book.faces.contains_key(&(family, weight)) {
                continue;
            }

            let bytes = std::fs::read(entry.path())?;
            match book.insert(family, weight, &bytes) {
                Ok(()) => debug!(%family, ?weight, file = %name, "registered font face"),
                Err(e) => warn!(file = %name, error = %e, "skipping unreadable font"),
            }
        }
        Ok(book)
    }

    /// Whether a TrueType face is registered for exactly this family and weight.
    #[must_use]
    pub fn has_face(&self, family: FontFamily, weight: FontWeight) -> bool {
        self.faces.contains_key(&(family, weight))
    }

    /// Number of registered TrueType faces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    /// Whether no TrueType faces are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Pick a face for the request. The flag reports whether bold must be
    /// synthesised because only a regular face was found.
    fn resolve(&self, family: FontFamily, weight: FontWeight) -> (Face<'_>, bool) {
        let wanted = [weight, FontWeight::Normal];
        let families = std::iter::once(family).chain(
            FontFamily::ALL
                .into_iter()
                .filter(move |f| *f != family && f.generic() == family.generic()),
        );

        for candidate in families {
            for w in wanted {
                if let Some(font) = self.faces.get(&(candidate, w)) {
                    return (Face::TrueType(font), weight == FontWeight::Bold && w != FontWeight::Bold);
                }
            }
        }
        (Face::Builtin, weight == FontWeight::Bold)
    }

    /// Lay out a single line of text and rasterise it.
    ///
    /// Returns `Ok(None)` when the text has no visible glyphs.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError`] for non-finite sizes, faces without metrics, or
    /// masks beyond the rasteriser's size limit.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn layout(
        &self,
        text: &str,
        font: FontRequest,
        align: TextAlign,
        baseline: TextBaseline,
    ) -> std::result::Result<Option<TextMask>, DrawError> {
        if !font.size.is_finite() || font.size <= 0.0 {
            return Err(DrawError::NonFinite("font size"));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }

        let (face, synthetic_bold) = self.resolve(font.family, font.weight);
        let (ascent, descent) = face.line_metrics(font.size)?;
        let chars: Vec<char> = text.chars().filter(|c| !c.is_control()).collect();

        // Refuse oversized lines before rasterising any glyph.
        let estimate: f32 = chars.iter().map(|&ch| face.advance(ch, font.size)).sum();
        let line_height = (ascent - descent).ceil() as u64;
        if estimate > MAX_MASK_EDGE as f32 {
            return Err(DrawError::MaskTooLarge {
                width: estimate.ceil() as u64,
                height: line_height,
            });
        }

        let mut placed = Vec::with_capacity(chars.len());
        let mut pen = 0.0_f32;
        let mut prev = None;
        for &ch in &chars {
            if let Some(p) = prev {
                pen += face.kern(p, ch, font.size);
            }
            let glyph = face.glyph(ch, font.size);
            let x = pen.round() as i32 + glyph.left;
            pen += glyph.advance;
            prev = Some(ch);
            placed.push((x, glyph));
        }

        let mut min_x = 0.0_f32.min(pen);
        let mut max_x = pen.max(0.0);
        let mut min_y = -ascent;
        let mut max_y = -descent;
        for (x, g) in &placed {
            min_x = min_x.min(*x as f32);
            max_x = max_x.max((*x + g.width as i32) as f32);
            min_y = min_y.min(g.top as f32);
            max_y = max_y.max((g.top + g.height as i32) as f32);
        }

        let embolden = if synthetic_bold {
            ((font.size / 24.0).round() as u32).max(1)
        } else {
            0
        };

        let left = min_x.floor();
        let top = min_y.floor();
        let width = (max_x.ceil() - left) as u64 + u64::from(embolden);
        let height = (max_y.ceil() - top) as u64;
        check_mask_size(width, height)?;

        let mut coverage = GrayImage::new(width as u32, height as u32);
        let (shift_x, shift_y) = (left as i32, top as i32);
        for (x, g) in &placed {
            for gy in 0..g.height {
                for gx in 0..g.width {
                    let v = g.coverage[(gy * g.width + gx) as usize];
                    if v == 0 {
                        continue;
                    }
                    let mx = (x + gx as i32 - shift_x) as u32;
                    let my = (g.top + gy as i32 - shift_y) as u32;
                    let px = coverage.get_pixel_mut(mx, my);
                    px[0] = px[0].max(v);
                }
            }
        }

        if embolden > 0 {
            embolden_horizontally(&mut coverage, embolden);
        }

        let start_x = match align {
            TextAlign::Left => 0.0,
            TextAlign::Center => -pen / 2.0,
            TextAlign::Right => -pen,
        };
        let baseline_y = match baseline {
            TextBaseline::Top => ascent,
            TextBaseline::Middle => (ascent + descent) / 2.0,
            TextBaseline::Bottom => descent,
        };

        Ok(Some(TextMask {
            coverage,
            origin_x: start_x + left,
            origin_y: baseline_y + top,
        }))
    }
}

/// Smear coverage `amount` pixels to the right, thickening vertical stems.
fn embolden_horizontally(mask: &mut GrayImage, amount: u32) {
    let (w, h) = mask.dimensions();
    for y in 0..h {
        for x in (0..w).rev() {
            let from = x.saturating_sub(amount);
            let v = (from..=x).map(|sx| mask.get_pixel(sx, y)[0]).max().unwrap_or(0);
            mask.put_pixel(x, y, Luma([v]));
        }
    }
}
