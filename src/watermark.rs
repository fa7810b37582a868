//! The watermark description consumed by the compositor.
//!
//! A [`WatermarkSpec`] is a plain value: editors build a new one (or clone
//! and change a field) and hand it to the compositor whole. The compositor
//! never mutates it.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;

use image::Rgba;

use crate::error::{Error, Result};
use crate::loader::Bitmap;

/// Accepted position range for both axes, in percent of the canvas.
pub const POSITION_RANGE: RangeInclusive<f32> = 0.0..=100.0;
/// Accepted rotation range, in degrees.
pub const ROTATION_RANGE: RangeInclusive<f32> = -180.0..=180.0;
/// Accepted opacity range.
pub const OPACITY_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Accepted text size range, in pixels.
pub const FONT_SIZE_RANGE: RangeInclusive<f32> = 8.0..=200.0;
/// Accepted image watermark size range, in pixels.
pub const IMAGE_SIZE_RANGE: RangeInclusive<u32> = 20..=500;
/// Accepted pattern cell size range, in pixels.
pub const PATTERN_SPACING_RANGE: RangeInclusive<u32> = 50..=300;
/// Accepted stroke width range, in pixels.
pub const STROKE_WIDTH_RANGE: RangeInclusive<f32> = 0.0..=20.0;
/// Accepted shadow blur range, in pixels.
pub const SHADOW_BLUR_RANGE: RangeInclusive<f32> = 0.0..=50.0;
/// Accepted shadow offset range on each axis, in pixels.
pub const SHADOW_OFFSET_RANGE: RangeInclusive<f32> = -50.0..=50.0;

/// Which field set of a [`WatermarkSpec`] is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkKind {
    /// Draw [`WatermarkSpec::text`].
    #[default]
    Text,
    /// Draw [`WatermarkSpec::image`].
    Image,
}

/// Anchor point and rotation of the watermark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Horizontal anchor, percent of canvas width.
    pub x: f32,
    /// Vertical anchor, percent of canvas height.
    pub y: f32,
    /// Clockwise rotation around the anchor, in degrees.
    pub rotation: f32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            x: 95.0,
            y: 90.0,
            rotation: 0.0,
        }
    }
}

/// Single placement or a repeating grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tiling {
    /// One instance at the geometry anchor.
    #[default]
    Single,
    /// Instances tiled over the whole canvas on a square grid.
    Pattern {
        /// Grid cell size in pixels.
        spacing: u32,
    },
}

/// Supported font families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontFamily {
    /// Arial, sans-serif.
    #[default]
    Arial,
    /// Georgia, serif.
    Georgia,
    /// Times New Roman, serif.
    TimesNewRoman,
    /// Courier New, monospace.
    CourierNew,
    /// Verdana, sans-serif.
    Verdana,
    /// Helvetica, sans-serif.
    Helvetica,
    /// Impact, sans-serif.
    Impact,
}

/// Generic class a family falls back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericFamily {
    /// Proportional sans-serif faces.
    SansSerif,
    /// Proportional serif faces.
    Serif,
    /// Fixed-width faces.
    Monospace,
}

impl FontFamily {
    /// Every family in menu order.
    pub const ALL: [Self; 7] = [
        Self::Arial,
        Self::Georgia,
        Self::TimesNewRoman,
        Self::CourierNew,
        Self::Verdana,
        Self::Helvetica,
        Self::Impact,
    ];

    /// Display name of the family.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Arial => "Arial",
            Self::Georgia => "Georgia",
            Self::TimesNewRoman => "Times New Roman",
            Self::CourierNew => "Courier New",
            Self::Verdana => "Verdana",
            Self::Helvetica => "Helvetica",
            Self::Impact => "Impact",
        }
    }

    /// The generic class used when no face of this family is available.
    #[must_use]
    pub fn generic(self) -> GenericFamily {
        match self {
            Self::Georgia | Self::TimesNewRoman => GenericFamily::Serif,
            Self::CourierNew => GenericFamily::Monospace,
            Self::Arial | Self::Verdana | Self::Helvetica | Self::Impact => {
                GenericFamily::SansSerif
            }
        }
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FontFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|family| family.name().replace(' ', "").to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown font family `{s}`"))
    }
}

/// Font weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontWeight {
    /// Regular weight.
    Normal,
    /// Bold weight.
    #[default]
    Bold,
    /// Lighter than regular.
    Lighter,
}

impl FromStr for FontWeight {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "regular" => Ok(Self::Normal),
            "bold" => Ok(Self::Bold),
            "lighter" | "light" => Ok(Self::Lighter),
            _ => Err(format!("unknown font weight `{s}`")),
        }
    }
}

/// Horizontal text alignment relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    /// Text starts at the anchor.
    Left,
    /// Text is centred on the anchor.
    Center,
    /// Text ends at the anchor.
    #[default]
    Right,
}

impl FromStr for TextAlign {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" | "centre" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            _ => Err(format!("unknown alignment `{s}`")),
        }
    }
}

/// Outline drawn beneath the text fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    /// Outline width in pixels; `0` disables the outline.
    pub width: f32,
    /// Outline colour.
    pub color: Rgba<u8>,
}

/// Drop shadow cast by the text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    /// Blur radius in pixels; `0` disables the shadow.
    pub blur: f32,
    /// Shadow colour.
    pub color: Rgba<u8>,
    /// Horizontal offset in pixels.
    pub offset_x: f32,
    /// Vertical offset in pixels.
    pub offset_y: f32,
}

/// Field set used when [`WatermarkKind::Text`] is selected.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    /// The string to draw.
    pub content: String,
    /// Font family.
    pub family: FontFamily,
    /// Font weight.
    pub weight: FontWeight,
    /// Font size in pixels.
    pub size: f32,
    /// Horizontal alignment around the anchor.
    pub align: TextAlign,
    /// Fill colour.
    pub color: Rgba<u8>,
    /// Optional outline.
    pub stroke: Option<Stroke>,
    /// Optional drop shadow.
    pub shadow: Option<Shadow>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            content: "Sample Watermark".to_string(),
            family: FontFamily::Arial,
            weight: FontWeight::Bold,
            size: 48.0,
            align: TextAlign::Right,
            color: Rgba([255, 255, 255, 255]),
            stroke: None,
            shadow: None,
        }
    }
}

/// Field set used when [`WatermarkKind::Image`] is selected.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageWatermark {
    /// The decoded logo, if one has loaded successfully.
    pub bitmap: Option<Arc<Bitmap>>,
    /// Edge length of the square the logo is stretched to, in pixels.
    pub size: u32,
}

impl Default for ImageWatermark {
    fn default() -> Self {
        Self {
            bitmap: None,
            size: 100,
        }
    }
}

/// Everything needed to draw one watermark pass.
///
/// Both field sets are always present; [`WatermarkSpec::kind`] selects which
/// one is drawn and the other is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    /// Which field set is drawn.
    pub kind: WatermarkKind,
    /// Anchor and rotation.
    pub geometry: Geometry,
    /// Opacity applied to the whole watermark, `0..=1`.
    pub opacity: f32,
    /// Single placement or pattern.
    pub tiling: Tiling,
    /// Text field set.
    pub text: TextStyle,
    /// Image field set.
    pub image: ImageWatermark,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            kind: WatermarkKind::Text,
            geometry: Geometry::default(),
            opacity: 0.7,
            tiling: Tiling::Single,
            text: TextStyle::default(),
            image: ImageWatermark::default(),
        }
    }
}

impl WatermarkSpec {
    /// A text watermark with default styling.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        let mut spec = Self::default();
        spec.text.content = content.into();
        spec
    }

    /// An image watermark with default geometry.
    #[must_use]
    pub fn image(bitmap: Arc<Bitmap>, size: u32) -> Self {
        Self {
            kind: WatermarkKind::Image,
            image: ImageWatermark {
                bitmap: Some(bitmap),
                size,
            },
            ..Self::default()
        }
    }

    /// Move the anchor to a preset and align text the way the preset implies.
    #[must_use]
    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        let (x, y) = anchor.position();
        self.geometry.x = x;
        self.geometry.y = y;
        self.text.align = anchor.text_align();
        self
    }

    /// Rotate by `degrees` relative to the current rotation, wrapping into
    /// `-180..=180`.
    #[must_use]
    pub fn rotated_by(mut self, degrees: f32) -> Self {
        let mut r = (self.geometry.rotation + degrees) % 360.0;
        if r > 180.0 {
            r -= 360.0;
        } else if r < -180.0 {
            r += 360.0;
        }
        self.geometry.rotation = r;
        self
    }

    /// Check every active field against its accepted range.
    ///
    /// The compositor does not require a validated spec (it clamps), but
    /// editors call this before accepting user input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpec`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check_range("position.x", self.geometry.x, &POSITION_RANGE)?;
        check_range("position.y", self.geometry.y, &POSITION_RANGE)?;
        check_range("rotation", self.geometry.rotation, &ROTATION_RANGE)?;
        check_range("opacity", self.opacity, &OPACITY_RANGE)?;

        if let Tiling::Pattern { spacing } = self.tiling {
            if !PATTERN_SPACING_RANGE.contains(&spacing) {
                return Err(out_of_range("pattern.spacing", spacing, &PATTERN_SPACING_RANGE));
            }
        }

        match self.kind {
            WatermarkKind::Text => {
                let text = &self.text;
                check_range("text.size", text.size, &FONT_SIZE_RANGE)?;
                if let Some(stroke) = &text.stroke {
                    check_range("text.stroke.width", stroke.width, &STROKE_WIDTH_RANGE)?;
                }
                if let Some(shadow) = &text.shadow {
                    check_range("text.shadow.blur", shadow.blur, &SHADOW_BLUR_RANGE)?;
                    check_range("text.shadow.offset_x", shadow.offset_x, &SHADOW_OFFSET_RANGE)?;
                    check_range("text.shadow.offset_y", shadow.offset_y, &SHADOW_OFFSET_RANGE)?;
                }
            }
            WatermarkKind::Image => {
                if !IMAGE_SIZE_RANGE.contains(&self.image.size) {
                    return Err(out_of_range("image.size", self.image.size, &IMAGE_SIZE_RANGE));
                }
            }
        }

        Ok(())
    }
}

fn check_range(field: &'static str, value: f32, range: &RangeInclusive<f32>) -> Result<()> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(out_of_range(field, value, range))
    }
}

fn out_of_range<T: fmt::Display>(
    field: &'static str,
    value: T,
    range: &RangeInclusive<T>,
) -> Error {
    Error::InvalidSpec {
        field,
        reason: format!(
            "{value} is outside {}..={}",
            range.start(),
            range.end()
        ),
    }
}

/// The nine quick-placement presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Top-left corner.
    TopLeft,
    /// Top edge, centred.
    TopCenter,
    /// Top-right corner.
    TopRight,
    /// Left edge, centred.
    CenterLeft,
    /// Canvas centre.
    Center,
    /// Right edge, centred.
    CenterRight,
    /// Bottom-left corner.
    BottomLeft,
    /// Bottom edge, centred.
    BottomCenter,
    /// Bottom-right corner.
    BottomRight,
}

impl Anchor {
    /// Position in percent of the canvas.
    #[must_use]
    pub fn position(self) -> (f32, f32) {
        match self {
            Self::TopLeft => (5.0, 10.0),
            Self::TopCenter => (50.0, 10.0),
            Self::TopRight => (95.0, 10.0),
            Self::CenterLeft => (5.0, 50.0),
            Self::Center => (50.0, 50.0),
            Self::CenterRight => (95.0, 50.0),
            Self::BottomLeft => (5.0, 90.0),
            Self::BottomCenter => (50.0, 90.0),
            Self::BottomRight => (95.0, 90.0),
        }
    }

    /// Text alignment that keeps the text on the canvas at this anchor.
    #[must_use]
    pub fn text_align(self) -> TextAlign {
        match self {
            Self::TopRight | Self::CenterRight | Self::BottomRight => TextAlign::Right,
            Self::TopCenter | Self::Center | Self::BottomCenter => TextAlign::Center,
            Self::TopLeft | Self::CenterLeft | Self::BottomLeft => TextAlign::Left,
        }
    }
}

impl FromStr for Anchor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" => Ok(Self::TopLeft),
            "top-center" => Ok(Self::TopCenter),
            "top-right" => Ok(Self::TopRight),
            "center-left" => Ok(Self::CenterLeft),
            "center" => Ok(Self::Center),
            "center-right" => Ok(Self::CenterRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-center" => Ok(Self::BottomCenter),
            "bottom-right" => Ok(Self::BottomRight),
            _ => Err(format!("unknown anchor `{s}`")),
        }
    }
}
