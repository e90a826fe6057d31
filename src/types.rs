use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ScribeError};

/// User unit chosen at construction; fixes the scale factor `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    Point,
    #[default]
    Millimeter,
    Centimeter,
    Inch,
}

impl Unit {
    /// Points per user unit.
    pub fn scale_factor(self) -> f64 {
        match self {
            Unit::Point => 1.0,
            Unit::Millimeter => 72.0 / 25.4,
            Unit::Centimeter => 72.0 / 2.54,
            Unit::Inch => 72.0,
        }
    }
}

impl FromStr for Unit {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pt" => Ok(Unit::Point),
            "mm" => Ok(Unit::Millimeter),
            "cm" => Ok(Unit::Centimeter),
            "in" => Ok(Unit::Inch),
            other => Err(ScribeError::config(format!("incorrect unit: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "p" | "portrait" => Ok(Orientation::Portrait),
            "l" | "landscape" => Ok(Orientation::Landscape),
            _ => Err(ScribeError::config(format!("incorrect orientation: {s}"))),
        }
    }
}

/// Width and height of a page, in whatever unit the caller states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub(crate) fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// Page format: one of the standard sizes, or a custom size in user units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Custom(Size),
}

impl PageFormat {
    /// Size in points for the standard formats.
    fn points(self) -> Option<Size> {
        match self {
            PageFormat::A3 => Some(Size::new(841.89, 1190.55)),
            PageFormat::A4 => Some(Size::new(595.28, 841.89)),
            PageFormat::A5 => Some(Size::new(420.94, 595.28)),
            PageFormat::Letter => Some(Size::new(612.0, 792.0)),
            PageFormat::Legal => Some(Size::new(612.0, 1008.0)),
            PageFormat::Custom(_) => None,
        }
    }

    /// Portrait size in user units for scale factor `k`.
    pub fn user_size(self, k: f64) -> Size {
        match self {
            PageFormat::Custom(size) if size.width > size.height => size.swapped(),
            PageFormat::Custom(size) => size,
            named => {
                let pt = named.points().unwrap_or(Size::new(595.28, 841.89));
                Size::new(pt.width / k, pt.height / k)
            }
        }
    }
}

impl FromStr for PageFormat {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "a3" => Ok(PageFormat::A3),
            "a4" => Ok(PageFormat::A4),
            "a5" => Ok(PageFormat::A5),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            _ => Err(ScribeError::config(format!("unknown page size: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Margins {
    pub fn all(value: f64) -> Self {
        Self {
            left: value,
            top: value,
            right: value,
            bottom: value,
        }
    }
}

/// Draw, fill or text color as 0-255 components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Gray(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    pub const BLACK: Color = Color::Gray(0);

    /// Color operator; `stroke` selects `G`/`RG` over `g`/`rg`.
    pub(crate) fn operator(self, stroke: bool) -> String {
        let (gray, rgb) = if stroke { ("G", "RG") } else { ("g", "rg") };
        match self {
            Color::Gray(v) => format!("{:.3} {}", v as f64 / 255.0, gray),
            Color::Rgb(0, 0, 0) => format!("0.000 {gray}"),
            Color::Rgb(r, g, b) => format!(
                "{:.3} {:.3} {:.3} {}",
                r as f64 / 255.0,
                g as f64 / 255.0,
                b as f64 / 255.0,
                rgb
            ),
        }
    }
}

/// Initial zoom of the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ZoomMode {
    FullPage,
    FullWidth,
    Real,
    #[default]
    Default,
    Percent(f64),
}

impl FromStr for ZoomMode {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fullpage" => Ok(ZoomMode::FullPage),
            "fullwidth" => Ok(ZoomMode::FullWidth),
            "real" => Ok(ZoomMode::Real),
            "default" => Ok(ZoomMode::Default),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(ZoomMode::Percent)
                .ok_or_else(|| ScribeError::config(format!("incorrect zoom display mode: {s}"))),
        }
    }
}

/// Page layout of the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayoutMode {
    Single,
    Continuous,
    Two,
    #[default]
    Default,
}

impl FromStr for LayoutMode {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(LayoutMode::Single),
            "continuous" => Ok(LayoutMode::Continuous),
            "two" => Ok(LayoutMode::Two),
            "default" => Ok(LayoutMode::Default),
            _ => Err(ScribeError::config(format!("incorrect layout display mode: {s}"))),
        }
    }
}

/// Cell border: none, the full frame, or any subset of the four sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Border {
    #[default]
    None,
    Frame,
    Sides {
        left: bool,
        top: bool,
        right: bool,
        bottom: bool,
    },
}

impl Border {
    pub fn sides(letters: &str) -> Self {
        Border::Sides {
            left: letters.contains('L'),
            top: letters.contains('T'),
            right: letters.contains('R'),
            bottom: letters.contains('B'),
        }
    }

    pub(crate) fn without_top(self) -> Self {
        match self {
            Border::Sides {
                left,
                right,
                bottom,
                ..
            } => Border::Sides {
                left,
                top: false,
                right,
                bottom,
            },
            other => other,
        }
    }

    pub(crate) fn without_bottom(self) -> Self {
        match self {
            Border::Sides {
                left, top, right, ..
            } => Border::Sides {
                left,
                top,
                right,
                bottom: false,
            },
            other => other,
        }
    }
}

impl FromStr for Border {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "0" => Ok(Border::None),
            "1" => Ok(Border::Frame),
            sides if sides.chars().all(|c| matches!(c, 'L' | 'T' | 'R' | 'B')) => {
                Ok(Border::sides(sides))
            }
            _ => Err(ScribeError::config(format!("incorrect border: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Right,
    Center,
    Justify,
}

/// Where the cursor goes after a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineBreak {
    #[default]
    Right,
    NextLine,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RectStyle {
    #[default]
    Draw,
    Fill,
    DrawFill,
}

impl RectStyle {
    pub(crate) fn operator(self) -> &'static str {
        match self {
            RectStyle::Draw => "S",
            RectStyle::Fill => "f",
            RectStyle::DrawFill => "B",
        }
    }
}

/// Handle returned by `Document::add_link`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

/// Target of a clickable area.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    Internal(LinkId),
    Uri(String),
}

impl From<LinkId> for LinkTarget {
    fn from(value: LinkId) -> Self {
        LinkTarget::Internal(value)
    }
}

impl From<&str> for LinkTarget {
    fn from(value: &str) -> Self {
        LinkTarget::Uri(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub const V1_3: PdfVersion = PdfVersion { major: 1, minor: 3 };
    pub const V1_4: PdfVersion = PdfVersion { major: 1, minor: 4 };
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_factors() {
        assert_eq!(Unit::Point.scale_factor(), 1.0);
        assert!((Unit::Millimeter.scale_factor() - 2.834645669).abs() < 1e-6);
        assert!((Unit::Centimeter.scale_factor() - 28.34645669).abs() < 1e-6);
        assert_eq!(Unit::Inch.scale_factor(), 72.0);
        assert!("furlong".parse::<Unit>().is_err());
    }

    #[test]
    fn page_formats_parse_case_insensitively() {
        assert_eq!("Letter".parse::<PageFormat>().unwrap(), PageFormat::Letter);
        assert_eq!("A3".parse::<PageFormat>().unwrap(), PageFormat::A3);
        assert!(matches!(
            "b5".parse::<PageFormat>(),
            Err(ScribeError::Configuration(_))
        ));
    }

    #[test]
    fn custom_formats_are_normalized_to_portrait() {
        let size = PageFormat::Custom(Size::new(300.0, 100.0)).user_size(2.0);
        assert_eq!(size, Size::new(100.0, 300.0));
        let a4 = PageFormat::A4.user_size(1.0);
        assert_eq!(a4, Size::new(595.28, 841.89));
    }

    #[test]
    fn color_operators() {
        assert_eq!(Color::Gray(0).operator(true), "0.000 G");
        assert_eq!(Color::Rgb(0, 0, 0).operator(false), "0.000 g");
        assert_eq!(Color::Gray(128).operator(false), "0.502 g");
        assert_eq!(
            Color::Rgb(128, 128, 128).operator(false),
            "0.502 0.502 0.502 rg"
        );
        assert_eq!(Color::Rgb(255, 0, 0).operator(false), "1.000 0.000 0.000 rg");
        assert_eq!(Color::Rgb(0, 0, 255).operator(true), "0.000 0.000 1.000 RG");
    }

    #[test]
    fn display_modes_parse() {
        assert_eq!("real".parse::<ZoomMode>().unwrap(), ZoomMode::Real);
        assert_eq!("150".parse::<ZoomMode>().unwrap(), ZoomMode::Percent(150.0));
        assert!("huge".parse::<ZoomMode>().is_err());
        assert_eq!("two".parse::<LayoutMode>().unwrap(), LayoutMode::Two);
        assert!("three".parse::<LayoutMode>().is_err());
    }

    #[test]
    fn borders_parse() {
        assert_eq!("1".parse::<Border>().unwrap(), Border::Frame);
        assert_eq!(
            "LB".parse::<Border>().unwrap(),
            Border::Sides {
                left: true,
                top: false,
                right: false,
                bottom: true
            }
        );
        assert!("X".parse::<Border>().is_err());
    }

    #[test]
    fn versions_order() {
        assert!(PdfVersion::V1_3 < PdfVersion::V1_4);
        assert_eq!(PdfVersion::V1_4.to_string(), "1.4");
    }
}
