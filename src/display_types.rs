//! Named, reusable visual primitives.
//!
//! A [`DisplayTypeSpec`] is what gets configured: shapes refer to colors and
//! fonts by id. Resolving a spec against already-registered display types gives
//! a self-contained [`DisplayType`] value, which actions copy into a frame's
//! render list as [`DisplayMeta`]. Nothing here draws; an external overlay
//! composer consumes the render list.

use colorsys::{Hsl, Rgb};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::{OdeError, Result},
    Point2D,
};

/// Channels are in the range [0,1]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RgbaColor {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl RgbaColor {
    pub fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        RgbaColor {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub fn from_hex(hex: &str, alpha: f64) -> Result<Self> {
        let rgb = Rgb::from_hex_str(hex)
            .map_err(|e| OdeError::invalid("hex color", format!("\"{hex}\": {e:?}")))?;
        let [r, g, b]: [u8; 3] = rgb.into();
        Ok(RgbaColor::from_bytes([r, g, b], alpha))
    }

    pub fn from_predefined(color: PredefinedColor, alpha: f64) -> Self {
        RgbaColor::from_bytes(color.rgb(), alpha)
    }

    fn from_bytes(rgb: [u8; 3], alpha: f64) -> Self {
        let [r, g, b] = rgb;
        RgbaColor::new(r as f64 / 255., g as f64 / 255., b as f64 / 255., alpha)
    }

    fn check(&self) -> Result<()> {
        let channels = [self.red, self.green, self.blue, self.alpha];
        if channels.iter().all(|c| (0. ..=1.).contains(c)) {
            Ok(())
        } else {
            Err(OdeError::invalid(
                "color",
                format!("channels must be within [0,1], got {channels:?}"),
            ))
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PredefinedColor {
    Black,
    Gray50,
    DarkRed,
    Red,
    Orange,
    Yellow,
    Green,
    Turquoise,
    Indigo,
    Purple,
    White,
    Gray25,
    Brown,
    Rose,
    Gold,
    LightYellow,
    Lime,
    LightTurquoise,
    BlueGray,
    Lavender,
}

impl PredefinedColor {
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            PredefinedColor::Black => [0, 0, 0],
            PredefinedColor::Gray50 => [127, 127, 127],
            PredefinedColor::DarkRed => [136, 0, 21],
            PredefinedColor::Red => [237, 28, 36],
            PredefinedColor::Orange => [255, 127, 39],
            PredefinedColor::Yellow => [255, 242, 0],
            PredefinedColor::Green => [34, 177, 76],
            PredefinedColor::Turquoise => [0, 162, 232],
            PredefinedColor::Indigo => [63, 72, 204],
            PredefinedColor::Purple => [163, 73, 164],
            PredefinedColor::White => [255, 255, 255],
            PredefinedColor::Gray25 => [195, 195, 195],
            PredefinedColor::Brown => [185, 122, 87],
            PredefinedColor::Rose => [255, 174, 201],
            PredefinedColor::Gold => [255, 201, 14],
            PredefinedColor::LightYellow => [239, 228, 176],
            PredefinedColor::Lime => [181, 230, 29],
            PredefinedColor::LightTurquoise => [153, 217, 234],
            PredefinedColor::BlueGray => [112, 146, 190],
            PredefinedColor::Lavender => [200, 191, 231],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ColorHue {
    Random,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
    Monochrome,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ColorLuminosity {
    Random,
    Bright,
    Light,
    Dark,
}

/// Pick a color from a seeded generator; the same seed always gives the same color.
pub fn random_color(hue: ColorHue, luminosity: ColorLuminosity, alpha: f64, seed: u64) -> RgbaColor {
    let mut rng = StdRng::seed_from_u64(seed);

    let (hue_min, hue_max) = match hue {
        ColorHue::Random | ColorHue::Monochrome => (0., 360.),
        ColorHue::Red => (-26., 18.),
        ColorHue::Orange => (19., 46.),
        ColorHue::Yellow => (47., 62.),
        ColorHue::Green => (63., 178.),
        ColorHue::Blue => (179., 257.),
        ColorHue::Purple => (258., 282.),
        ColorHue::Pink => (283., 334.),
    };
    let h: f64 = rng.gen_range(hue_min..=hue_max);
    let h = if h < 0. { h + 360. } else { h };

    let s: f64 = match hue {
        ColorHue::Monochrome => 0.,
        _ => match luminosity {
            ColorLuminosity::Bright => rng.gen_range(55.0..=100.0),
            ColorLuminosity::Dark => rng.gen_range(70.0..=100.0),
            ColorLuminosity::Light => rng.gen_range(20.0..=60.0),
            ColorLuminosity::Random => rng.gen_range(0.0..=100.0),
        },
    };
    let l: f64 = match luminosity {
        ColorLuminosity::Bright => rng.gen_range(45.0..=60.0),
        ColorLuminosity::Dark => rng.gen_range(15.0..=35.0),
        ColorLuminosity::Light => rng.gen_range(65.0..=85.0),
        ColorLuminosity::Random => rng.gen_range(10.0..=90.0),
    };

    let rgb: [u8; 3] = Rgb::from(&Hsl::new(h, s, l, None)).into();
    RgbaColor::from_bytes(rgb, alpha)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RgbaFont {
    pub name: String,
    pub size: u32,
    pub color: RgbaColor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RgbaText {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font: RgbaFont,
    pub bg_color: Option<RgbaColor>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RgbaLine {
    pub start: Point2D,
    pub end: Point2D,
    pub width: u32,
    pub color: RgbaColor,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ArrowHead {
    Start,
    End,
    Both,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RgbaArrow {
    pub start: Point2D,
    pub end: Point2D,
    pub width: u32,
    pub head: ArrowHead,
    pub color: RgbaColor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RgbaRectangle {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub border_width: u32,
    pub color: RgbaColor,
    pub bg_color: Option<RgbaColor>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RgbaCircle {
    pub center: Point2D,
    pub radius: f32,
    pub color: RgbaColor,
    pub bg_color: Option<RgbaColor>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RgbaPolygon {
    pub coordinates: Vec<Point2D>,
    pub border_width: u32,
    pub color: RgbaColor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RgbaMultiLine {
    pub coordinates: Vec<Point2D>,
    pub width: u32,
    pub color: RgbaColor,
}

/// A renderable primitive on a frame's render list
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DisplayMeta {
    Text(RgbaText),
    Line(RgbaLine),
    Arrow(RgbaArrow),
    Rectangle(RgbaRectangle),
    Circle(RgbaCircle),
    Polygon(RgbaPolygon),
    MultiLine(RgbaMultiLine),
}

/// A resolved, registered display type
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayType {
    Color(RgbaColor),
    Palette(Vec<RgbaColor>),
    Font(RgbaFont),
    Shape(DisplayMeta),
}

impl DisplayType {
    pub fn as_meta(&self) -> Option<&DisplayMeta> {
        match self {
            DisplayType::Shape(meta) => Some(meta),
            _ => None,
        }
    }

    /// Colors and palettes can both be used wherever a color is wanted;
    /// `index` selects a palette entry (wrapping).
    pub fn color_at(&self, index: usize) -> Option<RgbaColor> {
        match self {
            DisplayType::Color(c) => Some(*c),
            DisplayType::Palette(colors) if !colors.is_empty() => {
                Some(colors[index % colors.len()])
            }
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DisplayTypeSpec {
    CustomColor {
        red: f64,
        green: f64,
        blue: f64,
        alpha: f64,
    },
    HexColor {
        hex: String,
        alpha: f64,
    },
    PredefinedColor {
        color: PredefinedColor,
        alpha: f64,
    },
    RandomColor {
        hue: ColorHue,
        luminosity: ColorLuminosity,
        alpha: f64,
        seed: u64,
    },
    ColorPalette {
        colors: Vec<String>,
    },
    Font {
        font: String,
        size: u32,
        color: String,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        font: String,
        bg_color: Option<String>,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: u32,
        color: String,
    },
    Arrow {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: u32,
        head: ArrowHead,
        color: String,
    },
    Rectangle {
        left: f32,
        top: f32,
        width: f32,
        height: f32,
        border_width: u32,
        color: String,
        bg_color: Option<String>,
    },
    Circle {
        x: f32,
        y: f32,
        radius: f32,
        color: String,
        bg_color: Option<String>,
    },
    Polygon {
        coordinates: Vec<Point2D>,
        border_width: u32,
        color: String,
    },
    MultiLine {
        coordinates: Vec<Point2D>,
        width: u32,
        color: String,
    },
}

impl DisplayTypeSpec {
    /// Build the display type value, looking up any referenced colors and
    /// fonts by id.
    pub fn resolve<'a, F>(&self, lookup: F) -> Result<DisplayType>
    where
        F: Fn(&str) -> Option<&'a DisplayType>,
    {
        let color = |id: &str| -> Result<RgbaColor> {
            lookup(id)
                .ok_or_else(|| OdeError::unknown("color", id))?
                .color_at(0)
                .ok_or_else(|| OdeError::invalid("color reference", format!("\"{id}\" is not a color")))
        };
        let optional_color = |id: &Option<String>| -> Result<Option<RgbaColor>> {
            id.as_deref().map(color).transpose()
        };

        let resolved = match self {
            DisplayTypeSpec::CustomColor {
                red,
                green,
                blue,
                alpha,
            } => {
                let c = RgbaColor::new(*red, *green, *blue, *alpha);
                c.check()?;
                DisplayType::Color(c)
            }
            DisplayTypeSpec::HexColor { hex, alpha } => {
                let c = RgbaColor::from_hex(hex, *alpha)?;
                c.check()?;
                DisplayType::Color(c)
            }
            DisplayTypeSpec::PredefinedColor { color, alpha } => {
                let c = RgbaColor::from_predefined(*color, *alpha);
                c.check()?;
                DisplayType::Color(c)
            }
            DisplayTypeSpec::RandomColor {
                hue,
                luminosity,
                alpha,
                seed,
            } => {
                let c = random_color(*hue, *luminosity, *alpha, *seed);
                c.check()?;
                DisplayType::Color(c)
            }
            DisplayTypeSpec::ColorPalette { colors } => {
                if colors.is_empty() {
                    return Err(OdeError::invalid("color palette", "no colors given"));
                }
                DisplayType::Palette(
                    colors
                        .iter()
                        .map(|id| color(id))
                        .collect::<Result<Vec<RgbaColor>>>()?,
                )
            }
            DisplayTypeSpec::Font { font, size, color: c } => DisplayType::Font(RgbaFont {
                name: font.clone(),
                size: *size,
                color: color(c)?,
            }),
            DisplayTypeSpec::Text {
                text,
                x,
                y,
                font,
                bg_color,
            } => DisplayType::Shape(DisplayMeta::Text(RgbaText {
                text: text.clone(),
                x: *x,
                y: *y,
                font: resolve_font(&lookup, font)?,
                bg_color: optional_color(bg_color)?,
            })),
            DisplayTypeSpec::Line {
                x1,
                y1,
                x2,
                y2,
                width,
                color: c,
            } => DisplayType::Shape(DisplayMeta::Line(RgbaLine {
                start: (*x1, *y1),
                end: (*x2, *y2),
                width: *width,
                color: color(c)?,
            })),
            DisplayTypeSpec::Arrow {
                x1,
                y1,
                x2,
                y2,
                width,
                head,
                color: c,
            } => DisplayType::Shape(DisplayMeta::Arrow(RgbaArrow {
                start: (*x1, *y1),
                end: (*x2, *y2),
                width: *width,
                head: *head,
                color: color(c)?,
            })),
            DisplayTypeSpec::Rectangle {
                left,
                top,
                width,
                height,
                border_width,
                color: c,
                bg_color,
            } => DisplayType::Shape(DisplayMeta::Rectangle(RgbaRectangle {
                left: *left,
                top: *top,
                width: *width,
                height: *height,
                border_width: *border_width,
                color: color(c)?,
                bg_color: optional_color(bg_color)?,
            })),
            DisplayTypeSpec::Circle {
                x,
                y,
                radius,
                color: c,
                bg_color,
            } => DisplayType::Shape(DisplayMeta::Circle(RgbaCircle {
                center: (*x, *y),
                radius: *radius,
                color: color(c)?,
                bg_color: optional_color(bg_color)?,
            })),
            DisplayTypeSpec::Polygon {
                coordinates,
                border_width,
                color: c,
            } => {
                if coordinates.len() < 3 {
                    return Err(OdeError::invalid(
                        "polygon",
                        format!("needs at least 3 coordinates, got {}", coordinates.len()),
                    ));
                }
                DisplayType::Shape(DisplayMeta::Polygon(RgbaPolygon {
                    coordinates: coordinates.clone(),
                    border_width: *border_width,
                    color: color(c)?,
                }))
            }
            DisplayTypeSpec::MultiLine {
                coordinates,
                width,
                color: c,
            } => {
                if coordinates.len() < 2 {
                    return Err(OdeError::invalid(
                        "multi-line",
                        format!("needs at least 2 coordinates, got {}", coordinates.len()),
                    ));
                }
                DisplayType::Shape(DisplayMeta::MultiLine(RgbaMultiLine {
                    coordinates: coordinates.clone(),
                    width: *width,
                    color: color(c)?,
                }))
            }
        };
        Ok(resolved)
    }
}

pub fn resolve_font<'a, F>(lookup: &F, id: &str) -> Result<RgbaFont>
where
    F: Fn(&str) -> Option<&'a DisplayType>,
{
    match lookup(id) {
        Some(DisplayType::Font(font)) => Ok(font.clone()),
        Some(_) => Err(OdeError::invalid(
            "font reference",
            format!("\"{id}\" is not a font"),
        )),
        None => Err(OdeError::unknown("font", id)),
    }
}
