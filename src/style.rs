//! Style resolver – maps utility classes and inline `style` declarations on
//! sheet markup to a flat [`ComputedStyle`] consumed by the layout engine.
//!
//! All lengths are resolved to PDF points. Spacing utilities (`p-2`, `mb-1`
//! ...) step in whole millimetres, which is what certificate artwork is
//! specified in.

use crate::markup::{Element, Tag};

/// Points per millimetre.
pub const PT_PER_MM: f32 = 72.0 / 25.4;
/// Points per CSS pixel.
pub const PT_PER_PX: f32 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,
    pub direction: Direction,
    pub justify: Justify,
    pub align_items: Align,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub position: Position,

    pub width: Length,
    pub height: Length,
    pub min_height: Length,
    /// Offsets for absolutely positioned boxes.
    pub top: Length,
    pub left: Length,

    /// top, right, bottom, left
    pub margin: [f32; 4],
    pub padding: [f32; 4],
    pub gap: f32,

    pub border_bottom: f32,
    pub border_all: f32,
    pub border_color: Color,
    pub background: Option<Color>,
    pub opacity: f32,

    pub font_size: f32,
    pub bold: bool,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Flex,
            direction: Direction::Column,
            justify: Justify::Start,
            align_items: Align::Stretch,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            position: Position::Relative,
            width: Length::Auto,
            height: Length::Auto,
            min_height: Length::Auto,
            top: Length::Auto,
            left: Length::Auto,
            margin: [0.0; 4],
            padding: [0.0; 4],
            gap: 0.0,
            border_bottom: 0.0,
            border_all: 0.0,
            border_color: Color::BLACK,
            background: None,
            opacity: 1.0,
            font_size: 10.0,
            bold: false,
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Flex,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Justify {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Start,
    End,
    Center,
    Baseline,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Relative,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Auto,
    Pt(f32),
    Percent(f32),
}

impl Length {
    /// Parse `12mm`, `10pt`, `16px`, `50%`, `auto` or a bare point value.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s == "auto" {
            return Some(Length::Auto);
        }
        let (num, factor) = if let Some(n) = s.strip_suffix("mm") {
            (n, PT_PER_MM)
        } else if let Some(n) = s.strip_suffix("pt") {
            (n, 1.0)
        } else if let Some(n) = s.strip_suffix("px") {
            (n, PT_PER_PX)
        } else if let Some(n) = s.strip_suffix('%') {
            return n.trim().parse().ok().map(Length::Percent);
        } else {
            (s, 1.0)
        };
        num.trim().parse::<f32>().ok().map(|v| Length::Pt(v * factor))
    }

    pub fn resolve(self, parent: f32) -> Option<f32> {
        match self {
            Length::Auto => None,
            Length::Pt(v) => Some(v),
            Length::Percent(p) => Some(parent * p / 100.0),
        }
    }
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Named palette used by the certificate artwork.
fn palette(name: &str) -> Option<Color> {
    let hex = match name {
        "black" => "000000",
        "white" => "ffffff",
        "muted" => "666666",
        "maroon" => "7a1f1f",
        "gold" => "8b6f47",
        "saffron" => "d4a574",
        "cream" => "fdf8ef",
        _ => return None,
    };
    Color::from_hex(hex)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve the style of an element, inheriting text properties from `parent`.
pub fn resolve_style(element: &Element, parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = base_style_for_tag(&element.tag);

    if let Some(p) = parent {
        if !matches!(element.tag, Tag::H1 | Tag::H2) {
            style.font_size = p.font_size;
            style.bold = p.bold;
        }
        style.color = p.color;
        style.text_align = p.text_align;
        style.line_height = p.line_height;
    }

    for class in element.classes() {
        apply_class(&mut style, class);
    }
    if let Some(inline) = element.attr("style") {
        apply_inline_style(&mut style, inline);
    }
    style
}

fn base_style_for_tag(tag: &Tag) -> ComputedStyle {
    let mut s = ComputedStyle::default();
    match tag {
        Tag::H1 => {
            s.font_size = 14.0;
            s.margin[2] = 5.0 * PT_PER_MM;
        }
        Tag::H2 => {
            s.font_size = 12.0;
            s.margin[2] = 2.0 * PT_PER_MM;
        }
        Tag::P => {
            s.margin[0] = 0.5 * PT_PER_MM;
            s.margin[2] = 0.5 * PT_PER_MM;
        }
        Tag::Span | Tag::Br => {}
        Tag::Img => s.flex_shrink = 0.0,
        Tag::Sheet | Tag::Div => {}
        Tag::Unknown(_) => s.display = Display::None,
    }
    s
}

fn apply_class(s: &mut ComputedStyle, class: &str) {
    match class {
        "flex" | "flex-row" => s.direction = Direction::Row,
        "flex-col" => s.direction = Direction::Column,
        "hidden" => s.display = Display::None,
        "flex-1" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }
        "grow" => s.flex_grow = 1.0,
        "shrink-0" => s.flex_shrink = 0.0,
        "absolute" => s.position = Position::Absolute,
        "relative" => s.position = Position::Relative,

        "justify-start" => s.justify = Justify::Start,
        "justify-end" => s.justify = Justify::End,
        "justify-center" => s.justify = Justify::Center,
        "justify-between" => s.justify = Justify::SpaceBetween,
        "justify-around" => s.justify = Justify::SpaceAround,
        "justify-evenly" => s.justify = Justify::SpaceEvenly,

        "items-start" => s.align_items = Align::Start,
        "items-end" => s.align_items = Align::End,
        "items-center" => s.align_items = Align::Center,
        "items-baseline" => s.align_items = Align::Baseline,
        "items-stretch" => s.align_items = Align::Stretch,

        "font-bold" => s.bold = true,
        "font-normal" => s.bold = false,
        "text-left" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,

        "text-xs" => s.font_size = 8.0,
        "text-sm" => s.font_size = 9.0,
        "text-base" => s.font_size = 10.0,
        "text-md" => s.font_size = 11.0,
        "text-lg" => s.font_size = 12.0,
        "text-xl" => s.font_size = 14.0,
        "text-2xl" => s.font_size = 18.0,
        "text-3xl" => s.font_size = 24.0,
        "text-4xl" => s.font_size = 32.0,

        "leading-tight" => s.line_height = 1.25,
        "leading-normal" => s.line_height = 1.5,
        "leading-loose" => s.line_height = 2.0,

        "w-full" => s.width = Length::Percent(100.0),
        "h-full" => s.height = Length::Percent(100.0),
        "w-1/2" => s.width = Length::Percent(50.0),

        "border" => s.border_all = 0.5,
        "border-b" => s.border_bottom = 0.5,
        // Blank-able value slot: underline plus one line of reserved height.
        "fill-line" => {
            s.border_bottom = 0.5;
            s.min_height = Length::Pt(s.font_size * s.line_height);
            s.padding[2] = 0.5 * PT_PER_MM;
        }
        "opacity-90" => s.opacity = 0.9,

        _ => {
            try_spacing_class(s, class);
            try_color_class(s, class);
        }
    }
}

fn try_spacing_class(s: &mut ComputedStyle, class: &str) {
    let Some((prefix, value)) = class.rsplit_once('-') else {
        return;
    };
    let Ok(mm) = value.parse::<f32>() else {
        return;
    };
    let v = mm * PT_PER_MM;
    let (target, sides): (&mut [f32; 4], &[usize]) = match prefix {
        "p" => (&mut s.padding, &[0, 1, 2, 3][..]),
        "px" => (&mut s.padding, &[1, 3][..]),
        "py" => (&mut s.padding, &[0, 2][..]),
        "pt" => (&mut s.padding, &[0][..]),
        "pr" => (&mut s.padding, &[1][..]),
        "pb" => (&mut s.padding, &[2][..]),
        "pl" => (&mut s.padding, &[3][..]),
        "m" => (&mut s.margin, &[0, 1, 2, 3][..]),
        "mx" => (&mut s.margin, &[1, 3][..]),
        "my" => (&mut s.margin, &[0, 2][..]),
        "mt" => (&mut s.margin, &[0][..]),
        "mr" => (&mut s.margin, &[1][..]),
        "mb" => (&mut s.margin, &[2][..]),
        "ml" => (&mut s.margin, &[3][..]),
        "gap" => {
            s.gap = v;
            return;
        }
        _ => return,
    };
    for &i in sides {
        target[i] = v;
    }
}

fn try_color_class(s: &mut ComputedStyle, class: &str) {
    if let Some(name) = class.strip_prefix("text-") {
        if let Some(c) = palette(name) {
            s.color = c;
        }
    } else if let Some(name) = class.strip_prefix("bg-") {
        if let Some(c) = palette(name) {
            s.background = Some(c);
        }
    } else if let Some(name) = class.strip_prefix("border-") {
        if let Some(c) = palette(name) {
            s.border_color = c;
        }
    }
}

fn parse_color(value: &str) -> Option<Color> {
    palette(value.trim()).or_else(|| Color::from_hex(value))
}

/// Apply `key: value; ...` declarations.
pub fn apply_inline_style(s: &mut ComputedStyle, inline: &str) {
    for decl in inline.split(';') {
        let Some((key, value)) = decl.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        let length = || Length::parse(value);
        let points = || length().and_then(|l| l.resolve(0.0));
        match key {
            "width" => s.width = length().unwrap_or(s.width),
            "height" => s.height = length().unwrap_or(s.height),
            "min-height" => s.min_height = length().unwrap_or(s.min_height),
            "top" => s.top = length().unwrap_or(s.top),
            "left" => s.left = length().unwrap_or(s.left),
            "font-size" => s.font_size = points().unwrap_or(s.font_size),
            "line-height" => s.line_height = value.parse().unwrap_or(s.line_height),
            "color" => s.color = parse_color(value).unwrap_or(s.color),
            "background" | "background-color" => s.background = parse_color(value),
            "opacity" => s.opacity = value.parse().unwrap_or(s.opacity),
            "gap" => s.gap = points().unwrap_or(s.gap),
            "border-bottom-width" => s.border_bottom = points().unwrap_or(s.border_bottom),
            "margin-top" => s.margin[0] = points().unwrap_or(s.margin[0]),
            "margin-right" => s.margin[1] = points().unwrap_or(s.margin[1]),
            "margin-bottom" => s.margin[2] = points().unwrap_or(s.margin[2]),
            "margin-left" => s.margin[3] = points().unwrap_or(s.margin[3]),
            "padding-top" => s.padding[0] = points().unwrap_or(s.padding[0]),
            "padding-right" => s.padding[1] = points().unwrap_or(s.padding[1]),
            "padding-bottom" => s.padding[2] = points().unwrap_or(s.padding[2]),
            "padding-left" => s.padding[3] = points().unwrap_or(s.padding[3]),
            "padding" => {
                if let Some(v) = points() {
                    s.padding = [v; 4];
                }
            }
            _ => log::debug!("Ignoring unsupported style property {key:?}"),
        }
    }
}
