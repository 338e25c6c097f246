//! Color values and the `color()` adjuster function
//!
//! `color(<base> <adjuster>*)` evaluates to a plain `rgb()`/`rgba()` value.
//! Supported adjusters: `red`, `green`, `blue`, `alpha`/`a`, `hue`/`h`,
//! `saturation`/`s`, `lightness`/`l`, `whiteness`/`w`, `blackness`/`b`,
//! `tint`, `shade`, `blend` and `contrast`. Channel adjusters accept an
//! optional `+`, `-` or `*` modifier: `color(red lightness(+ 10%))`.

use super::ast::{SourceLocation, Stylesheet};
use super::chain::{ProcessContext, Processor, Stage};
use super::error::CssError;
use super::value::{find_function, replace_functions, split_top_level, split_whitespace_top_level};

/// An sRGB color: channels 0-255, alpha 0-1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

/// Hue in degrees, the other components 0-100
#[derive(Debug, Clone, Copy, PartialEq)]
struct Hsl {
    h: f64,
    s: f64,
    l: f64,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba { r: 255.0, g: 255.0, b: 255.0, a: 1.0 };
    pub const BLACK: Rgba = Rgba { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };

    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            r: r.clamp(0.0, 255.0),
            g: g.clamp(0.0, 255.0),
            b: b.clamp(0.0, 255.0),
            a: a.clamp(0.0, 1.0),
        }
    }

    fn to_hsl(self) -> Hsl {
        let (r, g, b) = (self.r / 255.0, self.g / 255.0, self.b / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        let delta = max - min;

        if delta == 0.0 {
            return Hsl { h: 0.0, s: 0.0, l: l * 100.0 };
        }

        let s = if l > 0.5 {
            delta / (2.0 - max - min)
        } else {
            delta / (max + min)
        };
        let h = if max == r {
            (g - b) / delta + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / delta + 2.0
        } else {
            (r - g) / delta + 4.0
        };

        Hsl {
            h: h * 60.0,
            s: s * 100.0,
            l: l * 100.0,
        }
    }

    fn from_hsl(hsl: Hsl, a: f64) -> Self {
        let h = hsl.h.rem_euclid(360.0) / 360.0;
        let s = (hsl.s / 100.0).clamp(0.0, 1.0);
        let l = (hsl.l / 100.0).clamp(0.0, 1.0);

        if s == 0.0 {
            let v = l * 255.0;
            return Rgba::new(v, v, v, a);
        }

        let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        let channel = |t: f64| {
            let t = t.rem_euclid(1.0);
            let v = if t < 1.0 / 6.0 {
                p + (q - p) * 6.0 * t
            } else if t < 0.5 {
                q
            } else if t < 2.0 / 3.0 {
                p + (q - p) * (2.0 / 3.0 - t) * 6.0
            } else {
                p
            };
            v * 255.0
        };

        Rgba::new(channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0), a)
    }

    /// Whiteness and blackness, 0-100
    fn whiteness_blackness(self) -> (f64, f64) {
        let min = self.r.min(self.g).min(self.b) / 255.0;
        let max = self.r.max(self.g).max(self.b) / 255.0;
        (min * 100.0, (1.0 - max) * 100.0)
    }

    fn from_hwb(hue: f64, whiteness: f64, blackness: f64, a: f64) -> Self {
        let w = (whiteness / 100.0).clamp(0.0, 1.0);
        let b = (blackness / 100.0).clamp(0.0, 1.0);
        if w + b >= 1.0 {
            let gray = w / (w + b) * 255.0;
            return Rgba::new(gray, gray, gray, a);
        }
        let pure = Rgba::from_hsl(Hsl { h: hue, s: 100.0, l: 50.0 }, a);
        let scale = |c: f64| (c / 255.0 * (1.0 - w - b) + w) * 255.0;
        Rgba::new(scale(pure.r), scale(pure.g), scale(pure.b), a)
    }

    /// Linear mix: `weight` 0 keeps `self`, 1 gives `other`
    pub fn mix(self, other: Rgba, weight: f64) -> Rgba {
        let w = weight.clamp(0.0, 1.0);
        let lerp = |a: f64, b: f64| a * (1.0 - w) + b * w;
        Rgba::new(
            lerp(self.r, other.r),
            lerp(self.g, other.g),
            lerp(self.b, other.b),
            lerp(self.a, other.a),
        )
    }

    /// WCAG relative luminance, 0-1
    pub fn luminance(self) -> f64 {
        let linear = |c: f64| {
            let c = c / 255.0;
            if c <= 0.03928 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        0.2126 * linear(self.r) + 0.7152 * linear(self.g) + 0.0722 * linear(self.b)
    }

    /// Channels rounded to integers, as `(r, g, b)`
    pub fn rounded(self) -> (u8, u8, u8) {
        (
            self.r.round() as u8,
            self.g.round() as u8,
            self.b.round() as u8,
        )
    }

    /// `rgb(r, g, b)` or `rgba(r, g, b, a)`
    pub fn to_css(self) -> String {
        let (r, g, b) = self.rounded();
        if self.a >= 1.0 {
            format!("rgb({}, {}, {})", r, g, b)
        } else {
            format!("rgba({}, {}, {}, {})", r, g, b, format_number(self.a))
        }
    }

    /// Shortest hex form, when alpha is 1
    pub fn to_hex(self) -> Option<String> {
        if self.a < 1.0 {
            return None;
        }
        let (r, g, b) = self.rounded();
        Some(shorten_hex(&format!("{:02x}{:02x}{:02x}", r, g, b)))
    }
}

/// `aabbcc` -> `#abc`, otherwise `#aabbcc`
pub fn shorten_hex(digits: &str) -> String {
    let bytes = digits.as_bytes();
    if bytes.len() == 6 && bytes[0] == bytes[1] && bytes[2] == bytes[3] && bytes[4] == bytes[5] {
        format!("#{}{}{}", bytes[0] as char, bytes[2] as char, bytes[4] as char)
    } else {
        format!("#{}", digits)
    }
}

/// Formats with up to three decimals and no trailing zeros
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    let mut text = format!("{:.3}", rounded);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

const NAMED_COLORS: &[(&str, u32)] = &[
    ("aliceblue", 0xf0f8ff), ("antiquewhite", 0xfaebd7), ("aqua", 0x00ffff), ("aquamarine", 0x7fffd4),
    ("azure", 0xf0ffff), ("beige", 0xf5f5dc), ("bisque", 0xffe4c4), ("black", 0x000000),
    ("blanchedalmond", 0xffebcd), ("blue", 0x0000ff), ("blueviolet", 0x8a2be2), ("brown", 0xa52a2a),
    ("burlywood", 0xdeb887), ("cadetblue", 0x5f9ea0), ("chartreuse", 0x7fff00), ("chocolate", 0xd2691e),
    ("coral", 0xff7f50), ("cornflowerblue", 0x6495ed), ("cornsilk", 0xfff8dc), ("crimson", 0xdc143c),
    ("cyan", 0x00ffff), ("darkblue", 0x00008b), ("darkcyan", 0x008b8b), ("darkgoldenrod", 0xb8860b),
    ("darkgray", 0xa9a9a9), ("darkgreen", 0x006400), ("darkgrey", 0xa9a9a9), ("darkkhaki", 0xbdb76b),
    ("darkmagenta", 0x8b008b), ("darkolivegreen", 0x556b2f), ("darkorange", 0xff8c00), ("darkorchid", 0x9932cc),
    ("darkred", 0x8b0000), ("darksalmon", 0xe9967a), ("darkseagreen", 0x8fbc8f), ("darkslateblue", 0x483d8b),
    ("darkslategray", 0x2f4f4f), ("darkslategrey", 0x2f4f4f), ("darkturquoise", 0x00ced1), ("darkviolet", 0x9400d3),
    ("deeppink", 0xff1493), ("deepskyblue", 0x00bfff), ("dimgray", 0x696969), ("dimgrey", 0x696969),
    ("dodgerblue", 0x1e90ff), ("firebrick", 0xb22222), ("floralwhite", 0xfffaf0), ("forestgreen", 0x228b22),
    ("fuchsia", 0xff00ff), ("gainsboro", 0xdcdcdc), ("ghostwhite", 0xf8f8ff), ("gold", 0xffd700),
    ("goldenrod", 0xdaa520), ("gray", 0x808080), ("green", 0x008000), ("greenyellow", 0xadff2f),
    ("grey", 0x808080), ("honeydew", 0xf0fff0), ("hotpink", 0xff69b4), ("indianred", 0xcd5c5c),
    ("indigo", 0x4b0082), ("ivory", 0xfffff0), ("khaki", 0xf0e68c), ("lavender", 0xe6e6fa),
    ("lavenderblush", 0xfff0f5), ("lawngreen", 0x7cfc00), ("lemonchiffon", 0xfffacd), ("lightblue", 0xadd8e6),
    ("lightcoral", 0xf08080), ("lightcyan", 0xe0ffff), ("lightgoldenrodyellow", 0xfafad2), ("lightgray", 0xd3d3d3),
    ("lightgreen", 0x90ee90), ("lightgrey", 0xd3d3d3), ("lightpink", 0xffb6c1), ("lightsalmon", 0xffa07a),
    ("lightseagreen", 0x20b2aa), ("lightskyblue", 0x87cefa), ("lightslategray", 0x778899), ("lightslategrey", 0x778899),
    ("lightsteelblue", 0xb0c4de), ("lightyellow", 0xffffe0), ("lime", 0x00ff00), ("limegreen", 0x32cd32),
    ("linen", 0xfaf0e6), ("magenta", 0xff00ff), ("maroon", 0x800000), ("mediumaquamarine", 0x66cdaa),
    ("mediumblue", 0x0000cd), ("mediumorchid", 0xba55d3), ("mediumpurple", 0x9370db), ("mediumseagreen", 0x3cb371),
    ("mediumslateblue", 0x7b68ee), ("mediumspringgreen", 0x00fa9a), ("mediumturquoise", 0x48d1cc), ("mediumvioletred", 0xc71585),
    ("midnightblue", 0x191970), ("mintcream", 0xf5fffa), ("mistyrose", 0xffe4e1), ("moccasin", 0xffe4b5),
    ("navajowhite", 0xffdead), ("navy", 0x000080), ("oldlace", 0xfdf5e6), ("olive", 0x808000),
    ("olivedrab", 0x6b8e23), ("orange", 0xffa500), ("orangered", 0xff4500), ("orchid", 0xda70d6),
    ("palegoldenrod", 0xeee8aa), ("palegreen", 0x98fb98), ("paleturquoise", 0xafeeee), ("palevioletred", 0xdb7093),
    ("papayawhip", 0xffefd5), ("peachpuff", 0xffdab9), ("peru", 0xcd853f), ("pink", 0xffc0cb),
    ("plum", 0xdda0dd), ("powderblue", 0xb0e0e6), ("purple", 0x800080), ("rebeccapurple", 0x663399),
    ("red", 0xff0000), ("rosybrown", 0xbc8f8f), ("royalblue", 0x4169e1), ("saddlebrown", 0x8b4513),
    ("salmon", 0xfa8072), ("sandybrown", 0xf4a460), ("seagreen", 0x2e8b57), ("seashell", 0xfff5ee),
    ("sienna", 0xa0522d), ("silver", 0xc0c0c0), ("skyblue", 0x87ceeb), ("slateblue", 0x6a5acd),
    ("slategray", 0x708090), ("slategrey", 0x708090), ("snow", 0xfffafa), ("springgreen", 0x00ff7f),
    ("steelblue", 0x4682b4), ("tan", 0xd2b48c), ("teal", 0x008080), ("thistle", 0xd8bfd8),
    ("tomato", 0xff6347), ("turquoise", 0x40e0d0), ("violet", 0xee82ee), ("wheat", 0xf5deb3),
    ("white", 0xffffff), ("whitesmoke", 0xf5f5f5), ("yellow", 0xffff00), ("yellowgreen", 0x9acd32),
];

fn named_color(name: &str) -> Option<Rgba> {
    if name == "transparent" {
        return Some(Rgba::new(0.0, 0.0, 0.0, 0.0));
    }
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, hex)| {
            Rgba::new(
                ((hex >> 16) & 0xff) as f64,
                ((hex >> 8) & 0xff) as f64,
                (hex & 0xff) as f64,
                1.0,
            )
        })
}

fn parse_hex(digits: &str) -> Option<Rgba> {
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match digits.len() {
        3 | 4 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 | 8 => digits.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok().map(f64::from);
    let a = if expanded.len() == 8 { channel(6)? / 255.0 } else { 1.0 };
    Some(Rgba::new(channel(0)?, channel(2)?, channel(4)?, a))
}

fn parse_number(text: &str) -> Result<f64, String> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid number '{}'", text.trim()))
}

/// Number or percentage, percentages scaled to `scale`
fn parse_scaled(text: &str, scale: f64) -> Result<f64, String> {
    let text = text.trim();
    match text.strip_suffix('%') {
        Some(pct) => Ok(parse_number(pct)? / 100.0 * scale),
        None => parse_number(text),
    }
}

fn parse_alpha(text: &str) -> Result<f64, String> {
    let text = text.trim();
    match text.strip_suffix('%') {
        Some(pct) => Ok(parse_number(pct)? / 100.0),
        None => parse_number(text),
    }
}

fn parse_hue(text: &str) -> Result<f64, String> {
    let text = text.trim().to_ascii_lowercase();
    if let Some(deg) = text.strip_suffix("deg") {
        parse_number(deg)
    } else if let Some(turn) = text.strip_suffix("turn") {
        Ok(parse_number(turn)? * 360.0)
    } else if let Some(rad) = text.strip_suffix("rad") {
        Ok(parse_number(rad)?.to_degrees())
    } else {
        parse_number(&text)
    }
}

fn parse_percentage(text: &str) -> Result<f64, String> {
    let text = text.trim();
    parse_number(text.strip_suffix('%').unwrap_or(text))
}

/// Splits `rgb()`-style arguments in comma or space syntax
fn channel_args(args: &str) -> Vec<String> {
    if args.contains(',') {
        split_top_level(args, ',').iter().map(|s| s.trim().to_string()).collect()
    } else {
        args.replace('/', " / ")
            .split_whitespace()
            .filter(|s| *s != "/")
            .map(str::to_string)
            .collect()
    }
}

/// Parses any supported color syntax
pub fn parse_color(text: &str) -> Result<Rgba, String> {
    let text = text.trim();
    let lower = text.to_ascii_lowercase();

    if let Some(digits) = lower.strip_prefix('#') {
        return parse_hex(digits).ok_or_else(|| format!("invalid hex color '{}'", text));
    }

    if let Some(open) = lower.find('(') {
        if !lower.ends_with(')') {
            return Err(format!("invalid color '{}'", text));
        }
        let name = &lower[..open];
        let args = &text[open + 1..text.len() - 1];

        return match name {
            "rgb" | "rgba" => {
                let parts = channel_args(args);
                if parts.len() != 3 && parts.len() != 4 {
                    return Err(format!("expected 3 or 4 channels in '{}'", text));
                }
                let a = match parts.get(3) {
                    Some(alpha) => parse_alpha(alpha)?,
                    None => 1.0,
                };
                Ok(Rgba::new(
                    parse_scaled(&parts[0], 255.0)?,
                    parse_scaled(&parts[1], 255.0)?,
                    parse_scaled(&parts[2], 255.0)?,
                    a,
                ))
            }
            "hsl" | "hsla" => {
                let parts = channel_args(args);
                if parts.len() != 3 && parts.len() != 4 {
                    return Err(format!("expected 3 or 4 components in '{}'", text));
                }
                let a = match parts.get(3) {
                    Some(alpha) => parse_alpha(alpha)?,
                    None => 1.0,
                };
                let hsl = Hsl {
                    h: parse_hue(&parts[0])?,
                    s: parse_percentage(&parts[1])?,
                    l: parse_percentage(&parts[2])?,
                };
                Ok(Rgba::from_hsl(hsl, a))
            }
            "hwb" => {
                let parts = channel_args(args);
                if parts.len() != 3 && parts.len() != 4 {
                    return Err(format!("expected 3 or 4 components in '{}'", text));
                }
                let a = match parts.get(3) {
                    Some(alpha) => parse_alpha(alpha)?,
                    None => 1.0,
                };
                Ok(Rgba::from_hwb(
                    parse_hue(&parts[0])?,
                    parse_percentage(&parts[1])?,
                    parse_percentage(&parts[2])?,
                    a,
                ))
            }
            "color" => evaluate(args),
            _ => Err(format!("unsupported color function '{}'", name)),
        };
    }

    named_color(&lower).ok_or_else(|| format!("unknown color '{}'", text))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modifier {
    Set,
    Add,
    Subtract,
    Multiply,
}

/// Splits an optional `+ `, `- ` or `* ` modifier off adjuster arguments
fn split_modifier(args: &str) -> (Modifier, &str) {
    let args = args.trim();
    let mut chars = args.chars();
    let modifier = match chars.next() {
        Some('+') => Modifier::Add,
        Some('-') => Modifier::Subtract,
        Some('*') => Modifier::Multiply,
        _ => return (Modifier::Set, args),
    };
    let rest = chars.as_str();
    // `-10` is a negative absolute value, `- 10` subtracts
    if modifier != Modifier::Multiply && !rest.starts_with(char::is_whitespace) {
        return (Modifier::Set, args);
    }
    (modifier, rest.trim())
}

/// Applies a modifier; `scale` converts percentages of non-multiply amounts
fn apply(current: f64, args: &str, scale: f64) -> Result<f64, String> {
    let (modifier, amount) = split_modifier(args);
    if modifier == Modifier::Multiply {
        return Ok(current * parse_scaled(amount, 1.0)?);
    }
    let amount = parse_scaled(amount, scale)?;
    Ok(match modifier {
        Modifier::Set => amount,
        Modifier::Add => current + amount,
        Modifier::Subtract => current - amount,
        Modifier::Multiply => current * amount,
    })
}

fn parse_weight(args: &str) -> Result<f64, String> {
    Ok(parse_scaled(args, 100.0)? / 100.0)
}

fn adjust(color: Rgba, adjuster: &str) -> Result<Rgba, String> {
    let open = adjuster
        .find('(')
        .filter(|_| adjuster.ends_with(')'))
        .ok_or_else(|| format!("invalid color adjuster '{}'", adjuster))?;
    let name = adjuster[..open].trim().to_ascii_lowercase();
    let args = &adjuster[open + 1..adjuster.len() - 1];

    let adjusted = match name.as_str() {
        "red" => Rgba { r: apply(color.r, args, 255.0)?, ..color },
        "green" => Rgba { g: apply(color.g, args, 255.0)?, ..color },
        "blue" => Rgba { b: apply(color.b, args, 255.0)?, ..color },
        "alpha" | "a" => Rgba { a: apply(color.a, args, 1.0)?, ..color },
        "hue" | "h" | "saturation" | "s" | "lightness" | "l" => {
            let mut hsl = color.to_hsl();
            match name.as_str() {
                "hue" | "h" => {
                    let (modifier, amount) = split_modifier(args);
                    let amount = parse_hue(amount)?;
                    hsl.h = match modifier {
                        Modifier::Set => amount,
                        Modifier::Add => hsl.h + amount,
                        Modifier::Subtract => hsl.h - amount,
                        Modifier::Multiply => hsl.h * amount,
                    };
                }
                "saturation" | "s" => hsl.s = apply(hsl.s, args, 100.0)?.clamp(0.0, 100.0),
                _ => hsl.l = apply(hsl.l, args, 100.0)?.clamp(0.0, 100.0),
            }
            Rgba::from_hsl(hsl, color.a)
        }
        "whiteness" | "w" | "blackness" | "b" => {
            let hue = color.to_hsl().h;
            let (mut w, mut b) = color.whiteness_blackness();
            if name.starts_with('w') {
                w = apply(w, args, 100.0)?.clamp(0.0, 100.0);
            } else {
                b = apply(b, args, 100.0)?.clamp(0.0, 100.0);
            }
            Rgba::from_hwb(hue, w, b, color.a)
        }
        "tint" => color.mix(Rgba::WHITE, parse_weight(args)?),
        "shade" => color.mix(Rgba::BLACK, parse_weight(args)?),
        "blend" => {
            let parts = split_whitespace_top_level(args);
            if parts.len() != 2 {
                return Err(format!("blend() expects a color and a percentage, got '{}'", args.trim()));
            }
            color.mix(parse_color(parts[0])?, parse_weight(parts[1])?)
        }
        "contrast" => {
            let weight = if args.trim().is_empty() { 1.0 } else { parse_weight(args)? };
            let target = if color.luminance() < 0.5 { Rgba::WHITE } else { Rgba::BLACK };
            let target = Rgba { a: color.a, ..target };
            color.mix(target, weight)
        }
        other => return Err(format!("unknown color adjuster '{}'", other)),
    };

    Ok(Rgba::new(adjusted.r, adjusted.g, adjusted.b, adjusted.a))
}

/// Evaluates the arguments of a `color()` call
pub fn evaluate(args: &str) -> Result<Rgba, String> {
    let parts = split_whitespace_top_level(args);
    let (base, adjusters) = parts
        .split_first()
        .ok_or_else(|| "color() needs a base color".to_string())?;

    let mut color = parse_color(base)?;
    for adjuster in adjusters {
        color = adjust(color, adjuster)?;
    }
    Ok(color)
}

const NAME: &str = "color-function";

#[derive(Debug, Default)]
pub struct ColorFunctions;

impl ColorFunctions {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for ColorFunctions {
    fn name(&self) -> &'static str {
        NAME
    }

    fn stage(&self) -> Stage {
        Stage::Transform
    }

    fn process(&self, sheet: &mut Stylesheet, _ctx: &mut ProcessContext) -> Result<(), CssError> {
        let result: Result<(), (SourceLocation, String)> = sheet.try_for_each_declaration_mut(|decl| {
            if find_function(&decl.value, "color", 0).is_none() {
                return Ok(());
            }
            decl.value = replace_functions(&decl.value, "color", |args| {
                evaluate(args).map(|color| Some(color.to_css()))
            })
            .map_err(|message| (decl.location, message))?;
            Ok(())
        });

        result.map_err(|(location, message)| CssError::Color {
            path: sheet.source_path(location).to_path_buf(),
            line: location.line + 1,
            column: location.column + 1,
            message,
        })
    }
}
