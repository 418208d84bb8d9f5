//! Compact gradient specs and their rasterization.
//!
//! Accepts the CSS `linear-gradient` argument syntax, e.g.
//! `135deg, #667eea 0%, #764ba2 100%`, with or without the
//! `linear-gradient(...)` wrapper. Rendering is a pure function so it can be
//! used without any drawing surface.

use std::sync::OnceLock;

use image::{ImageBuffer, Rgba, RgbaImage};
use regex::Regex;

use crate::errors::CallError;

/// CSS default direction (`to bottom`).
const DEFAULT_ANGLE_DEG: f32 = 180.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GradientStop {
    pub color: Rgba<u8>,
    /// Offset along the gradient line, in [0, 1].
    pub position: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    /// CSS angle: 0deg points up, angles grow clockwise.
    pub angle_deg: f32,
    pub stops: Vec<GradientStop>,
}

fn angle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?\d+(?:\.\d+)?)deg$").expect("valid angle regex"))
}

fn stop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*\S)\s+(-?\d+(?:\.\d+)?)%$").expect("valid stop regex")
    })
}

fn malformed(spec: &str, why: &str) -> CallError {
    CallError::Processing(format!("malformed gradient '{spec}': {why}"))
}

/// Parse a gradient spec into an angle and normalized stops.
///
/// Stops are `color pos%` or a bare `color`. Positions are clamped to [0, 1];
/// a missing first position is 0, a missing last position is 1 and missing
/// positions in between are spread evenly between their neighbours.
pub fn parse_gradient(spec: &str) -> Result<Gradient, CallError> {
    let mut body = spec.trim();
    if let Some(inner) = strip_prefix_ci(body, "linear-gradient(") {
        body = inner
            .strip_suffix(')')
            .ok_or_else(|| malformed(spec, "unbalanced parenthesis"))?;
    }

    let mut parts: Vec<&str> = split_top_level(body)
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut angle_deg = DEFAULT_ANGLE_DEG;
    if let Some(first) = parts.first() {
        if let Some(angle) = parse_direction(first) {
            angle_deg = angle;
            parts.remove(0);
        }
    }

    if parts.len() < 2 {
        return Err(malformed(spec, "at least two color stops are required"));
    }

    let mut colors = Vec::with_capacity(parts.len());
    let mut positions = Vec::with_capacity(parts.len());
    for part in parts {
        let (color, position) = match stop_re().captures(part) {
            Some(caps) => {
                let pct: f32 = caps[2]
                    .parse()
                    .map_err(|_| malformed(spec, "invalid stop position"))?;
                (caps.get(1).map_or("", |m| m.as_str()), Some((pct / 100.0).clamp(0.0, 1.0)))
            }
            None => (part, None),
        };
        colors.push(
            parse_color(color).ok_or_else(|| malformed(spec, &format!("unknown color '{color}'")))?,
        );
        positions.push(position);
    }

    let stops = colors
        .into_iter()
        .zip(fill_positions(positions))
        .map(|(color, position)| GradientStop { color, position })
        .collect();

    Ok(Gradient { angle_deg, stops })
}

/// Rasterize `gradient` into a `width` x `height` image.
pub fn render(gradient: &Gradient, width: u32, height: u32) -> RgbaImage {
    let (sin, cos) = gradient.angle_deg.to_radians().sin_cos();
    let w = width as f32;
    let h = height as f32;
    // Length of the gradient line so that corners land on 0 and 1.
    let line = (w * sin).abs() + (h * cos).abs();

    ImageBuffer::from_fn(width, height, |x, y| {
        let dx = x as f32 + 0.5 - w / 2.0;
        let dy = y as f32 + 0.5 - h / 2.0;
        let t = if line > f32::EPSILON {
            (dx * sin - dy * cos) / line + 0.5
        } else {
            0.5
        };
        color_at(&gradient.stops, t.clamp(0.0, 1.0))
    })
}

fn color_at(stops: &[GradientStop], t: f32) -> Rgba<u8> {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Rgba([0, 0, 0, 0]);
    };
    if t <= first.position {
        return first.color;
    }
    if t >= last.position {
        return last.color;
    }

    for pair in stops.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if t >= a.position && t <= b.position {
            let span = b.position - a.position;
            if span <= f32::EPSILON {
                return b.color;
            }
            let k = (t - a.position) / span;
            let mut out = [0u8; 4];
            for (i, channel) in out.iter_mut().enumerate() {
                let from = a.color.0[i] as f32;
                let to = b.color.0[i] as f32;
                *channel = (from + (to - from) * k).round() as u8;
            }
            return Rgba(out);
        }
    }
    last.color
}

fn fill_positions(positions: Vec<Option<f32>>) -> Vec<f32> {
    let n = positions.len();
    let mut known = positions;
    if let Some(first) = known.first_mut() {
        first.get_or_insert(0.0);
    }
    if let Some(last) = known.last_mut() {
        last.get_or_insert(1.0);
    }

    let mut out: Vec<f32> = Vec::with_capacity(n);
    let mut i = 0;
    while i < n {
        match known[i] {
            Some(p) => {
                out.push(p);
                i += 1;
            }
            None => {
                // Run of missing positions between out[i - 1] and the next known stop.
                let start = out[i - 1];
                let end_idx = (i..n).find(|&j| known[j].is_some()).unwrap_or(n - 1);
                let end = known[end_idx].unwrap_or(1.0);
                let steps = (end_idx - i + 1) as f32;
                for k in i..end_idx {
                    out.push(start + (end - start) * ((k - i + 1) as f32 / steps));
                }
                i = end_idx;
            }
        }
    }

    // Stops never go backwards along the line.
    for i in 1..out.len() {
        if out[i] < out[i - 1] {
            out[i] = out[i - 1];
        }
    }
    out
}

fn parse_direction(token: &str) -> Option<f32> {
    let token = token.trim().to_ascii_lowercase();
    if let Some(caps) = angle_re().captures(&token) {
        return caps[1].parse().ok();
    }

    let sides = token.strip_prefix("to ")?;
    let mut words: Vec<&str> = sides.split_whitespace().collect();
    words.sort_unstable();
    let angle = match words.as_slice() {
        ["top"] => 0.0,
        ["right"] => 90.0,
        ["bottom"] => 180.0,
        ["left"] => 270.0,
        ["right", "top"] => 45.0,
        ["bottom", "right"] => 135.0,
        ["bottom", "left"] => 225.0,
        ["left", "top"] => 315.0,
        _ => return None,
    };
    Some(angle)
}

/// Parse `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb()`, `rgba()` or a
/// basic named color.
pub fn parse_color(token: &str) -> Option<Rgba<u8>> {
    let token = token.trim().to_ascii_lowercase();

    if let Some(hex) = token.strip_prefix('#') {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return match hex.len() {
            3 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
            4 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?])),
            6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => None,
        };
    }

    if let Some(args) = token
        .strip_prefix("rgba(")
        .or_else(|| token.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let values: Vec<&str> = args.split(',').map(str::trim).collect();
        let channel = |s: &str| s.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
        return match values.as_slice() {
            [r, g, b] => Some(Rgba([channel(r)?, channel(g)?, channel(b)?, 255])),
            [r, g, b, a] => {
                let alpha = a.parse::<f32>().ok()?.clamp(0.0, 1.0);
                Some(Rgba([channel(r)?, channel(g)?, channel(b)?, (alpha * 255.0).round() as u8]))
            }
            _ => None,
        };
    }

    let named = match token.as_str() {
        "black" => [0, 0, 0, 255],
        "white" => [255, 255, 255, 255],
        "red" => [255, 0, 0, 255],
        "green" => [0, 128, 0, 255],
        "blue" => [0, 0, 255, 255],
        "gray" | "grey" => [128, 128, 128, 255],
        "transparent" => [0, 0, 0, 0],
        _ => return None,
    };
    Some(Rgba(named))
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
