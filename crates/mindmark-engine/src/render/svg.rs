use std::borrow::Cow;
use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;

use super::result::{ImageSize, ceil_dimension};

pub const SVG_MIME: &str = "image/svg+xml";

pub const DEFAULT_SVG_SIZE: ImageSize = ImageSize::new(480, 240);

fn svg_open_tag(svg: &str) -> Option<regex::Match<'_>> {
    static OPEN: OnceLock<Regex> = OnceLock::new();
    OPEN.get_or_init(|| Regex::new(r"(?i)<svg\b[^>]*>").expect("Invalid svg tag regex"))
        .find(svg)
}

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!(r#"(?i)\s{name}\s*=\s*["']([^"']*)["']"#);
    let re = Regex::new(&pattern).ok()?;
    re.captures(tag).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn leading_number(value: &str) -> Option<(f64, &str)> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER.get_or_init(|| {
        Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+))\s*([A-Za-z%]*)\s*$").expect("Invalid length regex")
    });
    let caps = re.captures(value)?;
    let number = caps[1].parse().ok()?;
    let unit = caps.get(2).map_or("", |m| m.as_str());
    Some((number, unit))
}

/// Size declared by the `viewBox` or the `width`/`height` attributes.
pub fn declared_svg_size(svg: &str) -> Option<ImageSize> {
    let tag = svg_open_tag(svg)?.as_str();

    if let Some(view_box) = attribute(tag, "viewBox") {
        let parts: Vec<f64> = view_box
            .split([' ', ','])
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.parse().ok())
            .collect();
        if let &[_, _, w, h] = parts.as_slice()
            && let Some(size) = ImageSize::from_f64(w, h)
        {
            return Some(size);
        }
    }

    let (width, _) = attribute(tag, "width").and_then(leading_number)?;
    let (height, _) = attribute(tag, "height").and_then(leading_number)?;
    ImageSize::from_f64(width, height)
}

/// Pixels per unit for CSS absolute and font-relative lengths.
fn unit_to_px(unit: &str, base_px: f64) -> Option<f64> {
    let factor = match unit.to_ascii_lowercase().as_str() {
        "" | "px" => 1.0,
        "pt" => 96.0 / 72.0,
        "pc" => 16.0,
        "in" => 96.0,
        "cm" => 96.0 / 2.54,
        "mm" => 96.0 / 25.4,
        "em" => base_px,
        "ex" => base_px / 2.0,
        _ => return None,
    };
    Some(factor)
}

/// Size from `width`/`height` attributes with units converted to pixels.
///
/// MathJax emits sizes in `ex`, so `base_px` is the surrounding font size.
/// Returns `None` when either attribute is missing or unusable.
pub fn parse_svg_size_with_unit(svg: &str, base_px: f64) -> Option<ImageSize> {
    let tag = svg_open_tag(svg)?.as_str();
    let to_px = |name: &str| {
        let (n, unit) = leading_number(attribute(tag, name)?)?;
        Some(n * unit_to_px(unit, base_px)?)
    };
    Some(ImageSize::new(ceil_dimension(to_px("width")?)?, ceil_dimension(to_px("height")?)?))
}

/// Pins the root element to an explicit pixel size.
pub fn set_svg_pixel_size(svg: &str, size: ImageSize) -> String {
    let Some(open) = svg_open_tag(svg) else {
        return svg.to_string();
    };
    let tag = open.as_str();

    static SIZE_ATTR: OnceLock<Regex> = OnceLock::new();
    let size_attr = SIZE_ATTR.get_or_init(|| {
        Regex::new(r#"(?i)\s(?:width|height|style)\s*=\s*(?:"[^"]*"|'[^']*')"#)
            .expect("Invalid svg attribute regex")
    });

    let kept_style = attribute(tag, "style")
        .map(|style| {
            style
                .split(';')
                .map(str::trim)
                .filter(|decl| {
                    let name = decl.split(':').next().unwrap_or_default().trim();
                    !decl.is_empty() && !name.eq_ignore_ascii_case("width") && !name.eq_ignore_ascii_case("height")
                })
                .map(|decl| format!("{decl};"))
                .collect::<String>()
        })
        .unwrap_or_default();

    let stripped = size_attr.replace_all(tag, "");
    let (head, close) = match stripped.strip_suffix("/>") {
        Some(head) => (head.trim_end(), "/>"),
        None => (stripped.trim_end_matches('>').trim_end(), ">"),
    };
    let ImageSize { width, height } = size;
    let new_tag = format!(
        r#"{head} width="{width}" height="{height}" style="width:{width}px;height:{height}px;{kept_style}"{close}"#
    );

    format!("{}{new_tag}{}", &svg[..open.start()], &svg[open.end()..])
}

/// Adds `css` to the first `<style>` element, creating one if needed.
pub fn inject_svg_style(svg: &str, css: &str) -> String {
    if let Some(close) = svg.find("</style>") {
        return format!("{}{css}{}", &svg[..close], &svg[close..]);
    }
    match svg_open_tag(svg) {
        Some(open) => format!(
            "{}<style>{css}</style>{}",
            &svg[..open.end()],
            &svg[open.end()..]
        ),
        None => svg.to_string(),
    }
}

/// Makes renderer output well-formed XML so it loads from a blob or data URL.
///
/// HTML-only entities are the usual culprit: `&nbsp;` (also double-escaped,
/// unterminated, or split across `<tspan>`s by text layout) becomes a space,
/// and any other unknown entity or bare `&` is escaped.
pub fn sanitize_svg_for_xml(svg: &str) -> Cow<'_, str> {
    static SPLIT_NBSP: OnceLock<Regex> = OnceLock::new();
    static NBSP: OnceLock<Regex> = OnceLock::new();
    static ENTITY: OnceLock<Regex> = OnceLock::new();

    if !svg.contains('&') {
        return Cow::Borrowed(svg);
    }

    let split = SPLIT_NBSP.get_or_init(|| {
        Regex::new(r"&(?:amp;)?(nbs|nb|n)((?:</tspan>\s*<tspan[^>]*>)+)(p|sp|bsp);")
            .expect("Invalid split nbsp regex")
    });
    let joined = split.replace_all(svg, |caps: &regex::Captures<'_>| {
        if format!("{}{}", &caps[1], &caps[3]) == "nbsp" {
            format!(" {}", &caps[2])
        } else {
            caps[0].to_string()
        }
    });

    let nbsp = NBSP.get_or_init(|| Regex::new(r"&(?:amp;)?nbsp;?").expect("Invalid nbsp regex"));
    let spaced = nbsp.replace_all(&joined, " ");

    let entity = ENTITY.get_or_init(|| {
        Regex::new(r"&(#[0-9]+;|#[xX][0-9A-Fa-f]+;|[A-Za-z][A-Za-z0-9]*;)?").expect("Invalid entity regex")
    });
    let escaped = entity.replace_all(&spaced, |caps: &regex::Captures<'_>| match caps.get(1) {
        Some(name) if name.as_str().starts_with('#') => caps[0].to_string(),
        Some(name) if matches!(name.as_str(), "amp;" | "lt;" | "gt;" | "quot;" | "apos;") => caps[0].to_string(),
        Some(name) => format!("&amp;{}", name.as_str()),
        None => "&amp;".to_string(),
    });

    Cow::Owned(escaped.into_owned())
}

pub fn svg_to_data_url(svg: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg.as_bytes()))
}
