//! Image markup and list-aware placement for rendered blocks.

use html_escape::encode_double_quoted_attribute as attr;

use super::result::ImageSize;
use crate::parsing::list_context::{
    append_inline_to_last_list_item, compute_safe_indent, get_list_context,
};

/// `<img>` for a diagram inside an inline-block wrapper of the same size.
///
/// The wrapper is never absolutely positioned: some engines place positioned
/// children of a `foreignObject` at the SVG origin.
pub fn diagram_image_html(src: &str, size: ImageSize, class_name: &str, alt: &str) -> String {
    let ImageSize { width, height } = size;
    format!(
        "<span class=\"diagram-wrap\" style=\"display:inline-block;width:{width}px;height:{height}px;line-height:0;vertical-align:top;\">\
         <img class=\"{}\" alt=\"{}\" src=\"{}\" width=\"{width}\" height=\"{height}\" style=\"display:block;width:{width}px;height:{height}px;\"></span>",
        attr(class_name),
        attr(alt),
        attr(src),
    )
}

/// `<img>` for a math expression; display math gets the `math-block` class.
pub fn math_image_html(src: &str, size: ImageSize, display: bool) -> String {
    let ImageSize { width, height } = size;
    let class = if display { "math-img math-block" } else { "math-img" };
    format!(
        "<img class=\"{class}\" alt=\"math\" src=\"{}\" width=\"{width}\" height=\"{height}\" style=\"width:{width}px;height:{height}px;\">",
        attr(src)
    )
}

/// Where a block-level image ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Appended to the end of the owning list item's line.
    InlineOnItem,
    /// A new list item nested under the owning item.
    NestedChild,
    /// A new list item outside any list.
    NewItem,
}

/// Emits `html` in place of a block that started at `offset` of `text`.
///
/// `out` holds everything emitted so far, ending at the start of the block's
/// line; `indent` is that line's leading whitespace.
pub fn place_block_image(
    out: &mut String,
    text: &str,
    offset: usize,
    indent: &str,
    html: &str,
) -> Placement {
    let ctx = get_list_context(text, offset);
    if ctx.is_list {
        if let Some(appended) = append_inline_to_last_list_item(out, html) {
            *out = appended;
            return Placement::InlineOnItem;
        }
        out.push_str(&ctx.child_indent);
        out.push_str("- ");
        out.push_str(html);
        return Placement::NestedChild;
    }

    out.push_str(&compute_safe_indent(indent, text, offset));
    out.push_str("- ");
    out.push_str(html);
    Placement::NewItem
}
