use std::sync::OnceLock;

use regex::Regex;

use super::TreeNode;

/// Strips the `<p>` wrappers the HTML renderer puts around node content.
///
/// Block paragraphs break the one-line-per-node layout of the mind map, so
/// adjacent paragraphs are joined with `<br>`. Returns whether any node
/// changed.
pub fn unwrap_paragraph_wrappers(root: &mut TreeNode) -> bool {
    let mut changed = false;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(unwrapped) = unwrap_content(&node.content) {
            node.content = unwrapped;
            changed = true;
        }
        stack.extend(node.children.iter_mut());
    }
    changed
}

fn unwrap_content(content: &str) -> Option<String> {
    static BETWEEN: OnceLock<Regex> = OnceLock::new();
    let inner = content
        .trim()
        .strip_prefix("<p>")?
        .strip_suffix("</p>")?;
    let re = BETWEEN.get_or_init(|| Regex::new(r"</p>\s*<p>").expect("Invalid paragraph regex"));
    Some(re.replace_all(inner, "<br>").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unwraps_nested_nodes() {
        let mut root = TreeNode::new("Root");
        let mut child = TreeNode::new("<p>one</p>");
        child.children.push(TreeNode::new("<p>a</p>\n<p>b</p>"));
        root.children.push(child);

        assert!(unwrap_paragraph_wrappers(&mut root));
        assert_eq!(root.children[0].content, "one");
        assert_eq!(root.children[0].children[0].content, "a<br>b");
    }

    #[test]
    fn leaves_other_content_alone() {
        let mut root = TreeNode::new("<pre><code>x</code></pre>");
        root.children.push(TreeNode::new("plain <p>inline</p> text"));
        assert!(!unwrap_paragraph_wrappers(&mut root));
        assert_eq!(root.content, "<pre><code>x</code></pre>");
    }
}
