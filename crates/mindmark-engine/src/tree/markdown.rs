use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, html};

use super::{TransformError, TreeNode, TreeTransformer};

/// Heading levels occupy ranks 1..=6; list items rank below them by depth.
const HEADING_RANKS: usize = 6;

/// Builds the mind-map tree from canonical markdown with pulldown-cmark.
///
/// Headings nest by level, list items nest under the current heading or
/// item, code blocks and stray paragraphs become leaves of whatever is open.
#[derive(Debug, Default)]
pub struct MarkdownTreeTransformer;

impl MarkdownTreeTransformer {
    pub fn new() -> Self {
        Self
    }

    fn options() -> Options {
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
    }
}

impl TreeTransformer for MarkdownTreeTransformer {
    fn transform(&self, markdown: &str) -> Result<TreeNode, TransformError> {
        let mut builder = TreeBuilder::new();
        for event in Parser::new_ext(markdown, Self::options()) {
            builder.push(event);
        }
        let root = builder.finish();
        if root.content.is_empty() && root.children.is_empty() {
            return Err(TransformError::Empty);
        }
        Ok(root)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Capture {
    None,
    Heading,
    Item,
    Paragraph,
    Code { lang: String, body: String },
}

struct Frame {
    rank: usize,
    node: TreeNode,
}

struct TreeBuilder<'a> {
    stack: Vec<Frame>,
    inline: Vec<Event<'a>>,
    capture: Capture,
    list_depth: usize,
    top_level_headings: usize,
}

impl<'a> TreeBuilder<'a> {
    fn new() -> Self {
        Self {
            stack: vec![Frame {
                rank: 0,
                node: TreeNode::default(),
            }],
            inline: Vec::new(),
            capture: Capture::None,
            list_depth: 0,
            top_level_headings: 0,
        }
    }

    fn push(&mut self, event: Event<'a>) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                self.inline.clear();
                self.capture = Capture::Heading;
            }
            Event::End(TagEnd::Heading(level)) => {
                let content = self.render_inline();
                let rank = level as usize;
                if rank == 1 {
                    self.top_level_headings += 1;
                }
                self.open(rank, TreeNode::new(content));
                self.capture = Capture::None;
            }
            Event::Start(Tag::List(_)) => {
                self.finish_item_content();
                self.list_depth += 1;
            }
            Event::End(TagEnd::List(_)) => {
                self.list_depth = self.list_depth.saturating_sub(1);
            }
            Event::Start(Tag::Item) => {
                self.open(HEADING_RANKS + self.list_depth, TreeNode::default());
                self.inline.clear();
                self.capture = Capture::Item;
            }
            Event::End(TagEnd::Item) => {
                self.finish_item_content();
                self.close(HEADING_RANKS + self.list_depth);
            }
            Event::Start(Tag::Paragraph) => {
                if self.capture == Capture::Item && self.inline.is_empty() {
                    return;
                }
                self.finish_item_content();
                self.inline.clear();
                self.inline.push(Event::Start(Tag::Paragraph));
                self.capture = Capture::Paragraph;
            }
            Event::End(TagEnd::Paragraph) => match self.capture {
                Capture::Item => self.finish_item_content(),
                Capture::Paragraph => {
                    self.inline.push(Event::End(TagEnd::Paragraph));
                    let content = self.render_inline();
                    self.attach_leaf(content);
                    self.capture = Capture::None;
                }
                _ => {}
            },
            Event::Start(Tag::CodeBlock(kind)) => {
                self.finish_item_content();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.capture = Capture::Code {
                    lang,
                    body: String::new(),
                };
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Capture::Code { lang, body } =
                    std::mem::replace(&mut self.capture, Capture::None)
                {
                    self.attach_leaf(code_block_html(&lang, &body));
                }
            }
            Event::Text(text) if matches!(self.capture, Capture::Code { .. }) => {
                if let Capture::Code { body, .. } = &mut self.capture {
                    body.push_str(&text);
                }
            }
            Event::Html(raw) if self.capture == Capture::None => {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    self.attach_leaf(trimmed.to_string());
                }
            }
            Event::Rule => {}
            other => {
                if matches!(
                    self.capture,
                    Capture::Heading | Capture::Item | Capture::Paragraph
                ) {
                    self.inline.push(other);
                }
            }
        }
    }

    fn finish(mut self) -> TreeNode {
        self.finish_item_content();
        while self.stack.len() > 1 {
            self.close_top();
        }
        let mut root = self
            .stack
            .pop()
            .map(|frame| frame.node)
            .unwrap_or_default();

        if self.top_level_headings == 1 && root.children.len() == 1 {
            root = root.children.remove(0);
        }
        root.assign_depths(0);
        root
    }

    fn render_inline(&mut self) -> String {
        let mut out = String::new();
        html::push_html(&mut out, self.inline.drain(..));
        out.trim().to_string()
    }

    /// Moves buffered inline events into the open list item's content.
    fn finish_item_content(&mut self) {
        if self.capture != Capture::Item {
            return;
        }
        let content = self.render_inline();
        if let Some(frame) = self.stack.last_mut() {
            frame.node.content = content;
        }
        self.capture = Capture::None;
    }

    fn open(&mut self, rank: usize, node: TreeNode) {
        while self.stack.len() > 1 && self.stack.last().is_some_and(|f| f.rank >= rank) {
            self.close_top();
        }
        self.stack.push(Frame { rank, node });
    }

    fn close(&mut self, rank: usize) {
        while self.stack.len() > 1 && self.stack.last().is_some_and(|f| f.rank >= rank) {
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        if let Some(frame) = self.stack.pop()
            && let Some(parent) = self.stack.last_mut()
        {
            parent.node.children.push(frame.node);
        }
    }

    fn attach_leaf(&mut self, content: String) {
        if let Some(frame) = self.stack.last_mut() {
            frame.node.children.push(TreeNode::new(content));
        }
    }
}

fn code_block_html(lang: &str, body: &str) -> String {
    let code = html_escape::encode_text(body.trim_end_matches('\n'));
    if lang.is_empty() {
        format!("<pre><code>{code}</code></pre>")
    } else {
        format!(
            "<pre><code class=\"language-{}\">{code}</code></pre>",
            html_escape::encode_double_quoted_attribute(lang)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transform(md: &str) -> TreeNode {
        MarkdownTreeTransformer::new().transform(md).unwrap()
    }

    fn outline(node: &TreeNode) -> Vec<(usize, String)> {
        node.iter().map(|n| (n.depth, n.content.clone())).collect()
    }

    #[test]
    fn single_top_heading_becomes_root() {
        let root = transform("# Root\n## A\n- one\n- two\n## B\n");
        assert_eq!(
            outline(&root),
            vec![
                (0, "Root".to_string()),
                (1, "A".to_string()),
                (2, "one".to_string()),
                (2, "two".to_string()),
                (1, "B".to_string()),
            ]
        );
    }

    #[test]
    fn multiple_top_headings_get_synthetic_root() {
        let root = transform("# A\n# B\n");
        assert_eq!(root.content, "");
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn nested_lists_nest() {
        let root = transform("- Parent\n  - Child\n    - Grandchild\n- Sibling\n");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].content, "Parent");
        assert_eq!(root.children[0].children[0].content, "Child");
        assert_eq!(root.children[0].children[0].children[0].content, "Grandchild");
        assert_eq!(root.children[1].content, "Sibling");
    }

    #[test]
    fn inline_html_images_are_kept() {
        let root = transform("# R\n- Item <img src=\"blob:x\" width=\"10\">\n");
        assert_eq!(root.children[0].content, "Item <img src=\"blob:x\" width=\"10\">");
    }

    #[test]
    fn inline_markup_is_rendered() {
        let root = transform("# R\n- **bold** and `code`\n");
        assert_eq!(
            root.children[0].content,
            "<strong>bold</strong> and <code>code</code>"
        );
    }

    #[test]
    fn code_blocks_become_leaves_of_their_item() {
        let root = transform("# R\n- Item\n  ```javascript\n  a < b\n  ```\n- Next\n");
        let item = &root.children[0];
        assert_eq!(item.content, "Item");
        assert_eq!(
            item.children[0].content,
            "<pre><code class=\"language-javascript\">a &lt; b</code></pre>"
        );
        assert_eq!(root.children[1].content, "Next");
    }

    #[test]
    fn loose_item_continuations_are_paragraph_leaves() {
        let root = transform("- Item\n\n    More text.\n");
        let item = &root.children[0];
        assert_eq!(item.content, "Item");
        assert_eq!(item.children[0].content, "<p>More text.</p>");
    }

    #[test]
    fn heading_after_list_closes_items() {
        let root = transform("# R\n## A\n- x\n  - y\n## B\n");
        assert_eq!(root.children[1].content, "B");
        assert_eq!(root.children[1].depth, 1);
    }

    #[test]
    fn nothing_renderable_is_an_error() {
        assert_eq!(
            MarkdownTreeTransformer::new().transform("---\n"),
            Err(TransformError::Empty)
        );
    }

    #[test]
    fn rules_are_ignored() {
        let root = transform("# R\n- a\n\n---\n");
        assert_eq!(root.count(), 2);
    }
}
