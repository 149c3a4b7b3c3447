//! Behavioural tests for the normalizer over realistic documents.
//!
//! Every case also runs the output through [`invariants::check`].


use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::parsing::normalize;

fn normalized(input: &str) -> String {
    let output = normalize(input);
    invariants::check(input, &output);
    output
}

#[test]
fn unwraps_container_then_normalizes() {
    let input = "````markdown\n# Plan\n\nIntro text\n\n- one\n\n- two\n````";
    insta::assert_snapshot!(normalized(input), @r"
    # Plan

    ## Intro text

    - one
    - two
    ");
}

#[test]
fn mixed_document() {
    let input = "\
# Project

Overview paragraph
spanning two lines.

## Tasks

- Write parser

- Add tests
```js
test()
```

- Ship it

Closing remarks.
";
    insta::assert_snapshot!(normalized(input), @r"
    # Project

    ## Overview paragraph spanning two lines.

    ## Tasks

    - Write parser
    - Add tests
      ```js
      test()
      ```
    - Ship it

    ### Closing remarks.
    ");
}

#[test]
fn does_not_treat_mixed_chars_as_horizontal_rule() {
    assert!(normalized("-*-").contains("####"));
}

#[test]
fn keeps_real_horizontal_rule() {
    assert_eq!(normalized("---"), "---\n");
}

#[test]
fn trailing_empty_item_stays_a_list_item() {
    assert_eq!(normalized("- a\n- "), "- a\n-\n");
    assert_eq!(normalized("- a\n-\n"), "- a\n-\n");
}

#[test]
fn exits_list_context_on_unindented_paragraph() {
    let output = normalized("- Item\n\nNot in list.");
    assert!(output.contains("#### Not in list."), "{output}");
}

#[test]
fn preserves_list_continuation_paragraphs() {
    let input = "- Item\n\n    Para 1.\n\n    Para 2.\n\n    Para 3.\n\n- Next";
    let output = normalized(input);
    assert!(!output.contains("####"));
    assert!(output.contains("    Para 3."));
}

#[test]
fn preserves_content_after_math_block_in_list() {
    let input = "- Math item\n\n    $$\n    E = mc^2\n    $$\n\n    Text after math.\n\n- Next";
    let output = normalized(input);
    assert!(output.contains("    Text after math."));
    assert!(!output.contains("#### Text"));
}

#[test]
fn keeps_nested_items_under_bold_parent() {
    let input = "### Recommendations\n\n-   **Use Context7 for docs**\n\n    -   Codex: supported\n    -   Claude: supported\n";
    let output = normalized(input);
    assert!(output.contains("-   **Use Context7 for docs**\n    -   Codex:"));
}

#[test]
fn recognizes_indented_headings() {
    let output = normalized("  # Heading\nContent");
    assert!(output.contains("# Heading"));
    assert!(!output.contains("#### #"));
    assert!(output.contains("## Content"));
}

#[rstest]
#[case::indented_list("  - Item\n  ```js\n  code\n  ```", "  - Item\n    ```js\n    code\n    ```\n")]
#[case::one_space_fence("- Item\n ```js\n code\n ```", "- Item\n  ```js\n  code\n  ```\n")]
#[case::flush_fence("- Item\n```js\ncode\n```", "- Item\n  ```js\n  code\n  ```\n")]
fn reindents_fences_inside_lists(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(normalized(input), expected);
}

#[test]
fn removes_blank_line_after_fence_before_sibling() {
    let output = normalized("- Item\n  ```mermaid\n  A-->B\n  ```\n\n- Next item");
    assert!(!output.contains("```\n\n-"));
}

#[test]
fn preserves_blank_line_before_nested_item_after_fence() {
    let output = normalized("- Parent\n  ```js\n  code\n  ```\n\n    - Child");
    assert!(output.contains("```\n\n    - Child"));
}

#[test]
fn fence_content_is_untouched_by_heading_rules() {
    let input = "# Root\n```mermaid\nflowchart LR\nA-->B\n```\n";
    assert_eq!(normalized(input), input);
}

#[test]
fn tilde_fences_are_respected() {
    let input = "# Notes\n~~~\nnot a heading\n\n\n~~~\n";
    assert_eq!(normalized(input), input);
}

#[test]
fn tables_and_quotes_do_not_become_headings() {
    let input = "# Data\n| a | b |\n|---|---|\n| 1 | 2 |\n\n> quoted\n";
    assert_eq!(normalized(input), input);
}

#[rstest]
#[case("")]
#[case("plain")]
#[case("# A\n\n\n\nB\n\n\n- c\n\n- d")]
#[case("Title\n=====\nBody\n-----\nMore")]
#[case("- a\n```\nx\n```\n\n- b\n\n  - c")]
#[case("$$\nx\n\n\ny\n$$\nafter")]
#[case("1. one\n\n2. two\n\n   continued")]
#[case("````md\n# Wrapped\n\ntext\n````")]
#[case("- ")]
#[case("> q\n- ")]
#[case("    - deep\n- ")]
#[case("1. first\n2. ")]
fn normalize_is_idempotent(#[case] input: &str) {
    normalized(input);
}
