// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
#[allow(dead_code)]
pub fn generate_loose_markdown(size: usize) -> String {
    let base = "# Title\n\nIntro paragraph that will be promoted.\n\nSetext heading\n--------------\n\n- Item one\n\n- Item two\n    - Child\n```mermaid\nflowchart LR\n  A-->B\n```\n\n$$\nx^2\n$$\n\n";
    base.repeat(size)
}

#[allow(dead_code)]
pub fn generate_wrapped_markdown(size: usize) -> String {
    format!("````markdown\n{}````\n", generate_loose_markdown(size))
}
