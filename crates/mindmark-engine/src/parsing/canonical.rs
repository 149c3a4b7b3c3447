use super::fence_lang::normalize_fence_lang;
use super::mermaid::sanitize_mermaid_fences;
use super::normalize::normalize;

/// The text the renderer actually draws: normalized structure, canonical
/// fence languages and Mermaid flowchart labels made parseable.
///
/// Editors show this form so what the user sees is what gets rendered.
pub fn canonicalize(text: &str) -> String {
    let normalized = normalize(text);
    let langs = normalize_fence_lang(&normalized);
    sanitize_mermaid_fences(&langs).into_owned()
}
