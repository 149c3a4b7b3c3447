use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Canonical name for a short fence language alias, if it has one.
pub fn canonical_lang(lang: &str) -> Option<&'static str> {
    match lang.to_ascii_lowercase().as_str() {
        "js" => Some("javascript"),
        "ts" => Some("typescript"),
        "py" => Some("python"),
        "sh" | "shell" => Some("bash"),
        "yml" => Some("yaml"),
        _ => None,
    }
}

/// Rewrites short language aliases on bare opener lines (` ```js ` becomes
/// ` ```javascript `) so the highlighter recognises them.
///
/// Only lines consisting of the marker and a single token are touched.
pub fn normalize_fence_lang(text: &str) -> Cow<'_, str> {
    static OPENER: OnceLock<Regex> = OnceLock::new();
    let re = OPENER.get_or_init(|| {
        Regex::new(r"(?m)^([ \t]*`{3,})([A-Za-z]+)[ \t]*$").expect("Invalid fence opener regex")
    });
    re.replace_all(text, |caps: &regex::Captures<'_>| match canonical_lang(&caps[2]) {
        Some(lang) => format!("{}{lang}", &caps[1]),
        None => caps[0].to_string(),
    })
}
