//! HTML reduction helpers
//!
//! Product pages are parsed as text, not as a DOM: every element boundary
//! becomes a line break, whitespace-only lines are dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static SCRIPT_OR_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
        .expect("static regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("static regex")
});
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static H1: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>").expect("static regex")
});
static HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#)
        .expect("static regex")
});

/// Reduce an HTML document to newline-separated text lines
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let stripped = SCRIPT_OR_STYLE.replace_all(html, "\n");
    let stripped = TAG.replace_all(&stripped, "\n");
    let decoded = decode_entities(&stripped);
    decoded
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse all whitespace runs to one space
pub(crate) fn clean(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Text of the first `<h1>`
pub(crate) fn first_heading(html: &str) -> Option<String> {
    let inner = H1.captures(html)?.get(1)?.as_str();
    let text = clean(&decode_entities(&TAG.replace_all(inner, " ")));
    (!text.is_empty()).then_some(text)
}

/// Absolute targets of every `<a href>`, resolved against `base`
pub(crate) fn links(html: &str, base: &Url) -> Vec<Url> {
    HREF.captures_iter(html)
        .filter_map(|c| c.get(1))
        .filter_map(|m| base.join(decode_entities(m.as_str()).trim()).ok())
        .collect()
}

fn decode_entities(s: &str) -> String {
    let named = s
        .replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&ndash;", "\u{2013}")
        .replace("&mdash;", "\u{2014}");
    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures<'_>| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse().ok(),
        };
        code.and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), |c| c.to_string())
    });
    numeric.replace("&amp;", "&")
}
