//! Turning fetched documents into titles, readable text and links.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Cursor;

pub const TRUNCATION_MARKER: &str = "[… truncated]";

const TEXT_WIDTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub index: usize,
    pub url: String,
    pub text: String,
}

pub fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("html") {
            return true;
        }
        if ct.starts_with("text/plain") || ct.contains("json") {
            return false;
        }
    }
    let head: String = body.trim_start().chars().take(256).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<body")
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `<title>`, else the first `<h1>`, else the URL. Never empty.
pub fn extract_title(doc: &Html, url: &str) -> String {
    first_text(doc, "title")
        .or_else(|| first_text(doc, "h1"))
        .unwrap_or_else(|| url.to_string())
}

pub fn html_to_text(html: &str) -> String {
    html2text::from_read(Cursor::new(html.as_bytes()), TEXT_WIDTH)
        .unwrap_or_else(|_| html.to_string())
}

/// Absolute, de-duplicated links with anchor text, in document order.
///
/// Relative hrefs are resolved against `base_url`; fragments are dropped and
/// `javascript:` / `mailto:` links skipped.
pub fn extract_links(doc: &Html, base_url: &str, max_links: usize) -> Vec<Link> {
    if max_links == 0 {
        return Vec::new();
    }
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let base = url::Url::parse(base_url).ok();

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for el in doc.select(&sel) {
        if links.len() >= max_links {
            break;
        }
        let href = match el.value().attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let href_lc = href.to_ascii_lowercase();
        if href_lc.starts_with("javascript:") || href_lc.starts_with("mailto:") {
            continue;
        }

        let mut abs = match url::Url::parse(href) {
            Ok(u) => u,
            Err(_) => match base.as_ref().and_then(|b| b.join(href).ok()) {
                Some(u) => u,
                None => continue,
            },
        };
        if !matches!(abs.scheme(), "http" | "https") {
            continue;
        }
        abs.set_fragment(None);
        let url = abs.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }

        let mut text = normalize_whitespace(&el.text().collect::<String>());
        if text.is_empty() {
            text = el.value().attr("title").unwrap_or_default().trim().to_string();
        }
        links.push(Link {
            index: links.len(),
            url,
            text,
        });
    }
    links
}

/// Truncate to at most `max_chars` characters, appending the marker when
/// anything was cut. Returns the text and whether it was truncated.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut out = text[..byte_idx].trim_end().to_string();
            out.push('\n');
            out.push_str(TRUNCATION_MARKER);
            (out, true)
        }
        None => (text.to_string(), false),
    }
}

/// Plain-text documents use their first non-empty line as title.
pub fn plain_title(body: &str, url: &str) -> String {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(120).collect())
        .unwrap_or_else(|| url.to_string())
}
