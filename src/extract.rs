//! Field extraction and normalization
//!
//! Pure helpers that pull scalar values out of parsed HTML and normalize
//! them. Nothing here fails: a missing selector, an invalid selector or an
//! unmatched element all degrade to an empty value.

use regex::Regex;
use scraper::{ElementRef, Selector};
use std::sync::OnceLock;

const ATTR_PREFIX: &str = "::attr(";

/// A configured selector split into its CSS part and an optional attribute
///
/// `img.photo::attr(data-src)` selects `img.photo` and reads `data-src`;
/// a plain selector reads the element's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSpec<'a> {
    pub css: &'a str,
    pub attr: Option<&'a str>,
}

impl<'a> SelectorSpec<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let raw = raw.trim();
        if let Some(start) = raw.rfind(ATTR_PREFIX) {
            if let Some(attr) = raw[start + ATTR_PREFIX.len()..].strip_suffix(')') {
                let attr = attr.trim();
                if !attr.is_empty() {
                    return Self {
                        css: raw[..start].trim_end(),
                        attr: Some(attr),
                    };
                }
            }
        }
        Self {
            css: raw,
            attr: None,
        }
    }

    /// Compiles the CSS part, logging selectors the parser rejects
    pub fn compile(&self) -> Option<Selector> {
        if self.css.is_empty() {
            return None;
        }
        match Selector::parse(self.css) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!("Invalid CSS selector '{}': {:?}", self.css, e);
                None
            }
        }
    }
}

/// Returns the first element under `root` matching `selector`
pub fn select_first<'a>(root: ElementRef<'a>, selector: Option<&str>) -> Option<ElementRef<'a>> {
    let spec = SelectorSpec::parse(selector?);
    let compiled = spec.compile()?;
    root.select(&compiled).next()
}

/// Extracts the cleaned text of the first element matching `selector`
///
/// With an `::attr(NAME)` suffix the attribute value is returned instead.
/// Returns an empty string when the selector is absent, empty, invalid or
/// does not match.
pub fn extract_text(root: ElementRef<'_>, selector: Option<&str>) -> String {
    let Some(raw) = selector else {
        return String::new();
    };
    let spec = SelectorSpec::parse(raw);
    let Some(compiled) = spec.compile() else {
        return String::new();
    };
    let Some(element) = root.select(&compiled).next() else {
        return String::new();
    };

    match spec.attr {
        Some(attr) => element.value().attr(attr).map(clean_text).unwrap_or_default(),
        None => clean_text(&element.text().collect::<String>()),
    }
}

/// Trims `text` and collapses internal whitespace runs to a single space
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes a price string to `$1,234,567`
///
/// Everything but digits and `.` is dropped before parsing. If what remains
/// is not a number the input is returned unchanged.
///
/// ```
/// use homescrape::extract::extract_price;
///
/// assert_eq!(extract_price("$1,250,000"), "$1,250,000");
/// assert_eq!(extract_price("Call for price"), "Call for price");
/// ```
pub fn extract_price(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let digits: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match digits.parse::<f64>() {
        Ok(value) => format!("${}", group_thousands(&format!("{:.0}", value))),
        Err(_) => text.to_string(),
    }
}

/// Inserts `,` between groups of three digits
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+\.?[0-9]*").expect("number pattern is valid"))
}

/// Parses the first number embedded in `text` (`"3 Beds"` gives `3.0`)
///
/// The first digit run wins, so `"1,850 sqft"` gives `1.0`.
pub fn extract_number(text: &str) -> Option<f64> {
    number_pattern()
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Cleaned text as an `Option`, `None` when empty
pub fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
