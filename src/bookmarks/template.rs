//! `#{name}` placeholder expansion for bookmark URLs.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::store::Bookmark;
use crate::errors::ExpandError;

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\{(\w+)\}").unwrap());

/// URL schemes browsers refuse to open from a redirect.
pub const BROWSER_ONLY_SCHEMES: [&str; 3] = ["chrome://", "about://", "file://"];

/// Unique placeholder names in order of first appearance.
pub fn placeholders(url: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in PLACEHOLDER_REGEX.captures_iter(url) {
        let name = &cap[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Where an expanded bookmark sends the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Redirect(String),
    /// Shown for copy-paste instead of redirecting.
    BrowserOnly(String),
}

impl Target {
    pub fn classify(url: String) -> Self {
        if BROWSER_ONLY_SCHEMES.iter().any(|s| url.starts_with(s)) {
            Target::BrowserOnly(url)
        } else {
            Target::Redirect(url)
        }
    }
}

/// Percent-encode what is not allowed in a `Location` header, keeping URL
/// delimiters and existing escapes intact.
pub fn to_location(url: &str) -> String {
    const KEEP: &[u8] = b"-._~/#%[]=:;$&()+,!?*@'";
    let mut out = String::with_capacity(url.len());
    for byte in url.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn substitute(url: &str, values: &[(String, String)]) -> String {
    PLACEHOLDER_REGEX
        .replace_all(url, |cap: &Captures| {
            values
                .iter()
                .find(|(name, _)| name == &cap[1])
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

/// Expand for a search-box query `"<key> <rest>"`.
///
/// A single placeholder takes all of `rest`. With several, `rest` is split on
/// whitespace and the values fill placeholders without defaults first, then
/// the defaulted ones; defaults cover whatever is left.
pub fn expand_search(bookmark: &Bookmark, rest: &str) -> Result<String, ExpandError> {
    let names = bookmark.params();
    let rest = rest.trim();

    let values = match names.as_slice() {
        [] => Vec::new(),
        [only] => {
            let value = if !rest.is_empty() {
                rest.to_string()
            } else if let Some(default) = bookmark.defaults.get(only) {
                default.clone()
            } else {
                return Err(ExpandError::ParameterRequired {
                    key: bookmark.key.clone(),
                });
            };
            vec![(only.clone(), value)]
        }
        _ => {
            let (optional, required): (Vec<&String>, Vec<&String>) = names
                .iter()
                .partition(|name| bookmark.defaults.contains_key(*name));
            let mut supplied = rest.split_whitespace();
            let mut values = Vec::with_capacity(names.len());

            for name in &required {
                match supplied.next() {
                    Some(value) => values.push(((*name).clone(), value.to_string())),
                    None => return Err(search_usage(bookmark, &required, &optional)),
                }
            }
            for name in &optional {
                let value = match supplied.next() {
                    Some(value) => value.to_string(),
                    None => bookmark.defaults[*name].clone(),
                };
                values.push(((*name).clone(), value));
            }
            values
        }
    };

    Ok(substitute(&bookmark.url, &values))
}

fn search_usage(bookmark: &Bookmark, required: &[&String], optional: &[&String]) -> ExpandError {
    let mut usage = bookmark.key.clone();
    for name in required {
        usage.push_str(&format!(" <{}>", name));
    }
    if !optional.is_empty() {
        let names: Vec<&str> = optional.iter().map(|n| n.as_str()).collect();
        usage.push_str(&format!(" [{}]", names.join(" ")));
    }
    ExpandError::ParametersRequired {
        key: bookmark.key.clone(),
        required: required.iter().map(|n| (*n).clone()).collect(),
        usage,
    }
}

/// Expand for `/<key>/?name=value`. Every placeholder must be supplied.
pub fn expand_direct<'a, F>(bookmark: &Bookmark, lookup: F) -> Result<String, ExpandError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut values = Vec::new();
    for name in bookmark.params() {
        match lookup(&name).filter(|v| !v.is_empty()) {
            Some(value) => values.push((name, value.to_string())),
            None => {
                return Err(ExpandError::MissingQueryParameter {
                    key: bookmark.key.clone(),
                    name,
                });
            }
        }
    }
    Ok(substitute(&bookmark.url, &values))
}
