//! In-memory bookmark store loaded from a JSON file.
//!
//! ```json
//! {
//!   "pr": {
//!     "description": "Open a pull request",
//!     "url": "https://github.com/#{repo}/pull/#{id}",
//!     "defaults": { "repo": "shop/world" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::template::placeholders;
use crate::errors::BookmarkError;

/// Keys the search box handles itself.
pub const RESERVED_KEYS: [&str; 2] = ["h", "help"];

static KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub key: String,
    pub description: String,
    /// Target URL, possibly containing `#{name}` placeholders.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_url: Option<String>,
    /// Fallback values for placeholders.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, String>,
}

impl Bookmark {
    /// Placeholder names in the URL, in order of first appearance.
    pub fn params(&self) -> Vec<String> {
        placeholders(&self.url)
    }

    fn from_entry(key: &str, value: &Value) -> Result<Self, BookmarkError> {
        let Value::Object(fields) = value else {
            return Err(BookmarkError::NotABookmark(key.to_string()));
        };

        let description = required_string(key, fields, "description")?;
        let url = required_string(key, fields, "url")?;
        let old_url = match optional_string(key, fields, "old-url")? {
            Some(old) => Some(old),
            None => optional_string(key, fields, "oldurl")?,
        };

        let mut defaults = BTreeMap::new();
        match fields.get("defaults") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    let Value::String(value) = value else {
                        return Err(BookmarkError::WrongType {
                            key: key.to_string(),
                            field: "defaults",
                        });
                    };
                    defaults.insert(name.clone(), value.clone());
                }
            }
            Some(_) => {
                return Err(BookmarkError::WrongType {
                    key: key.to_string(),
                    field: "defaults",
                });
            }
        }

        Ok(Self {
            key: key.to_string(),
            description,
            url,
            old_url,
            defaults,
        })
    }
}

fn required_string(
    key: &str,
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<String, BookmarkError> {
    optional_string(key, fields, field)?.ok_or_else(|| BookmarkError::MissingField {
        key: key.to_string(),
        field,
    })
}

fn optional_string(
    key: &str,
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, BookmarkError> {
    match fields.get(field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(BookmarkError::WrongType {
            key: key.to_string(),
            field,
        }),
    }
}

/// All bookmarks, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkStore {
    bookmarks: BTreeMap<String, Bookmark>,
}

impl BookmarkStore {
    pub fn load(path: &Path) -> Result<Self, BookmarkError> {
        let content = std::fs::read_to_string(path).map_err(|source| BookmarkError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, BookmarkError> {
        let value: Value = serde_json::from_str(content)?;
        let Value::Object(entries) = value else {
            return Err(BookmarkError::NotAnObject);
        };

        let mut bookmarks = BTreeMap::new();
        for (key, entry) in &entries {
            if !KEY_REGEX.is_match(key) {
                return Err(BookmarkError::InvalidKey(key.clone()));
            }
            bookmarks.insert(key.clone(), Bookmark::from_entry(key, entry)?);
        }
        if let Some(reserved) = RESERVED_KEYS.iter().find(|k| bookmarks.contains_key(**k)) {
            return Err(BookmarkError::ReservedKey(reserved.to_string()));
        }

        Ok(Self { bookmarks })
    }

    pub fn get(&self, key: &str) -> Option<&Bookmark> {
        self.bookmarks.get(key)
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bookmark> {
        self.bookmarks.values()
    }

    /// Bookmarks whose key starts with `term` or whose description contains
    /// it, ignoring case. At most `limit`, in key order.
    pub fn suggest(&self, term: &str, limit: usize) -> Vec<&Bookmark> {
        let term = term.to_lowercase();
        self.iter()
            .filter(|b| {
                b.key.to_lowercase().starts_with(&term)
                    || b.description.to_lowercase().contains(&term)
            })
            .take(limit)
            .collect()
    }

    /// Short fingerprint of every key, URL and description.
    ///
    /// First 16 hex chars of SHA-256 over
    /// `[{"description": .., "key": .., "url": ..}, ..]` in key order, with
    /// `", "`/`": "` separators and non-ASCII escaped, so the value is stable
    /// across reloads and clients can poll it to detect changes.
    pub fn content_hash(&self) -> String {
        let entries: Vec<String> = self
            .iter()
            .map(|b| {
                format!(
                    "{{\"description\": {}, \"key\": {}, \"url\": {}}}",
                    ascii_json_string(&b.description),
                    ascii_json_string(&b.key),
                    ascii_json_string(&b.url)
                )
            })
            .collect();
        let canonical = format!("[{}]", entries.join(", "));

        let digest = Sha256::digest(canonical.as_bytes());
        let mut hex = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            hex.push_str(&format!("{:02x}", byte));
        }
        hex
    }
}

fn ascii_json_string(s: &str) -> String {
    let json = Value::String(s.to_string()).to_string();
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() && ch != '\u{7f}' {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
