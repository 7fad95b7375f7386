//! Line-oriented INI dialect used by config files and image metadata.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

pub type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// Section name of key/value pairs seen before the first `[section]` header.
pub const DEFAULT_SECTION: &str = "";

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\]]+)\]\s*$").unwrap());
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*([^=]+?)\s*=\s*"([^"]*)"\s*$"#).unwrap());
static BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([^=]+?)\s*=(.*)$").unwrap());

/// Parse the dialect. Rules apply in order: comments and blanks, section
/// headers, quoted assignments, bare assignments with trailing comments.
/// Anything else is a syntax error carrying the 1-based line number.
pub fn parse(text: &str) -> Result<Sections, ConfigError> {
    let mut sections = Sections::new();
    let mut current = DEFAULT_SECTION.to_string();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(caps) = SECTION_RE.captures(raw) {
            current = caps[1].to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some(caps) = QUOTED_RE.captures(raw) {
            sections
                .entry(current.clone())
                .or_default()
                .insert(caps[1].to_string(), caps[2].to_string());
            continue;
        }
        if let Some(caps) = BARE_RE.captures(raw) {
            let value = strip_comment(&caps[2]).trim().to_string();
            sections
                .entry(current.clone())
                .or_default()
                .insert(caps[1].to_string(), value);
            continue;
        }
        return Err(ConfigError::Syntax {
            line: idx + 1,
            text: raw.trim().to_string(),
        });
    }
    Ok(sections)
}

fn strip_comment(value: &str) -> &str {
    match value.find(['#', ';']) {
        Some(pos) => &value[..pos],
        None => value,
    }
}
