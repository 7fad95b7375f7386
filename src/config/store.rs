use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ini::{self, Sections};
use crate::error::{Result, TardisError};

/// Mode bits a strict-mode config file may carry: owner read/write only.
const STRICT_MODE_MASK: u32 = 0o600;

static VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^,}]+),([^}]+)\}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Refuse files with any permission bit beyond owner read/write.
    Strict,
    /// No permission check (image metadata lives inside the image).
    Relaxed,
}

/// Two-level section/key/value store over the INI dialect, with one-pass
/// `${section,key}` resolution and canonical write-back.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    sections: Sections,
    modified: bool,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path, strictness: Strictness) -> Result<Self> {
        if strictness == Strictness::Strict {
            check_mode(path)?;
        }
        let text = fs::read_to_string(path).map_err(|e| {
            TardisError::message(format!("read {}: {}", path.display(), e))
        })?;
        let mut store = Self::from_str(&text)?;
        store.resolve_vars();
        Ok(store)
    }

    pub fn from_str(text: &str) -> Result<Self> {
        let sections = ini::parse(text)?;
        Ok(ConfigStore {
            sections,
            modified: false,
        })
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self.modified = true;
    }

    pub fn remove(&mut self, section: &str, key: &str) -> Option<String> {
        let removed = self.sections.get_mut(section)?.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn section(&self, section: &str) -> Option<&std::collections::BTreeMap<String, String>> {
        self.sections.get(section)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// One resolution pass: every `${section,key}` occurrence is replaced by
    /// the referenced value, absent references by the empty string.
    /// References appearing only after substitution stay literal.
    pub fn resolve_vars(&mut self) {
        let snapshot = self.sections.clone();
        for section in self.sections.values_mut() {
            for value in section.values_mut() {
                if !value.contains("${") {
                    continue;
                }
                let resolved = VAR_RE.replace_all(value, |caps: &regex::Captures<'_>| {
                    snapshot
                        .get(&caps[1])
                        .and_then(|s| s.get(&caps[2]))
                        .cloned()
                        .unwrap_or_default()
                });
                if resolved != *value {
                    *value = resolved.into_owned();
                    self.modified = true;
                }
            }
        }
    }

    /// Canonical write: sorted sections, all values quoted. `skip` omits
    /// whole sections; unless `force`, an unmodified store is left alone.
    pub fn write(&mut self, path: &Path, skip: &HashSet<String>, force: bool) -> Result<()> {
        if !self.modified && !force {
            return Ok(());
        }
        let mut out = String::new();
        for (name, pairs) in &self.sections {
            if skip.contains(name) {
                continue;
            }
            if name != ini::DEFAULT_SECTION {
                out.push_str(&format!("[{}]\n", name));
            }
            for (key, value) in pairs {
                out.push_str(&format!("{} = \"{}\"\n", key, value));
            }
            out.push('\n');
        }
        write_atomic(path, &out)?;
        self.modified = false;
        Ok(())
    }
}

/// Write-to-temp in the target directory, then rename over the destination.
/// A crash mid-write leaves either the old or the new content.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        TardisError::message(format!("{} has no parent directory", path.display()))
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        TardisError::message(format!("create temp file in {}: {}", dir.display(), e))
    })?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| TardisError::message(format!("write {}: {}", path.display(), e)))?;
    tmp.persist(path)
        .map_err(|e| TardisError::message(format!("rename into {}: {}", path.display(), e)))?;
    Ok(())
}

fn check_mode(path: &Path) -> Result<()> {
    let meta = fs::metadata(path)
        .map_err(|e| TardisError::message(format!("stat {}: {}", path.display(), e)))?;
    let mode = meta.permissions().mode() & 0o7777;
    if mode & !STRICT_MODE_MASK != 0 {
        return Err(TardisError::Permission(format!(
            "{} has mode {:04o}; must be no more open than 0600",
            path.display(),
            mode
        )));
    }
    Ok(())
}
