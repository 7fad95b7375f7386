use std::env;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, TardisError};

static CONFIG_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+$").unwrap());

pub fn is_safe_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Install root derived from the executable location; a `bin/` directory
/// collapses to its parent so configs live beside it.
pub fn install_root() -> Result<PathBuf> {
    let exe = env::current_exe()
        .map_err(|e| TardisError::message(format!("locate executable: {}", e)))?;
    let dir = exe
        .parent()
        .ok_or_else(|| TardisError::message("executable has no parent directory"))?;
    if dir.file_name().map(|n| n == "bin").unwrap_or(false) {
        Ok(dir
            .parent()
            .unwrap_or_else(|| Path::new("/"))
            .to_path_buf())
    } else {
        Ok(dir.to_path_buf())
    }
}

/// Resolve `<root>/config/<name>`, rejecting names outside `^\w+$` and
/// files that do not exist.
pub fn config_path(root: &Path, name: &str) -> Result<PathBuf> {
    if !CONFIG_NAME_RE.is_match(name) {
        return Err(TardisError::usage(format!(
            "config name {:?} must match ^\\w+$",
            name
        )));
    }
    let path = root.join("config").join(name);
    if !path.is_file() {
        return Err(TardisError::usage(format!(
            "no config {:?} under {}",
            name,
            root.join("config").display()
        )));
    }
    Ok(path)
}
