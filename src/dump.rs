//! Size-capped dump directory: timestamped compressed dumps with the same
//! oldest-first eviction discipline as the snapshot ring.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use walkdir::WalkDir;

use crate::config::model::ServerConfig;
use crate::error::{Result, SpaceError, TardisError};
use crate::fsprobe;
use crate::size::format_size;

/// Only files shaped like `<name>-<YYYYMMDD>-<HHMM>.sql.bz2` may ever be
/// unlinked by the eviction pass.
static DUMP_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+-\d{8}-\d{4}\.sql\.bz2$").unwrap());

#[derive(Debug, Clone)]
pub struct DumpReport {
    pub used_before: u64,
    pub used_after: u64,
    pub limit: u64,
    pub evicted: Vec<PathBuf>,
    /// Dump files remaining after the admit.
    pub remaining: usize,
}

/// Reserve quota room for an incoming dump of `req_bytes`, evicting the
/// oldest dumps beyond the retention floor when the cap would be exceeded.
pub fn admit_dump(dir: &Path, req_bytes: u64, server: &ServerConfig) -> Result<DumpReport> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .map_err(|e| TardisError::message(format!("create {}: {}", dir.display(), e)))?;
    }

    let limit = server.dbsize;
    let used = dir_usage(dir)?;
    if used + req_bytes <= limit {
        return Ok(DumpReport {
            used_before: used,
            used_after: used,
            limit,
            evicted: Vec::new(),
            remaining: list_dumps_oldest_first(dir)?.len(),
        });
    }

    let need = used + req_bytes - limit;
    let files = list_dumps_oldest_first(dir)?;
    let floor = server.forcedbs;
    let candidates: &[(PathBuf, SystemTime, u64)] = if files.len() > floor {
        &files[..files.len() - floor]
    } else {
        &[]
    };

    // first pass: is the need reachable at all?
    let mut reachable = 0u64;
    let mut take = 0usize;
    for (_, _, size) in candidates {
        reachable += size;
        take += 1;
        if reachable >= need {
            break;
        }
    }
    if reachable < need {
        return Err(SpaceError::DumpShortfall {
            shortfall: format_size(need - reachable),
        }
        .into());
    }

    // second pass: unlink, whitelisted names only, counting real successes
    let mut freed = 0u64;
    let mut evicted = Vec::new();
    for (path, _, size) in &candidates[..take] {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !DUMP_NAME_RE.is_match(&name) {
            println!("WARNING: skipping {}: not a dump file name", name);
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("evicted dump {}", path.display());
                freed += size;
                evicted.push(path.clone());
            }
            Err(e) => {
                println!("WARNING: could not delete {}: {}", path.display(), e);
            }
        }
    }
    if freed < need {
        return Err(SpaceError::DumpShortfall {
            shortfall: format_size(need - freed),
        }
        .into());
    }

    Ok(DumpReport {
        used_before: used,
        used_after: used - freed,
        limit,
        evicted,
        remaining: list_dumps_oldest_first(dir)?.len(),
    })
}

/// The logical quota can be smaller than the device, never larger: confirm
/// the underlying filesystem really has room for the incoming dump.
pub fn check_physical_space(dir: &Path, req_bytes: u64) -> Result<()> {
    let stats = fsprobe::probe(dir)?;
    if stats.free_bytes < req_bytes {
        return Err(SpaceError::PhysicalShortfall {
            dir: dir.display().to_string(),
            free: format_size(stats.free_bytes),
            request: format_size(req_bytes),
        }
        .into());
    }
    Ok(())
}

/// Recursive byte total of everything under `dir`.
pub fn dir_usage(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry =
            entry.map_err(|e| TardisError::message(format!("walk {}: {}", dir.display(), e)))?;
        if entry.file_type().is_file() {
            let meta = entry.metadata().map_err(|e| {
                TardisError::message(format!("stat {}: {}", entry.path().display(), e))
            })?;
            total += meta.len();
        }
    }
    Ok(total)
}

fn list_dumps_oldest_first(dir: &Path) -> Result<Vec<(PathBuf, SystemTime, u64)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .map_err(|e| TardisError::message(format!("read {}: {}", dir.display(), e)))?
    {
        let entry =
            entry.map_err(|e| TardisError::message(format!("read {}: {}", dir.display(), e)))?;
        let meta = entry
            .metadata()
            .map_err(|e| TardisError::message(format!("stat {}: {}", entry.path().display(), e)))?;
        if !meta.is_file() {
            continue;
        }
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((entry.path(), mtime, meta.len()));
    }
    files.sort_by_key(|(_, mtime, _)| *mtime);
    Ok(files)
}
