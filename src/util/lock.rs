//! Per-tree advisory lock. Each server operation holds the lock for its
//! tree (or the dump store) for the length of the invocation; a live
//! holder is a temporary failure the client may retry, a dead holder's
//! lock is reclaimed on the spot.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SpaceError, TardisError};

const ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // only the pid that took the lock may remove it
        if holder_pid(&self.path) == Some(std::process::id()) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn lock_path(base: &Path, name: &str) -> PathBuf {
    base.join(format!(".tardis.{}.lock", name))
}

fn holder_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Take the lock for `name` under `base` for the rest of the invocation.
pub fn acquire(base: &Path, name: &str) -> Result<LockGuard> {
    let path = lock_path(base, name);
    for _ in 0..ACQUIRE_ATTEMPTS {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                writeln!(f, "{}", std::process::id()).map_err(|e| {
                    TardisError::message(format!("write {}: {}", path.display(), e))
                })?;
                return Ok(LockGuard { path });
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                match holder_pid(&path) {
                    Some(pid) if pid_alive(pid) => {
                        return Err(SpaceError::Busy(format!(
                            "{} held by pid {}",
                            path.display(),
                            pid
                        ))
                        .into());
                    }
                    // dead holder, or the file vanished or is garbage
                    _ => {
                        tracing::debug!("reclaiming stale lock {}", path.display());
                        if let Err(err) = fs::remove_file(&path) {
                            if err.kind() != ErrorKind::NotFound {
                                return Err(TardisError::message(format!(
                                    "failed to reclaim {}: {}",
                                    path.display(),
                                    err
                                )));
                            }
                        }
                    }
                }
            }
            Err(err) => {
                return Err(TardisError::message(format!(
                    "failed to lock {}: {}",
                    path.display(),
                    err
                )));
            }
        }
    }
    Err(SpaceError::Busy(path.display().to_string()).into())
}
