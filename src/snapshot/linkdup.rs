//! Deep hard-link duplication: the new tree's directories are recreated,
//! regular files share inodes with the source, symlinks and device nodes
//! are reproduced. This is what makes backup.1 a near-free copy of backup.0.

use std::collections::HashSet;
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{symlink, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Result, TardisError};

pub fn duplicate_tree(src: &Path, dst: &Path) -> Result<()> {
    let src_meta = fs::symlink_metadata(src)
        .map_err(|e| TardisError::message(format!("stat {}: {}", src.display(), e)))?;
    fs::create_dir(dst)
        .map_err(|e| TardisError::message(format!("create {}: {}", dst.display(), e)))?;
    fs::set_permissions(dst, fs::Permissions::from_mode(src_meta.mode() & 0o7777))
        .map_err(|e| TardisError::message(format!("chmod {}: {}", dst.display(), e)))?;

    // directory mtimes are restored after the walk; creating children
    // would clobber them otherwise
    let mut dir_times = vec![(dst.to_path_buf(), times_of(&src_meta))];

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry =
            entry.map_err(|e| TardisError::message(format!("walk {}: {}", src.display(), e)))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| TardisError::message(format!("walk {}: {}", src.display(), e)))?;
        let target = dst.join(rel);
        let meta = entry
            .metadata()
            .map_err(|e| TardisError::message(format!("stat {}: {}", entry.path().display(), e)))?;
        let ft = entry.file_type();

        if ft.is_dir() {
            fs::create_dir(&target)
                .map_err(|e| TardisError::message(format!("create {}: {}", target.display(), e)))?;
            fs::set_permissions(&target, fs::Permissions::from_mode(meta.mode() & 0o7777))
                .map_err(|e| TardisError::message(format!("chmod {}: {}", target.display(), e)))?;
            dir_times.push((target, times_of(&meta)));
        } else if ft.is_file() {
            fs::hard_link(entry.path(), &target).map_err(|e| {
                TardisError::message(format!(
                    "link {} -> {}: {}",
                    entry.path().display(),
                    target.display(),
                    e
                ))
            })?;
        } else if ft.is_symlink() {
            let referent = fs::read_link(entry.path()).map_err(|e| {
                TardisError::message(format!("readlink {}: {}", entry.path().display(), e))
            })?;
            symlink(&referent, &target).map_err(|e| {
                TardisError::message(format!("symlink {}: {}", target.display(), e))
            })?;
        } else {
            mknod_like(&target, &meta).map_err(|e| {
                TardisError::message(format!("mknod {}: {}", target.display(), e))
            })?;
        }
    }

    // deepest-first so parent mtimes are not disturbed again
    for (path, (atime, mtime)) in dir_times.into_iter().rev() {
        set_times(&path, atime, mtime)
            .map_err(|e| TardisError::message(format!("utimensat {}: {}", path.display(), e)))?;
    }
    Ok(())
}

/// Distinct inode count under `path`; the admit step uses it to estimate
/// what duplicating backup.0 will cost in inodes.
pub fn unique_inode_count(path: &Path) -> Result<u64> {
    if !path.is_dir() {
        return Ok(0);
    }
    let mut inodes = HashSet::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry =
            entry.map_err(|e| TardisError::message(format!("walk {}: {}", path.display(), e)))?;
        let meta = entry
            .metadata()
            .map_err(|e| TardisError::message(format!("stat {}: {}", entry.path().display(), e)))?;
        inodes.insert(meta.ino());
    }
    Ok(inodes.len() as u64)
}

fn times_of(meta: &fs::Metadata) -> (libc::timespec, libc::timespec) {
    (
        libc::timespec {
            tv_sec: meta.atime() as libc::time_t,
            tv_nsec: meta.atime_nsec() as libc::c_long,
        },
        libc::timespec {
            tv_sec: meta.mtime() as libc::time_t,
            tv_nsec: meta.mtime_nsec() as libc::c_long,
        },
    )
}

fn set_times(path: &Path, atime: libc::timespec, mtime: libc::timespec) -> io::Result<()> {
    let cpath = cstring(path)?;
    let times = [atime, mtime];
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, cpath.as_ptr(), times.as_ptr(), 0) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn mknod_like(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    let cpath = cstring(path)?;
    let rc = unsafe {
        libc::mknod(
            cpath.as_ptr(),
            meta.mode() as libc::mode_t,
            meta.rdev() as libc::dev_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))
}
