//! Filesystem capacity probe: bytes and inodes for a given path.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::{Result, TardisError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// 0 when the filesystem does not track an inode limit.
    pub total_inodes: u64,
    /// -1 when there is no inode constraint.
    pub free_inodes: i64,
}

impl FsStats {
    pub fn inode_limited(&self) -> bool {
        self.total_inodes > 0
    }
}

pub fn probe(path: &Path) -> Result<FsStats> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| TardisError::message(format!("{} contains a NUL byte", path.display())))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let res = unsafe { libc::statvfs(cpath.as_ptr(), &mut stat) };
    if res != 0 {
        let err = io::Error::last_os_error();
        return Err(TardisError::message(format!(
            "statvfs {}: {}",
            path.display(),
            err
        )));
    }

    let frsize = stat.f_frsize as u64;
    let blocks = stat.f_blocks as u64;
    let bfree = stat.f_bfree as u64;
    let bavail = stat.f_bavail as u64;
    let files = stat.f_files as u64;
    let favail = stat.f_favail as u64;

    let (total_inodes, free_inodes) = if files == 0 {
        (0, -1)
    } else {
        (files, favail as i64)
    };

    Ok(FsStats {
        total_bytes: blocks * frsize,
        used_bytes: blocks.saturating_sub(bfree) * frsize,
        free_bytes: bavail * frsize,
        total_inodes,
        free_inodes,
    })
}
