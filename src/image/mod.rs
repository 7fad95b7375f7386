//! Image lifecycle: sparse file creation, formatting, loop mount/unmount,
//! metadata bootstrapping, first-mount ownership.

pub mod meta;

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::process::Command;

use crate::error::{ImageError, Result, TardisError};
use crate::image::meta::ImageMeta;
use crate::mount::guard::LoopGuard;
use crate::mount::inspect::fs_type_at;
use crate::mount::ops::{loop_attach, mkfs, mount_loop, unmount_path};
use crate::util::command::run_command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    /// Regular file already present.
    Exists,
    /// File was built and formatted; caller owns first-mount initialisation.
    Created,
}

pub fn ensure_mountpoint(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(TardisError::message(format!(
            "{} exists and is not a directory",
            path.display()
        )));
    }
    fs::create_dir_all(path)
        .map_err(|e| TardisError::message(format!("create {}: {}", path.display(), e)))?;
    Ok(())
}

/// Build the sparse image if it is missing: allocate, attach to a loop
/// device, format, detach. The loop device is released on every exit path.
pub fn ensure_image(file: &Path, size: u64, fs_type: &str, mkfs_args: &str) -> Result<ImageState> {
    match fs::symlink_metadata(file) {
        Ok(meta) if meta.is_file() => return Ok(ImageState::Exists),
        Ok(_) => {
            return Err(ImageError::NotRegularFile(file.display().to_string()).into());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(TardisError::message(format!(
                "stat {}: {}",
                file.display(),
                e
            )));
        }
    }

    allocate_sparse(file, size)?;
    let guard = LoopGuard::new(loop_attach(file)?);
    mkfs(guard.device(), fs_type, mkfs_args)?;
    guard.detach()?;
    Ok(ImageState::Created)
}

/// One zero byte at offset size-1: declared length without physical blocks.
fn allocate_sparse(file: &Path, size: u64) -> Result<()> {
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(file)
        .map_err(|e| TardisError::message(format!("create {}: {}", file.display(), e)))?;
    if size > 0 {
        f.seek(SeekFrom::Start(size - 1))
            .map_err(|e| TardisError::message(format!("seek {}: {}", file.display(), e)))?;
        f.write_all(&[0])
            .map_err(|e| TardisError::message(format!("write {}: {}", file.display(), e)))?;
    }
    Ok(())
}

/// Mount the image (idempotent when it is already up with the right
/// filesystem), bootstrap metadata, apply first-mount ownership.
/// The recorded size is returned; the caller warns when it differs from the
/// declared size and continues with the recorded one.
pub fn mount_image(
    file: &Path,
    mountpoint: &Path,
    fs_type: &str,
    mount_args: &str,
    declared_size: u64,
    owner: Option<(&str, &str)>,
) -> Result<u64> {
    let mounted_ourselves = match fs_type_at(mountpoint)? {
        Some(found) if found == fs_type => false,
        Some(found) => {
            return Err(ImageError::FsTypeMismatch(
                mountpoint.display().to_string(),
                found,
                fs_type.to_string(),
            )
            .into());
        }
        None => {
            mount_loop(file, mountpoint, fs_type, mount_args)?;
            true
        }
    };

    let outcome = (|| {
        let (meta, _) = ImageMeta::load_or_create(mountpoint, declared_size)?;
        if let Some((user, group)) = owner {
            chown_recursive(mountpoint, user, group)?;
        }
        meta.size()
    })();

    if outcome.is_err() && mounted_ourselves {
        let _ = unmount_path(mountpoint);
    }
    outcome
}

pub fn unmount_image(mountpoint: &Path) -> Result<()> {
    if fs_type_at(mountpoint)?.is_none() {
        return Err(ImageError::NotMounted(mountpoint.display().to_string()).into());
    }
    unmount_path(mountpoint)
}

fn chown_recursive(path: &Path, user: &str, group: &str) -> Result<()> {
    let uid = nix::unistd::User::from_name(user)
        .map_err(|e| TardisError::message(format!("resolve user {}: {}", user, e)))?
        .ok_or_else(|| TardisError::message(format!("unknown user {}", user)))?
        .uid;
    let gid = nix::unistd::Group::from_name(group)
        .map_err(|e| TardisError::message(format!("resolve group {}: {}", group, e)))?
        .ok_or_else(|| TardisError::message(format!("unknown group {}", group)))?
        .gid;
    let mut cmd = Command::new("chown");
    cmd.arg("-R").arg(format!("{}:{}", uid, gid)).arg(path);
    let rc = run_command(&mut cmd)?;
    if rc != 0 {
        return Err(TardisError::message(format!(
            "chown {} failed with exit code {}",
            path.display(),
            rc
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn ensure_mountpoint_creates_and_checks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mnt/home");
        ensure_mountpoint(&target).unwrap();
        assert!(target.is_dir());
        // second call is a no-op
        ensure_mountpoint(&target).unwrap();

        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(ensure_mountpoint(&file).is_err());
    }

    #[test]
    fn sparse_allocation_declares_full_length() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tree.timg");
        let size = 16 * 1024 * 1024;
        allocate_sparse(&file, size).unwrap();
        let meta = fs::metadata(&file).unwrap();
        assert_eq!(meta.len(), size);
        // physical blocks far below the declared length
        assert!(meta.blocks() * 512 < size);
    }

    #[test]
    fn ensure_image_rejects_non_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("tree.timg");
        fs::create_dir(&sub).unwrap();
        assert!(matches!(
            ensure_image(&sub, 1024, "xfs", ""),
            Err(TardisError::Image(ImageError::NotRegularFile(_)))
        ));
    }

    #[test]
    fn ensure_image_reports_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tree.timg");
        fs::write(&file, b"already formatted").unwrap();
        assert_eq!(
            ensure_image(&file, 1024, "xfs", "").unwrap(),
            ImageState::Exists
        );
    }
}
