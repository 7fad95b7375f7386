use std::path::Path;
use std::process::Command;

use crate::error::{ImageError, Result};
use crate::util::command::{run_capture, run_command};

/// Loop-mount an image file. `mount_args` come from `server.mountargs`.
pub fn mount_loop(
    file: &Path,
    mountpoint: &Path,
    fs_type: &str,
    mount_args: &str,
) -> Result<()> {
    let mut options = String::from("loop");
    if !mount_args.trim().is_empty() {
        options.push(',');
        options.push_str(mount_args.trim());
    }
    let mut cmd = Command::new("mount");
    cmd.arg("-t")
        .arg(fs_type)
        .arg("-o")
        .arg(&options)
        .arg(file)
        .arg(mountpoint);
    let rc = run_command(&mut cmd)?;
    if rc != 0 {
        return Err(ImageError::MountFailure(format!(
            "{} failed with exit code {}",
            file.display(),
            rc
        ))
        .into());
    }
    Ok(())
}

pub fn unmount_path(mountpoint: &Path) -> Result<()> {
    let mut cmd = Command::new("umount");
    cmd.arg(mountpoint);
    let rc = run_command(&mut cmd)?;
    if rc != 0 {
        return Err(ImageError::UmountFailure(format!(
            "{} failed with exit code {}",
            mountpoint.display(),
            rc
        ))
        .into());
    }
    Ok(())
}

/// Attach `file` to a free loop device; the chosen device path is the result.
pub fn loop_attach(file: &Path) -> Result<String> {
    let mut cmd = Command::new("losetup");
    cmd.arg("--find").arg("--show").arg(file);
    let (rc, device) = run_capture(&mut cmd)?;
    if rc != 0 || device.is_empty() {
        return Err(ImageError::LoopAttach(format!(
            "{} failed with exit code {}",
            file.display(),
            rc
        ))
        .into());
    }
    Ok(device)
}

pub fn loop_detach(device: &str) -> Result<()> {
    let mut cmd = Command::new("losetup");
    cmd.arg("-d").arg(device);
    let rc = run_command(&mut cmd)?;
    if rc != 0 {
        return Err(ImageError::LoopDetach(format!(
            "{} failed with exit code {}",
            device, rc
        ))
        .into());
    }
    Ok(())
}

/// `mkfs -t <type> [opts] <device>`; any non-zero exit is fatal.
pub fn mkfs(device: &str, fs_type: &str, extra_opts: &str) -> Result<()> {
    let mut cmd = Command::new("mkfs");
    cmd.arg("-t").arg(fs_type);
    for opt in extra_opts.split_whitespace() {
        cmd.arg(opt);
    }
    cmd.arg(device);
    let rc = run_command(&mut cmd)?;
    if rc != 0 {
        return Err(ImageError::Format(format!(
            "-t {} {} failed with exit code {}",
            fs_type, device, rc
        ))
        .into());
    }
    Ok(())
}
