use std::fs;
use std::path::Path;

use crate::error::{Result, TardisError};

fn read_mounts() -> Result<String> {
    fs::read_to_string("/proc/self/mounts")
        .map_err(|e| TardisError::message(format!("read /proc/self/mounts: {}", e)))
}

pub fn mountpoint_is_mounted(mountpoint: &Path) -> Result<bool> {
    Ok(fs_type_at(mountpoint)?.is_some())
}

/// Filesystem type of whatever is mounted at `mountpoint`, if anything.
pub fn fs_type_at(mountpoint: &Path) -> Result<Option<String>> {
    let contents = read_mounts()?;
    Ok(fs_type_in(&contents, mountpoint))
}

fn fs_type_in(mounts: &str, mountpoint: &Path) -> Option<String> {
    // last match wins: overmounts shadow earlier entries
    let mut found = None;
    for line in mounts.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        if Path::new(&unescape_octal(fields[1])) == mountpoint {
            found = Some(fields[2].to_string());
        }
    }
    found
}

/// /proc/self/mounts escapes spaces and friends as \040 etc.
fn unescape_octal(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let bytes = field.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let oct = &field[i + 1..i + 4];
            if let Ok(code) = u8::from_str_radix(oct, 8) {
                out.push(code as char);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
/dev/sda1 / ext4 rw,relatime 0 0
/dev/loop3 /backup/home xfs rw,noatime 0 0
tmpfs /backup/with\\040space tmpfs rw 0 0
";

    #[test]
    fn finds_fs_type_for_mountpoint() {
        assert_eq!(
            fs_type_in(MOUNTS, Path::new("/backup/home")),
            Some("xfs".to_string())
        );
        assert_eq!(fs_type_in(MOUNTS, Path::new("/backup/etc")), None);
    }

    #[test]
    fn last_entry_wins_for_overmounts() {
        let mounts = "\
/dev/loop1 /backup/home ext3 rw 0 0
/dev/loop2 /backup/home xfs rw 0 0
";
        assert_eq!(
            fs_type_in(mounts, Path::new("/backup/home")),
            Some("xfs".to_string())
        );
    }

    #[test]
    fn octal_escapes_are_decoded() {
        assert_eq!(
            fs_type_in(MOUNTS, Path::new("/backup/with space")),
            Some("tmpfs".to_string())
        );
    }
}
