//! Snapshot-ring maintenance: reclaim space oldest-first, rotate the ring,
//! duplicate backup.0 into backup.1 by hard links, stamp completion times.

pub mod linkdup;

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::ServerConfig;
use crate::error::{Result, SpaceError, TardisError};
use crate::fsprobe::{self, FsStats};
use crate::image::meta::ImageMeta;
use crate::size::format_size;
use crate::types::Timestamp;

const SNAPSHOT_PREFIX: &str = "backup.";

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub index: u64,
    pub path: PathBuf,
}

/// The ring, oldest first (descending numeric suffix). A suffix that does
/// not parse sorts as 0.
pub fn list_ring(mountpoint: &Path) -> Result<Vec<Snapshot>> {
    let mut ring = Vec::new();
    let entries = fs::read_dir(mountpoint)
        .map_err(|e| TardisError::message(format!("read {}: {}", mountpoint.display(), e)))?;
    for entry in entries {
        let entry = entry
            .map_err(|e| TardisError::message(format!("read {}: {}", mountpoint.display(), e)))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(suffix) = name.strip_prefix(SNAPSHOT_PREFIX) else {
            continue;
        };
        if !entry.path().is_dir() {
            continue;
        }
        ring.push(Snapshot {
            index: suffix.parse().unwrap_or(0),
            path: entry.path(),
        });
    }
    ring.sort_by(|a, b| b.index.cmp(&a.index));
    Ok(ring)
}

fn snapshot_dir(mountpoint: &Path, index: u64) -> PathBuf {
    mountpoint.join(format!("{}{}", SNAPSHOT_PREFIX, index))
}

/// Drop metadata entries whose directory no longer exists: on-disk truth
/// wins over stale bookkeeping.
pub fn reconcile(mountpoint: &Path, meta: &mut ImageMeta) -> Result<()> {
    for index in meta.snapshots().keys().copied().collect::<Vec<_>>() {
        if !snapshot_dir(mountpoint, index).is_dir() {
            tracing::debug!("reconcile: dropping stale snapshots.backup.{}", index);
            meta.remove_snapshot(index);
        }
    }
    meta.persist(mountpoint)
}

#[derive(Debug, Clone, Copy)]
pub struct AdmitRequest {
    pub bytes: u64,
    pub inodes: u64,
}

#[derive(Debug, Clone)]
pub struct AdmitReport {
    pub evicted: Vec<u64>,
    pub before: FsStats,
    pub after: FsStats,
}

/// Reserve room for the next rsync. Never rotates; deletions are persisted
/// to metadata whether or not the reservation ultimately succeeds.
pub fn admit(
    mountpoint: &Path,
    meta: &mut ImageMeta,
    req: AdmitRequest,
    server: &ServerConfig,
) -> Result<AdmitReport> {
    admit_with(mountpoint, meta, req, server, &fsprobe::probe)
}

pub(crate) fn admit_with(
    mountpoint: &Path,
    meta: &mut ImageMeta,
    req: AdmitRequest,
    server: &ServerConfig,
    probe: &dyn Fn(&Path) -> Result<FsStats>,
) -> Result<AdmitReport> {
    reconcile(mountpoint, meta)?;
    let before = probe(mountpoint)?;

    let need_bytes = req.bytes + server.bytebuffer;
    let mut need_inodes = req.inodes + server.inodebuffer;

    if need_bytes >= before.total_bytes {
        return Err(SpaceError::CouldNeverFit {
            request: format_size(need_bytes),
            total: format_size(before.total_bytes),
        }
        .into());
    }
    if before.inode_limited() && need_inodes >= before.total_inodes {
        return Err(SpaceError::InodesCouldNeverFit {
            request: need_inodes,
            total: before.total_inodes,
        }
        .into());
    }
    if before.inode_limited() {
        need_inodes += linkdup::unique_inode_count(&snapshot_dir(mountpoint, 0))?;
    }

    let fits = |stats: &FsStats| {
        need_bytes <= stats.free_bytes
            && (!stats.inode_limited() || (need_inodes as i64) < stats.free_inodes)
    };

    if fits(&before) {
        return Ok(AdmitReport {
            evicted: Vec::new(),
            before,
            after: before,
        });
    }

    let ring = list_ring(mountpoint)?;
    let floor = server.forcesnaps as usize;
    let candidates: Vec<Snapshot> = if ring.len() > floor {
        ring[..ring.len() - floor].to_vec()
    } else {
        Vec::new()
    };
    if candidates.is_empty() {
        return Err(SpaceError::RetentionFloor {
            floor: server.forcesnaps,
        }
        .into());
    }

    let mut evicted = Vec::new();
    let mut current = before;
    for snap in candidates {
        if snap.index < server.forcesnaps {
            break;
        }
        if fits(&current) {
            break;
        }
        tracing::debug!("reclaim: deleting backup.{}", snap.index);
        match fs::remove_dir_all(&snap.path) {
            Ok(()) => {
                meta.remove_snapshot(snap.index);
                evicted.push(snap.index);
            }
            Err(e) => {
                println!("WARNING: could not delete backup.{}: {}", snap.index, e);
                continue;
            }
        }
        current = probe(mountpoint)?;
    }
    meta.persist(mountpoint)?;

    if fits(&current) {
        Ok(AdmitReport {
            evicted,
            before,
            after: current,
        })
    } else if need_bytes > current.free_bytes {
        Err(SpaceError::Shortfall {
            shortfall: format_size(need_bytes - current.free_bytes),
        }
        .into())
    } else {
        let free = current.free_inodes.max(0) as u64;
        Err(SpaceError::InodeShortfall {
            shortfall: need_inodes.saturating_sub(free),
        }
        .into())
    }
}

/// Shift the ring up one slot and duplicate backup.0 into backup.1, so the
/// rsync that follows can mutate backup.0 without destroying the previous
/// snapshot. Runs only after a successful admit.
pub fn rotate(mountpoint: &Path, meta: &mut ImageMeta) -> Result<()> {
    let ring = list_ring(mountpoint)?;
    if ring.is_empty() {
        // first-ever backup; rsync has not created backup.0 yet
        return Ok(());
    }
    let highest = ring[0].index;
    if highest == 0 && ring.len() > 1 {
        return Err(TardisError::message(
            "snapshot ring is broken: several directories but highest index is 0",
        ));
    }

    // highest first, so no rename collides with a still-present source
    for snap in &ring {
        if snap.index == 0 {
            continue;
        }
        let target = snapshot_dir(mountpoint, snap.index + 1);
        fs::rename(&snap.path, &target).map_err(|e| {
            TardisError::message(format!(
                "rename backup.{} -> backup.{}: {}",
                snap.index,
                snap.index + 1,
                e
            ))
        })?;
        if let Some(ts) = meta.snapshot(snap.index) {
            meta.set_snapshot(snap.index + 1, ts);
        }
    }

    let zero = snapshot_dir(mountpoint, 0);
    if zero.is_dir() {
        linkdup::duplicate_tree(&zero, &snapshot_dir(mountpoint, 1))?;
        if let Some(ts) = meta.snapshot(0) {
            meta.set_snapshot(1, ts);
        }
    }
    reconcile(mountpoint, meta)
}

/// Record the completion time of the newest snapshot.
pub fn stamp(mountpoint: &Path, timestamp: Timestamp) -> Result<()> {
    let mut meta = ImageMeta::load(mountpoint)?;
    meta.set_snapshot(0, timestamp.seconds());
    meta.persist(mountpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::os::unix::fs::MetadataExt;

    fn server(forcesnaps: u64) -> ServerConfig {
        ServerConfig {
            base: PathBuf::from("/backup"),
            dbdir: "dumps".to_string(),
            dbsize: 5 << 30,
            bytebuffer: 0,
            inodebuffer: 0,
            forcedbs: 7,
            forcesnaps,
            fstype: "xfs".to_string(),
            fsopts: "-f".to_string(),
            mountargs: "noatime".to_string(),
            user: "thedoctor".to_string(),
            group: "thedoctor".to_string(),
        }
    }

    fn unconstrained(total: u64, free: u64) -> FsStats {
        FsStats {
            total_bytes: total,
            used_bytes: total - free,
            free_bytes: free,
            total_inodes: 0,
            free_inodes: -1,
        }
    }

    fn seed_ring(mountpoint: &Path, indices: &[u64]) -> ImageMeta {
        let (mut meta, _) = ImageMeta::load_or_create(mountpoint, 1 << 30).unwrap();
        for &i in indices {
            let dir = snapshot_dir(mountpoint, i);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("payload"), vec![0u8; 16]).unwrap();
            meta.set_snapshot(i, 1_700_000_000 - i as i64 * 86_400);
        }
        meta.persist(mountpoint).unwrap();
        meta
    }

    #[test]
    fn ring_lists_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        seed_ring(dir.path(), &[0, 3, 1, 10]);
        fs::write(dir.path().join("backup.not-a-dir"), b"x").unwrap();
        let ring = list_ring(dir.path()).unwrap();
        let indices: Vec<u64> = ring.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![10, 3, 1, 0]);
    }

    #[test]
    fn bogus_suffix_sorts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("backup.junk")).unwrap();
        fs::create_dir(dir.path().join("backup.2")).unwrap();
        let ring = list_ring(dir.path()).unwrap();
        assert_eq!(ring[0].index, 2);
        assert_eq!(ring[1].index, 0);
    }

    #[test]
    fn admit_fits_without_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1, 2]);
        let probe = |_: &Path| Ok(unconstrained(100, 60));
        let report = admit_with(
            dir.path(),
            &mut meta,
            AdmitRequest { bytes: 50, inodes: 0 },
            &server(2),
            &probe,
        )
        .unwrap();
        assert!(report.evicted.is_empty());
        assert!(snapshot_dir(dir.path(), 2).is_dir());
    }

    #[test]
    fn admit_impossible_request_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1, 2]);
        let probe = |_: &Path| Ok(unconstrained(100, 10));
        let err = admit_with(
            dir.path(),
            &mut meta,
            AdmitRequest { bytes: 100, inodes: 0 },
            &server(2),
            &probe,
        )
        .unwrap_err();
        assert!(err.to_string().contains("could never fit"));
        assert!(snapshot_dir(dir.path(), 2).is_dir());
        assert_eq!(meta.snapshots().len(), 3);
    }

    #[test]
    fn admit_reclaims_oldest_until_sufficient() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1, 2, 3, 4]);
        // every deletion frees 20 units
        let free = Cell::new(10u64);
        let probe = move |_: &Path| {
            let f = free.get();
            free.set(f + 20);
            Ok(unconstrained(1000, f))
        };
        let report = admit_with(
            dir.path(),
            &mut meta,
            AdmitRequest { bytes: 45, inodes: 0 },
            &server(2),
            &probe,
        )
        .unwrap();
        // first probe 10, after deleting 4 -> 30, after deleting 3 -> 50
        assert_eq!(report.evicted, vec![4, 3]);
        assert!(!snapshot_dir(dir.path(), 4).exists());
        assert!(!snapshot_dir(dir.path(), 3).exists());
        assert!(snapshot_dir(dir.path(), 2).is_dir());
        let kept: Vec<u64> = meta.snapshots().keys().copied().collect();
        assert_eq!(kept, vec![0, 1, 2]);
        // persisted, not only in memory
        let reread = ImageMeta::load(dir.path()).unwrap();
        assert_eq!(reread.snapshots().len(), 3);
    }

    #[test]
    fn admit_respects_retention_floor() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1, 2, 3, 4, 5, 6]);
        let probe = |_: &Path| Ok(unconstrained(1000, 1));
        let err = admit_with(
            dir.path(),
            &mut meta,
            AdmitRequest { bytes: 100, inodes: 0 },
            &server(7),
            &probe,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not enough snapshots"));
        assert_eq!(list_ring(dir.path()).unwrap().len(), 7);
    }

    #[test]
    fn admit_shortfall_persists_deletions() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1, 2, 3]);
        let probe = |_: &Path| Ok(unconstrained(1000, 5));
        let err = admit_with(
            dir.path(),
            &mut meta,
            AdmitRequest { bytes: 500, inodes: 0 },
            &server(2),
            &probe,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unable to release"));
        // 3 and 2 were deleted before the verdict and the metadata knows
        assert!(!snapshot_dir(dir.path(), 3).exists());
        assert!(!snapshot_dir(dir.path(), 2).exists());
        let reread = ImageMeta::load(dir.path()).unwrap();
        let kept: Vec<u64> = reread.snapshots().keys().copied().collect();
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn admit_reconciles_stale_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1]);
        meta.set_snapshot(9, 123);
        meta.persist(dir.path()).unwrap();
        let probe = |_: &Path| Ok(unconstrained(100, 90));
        admit_with(
            dir.path(),
            &mut meta,
            AdmitRequest { bytes: 1, inodes: 0 },
            &server(2),
            &probe,
        )
        .unwrap();
        let reread = ImageMeta::load(dir.path()).unwrap();
        assert_eq!(reread.snapshots().keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn admit_accounts_for_duplication_inodes() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1, 2]);
        // backup.0 holds two inodes (the directory and its payload); the
        // duplication estimate lifts the request from 3 to 5, which no
        // longer fits the 5 free inodes until something is evicted
        let free_inodes = Cell::new(5i64);
        let probe = move |_: &Path| {
            let f = free_inodes.get();
            free_inodes.set(f + 45);
            Ok(FsStats {
                total_bytes: 1000,
                used_bytes: 100,
                free_bytes: 900,
                total_inodes: 1000,
                free_inodes: f,
            })
        };
        let report = admit_with(
            dir.path(),
            &mut meta,
            AdmitRequest { bytes: 1, inodes: 3 },
            &server(1),
            &probe,
        )
        .unwrap();
        assert_eq!(report.evicted, vec![2]);
    }

    #[test]
    fn rotate_skips_only_an_empty_ring() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meta, _) = ImageMeta::load_or_create(dir.path(), 1 << 30).unwrap();
        rotate(dir.path(), &mut meta).unwrap();
        assert!(list_ring(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn rotate_duplicates_a_lone_backup_zero() {
        // the second cycle ever: one stamped backup.0, nothing else; rsync
        // will mutate backup.0 next, so backup.1 must exist before that
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0]);
        let ts0 = meta.snapshot(0).unwrap();
        let zero_ino = fs::metadata(snapshot_dir(dir.path(), 0).join("payload"))
            .unwrap()
            .ino();

        rotate(dir.path(), &mut meta).unwrap();

        let indices: Vec<u64> = list_ring(dir.path())
            .unwrap()
            .iter()
            .map(|s| s.index)
            .collect();
        assert_eq!(indices, vec![1, 0]);
        let one_file = snapshot_dir(dir.path(), 1).join("payload");
        assert_eq!(fs::metadata(&one_file).unwrap().ino(), zero_ino);
        let reread = ImageMeta::load(dir.path()).unwrap();
        assert_eq!(reread.snapshot(1), Some(ts0));
        assert_eq!(reread.snapshot(0), Some(ts0));
    }

    #[test]
    fn rotate_shifts_ring_and_duplicates_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1, 2]);
        let ts0 = meta.snapshot(0).unwrap();
        let ts1 = meta.snapshot(1).unwrap();
        let ts2 = meta.snapshot(2).unwrap();
        let zero_file = snapshot_dir(dir.path(), 0).join("payload");
        let zero_ino = fs::metadata(&zero_file).unwrap().ino();

        rotate(dir.path(), &mut meta).unwrap();

        let ring = list_ring(dir.path()).unwrap();
        let indices: Vec<u64> = ring.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![3, 2, 1, 0]);

        let reread = ImageMeta::load(dir.path()).unwrap();
        assert_eq!(reread.snapshot(3), Some(ts2));
        assert_eq!(reread.snapshot(2), Some(ts1));
        assert_eq!(reread.snapshot(1), Some(ts0));
        assert_eq!(reread.snapshot(0), Some(ts0));

        // backup.1 is a hard-link duplicate of backup.0
        let one_file = snapshot_dir(dir.path(), 1).join("payload");
        assert_eq!(fs::metadata(&one_file).unwrap().ino(), zero_ino);
        // older timestamps never get younger as the index grows
        let snaps = reread.snapshots();
        let mut prev: Option<i64> = None;
        for (_, ts) in snaps.iter() {
            if let Some(p) = prev {
                assert!(*ts <= p);
            }
            prev = Some(*ts);
        }
    }

    #[test]
    fn rotate_fails_loudly_on_broken_ring() {
        let dir = tempfile::tempdir().unwrap();
        let (mut meta, _) = ImageMeta::load_or_create(dir.path(), 1 << 30).unwrap();
        fs::create_dir(snapshot_dir(dir.path(), 0)).unwrap();
        fs::create_dir(dir.path().join("backup.zero")).unwrap();
        let err = rotate(dir.path(), &mut meta).unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(snapshot_dir(dir.path(), 0).is_dir());
        assert!(dir.path().join("backup.zero").is_dir());
    }

    #[test]
    fn stamp_records_completion_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = seed_ring(dir.path(), &[0, 1]);
        meta.persist(dir.path()).unwrap();
        stamp(dir.path(), Timestamp::from(1_700_000_000)).unwrap();
        let reread = ImageMeta::load(dir.path()).unwrap();
        assert_eq!(reread.snapshot(0), Some(1_700_000_000));
        // stamping again simply overwrites
        stamp(dir.path(), Timestamp::from(1_700_000_600)).unwrap();
        let reread = ImageMeta::load(dir.path()).unwrap();
        assert_eq!(reread.snapshot(0), Some(1_700_000_600));
    }
}
