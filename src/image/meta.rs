//! `.tardis_meta` at the image root: declared size plus the completion
//! timestamp of every snapshot in the ring. Same INI dialect as the config.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::store::{ConfigStore, Strictness};
use crate::error::{ImageError, Result};

pub const META_FILE: &str = ".tardis_meta";

const IMAGE_SECTION: &str = "image";
const SNAPSHOT_SECTION: &str = "snapshots";

#[derive(Debug, Clone)]
pub struct ImageMeta {
    store: ConfigStore,
}

impl ImageMeta {
    pub fn path(mountpoint: &Path) -> PathBuf {
        mountpoint.join(META_FILE)
    }

    pub fn load(mountpoint: &Path) -> Result<Self> {
        let path = Self::path(mountpoint);
        let store = ConfigStore::load(&path, Strictness::Relaxed)
            .map_err(|e| ImageError::Meta(e.to_string()))?;
        Ok(ImageMeta { store })
    }

    /// Load the existing metadata, or bootstrap it with the declared size.
    /// The boolean reports whether the file had to be created.
    pub fn load_or_create(mountpoint: &Path, declared_size: u64) -> Result<(Self, bool)> {
        if Self::path(mountpoint).is_file() {
            return Ok((Self::load(mountpoint)?, false));
        }
        let mut meta = ImageMeta {
            store: ConfigStore::new(),
        };
        meta.store
            .set(IMAGE_SECTION, "size", declared_size.to_string());
        meta.persist(mountpoint)?;
        Ok((meta, true))
    }

    pub fn size(&self) -> Result<u64> {
        let raw = self
            .store
            .get(IMAGE_SECTION, "size")
            .ok_or_else(|| ImageError::Meta("image.size missing".to_string()))?;
        raw.parse()
            .map_err(|_| ImageError::Meta(format!("image.size {:?} is not a number", raw)).into())
    }

    /// Snapshot index -> completion timestamp, ascending by index.
    pub fn snapshots(&self) -> BTreeMap<u64, i64> {
        let mut out = BTreeMap::new();
        if let Some(section) = self.store.section(SNAPSHOT_SECTION) {
            for (key, value) in section {
                let Some(suffix) = key.strip_prefix("backup.") else {
                    continue;
                };
                let Ok(index) = suffix.parse::<u64>() else {
                    continue;
                };
                out.insert(index, value.parse().unwrap_or(0));
            }
        }
        out
    }

    pub fn snapshot(&self, index: u64) -> Option<i64> {
        self.store
            .get(SNAPSHOT_SECTION, &format!("backup.{}", index))
            .and_then(|v| v.parse().ok())
    }

    pub fn set_snapshot(&mut self, index: u64, timestamp: i64) {
        self.store.set(
            SNAPSHOT_SECTION,
            &format!("backup.{}", index),
            timestamp.to_string(),
        );
    }

    pub fn remove_snapshot(&mut self, index: u64) {
        self.store
            .remove(SNAPSHOT_SECTION, &format!("backup.{}", index));
    }

    pub fn persist(&mut self, mountpoint: &Path) -> Result<()> {
        let path = Self::path(mountpoint);
        self.store
            .write(&path, &HashSet::new(), false)
            .map_err(|e| ImageError::Meta(format!("write {}: {}", path.display(), e)).into())
    }
}
