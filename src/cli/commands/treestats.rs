use chrono::{Local, TimeZone, Utc};

use crate::cli::preflight_config;
use crate::config::model::{require_sections, ServerConfig, TreeConfig};
use crate::config::store::{ConfigStore, Strictness};
use crate::error::{ImageError, Result, TardisError};
use crate::fsprobe;
use crate::image::meta::ImageMeta;
use crate::mount::inspect::mountpoint_is_mounted;
use crate::size::{format_minutes, format_size};
use crate::snapshot;
use crate::types::TreeId;

pub fn run(config: &str, dir_id: &str) -> Result<()> {
    let config_path = preflight_config(config)?;
    let id: TreeId = dir_id.parse().map_err(TardisError::usage)?;

    let store = ConfigStore::load(&config_path, Strictness::Strict)?;
    require_sections(&store)?;
    let server = ServerConfig::from_store(&store)?;
    let tree = TreeConfig::from_store(&store, id)?;
    let mountpoint = server.tree_mountpoint(&tree);
    if !mountpoint_is_mounted(&mountpoint)? {
        return Err(ImageError::NotMounted(mountpoint.display().to_string()).into());
    }

    let meta = ImageMeta::load(&mountpoint)?;
    let stats = fsprobe::probe(&mountpoint)?;
    println!("tree {} ({})", tree.name, mountpoint.display());
    println!(
        "image size {} (configured {}), {} used, {} free",
        format_size(meta.size()?),
        format_size(tree.maxsize),
        format_size(stats.used_bytes),
        format_size(stats.free_bytes)
    );
    if stats.inode_limited() {
        println!(
            "inodes: {} of {} free",
            stats.free_inodes, stats.total_inodes
        );
    }

    let stamps = meta.snapshots();
    let ring = snapshot::list_ring(&mountpoint)?;
    if ring.is_empty() {
        println!("no snapshots yet");
        return Ok(());
    }
    for snap in &ring {
        match stamps.get(&snap.index) {
            Some(ts) => match Local.timestamp_opt(*ts, 0).single() {
                Some(when) => println!(
                    "backup.{}  completed {}",
                    snap.index,
                    when.format("%d-%m-%Y %H:%M")
                ),
                None => println!("backup.{}  completed at {}", snap.index, ts),
            },
            None => println!("backup.{}  not stamped", snap.index),
        }
    }
    if let Some(newest) = stamps.get(&ring.last().map(|s| s.index).unwrap_or(0)) {
        let age = Utc::now().timestamp() - newest;
        if age >= 0 {
            println!("newest snapshot is {} old", format_minutes(age as u64 / 60));
        }
    }
    Ok(())
}
