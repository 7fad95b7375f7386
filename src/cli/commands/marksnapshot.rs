use chrono::{Local, TimeZone};

use crate::cli::preflight_config;
use crate::config::model::{require_sections, ServerConfig, TreeConfig};
use crate::config::store::{ConfigStore, Strictness};
use crate::error::{Result, TardisError};
use crate::image::meta::ImageMeta;
use crate::size::format_minutes;
use crate::snapshot;
use crate::types::{Timestamp, TreeId};
use crate::util::lock;

pub fn run(config: &str, dir_id: &str, timestamp: &str) -> Result<()> {
    let config_path = preflight_config(config)?;
    let id: TreeId = dir_id.parse().map_err(TardisError::usage)?;
    let timestamp: Timestamp = timestamp.parse().map_err(TardisError::usage)?;

    let store = ConfigStore::load(&config_path, Strictness::Strict)?;
    require_sections(&store)?;
    let server = ServerConfig::from_store(&store)?;
    let tree = TreeConfig::from_store(&store, id)?;
    let mountpoint = server.tree_mountpoint(&tree);
    let _lock = lock::acquire(&server.base, &tree.remotedir)?;

    let previous = ImageMeta::load(&mountpoint)?.snapshot(0);
    snapshot::stamp(&mountpoint, timestamp)?;

    match Local.timestamp_opt(timestamp.seconds(), 0).single() {
        Some(when) => println!(
            "stamped backup.0 at {} ({})",
            timestamp,
            when.format("%d-%m-%Y %H:%M")
        ),
        None => println!("stamped backup.0 at {}", timestamp),
    }
    if let Some(previous) = previous {
        let gap = timestamp.seconds() - previous;
        if gap > 0 {
            println!("previous backup completed {} earlier", format_minutes(gap as u64 / 60));
        }
    }
    Ok(())
}
