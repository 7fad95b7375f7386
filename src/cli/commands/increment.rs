use crate::cli::preflight_config;
use crate::cli::commands::require_root;
use crate::config::model::{require_sections, ServerConfig, TreeConfig};
use crate::config::store::{ConfigStore, Strictness};
use crate::error::{ImageError, Result, TardisError};
use crate::image::meta::ImageMeta;
use crate::mount::inspect::mountpoint_is_mounted;
use crate::size::{format_size, parse_size};
use crate::snapshot::{self, AdmitRequest};
use crate::types::TreeId;
use crate::util::lock;

pub fn run(config: &str, dir_id: &str, bytes: &str, inodes: &str) -> Result<()> {
    let config_path = preflight_config(config)?;
    let id: TreeId = dir_id.parse().map_err(TardisError::usage)?;
    let bytes = parse_size(bytes).map_err(TardisError::usage)?;
    let inodes = parse_size(inodes).map_err(TardisError::usage)?;
    require_root()?;

    let store = ConfigStore::load(&config_path, Strictness::Strict)?;
    require_sections(&store)?;
    let server = ServerConfig::from_store(&store)?;
    let tree = TreeConfig::from_store(&store, id)?;
    let mountpoint = server.tree_mountpoint(&tree);
    if !mountpoint_is_mounted(&mountpoint)? {
        return Err(ImageError::NotMounted(mountpoint.display().to_string()).into());
    }
    let _lock = lock::acquire(&server.base, &tree.remotedir)?;

    let mut meta = ImageMeta::load(&mountpoint)?;
    let report = snapshot::admit(&mountpoint, &mut meta, AdmitRequest { bytes, inodes }, &server)?;
    for index in &report.evicted {
        println!("reclaimed backup.{}", index);
    }

    snapshot::rotate(&mountpoint, &mut meta)?;

    println!(
        "admitted {} and {} inode(s) for {}: {} free of {}",
        format_size(bytes),
        inodes,
        tree.name,
        format_size(report.after.free_bytes),
        format_size(report.after.total_bytes)
    );
    Ok(())
}
