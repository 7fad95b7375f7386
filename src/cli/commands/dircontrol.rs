use std::path::Path;

use crate::cli::preflight_config;
use crate::cli::commands::require_root;
use crate::config::model::{require_sections, ServerConfig, TreeConfig};
use crate::config::store::{ConfigStore, Strictness};
use crate::error::{Result, TardisError};
use crate::image::{self, ImageState};
use crate::size::format_size;
use crate::types::{DirAction, TreeId};
use crate::util::lock;

pub fn run(config: &str, dir_id: &str, action: &str) -> Result<()> {
    let config_path = preflight_config(config)?;
    let id: TreeId = dir_id.parse().map_err(TardisError::usage)?;
    let action: DirAction = action.parse().map_err(TardisError::usage)?;
    require_root()?;

    let store = ConfigStore::load(&config_path, Strictness::Strict)?;
    require_sections(&store)?;
    let server = ServerConfig::from_store(&store)?;
    let tree = TreeConfig::from_store(&store, id)?;
    let mountpoint = server.tree_mountpoint(&tree);
    let _lock = lock::acquire(&server.base, &tree.remotedir)?;

    match action {
        DirAction::Mount => mount(&server, &tree, &mountpoint),
        DirAction::Umount => {
            image::unmount_image(&mountpoint)?;
            println!("unmounted {}", mountpoint.display());
            Ok(())
        }
    }
}

fn mount(server: &ServerConfig, tree: &TreeConfig, mountpoint: &Path) -> Result<()> {
    image::ensure_mountpoint(mountpoint)?;
    let image_file = server.tree_image(tree);
    let state = image::ensure_image(&image_file, tree.maxsize, &server.fstype, &server.fsopts)?;
    if state == ImageState::Created {
        println!(
            "created image {} ({}, {})",
            image_file.display(),
            format_size(tree.maxsize),
            server.fstype
        );
    }

    // ownership is initialised once, on the mount that follows creation
    let owner =
        (state == ImageState::Created).then(|| (server.user.as_str(), server.group.as_str()));
    let recorded = image::mount_image(
        &image_file,
        mountpoint,
        &server.fstype,
        &server.mountargs,
        tree.maxsize,
        owner,
    )?;
    if recorded != tree.maxsize {
        println!(
            "WARNING: image records size {}, config says {}; using the recorded size",
            format_size(recorded),
            format_size(tree.maxsize)
        );
    }
    println!("mounted {} ({})", mountpoint.display(), format_size(recorded));
    Ok(())
}
