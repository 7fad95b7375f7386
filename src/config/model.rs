use std::path::PathBuf;

use crate::config::store::ConfigStore;
use crate::error::{ConfigError, Result};
use crate::size::parse_size;
use crate::types::TreeId;
use crate::util::paths::is_safe_name;

/// Sections every config file must carry (§ the client/server contract).
const REQUIRED_SECTIONS: [&str; 4] = ["client", "server", "email", "paths"];

/// The `[server]` section, fully validated.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub base: PathBuf,
    pub dbdir: String,
    pub dbsize: u64,
    pub bytebuffer: u64,
    pub inodebuffer: u64,
    pub forcedbs: usize,
    pub forcesnaps: u64,
    pub fstype: String,
    pub fsopts: String,
    pub mountargs: String,
    pub user: String,
    pub group: String,
}

/// One backup tree, from `[directory.N]`.
#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub id: TreeId,
    pub name: String,
    pub localdir: Option<String>,
    pub remotedir: String,
    pub maxsize: u64,
    pub excludes: Vec<String>,
    pub excludefile: Option<String>,
}

/// One database dump job, from `[database.N]`. Mostly client-side contract;
/// the server parses it to validate configs it is handed.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub id: u32,
    pub dumptype: String,
    pub user: String,
    pub password: String,
    /// Empty string means all databases.
    pub database: String,
    pub dumpname: String,
}

pub fn require_sections(store: &ConfigStore) -> Result<()> {
    for name in REQUIRED_SECTIONS {
        if !store.has_section(name) {
            return Err(ConfigError::MissingSection(name.to_string()).into());
        }
    }
    Ok(())
}

impl ServerConfig {
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        Ok(ServerConfig {
            base: PathBuf::from(required(store, "server", "base")?),
            dbdir: required(store, "server", "dbdir")?,
            dbsize: required_size(store, "server", "dbsize")?,
            bytebuffer: required_size(store, "server", "bytebuffer")?,
            inodebuffer: required_number(store, "server", "inodebuffer")?,
            forcedbs: required_number(store, "server", "forcedbs")? as usize,
            forcesnaps: required_number(store, "server", "forcesnaps")?,
            fstype: required(store, "server", "fstype")?,
            fsopts: required(store, "server", "fsopts")?,
            mountargs: required(store, "server", "mountargs")?,
            user: required(store, "server", "user")?,
            group: required(store, "server", "group")?,
        })
    }

    /// Mountpoint of one tree's image filesystem.
    pub fn tree_mountpoint(&self, tree: &TreeConfig) -> PathBuf {
        self.base.join(&tree.remotedir)
    }

    /// Sparse image file backing one tree.
    pub fn tree_image(&self, tree: &TreeConfig) -> PathBuf {
        self.base.join(format!("{}.timg", tree.remotedir))
    }

    /// The size-capped dump directory.
    pub fn dump_dir(&self) -> PathBuf {
        self.base.join(&self.dbdir)
    }
}

impl TreeConfig {
    pub fn from_store(store: &ConfigStore, id: TreeId) -> Result<Self> {
        let section = format!("directory.{}", id);
        if !store.has_section(&section) {
            return Err(ConfigError::MissingSection(section).into());
        }
        let excludes = store
            .get(&section, "exclude")
            .map(|v| {
                v.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        // remotedir becomes the mountpoint, the image file and the lock
        // name; it must never traverse out of the base directory
        let remotedir = safe_name(store, &section, "remotedir")?;
        Ok(TreeConfig {
            id,
            name: required(store, &section, "name")?,
            localdir: store.get(&section, "localdir").map(str::to_string),
            remotedir,
            maxsize: required_size(store, &section, "maxsize")?,
            excludes,
            excludefile: store.get(&section, "excludefile").map(str::to_string),
        })
    }
}

impl DumpConfig {
    pub fn from_store(store: &ConfigStore, id: u32) -> Result<Self> {
        let section = format!("database.{}", id);
        if !store.has_section(&section) {
            return Err(ConfigError::MissingSection(section).into());
        }
        Ok(DumpConfig {
            id,
            dumptype: required(store, &section, "type")?,
            user: required(store, &section, "user")?,
            password: required(store, &section, "password")?,
            database: store
                .get(&section, "database")
                .unwrap_or_default()
                .to_string(),
            dumpname: safe_name(store, &section, "dumpname")?,
        })
    }
}

/// All `[database.N]` jobs present in the config, in index order.
pub fn list_dumps(store: &ConfigStore) -> Result<Vec<DumpConfig>> {
    let mut ids: Vec<u32> = store
        .section_names()
        .filter_map(|name| name.strip_prefix("database."))
        .filter_map(|suffix| suffix.parse().ok())
        .collect();
    ids.sort_unstable();
    ids.into_iter()
        .map(|id| DumpConfig::from_store(store, id))
        .collect()
}

fn required(store: &ConfigStore, section: &str, key: &str) -> Result<String> {
    store
        .get(section, key)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingKey(format!("{}.{}", section, key)).into())
}

fn safe_name(store: &ConfigStore, section: &str, key: &str) -> Result<String> {
    let value = required(store, section, key)?;
    if !is_safe_name(&value) {
        return Err(ConfigError::Invalid(format!(
            "{}.{} {:?} must use only letters, digits, '.', '-', '_'",
            section, key, value
        ))
        .into());
    }
    Ok(value)
}

fn required_size(store: &ConfigStore, section: &str, key: &str) -> Result<u64> {
    let value = required(store, section, key)?;
    parse_size(&value)
        .map_err(|e| ConfigError::Invalid(format!("{}.{}: {}", section, key, e)).into())
}

fn required_number(store: &ConfigStore, section: &str, key: &str) -> Result<u64> {
    let value = required(store, section, key)?;
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}.{}: {:?} is not a number", section, key, value)).into())
}
