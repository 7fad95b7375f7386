use crate::cli::preflight_config;
use crate::config::model::{require_sections, ServerConfig};
use crate::config::store::{ConfigStore, Strictness};
use crate::dump;
use crate::error::{Result, TardisError};
use crate::size::{format_size, parse_size};
use crate::util::lock;

pub fn run(config: &str, bytes: &str) -> Result<()> {
    let config_path = preflight_config(config)?;
    let bytes = parse_size(bytes).map_err(TardisError::usage)?;

    let store = ConfigStore::load(&config_path, Strictness::Strict)?;
    require_sections(&store)?;
    let server = ServerConfig::from_store(&store)?;
    let dump_dir = server.dump_dir();
    let _lock = lock::acquire(&server.base, "dumps")?;

    let report = dump::admit_dump(&dump_dir, bytes, &server)?;
    for path in &report.evicted {
        println!("evicted {}", path.display());
    }

    // quota room is not physical room; the device has the last word
    dump::check_physical_space(&dump_dir, bytes)?;

    println!(
        "dump store ok: {} used of {}, {} admitted, {} file(s) kept",
        format_size(report.used_after),
        format_size(report.limit),
        format_size(bytes),
        report.remaining
    );
    Ok(())
}
