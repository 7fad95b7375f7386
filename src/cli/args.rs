use clap::{Parser, Subcommand};

/// Arguments stay as strings here; each entry point validates them itself
/// so violations exit with the usage code rather than clap's default.
#[derive(Parser, Debug)]
#[command(name = "tardis", version, about = "Remote incremental backup server core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Image lifecycle: loop-mount or unmount one tree's image
    Dircontrol {
        config: String,
        dir_id: String,
        /// mount or umount
        action: String,
    },
    /// Reserve space for the next backup, then rotate the snapshot ring
    Increment {
        config: String,
        dir_id: String,
        /// Estimated bytes of the incoming backup (K/M/G suffixes accepted)
        bytes: String,
        /// Estimated inodes of the incoming backup
        inodes: String,
    },
    /// Record the completion time of the newest snapshot
    Marksnapshot {
        config: String,
        dir_id: String,
        /// Unix timestamp of the completed rsync
        timestamp: String,
    },
    /// Admit an incoming database dump into the size-capped dump store
    Cleanup {
        config: String,
        /// Compressed size of the incoming dump (K/M/G suffixes accepted)
        bytes: String,
    },
    /// Report the snapshot ring and image usage for one tree
    Treestats { config: String, dir_id: String },
}
