pub mod cleanup;
pub mod dircontrol;
pub mod increment;
pub mod marksnapshot;
pub mod treestats;

use crate::error::{Result, SpaceError, TardisError};

pub const EX_USAGE: i32 = 64;
pub const EX_IOERR: i32 = 74;
pub const EX_TEMPFAIL: i32 = 75;
pub const EX_NOPERM: i32 = 77;

pub fn exit_code_for(err: &TardisError) -> i32 {
    match err {
        TardisError::Usage(_) => EX_USAGE,
        TardisError::Permission(_) => EX_NOPERM,
        TardisError::Space(space) => match space {
            SpaceError::CouldNeverFit { .. } | SpaceError::InodesCouldNeverFit { .. } => EX_IOERR,
            SpaceError::RetentionFloor { .. }
            | SpaceError::Shortfall { .. }
            | SpaceError::InodeShortfall { .. }
            | SpaceError::DumpShortfall { .. }
            | SpaceError::PhysicalShortfall { .. }
            | SpaceError::Busy(_) => EX_TEMPFAIL,
        },
        TardisError::Config(_)
        | TardisError::Image(_)
        | TardisError::Io(_)
        | TardisError::Message(_) => EX_IOERR,
    }
}

/// The client greps stderr for `^ERROR:`; every fatal diagnostic goes
/// through here.
pub fn exit_for_error(err: &TardisError) -> ! {
    eprintln!("ERROR: {}", err);
    std::process::exit(exit_code_for(err));
}

pub fn require_root() -> Result<()> {
    if !nix::unistd::Uid::effective().is_root() {
        return Err(TardisError::Permission(
            "this operation must run as the superuser".to_string(),
        ));
    }
    Ok(())
}
