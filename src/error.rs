use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TardisError {
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Permission(String),
    #[error("{0}")]
    Config(ConfigError),
    #[error("{0}")]
    Image(ImageError),
    #[error("{0}")]
    Space(SpaceError),
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse config: line {line}: {text}")]
    Syntax { line: usize, text: String },
    #[error("missing section [{0}]")]
    MissingSection(String),
    #[error("missing key {0}")]
    MissingKey(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image {0} exists but is not a regular file")]
    NotRegularFile(String),
    #[error("loop attach {0}")]
    LoopAttach(String),
    #[error("loop detach {0}")]
    LoopDetach(String),
    #[error("mkfs {0}")]
    Format(String),
    #[error("mount {0}")]
    MountFailure(String),
    #[error("umount {0}")]
    UmountFailure(String),
    #[error("{0} is mounted as {1}, expected {2}")]
    FsTypeMismatch(String, String, String),
    #[error("nothing mounted at {0}")]
    NotMounted(String),
    #[error("metadata {0}")]
    Meta(String),
}

#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("request of {request} could never fit in {total}")]
    CouldNeverFit { request: String, total: String },
    #[error("request of {request} inodes could never fit ({total} inodes on filesystem)")]
    InodesCouldNeverFit { request: u64, total: u64 },
    #[error("not enough snapshots present to release space (retention floor {floor})")]
    RetentionFloor { floor: u64 },
    #[error("unable to release enough space, still {shortfall} short")]
    Shortfall { shortfall: String },
    #[error("unable to release enough inodes, still {shortfall} short")]
    InodeShortfall { shortfall: u64 },
    #[error("unable to release enough dump space, still {shortfall} short")]
    DumpShortfall { shortfall: String },
    #[error("device holding {dir} has only {free} free, {request} requested")]
    PhysicalShortfall {
        dir: String,
        free: String,
        request: String,
    },
    #[error("operation already in progress ({0})")]
    Busy(String),
}

pub type Result<T> = std::result::Result<T, TardisError>;

impl TardisError {
    pub fn message(msg: impl Into<String>) -> Self {
        TardisError::Message(msg.into())
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        TardisError::Usage(msg.into())
    }
}

impl From<ConfigError> for TardisError {
    fn from(err: ConfigError) -> Self {
        TardisError::Config(err)
    }
}

impl From<ImageError> for TardisError {
    fn from(err: ImageError) -> Self {
        TardisError::Image(err)
    }
}

impl From<SpaceError> for TardisError {
    fn from(err: SpaceError) -> Self {
        TardisError::Space(err)
    }
}
