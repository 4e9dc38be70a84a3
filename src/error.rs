use crate::protocol::{FrameError, PayloadError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaymuxError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("malformed payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("invalid opcode")]
    InvalidOpcode,

    #[error("host not initialized")]
    NotRegistered,

    #[error("host already registered with {0} active session(s)")]
    HostBusy(usize),

    #[error("invalid host pid: {0}")]
    InvalidPid(u64),

    #[error("session {0} already exists")]
    DuplicateSession(u64),

    #[error("no such session: {0}")]
    NoSuchSession(u64),

    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("failed to launch session: {0}")]
    LaunchFailure(String),

    #[error("failed to adjust permissions on {path}: {source}")]
    Permission {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied: {0}")]
    Unauthorized(String),

    #[error("failed to signal process {pid}: {message}")]
    Signal { pid: u64, message: String },

    #[error("failed to resolve caller identity: {0}")]
    Identity(String),

    #[error("waymux is already running (pid {0})")]
    AlreadyRunning(String),

    #[error("waymux is not running")]
    NotRunning,

    #[error("daemon returned an error: {0}")]
    Daemon(String),

    #[error("unexpected reply from daemon: {0}")]
    UnexpectedReply(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("User cancelled")]
    UserCancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WaymuxError>;
