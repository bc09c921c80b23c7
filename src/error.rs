//! Error taxonomy for the server. Kinds mirror the original implementation's
//! `gearmand_error_t` values rather than inventing a new vocabulary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GearmandError {
    #[error("lost connection")]
    LostConnection,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("queue backend error: {0}")]
    QueueBackend(String),

    #[error("job already exists")]
    JobExists,

    #[error("job queue full")]
    JobQueueFull,

    #[error("memory allocation failed")]
    MemoryAllocation,

    #[error("argument too large")]
    ArgumentTooLarge,

    #[error("echo data corruption")]
    EchoDataCorruption,

    #[error("no active file descriptors")]
    NoActiveFds,

    #[error("operation timed out")]
    Timeout,

    #[error(transparent)]
    Errno(#[from] std::io::Error),

    /// Sentinel for normal immediate shutdown; not logged as an error.
    #[error("shutdown")]
    Shutdown,

    /// Sentinel for normal graceful shutdown; not logged as an error.
    #[error("graceful shutdown")]
    ShutdownGraceful,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid magic")]
    InvalidMagic,
    #[error("invalid command")]
    InvalidCommand,
    #[error("invalid packet")]
    InvalidPacket,
    #[error("too many arguments")]
    TooManyArgs,
}

impl ProtocolError {
    /// The `code-text` half of an `ERROR` packet, as used by spec §7.
    pub fn code_text(self) -> &'static str {
        match self {
            ProtocolError::InvalidMagic => "invalid_magic",
            ProtocolError::InvalidCommand => "invalid_command",
            ProtocolError::InvalidPacket => "invalid_packet",
            ProtocolError::TooManyArgs => "too_many_args",
        }
    }
}

pub type Result<T> = std::result::Result<T, GearmandError>;
