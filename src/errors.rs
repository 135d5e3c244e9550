//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every worker and queue failure mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The connection could not be established.
    Connection(String),
    /// Writing an outbound message to the connection failed.
    Write(String),
    /// Reading from the connection failed or the peer closed it.
    Read(String),
    /// No inbound message arrived before the caller's deadline.
    ReceiveTimeout(String),
    /// `start` or `attach` was called on a worker that was already started.
    AlreadyStarted(String),
    /// File-system or other I/O failure outside the service loop.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::Write(msg) => write!(f, "write: {msg}"),
            Self::Read(msg) => write!(f, "read: {msg}"),
            Self::ReceiveTimeout(msg) => write!(f, "receive timeout: {msg}"),
            Self::AlreadyStarted(msg) => write!(f, "already started: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
