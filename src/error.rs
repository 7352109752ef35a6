//! Crate error type.
//!
//! Most failures in this crate are *not* surfaced to the end user: a failed
//! open is a retry, a failed reboot or close is a log line. [`Error`] exists so
//! backends can say *why* something failed and the supervisor can log it.

use thiserror::Error;

/// Errors produced by configuration loading and sensor device backends.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// No sensor matching the configured filter is attached.
    #[error("no matching sensor device present")]
    NoDevice,

    /// A command was issued with no open handle.
    #[error("sensor device is not open")]
    NotOpen,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The device went away while a command was in flight.
    #[error("sensor device disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, Error>;
