//! Error types for fwupd-tool

use std::path::PathBuf;

use fwupd_errors::{ErrorKind, FwupdError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("no known format matched {}", .0.display())]
    UnknownFormat(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Process exit code for an error kind.
pub fn kind_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::NotFound => 2,
        ErrorKind::NotSupported => 3,
        ErrorKind::InvalidData
        | ErrorKind::InvalidFile
        | ErrorKind::OutOfRange
        | ErrorKind::Protocol => 4,
        ErrorKind::ResourceLimit => 5,
        ErrorKind::PermissionDenied => 6,
        _ => 1,
    }
}

fn io_exit_code(kind: std::io::ErrorKind) -> u8 {
    kind_exit_code(FwupdError::from(std::io::Error::from(kind)).kind())
}

/// Process exit code for the first recognised error in the chain.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if let Some(err) = cause.downcast_ref::<CliError>() {
            return match err {
                CliError::UnknownFormat(_) => 3,
                CliError::InvalidConfiguration(_) | CliError::JsonError(_) => 4,
                CliError::IoError(e) => io_exit_code(e.kind()),
            };
        }
        if let Some(err) = cause.downcast_ref::<FwupdError>() {
            return kind_exit_code(err.kind());
        }
        if let Some(err) = cause.downcast_ref::<std::io::Error>() {
            return io_exit_code(err.kind());
        }
    }
    1
}
