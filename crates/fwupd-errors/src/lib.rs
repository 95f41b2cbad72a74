//! Centralized error types for the fwupd core crates
//!
//! Every fallible operation in the workspace returns [`FwupdError`], a closed
//! enum whose variants are the error *kinds* callers branch on. The kind is
//! preserved when context is prefixed onto a message, so a retry loop several
//! layers up can still tell a busy device from a missing one.
//!
//! # Classification
//!
//! - [`FwupdError::category`] groups kinds into malformed input, bounds,
//!   protocol, transport, resource and internal failures.
//! - [`FwupdError::is_retryable`] is true for transient transport failures
//!   (busy, timed out).
//! - [`FwupdError::is_terminal`] is true for kinds that must short-circuit
//!   every retry loop (not found, permission denied, cancelled).
//!
//! # Example
//!
//! ```
//! use fwupd_errors::prelude::*;
//!
//! fn check_magic(magic: u32) -> Result<()> {
//!     if magic != 0x5450_4624 {
//!         return Err(FwupdError::invalid_file(format!("invalid magic 0x{magic:x}")));
//!     }
//!     Ok(())
//! }
//!
//! let err = check_magic(0).prefix("failed to parse FPT").unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::InvalidFile);
//! assert_eq!(err.to_string(), "failed to parse FPT: invalid magic 0x0");
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod common;
pub mod prelude;

pub use common::{ErrorCategory, ErrorContext, ErrorKind, FwupdError, ResultExt};

/// A specialized `Result` type for fwupd core operations.
pub type Result<T> = std::result::Result<T, FwupdError>;
