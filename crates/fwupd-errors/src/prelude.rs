//! Prelude module for convenient error handling imports.
//!
//! # Example
//!
//! ```
//! use fwupd_errors::prelude::*;
//!
//! fn need_image(id: Option<&str>) -> Result<&str> {
//!     id.ok_or_else(|| FwupdError::not_found("no image id"))
//! }
//! assert!(need_image(None).is_err());
//! ```

pub use crate::{
    Result,
    common::{ErrorCategory, ErrorContext, ErrorKind, FwupdError, ResultExt},
};

/// Return early with an error of the given kind when a condition fails.
///
/// # Example
///
/// ```
/// use fwupd_errors::prelude::*;
/// use fwupd_errors::ensure;
///
/// fn check_len(len: usize) -> Result<()> {
///     ensure!(len >= 36, InvalidFile, "table length 0x{len:x} too small");
///     Ok(())
/// }
/// assert_eq!(check_len(4).unwrap_err().kind(), ErrorKind::InvalidFile);
/// ```
#[macro_export]
macro_rules! ensure {
    ($condition:expr, $kind:ident, $($arg:tt)+) => {
        if !$condition {
            return Err($crate::FwupdError::new($crate::ErrorKind::$kind, format!($($arg)+)));
        }
    };
}
