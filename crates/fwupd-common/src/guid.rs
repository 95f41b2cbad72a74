//! GUIDs as stored in firmware: mixed-endian, the first three groups
//! little-endian.

use fwupd_errors::{FwupdError, Result};
use uuid::Uuid;

/// A GUID in its 16-byte on-disk form.
pub type Guid = [u8; 16];

/// Format on-disk GUID bytes as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
pub fn guid_to_string(guid: &Guid) -> String {
    Uuid::from_bytes_le(*guid).hyphenated().to_string()
}

/// Parse a hyphenated GUID string into on-disk bytes.
///
/// # Errors
///
/// Returns an invalid-data error if the string is not a valid GUID.
pub fn guid_from_string(s: &str) -> Result<Guid> {
    Uuid::parse_str(s.trim())
        .map(|u| u.to_bytes_le())
        .map_err(|e| FwupdError::invalid_data(format!("invalid GUID {s}: {e}")))
}

/// Check whether the GUID is all zeros.
pub fn guid_is_zero(guid: &Guid) -> bool {
    guid.iter().all(|&b| b == 0)
}
