//! The bulk pipe a session talks through.

use std::fmt;
use std::time::Duration;

use fwupd_errors::Result;

/// Bulk endpoints of the two device interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Device to host, sync interface.
    SyncIn,
    /// Host to device, sync interface.
    SyncOut,
    /// Device to host, update interface.
    UpdIn,
    /// Host to device, update interface.
    UpdOut,
}

impl Endpoint {
    /// Whether data flows from the host to the device.
    pub fn is_out(self) -> bool {
        matches!(self, Self::SyncOut | Self::UpdOut)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SyncIn => "sync-in",
            Self::SyncOut => "sync-out",
            Self::UpdIn => "upd-in",
            Self::UpdOut => "upd-out",
        })
    }
}

/// Blocking bulk transfers with a timeout.
///
/// Implementations map a timeout to [`fwupd_errors::FwupdError::TimedOut`], a
/// stalled or busy pipe to `Busy`, and a vanished device to `NotFound` so the
/// session retry logic can tell transient failures from terminal ones.
pub trait BulkTransport {
    /// Write `data` to an OUT endpoint, returning the number of bytes sent.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    fn bulk_write(&mut self, endpoint: Endpoint, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Read one transfer from an IN endpoint into `buf`, returning its length.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    fn bulk_read(&mut self, endpoint: Endpoint, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

impl<T: BulkTransport + ?Sized> BulkTransport for &mut T {
    fn bulk_write(&mut self, endpoint: Endpoint, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).bulk_write(endpoint, data, timeout)
    }

    fn bulk_read(&mut self, endpoint: Endpoint, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).bulk_read(endpoint, buf, timeout)
    }
}

impl<T: BulkTransport + ?Sized> BulkTransport for Box<T> {
    fn bulk_write(&mut self, endpoint: Endpoint, data: &[u8], timeout: Duration) -> Result<usize> {
        (**self).bulk_write(endpoint, data, timeout)
    }

    fn bulk_read(&mut self, endpoint: Endpoint, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).bulk_read(endpoint, buf, timeout)
    }
}
