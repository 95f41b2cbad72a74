//! Sync and update protocols of bulk-pipe video conferencing controllers.
//!
//! A [`BulkSession`] owns the sequence counter and transfer buffer size of
//! one device and drives two interfaces over a [`BulkTransport`]:
//!
//! - the sync interface exchanges protobuf [`message`]s through a buffered
//!   BUFFER_WRITE / BUFFER_READ handshake, each frame acknowledged by an ACK
//!   naming the command as decimal text;
//! - the update interface pushes an image in [`fwupd_stream::Chunk`]s and
//!   finishes with an MD5 the device checks itself.
//!
//! Every blocking call carries a timeout from [`SessionConfig`], and every
//! transfer and retry delay observes the session [`CancellationToken`].
//!
//! ```
//! use fwupd_bulkcontroller::protocol::{Cmd, SyncFrame, decode_ack_payload};
//!
//! let ack = SyncFrame::ack(Cmd::BufferWrite.as_u32(), 1)?;
//! assert_eq!(&ack.payload, b"52231\0");
//! assert_eq!(decode_ack_payload(&ack.payload)?, 0xCC07);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cancel;
pub mod config;
pub mod message;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod state;
pub mod transport;

pub use cancel::CancellationToken;
pub use config::SessionConfig;
pub use message::{DeviceInfo, Request, UsbMessage};
pub use protocol::{Cmd, SyncFrame};
pub use retry::{retry, retry_full};
pub use session::BulkSession;
pub use state::{CoarseStatus, DeviceState, NoProgress, ProgressSink, UpdateState, WriteFlags};
pub use transport::{BulkTransport, Endpoint};

pub use fwupd_errors::{FwupdError, Result};
