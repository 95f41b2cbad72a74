//! Chunking and bounded stream views for firmware images.
//!
//! - [`ChunkArray`] splits a byte range into addressed, optionally paged
//!   [`Chunk`]s sized for a transfer protocol.
//! - [`PartialStream`] is a zero-copy window over a larger seekable stream.
//! - [`CompositeStream`] concatenates several blobs into one address space.
//! - [`SharedStream`] lets several views alias one base stream on a single
//!   thread; a conflicting access is reported as a busy error.
//!
//! Every `Read + Seek` type gets the helpers of [`InputStream`].
//!
//! ```
//! use fwupd_stream::{InputStream, PartialStream};
//! use std::io::{Cursor, Read, Seek, SeekFrom};
//!
//! let mut base = Cursor::new(b"12345678".to_vec());
//! let mut view = PartialStream::new(&mut base, 2, 4)?;
//! assert_eq!(view.stream_size()?, 4);
//!
//! view.seek(SeekFrom::Start(2))?;
//! let mut buf = [0u8; 2];
//! assert_eq!(view.read(&mut buf)?, 2);
//! assert_eq!(&buf, b"56");
//! assert_eq!(view.read(&mut buf)?, 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod chunk;
pub mod composite;
pub mod input;
pub mod partial;
pub mod shared;

pub use chunk::{Chunk, ChunkArray, ChunkLayout, StreamChunkArray};
pub use composite::CompositeStream;
pub use input::InputStream;
pub use partial::{PartialStream, UNTIL_END};
pub use shared::SharedStream;

pub use fwupd_errors::{FwupdError, Result};
