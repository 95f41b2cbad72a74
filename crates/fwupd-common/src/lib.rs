//! Shared primitives for the fwupd core crates.
//!
//! - [`mem`]: bounds-checked copy/compare/search and endian integer access
//! - [`sum`]: additive checksums and the two's complement finishing transform
//! - [`crc`]: the catalogue of named CRC-8/16/32 parameter sets
//! - [`protobuf`]: the minimal protobuf wire subset used by device protocols
//! - [`guid`]: mixed-endian GUID conversion
//! - [`xml`]: indented XML output for exporters

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crc;
pub mod guid;
pub mod mem;
pub mod protobuf;
pub mod sum;
pub mod xml;

pub use crc::{Crc, CrcKind};
pub use guid::Guid;
pub use mem::{ByteVecExt, Endian};
pub use protobuf::{ProtobufReader, ProtobufValue, ProtobufWireType, ProtobufWriter};
pub use xml::XmlBuilder;

pub use fwupd_errors::{FwupdError, Result};
