//! Struct schema engine.
//!
//! A schema is compiled from a compact text form into an offset table, then
//! used to pack and unpack fixed-layout binary records:
//!
//! ```
//! use fwupd_struct::{StructInstance, StructSchema, UnpackFlags};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(StructSchema::compile("Foo{ val: u32le: 0x1234 }")?);
//! let st = StructInstance::new(schema.clone());
//! assert_eq!(st.pack(), [0x34, 0x12, 0x00, 0x00]);
//!
//! let mut st = StructInstance::new(schema);
//! st.unpack(&[0x78, 0x56, 0x00, 0x00], 0, UnpackFlags::NONE)?;
//! assert_eq!(st.get_u32("val"), 0x5678);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Schema text
//!
//! `Name{ id:type[:default[:const]], ... }`. Tokens are separated by any of
//! `{ } ,` newline or tab. A type is an optional decimal multiplier followed
//! by one of `u8 u16le u16be u24le u24be u32le u32be u64le u64be s guid`.
//! A default is a numeric literal, a string literal, a GUID, or one of the
//! computed values `$struct_size` and `$struct_offset`. The `const` marker
//! makes the default a value that unpacking verifies instead of copying.
//!
//! Typed accessors treat a wrong id, a wrong type or a constant field as a
//! caller bug and panic.

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod instance;
pub mod schema;
pub mod static_schema;

pub use error::SchemaError;
pub use instance::{StructInstance, UnpackFlags};
pub use schema::{FieldKind, FieldSpec, MAX_STRUCT_SIZE, RESERVED_PREFIX, StructSchema};
pub use static_schema::StaticSchema;
