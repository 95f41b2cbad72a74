//! Fuzzes the struct schema compiler.
//!
//! The input up to the first NUL byte is compiled as a schema; the remaining bytes
//! are unpacked against it and every readable field is read back. None of these
//! operations must panic.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_struct_schema

#![no_main]

use std::sync::Arc;

use fwupd_struct::{FieldKind, StructInstance, StructSchema};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let split = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let (text, rest) = data.split_at(split);
    let Ok(text) = std::str::from_utf8(text) else {
        return;
    };
    let Ok(schema) = StructSchema::compile(text) else {
        return;
    };
    let schema = Arc::new(schema);
    let Ok(st) = StructInstance::parse(Arc::clone(&schema), rest.get(1..).unwrap_or_default(), 0) else {
        return;
    };
    for field in schema.fields() {
        if field.is_constant() {
            continue;
        }
        let id = field.id();
        match field.kind() {
            FieldKind::String => {
                let _ = st.get_string(id);
            }
            kind if !field.is_scalar(kind) => {
                let _ = st.get_bytes(id);
            }
            FieldKind::U8 => {
                let _ = st.get_u8(id);
            }
            FieldKind::U16 => {
                let _ = st.get_u16(id);
            }
            FieldKind::U24 => {
                let _ = st.get_u24(id);
            }
            FieldKind::U32 => {
                let _ = st.get_u32(id);
            }
            FieldKind::U64 => {
                let _ = st.get_u64(id);
            }
            FieldKind::Guid => {
                let _ = st.get_guid(id);
            }
        }
    }
    let _ = st.pack();
});
