//! Property-based tests for schema packing.

use std::sync::Arc;

use fwupd_struct::{StructInstance, StructSchema, UnpackFlags};
use proptest::prelude::*;

const SCHEMA: &str = "Rec{ a:u8, b:u16le, c:u24be, d:u32be, e:u64le, name:8s }";

proptest! {
    #[test]
    fn test_pack_then_unpack_preserves_fields(
        a in any::<u8>(),
        b in any::<u16>(),
        c in 0u32..0x0100_0000,
        d in any::<u32>(),
        e in any::<u64>(),
        name in "[A-Za-z0-9]{0,8}",
    ) {
        let schema = Arc::new(StructSchema::compile(SCHEMA).map_err(|e| TestCaseError::fail(e.to_string()))?);
        let mut st = StructInstance::new(schema.clone());
        st.set_u8("a", a);
        st.set_u16("b", b);
        st.set_u24("c", c);
        st.set_u32("d", d);
        st.set_u64("e", e);
        st.set_string("name", &name).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let buf = st.pack();
        prop_assert_eq!(buf.len(), schema.size());

        let mut other = StructInstance::new(schema);
        other.unpack(&buf, 0, UnpackFlags::NONE).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(other.get_u8("a"), a);
        prop_assert_eq!(other.get_u16("b"), b);
        prop_assert_eq!(other.get_u24("c"), c);
        prop_assert_eq!(other.get_u32("d"), d);
        prop_assert_eq!(other.get_u64("e"), e);
        prop_assert_eq!(other.get_string("name"), name);
    }

    #[test]
    fn test_unpack_rejects_short_buffers(len in 0usize..26) {
        let schema = Arc::new(StructSchema::compile(SCHEMA).map_err(|e| TestCaseError::fail(e.to_string()))?);
        let mut st = StructInstance::new(schema);
        prop_assert!(st.unpack(&vec![0u8; len], 0, UnpackFlags::NONE).is_err());
    }

    #[test]
    fn test_compile_never_panics(text in "[A-Za-z0-9{}:,$_ ]{0,48}") {
        if let Ok(schema) = StructSchema::compile(&text) {
            prop_assert!(!schema.fields().is_empty());
            prop_assert!(schema.fields().iter().all(|f| f.offset() + f.width() <= schema.size()));
        }
    }
}
