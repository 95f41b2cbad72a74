//! Schema compilation.

use fwupd_common::guid::guid_from_string;
use fwupd_common::mem::Endian;

use crate::error::SchemaError;

/// Struct names must not start with this prefix.
pub const RESERVED_PREFIX: &str = "FuStruct";

/// Largest struct a schema may describe.
pub const MAX_STRUCT_SIZE: usize = 0x10000;

const MARKER_CONST: &str = "const";
const SIGIL_STRUCT_SIZE: &str = "$struct_size";
const SIGIL_STRUCT_OFFSET: &str = "$struct_offset";

/// Element type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 24-bit integer
    U24,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// Fixed-length string of single bytes
    String,
    /// 16 bytes holding a mixed-endian GUID
    Guid,
}

impl FieldKind {
    /// Width of one element in bytes.
    pub fn element_width(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::String => 1,
            FieldKind::U16 => 2,
            FieldKind::U24 => 3,
            FieldKind::U32 => 4,
            FieldKind::U64 => 8,
            FieldKind::Guid => 16,
        }
    }

    /// Check if this is one of the integer kinds.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldKind::U8 | FieldKind::U16 | FieldKind::U24 | FieldKind::U32 | FieldKind::U64
        )
    }
}

/// One compiled field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    id: String,
    kind: FieldKind,
    endian: Endian,
    multiplier: usize,
    offset: usize,
    default: Option<Vec<u8>>,
    constant: bool,
}

impl FieldSpec {
    /// Field identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Element type.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Byte order of multi-byte integers.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Element count.
    pub fn multiplier(&self) -> usize {
        self.multiplier
    }

    /// Offset from the start of the struct.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total width in bytes.
    pub fn width(&self) -> usize {
        self.kind.element_width() * self.multiplier
    }

    /// Encoded default, exactly [`FieldSpec::width`] bytes long.
    pub fn default_bytes(&self) -> Option<&[u8]> {
        self.default.as_deref()
    }

    /// Check if unpacking verifies this field against its default.
    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// Check if this field holds exactly one integer of `kind`.
    pub fn is_scalar(&self, kind: FieldKind) -> bool {
        self.kind == kind && self.multiplier == 1
    }
}

/// A compiled struct layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructSchema {
    name: String,
    fields: Vec<FieldSpec>,
    size: usize,
}

fn parse_type(id: &str, ty: &str) -> Result<(FieldKind, Endian, usize), SchemaError> {
    let unknown = || SchemaError::UnknownType {
        id: id.to_string(),
        ty: ty.to_string(),
    };
    let digits = ty.bytes().take_while(u8::is_ascii_digit).count();
    let (mult, base) = ty.split_at(digits);
    let multiplier = if mult.is_empty() {
        1
    } else {
        mult.parse::<usize>()
            .ok()
            .filter(|&m| m > 0)
            .ok_or_else(unknown)?
    };
    let (kind, endian) = match base {
        "u8" => (FieldKind::U8, Endian::Little),
        "u16le" => (FieldKind::U16, Endian::Little),
        "u16be" => (FieldKind::U16, Endian::Big),
        "u24le" => (FieldKind::U24, Endian::Little),
        "u24be" => (FieldKind::U24, Endian::Big),
        "u32le" => (FieldKind::U32, Endian::Little),
        "u32be" => (FieldKind::U32, Endian::Big),
        "u64le" => (FieldKind::U64, Endian::Little),
        "u64be" => (FieldKind::U64, Endian::Big),
        "s" => (FieldKind::String, Endian::Little),
        "guid" => (FieldKind::Guid, Endian::Little),
        _ => return Err(unknown()),
    };
    Ok((kind, endian, multiplier))
}

fn parse_number(value: &str) -> Option<u64> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse::<u64>().ok(),
    }
}

fn encode_integer(field: &FieldSpec, value: u64) -> Option<Vec<u8>> {
    let width = field.width();
    if width < 8 && value >> (width * 8) != 0 {
        return None;
    }
    let bytes = match field.endian {
        Endian::Little => value.to_le_bytes()[..width].to_vec(),
        Endian::Big => value.to_be_bytes()[8 - width..].to_vec(),
    };
    Some(bytes)
}

fn resolve_default(field: &FieldSpec, value: &str, size: usize) -> Result<Vec<u8>, SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidDefault {
        id: field.id.clone(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let scalar_int = field.kind.is_integer() && field.multiplier == 1;

    // literal number
    if scalar_int {
        if let Some(n) = parse_number(value) {
            return encode_integer(field, n).ok_or_else(|| invalid("value does not fit"));
        }
    }

    // literal string
    if field.kind == FieldKind::String {
        if value.starts_with('$') {
            return Err(invalid("computed default on a string field"));
        }
        let text = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        if text.len() > field.width() {
            return Err(invalid("string is longer than the field"));
        }
        let mut buf = text.as_bytes().to_vec();
        buf.resize(field.width(), 0);
        return Ok(buf);
    }
    if field.is_scalar(FieldKind::Guid) && !value.starts_with('$') {
        return guid_from_string(value)
            .map(|g| g.to_vec())
            .map_err(|e| invalid(&e.to_string()));
    }

    // computed
    let computed = match value {
        SIGIL_STRUCT_SIZE => size,
        SIGIL_STRUCT_OFFSET => field.offset,
        _ => return Err(invalid("not a number, string or computed value")),
    };
    if !scalar_int {
        return Err(invalid("computed default on a non-numeric field"));
    }
    encode_integer(field, computed as u64).ok_or_else(|| invalid("value does not fit"))
}

impl StructSchema {
    /// Compile schema text into an offset table.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] for an empty or reserved name, an empty,
    /// duplicated or badly typed field, a missing field list, or a default
    /// that cannot be resolved for its field.
    pub fn compile(text: &str) -> Result<Self, SchemaError> {
        let mut tokens = text
            .split(['{', '}', ',', '\n', '\t'])
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let name = tokens.next().ok_or(SchemaError::Empty)?.to_string();
        if name.starts_with(RESERVED_PREFIX) {
            return Err(SchemaError::ReservedPrefix(name));
        }

        let mut fields: Vec<FieldSpec> = Vec::new();
        let mut defaults: Vec<Option<&str>> = Vec::new();
        let mut offset = 0usize;
        for token in tokens {
            let parts: Vec<&str> = token.split(':').map(str::trim).collect();
            if parts.len() < 2 || parts.len() > 4 {
                return Err(SchemaError::InvalidToken(token.to_string()));
            }
            let id = parts[0];
            if id.is_empty() {
                return Err(SchemaError::EmptyId(token.to_string()));
            }
            if fields.iter().any(|f| f.id == id) {
                return Err(SchemaError::DuplicateId(id.to_string()));
            }
            let (kind, endian, multiplier) = parse_type(id, parts[1])?;
            let default = parts.get(2).copied().filter(|d| !d.is_empty());
            let constant = match parts.get(3) {
                None => false,
                Some(&MARKER_CONST) => true,
                Some(marker) => {
                    return Err(SchemaError::InvalidMarker {
                        id: id.to_string(),
                        marker: (*marker).to_string(),
                    });
                }
            };
            if constant && default.is_none() {
                return Err(SchemaError::ConstantWithoutDefault(id.to_string()));
            }
            let width = kind
                .element_width()
                .checked_mul(multiplier)
                .ok_or_else(|| SchemaError::TooLarge(name.clone()))?;
            fields.push(FieldSpec {
                id: id.to_string(),
                kind,
                endian,
                multiplier,
                offset,
                default: None,
                constant,
            });
            defaults.push(default);
            offset = offset
                .checked_add(width)
                .filter(|&end| end <= MAX_STRUCT_SIZE)
                .ok_or_else(|| SchemaError::TooLarge(name.clone()))?;
        }
        if fields.is_empty() {
            return Err(SchemaError::NoFields(name));
        }

        // defaults can refer to the total size, so resolve them last
        let size = offset;
        for (field, default) in fields.iter_mut().zip(defaults) {
            if let Some(value) = default {
                field.default = Some(resolve_default(field, value, size)?);
            }
        }
        Ok(Self { name, fields, size })
    }

    /// Struct name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fields in offset order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by id.
    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Offset of a field, if it exists.
    pub fn offset_of(&self, id: &str) -> Option<usize> {
        self.field(id).map(FieldSpec::offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_follow_declaration_order() -> Result<(), SchemaError> {
        let schema = StructSchema::compile(
            "Hdr{\n\tsignature:4s,\n\tlength:u32le,\n\trevision:u8,\n\tsize:u24be,\n\tname:guid\n}",
        )?;
        assert_eq!(schema.name(), "Hdr");
        let offsets: Vec<(&str, usize, usize)> = schema
            .fields()
            .iter()
            .map(|f| (f.id(), f.offset(), f.width()))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("signature", 0, 4),
                ("length", 4, 4),
                ("revision", 8, 1),
                ("size", 9, 3),
                ("name", 12, 16),
            ]
        );
        assert_eq!(schema.size(), 28);
        assert_eq!(schema.field("size").map(FieldSpec::endian), Some(Endian::Big));
        Ok(())
    }

    #[test]
    fn test_computed_defaults() -> Result<(), SchemaError> {
        let schema = StructSchema::compile(
            "Hdr{ magic:u16be:0xAA55:const, len:u16le:$struct_size, here:u8:$struct_offset }",
        )?;
        assert_eq!(schema.field("magic").and_then(FieldSpec::default_bytes), Some(&[0xAA, 0x55][..]));
        assert_eq!(schema.field("len").and_then(FieldSpec::default_bytes), Some(&[5, 0][..]));
        assert_eq!(schema.field("here").and_then(FieldSpec::default_bytes), Some(&[4][..]));
        assert!(schema.field("magic").is_some_and(FieldSpec::is_constant));
        Ok(())
    }

    #[test]
    fn test_string_and_guid_defaults() -> Result<(), SchemaError> {
        let schema = StructSchema::compile(
            "Hdr{ oem:6s:\"ABCD\", id:guid:8c8ce578-8a3d-4f1c-9935-896185c32dd3 }",
        )?;
        assert_eq!(
            schema.field("oem").and_then(FieldSpec::default_bytes),
            Some(&b"ABCD\0\0"[..])
        );
        assert_eq!(
            schema.field("id").and_then(FieldSpec::default_bytes).map(|b| b[0]),
            Some(0x78)
        );
        Ok(())
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(StructSchema::compile(" \n"), Err(SchemaError::Empty));
        assert!(matches!(
            StructSchema::compile("FuStructFoo{ a:u8 }"),
            Err(SchemaError::ReservedPrefix(_))
        ));
        assert!(matches!(StructSchema::compile("Foo{}"), Err(SchemaError::NoFields(_))));
        assert!(matches!(
            StructSchema::compile("Foo{ a:u16 }"),
            Err(SchemaError::UnknownType { .. })
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a:0u8 }"),
            Err(SchemaError::UnknownType { .. })
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a:u8, a:u8 }"),
            Err(SchemaError::DuplicateId(_))
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ :u8 }"),
            Err(SchemaError::EmptyId(_))
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a }"),
            Err(SchemaError::InvalidToken(_))
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a:u8:0x100 }"),
            Err(SchemaError::InvalidDefault { .. })
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a:4s:$struct_size }"),
            Err(SchemaError::InvalidDefault { .. })
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a:2s:ABC }"),
            Err(SchemaError::InvalidDefault { .. })
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a:u8:1:fixed }"),
            Err(SchemaError::InvalidMarker { .. })
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a:99999999s:x }"),
            Err(SchemaError::TooLarge(_))
        ));
        assert!(matches!(
            StructSchema::compile("Foo{ a:u8::const }"),
            Err(SchemaError::ConstantWithoutDefault(_))
        ));
    }

    #[test]
    fn test_compile_is_deterministic() -> Result<(), SchemaError> {
        let text = "Foo{ a:u8, b:3u16be:, c:u64le:$struct_size }";
        assert_eq!(StructSchema::compile(text)?, StructSchema::compile(text)?);
        Ok(())
    }
}
