//! The firmware container tree and format dispatch.
//!
//! Every image is a [`Firmware`]: the state shared by all formats lives in
//! [`FirmwareBase`], the format-specific header fields live in one
//! [`FirmwareFormat`] variant. Containers own their children as images.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use fwupd_common::XmlBuilder;
use fwupd_common::mem::memmem_safe;
use fwupd_errors::{FwupdError, Result, ResultExt};
use fwupd_stream::{InputStream, PartialStream, UNTIL_END};
use fwupd_struct::StructInstance;
use tracing::{debug, trace};

use crate::config::ParseConfig;
use crate::flags::ParseFlags;
use crate::formats::{
    AcpiTable, EfiFile, EfiFilesystem, EfiSection, EfiVolume, EfiVss2VariableStore,
    EfiVssAuthVariable, IfwiFpt, IfwiFptPartition, RawImage,
};
use crate::xml::XmlNode;

/// Per-parse limits and flags, narrowed as the parser descends.
#[derive(Debug, Clone)]
pub struct ParseContext {
    config: ParseConfig,
    flags: ParseFlags,
    depth: usize,
}

impl ParseContext {
    /// A context for a top-level parse.
    pub fn new(config: ParseConfig, flags: ParseFlags) -> Self {
        Self {
            config,
            flags,
            depth: 0,
        }
    }

    /// Flags of this parse.
    pub fn flags(&self) -> ParseFlags {
        self.flags
    }

    /// Limits of this parse.
    pub fn config(&self) -> &ParseConfig {
        &self.config
    }

    /// Nesting depth, 0 for the outermost image.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether checksum mismatches are fatal.
    pub fn check_checksums(&self) -> bool {
        !self.flags.contains(ParseFlags::IGNORE_CHECKSUM)
    }

    /// Image limit for every container of this parse.
    pub fn max_images(&self) -> usize {
        self.config.effective_max_images(self.flags)
    }

    /// Context for a nested image.
    ///
    /// # Errors
    ///
    /// Returns a resource-limit error if the nesting exceeds `max_depth`.
    pub fn child(&self) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > self.config.max_depth {
            return Err(FwupdError::resource_limit(format!(
                "images nested too deeply, limit is {}",
                self.config.max_depth
            )));
        }
        Ok(Self {
            config: self.config.clone(),
            flags: self.flags,
            depth,
        })
    }

    /// Dump a parsed header when verbose parsing is enabled.
    pub fn dump(&self, st: &StructInstance) {
        if self.config.verbose {
            trace!(depth = self.depth, "{st}");
        }
    }
}

/// State shared by every image regardless of format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareBase {
    /// Identifier, e.g. a GUID, a table signature or a partition name.
    pub id: Option<String>,
    /// Numeric index.
    pub idx: u64,
    /// Version string.
    pub version: Option<String>,
    /// Offset of the image inside its parent.
    pub offset: u64,
    /// Size of the image as found on disk, 0 if unknown.
    pub size: u64,
    /// Alignment as a power of two.
    pub alignment: u8,
    /// Payload of leaf images.
    pub bytes: Option<Vec<u8>>,
    images: Vec<Firmware>,
    images_max: usize,
}

impl Default for FirmwareBase {
    fn default() -> Self {
        Self {
            id: None,
            idx: 0,
            version: None,
            offset: 0,
            size: 0,
            alignment: 0,
            bytes: None,
            images: Vec::new(),
            images_max: ParseConfig::default().max_images,
        }
    }
}

impl FirmwareBase {
    /// Child images in order.
    pub fn images(&self) -> &[Firmware] {
        &self.images
    }

    /// Maximum number of child images.
    pub fn images_max(&self) -> usize {
        self.images_max
    }

    /// Change the maximum number of child images.
    pub fn set_images_max(&mut self, images_max: usize) {
        self.images_max = images_max;
    }

    /// Append a child image.
    ///
    /// # Errors
    ///
    /// Returns a resource-limit error if the image limit is reached.
    pub fn add_image(&mut self, image: Firmware) -> Result<()> {
        if self.images.len() >= self.images_max {
            return Err(FwupdError::resource_limit(format!(
                "too many images, limit is {}",
                self.images_max
            )));
        }
        self.images.push(image);
        Ok(())
    }

    /// Remove every child image.
    pub fn clear_images(&mut self) {
        self.images.clear();
    }

    /// The payload, or an error naming what is missing.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the image has no payload.
    pub fn bytes_or_err(&self) -> Result<&[u8]> {
        self.bytes
            .as_deref()
            .ok_or_else(|| FwupdError::not_found("no payload set"))
    }

    /// The payload, or an empty slice.
    pub fn bytes_or_empty(&self) -> &[u8] {
        self.bytes.as_deref().unwrap_or_default()
    }
}

/// Operations every container format provides.
///
/// `parse` receives a stream that starts at the image; the image may end
/// before the stream does. Formats without extra keys keep the default
/// `build` and `export`.
pub trait ContainerFormat {
    /// Registry name, e.g. `efi-volume`.
    fn name(&self) -> &'static str;

    /// Offset and bytes of a signature used to locate the image.
    fn magic(&self) -> Option<(u64, &'static [u8])> {
        None
    }

    /// Parse the image at the start of `stream`.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or truncated images.
    fn parse(
        &mut self,
        base: &mut FirmwareBase,
        stream: &mut dyn InputStream,
        ctx: &ParseContext,
    ) -> Result<()>;

    /// Serialize the image.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or out of range.
    fn write(&self, base: &FirmwareBase) -> Result<Vec<u8>>;

    /// Read format-specific keys from a builder element.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error for malformed values.
    fn build(&mut self, _base: &mut FirmwareBase, _node: &XmlNode) -> Result<()> {
        Ok(())
    }

    /// Write format-specific keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the XML writer fails.
    fn export(&self, _base: &FirmwareBase, _xb: &mut XmlBuilder) -> Result<()> {
        Ok(())
    }
}

/// The closed set of supported formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareFormat {
    /// Opaque payload.
    Raw(RawImage),
    /// ACPI table with the generic header.
    AcpiTable(AcpiTable),
    /// EFI firmware file.
    EfiFile(EfiFile),
    /// EFI file section.
    EfiSection(EfiSection),
    /// EFI firmware volume.
    EfiVolume(EfiVolume),
    /// FFS2/FFS3 file system inside a volume.
    EfiFilesystem(EfiFilesystem),
    /// Intel flash partition table.
    IfwiFpt(IfwiFpt),
    /// One partition of an IFWI FPT.
    IfwiFptPartition(IfwiFptPartition),
    /// Authenticated variable store.
    EfiVss2VariableStore(EfiVss2VariableStore),
    /// Authenticated variable.
    EfiVssAuthVariable(EfiVssAuthVariable),
}

/// Registry names accepted by [`Firmware::from_name`].
pub const FORMAT_NAMES: &[&str] = &[
    "raw",
    "acpi-table",
    "efi-file",
    "efi-section",
    "efi-filesystem",
    "efi-volume",
    "ifwi-fpt",
    "ifwi-fpt-partition",
    "efi-vss2-variable-store",
    "efi-vss-auth-variable",
];

impl FirmwareFormat {
    /// Default format state for a registry name.
    ///
    /// # Errors
    ///
    /// Returns a not-supported error for unknown names.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "raw" => Self::Raw(RawImage),
            "acpi-table" => Self::AcpiTable(AcpiTable::default()),
            "efi-file" => Self::EfiFile(EfiFile::default()),
            "efi-section" => Self::EfiSection(EfiSection::default()),
            "efi-filesystem" => Self::EfiFilesystem(EfiFilesystem),
            "efi-volume" => Self::EfiVolume(EfiVolume::default()),
            "ifwi-fpt" => Self::IfwiFpt(IfwiFpt::default()),
            "ifwi-fpt-partition" => Self::IfwiFptPartition(IfwiFptPartition::default()),
            "efi-vss2-variable-store" => Self::EfiVss2VariableStore(EfiVss2VariableStore),
            "efi-vss-auth-variable" => Self::EfiVssAuthVariable(EfiVssAuthVariable::default()),
            _ => {
                return Err(FwupdError::not_supported(format!(
                    "firmware format {name} not known, expected one of {}",
                    FORMAT_NAMES.join(", ")
                )));
            }
        })
    }

    fn ops(&self) -> &dyn ContainerFormat {
        match self {
            Self::Raw(f) => f,
            Self::AcpiTable(f) => f,
            Self::EfiFile(f) => f,
            Self::EfiSection(f) => f,
            Self::EfiVolume(f) => f,
            Self::EfiFilesystem(f) => f,
            Self::IfwiFpt(f) => f,
            Self::IfwiFptPartition(f) => f,
            Self::EfiVss2VariableStore(f) => f,
            Self::EfiVssAuthVariable(f) => f,
        }
    }

    fn ops_mut(&mut self) -> &mut dyn ContainerFormat {
        match self {
            Self::Raw(f) => f,
            Self::AcpiTable(f) => f,
            Self::EfiFile(f) => f,
            Self::EfiSection(f) => f,
            Self::EfiVolume(f) => f,
            Self::EfiFilesystem(f) => f,
            Self::IfwiFpt(f) => f,
            Self::IfwiFptPartition(f) => f,
            Self::EfiVss2VariableStore(f) => f,
            Self::EfiVssAuthVariable(f) => f,
        }
    }

    /// Registry name.
    pub fn name(&self) -> &'static str {
        self.ops().name()
    }
}

/// One image in a firmware tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    base: FirmwareBase,
    format: FirmwareFormat,
}

impl Firmware {
    /// An empty image of the given format.
    pub fn new(format: FirmwareFormat) -> Self {
        Self {
            base: FirmwareBase::default(),
            format,
        }
    }

    /// An empty image of a registered format.
    ///
    /// # Errors
    ///
    /// Returns a not-supported error for unknown names.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(Self::new(FirmwareFormat::from_name(name)?))
    }

    /// A raw image holding `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mut fw = Self::new(FirmwareFormat::Raw(RawImage));
        fw.base.size = bytes.len() as u64;
        fw.base.bytes = Some(bytes);
        fw
    }

    /// Registry name of the format.
    pub fn format_name(&self) -> &'static str {
        self.format.name()
    }

    /// Shared state.
    pub fn base(&self) -> &FirmwareBase {
        &self.base
    }

    /// Mutable shared state.
    pub fn base_mut(&mut self) -> &mut FirmwareBase {
        &mut self.base
    }

    /// Format-specific state.
    pub fn format(&self) -> &FirmwareFormat {
        &self.format
    }

    /// Mutable format-specific state.
    pub fn format_mut(&mut self) -> &mut FirmwareFormat {
        &mut self.format
    }

    /// Identifier.
    pub fn id(&self) -> Option<&str> {
        self.base.id.as_deref()
    }

    /// Set the identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.base.id = Some(id.into());
    }

    /// Numeric index.
    pub fn idx(&self) -> u64 {
        self.base.idx
    }

    /// Child images.
    pub fn images(&self) -> &[Firmware] {
        self.base.images()
    }

    /// Append a child image.
    ///
    /// # Errors
    ///
    /// Returns a resource-limit error if the image limit is reached.
    pub fn add_image(&mut self, image: Firmware) -> Result<()> {
        self.base.add_image(image)
    }

    /// First child image with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no child matches.
    pub fn get_image_by_id(&self, id: &str) -> Result<&Firmware> {
        self.images()
            .iter()
            .find(|img| img.id() == Some(id))
            .ok_or_else(|| FwupdError::not_found(format!("no image id {id} found")))
    }

    /// First child image with index `idx`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no child matches.
    pub fn get_image_by_idx(&self, idx: u64) -> Result<&Firmware> {
        self.images()
            .iter()
            .find(|img| img.idx() == idx)
            .ok_or_else(|| FwupdError::not_found(format!("no image idx 0x{idx:x} found")))
    }

    /// Parse from `offset` of `stream` with limits from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error prefixed with the format and offset of the image that
    /// failed.
    pub fn parse(
        &mut self,
        stream: &mut dyn InputStream,
        offset: u64,
        flags: ParseFlags,
    ) -> Result<()> {
        self.parse_with_config(stream, offset, flags, &ParseConfig::from_env())
    }

    /// Parse a byte buffer with limits from the environment.
    ///
    /// # Errors
    ///
    /// See [`Firmware::parse`].
    pub fn parse_bytes(&mut self, buf: &[u8], offset: u64, flags: ParseFlags) -> Result<()> {
        let mut cursor = std::io::Cursor::new(buf);
        self.parse(&mut cursor, offset, flags)
    }

    /// Parse from `offset` of `stream` with explicit limits.
    ///
    /// Unless [`ParseFlags::NO_SEARCH`] is set, formats with a signature are
    /// searched for from `offset` onwards.
    ///
    /// # Errors
    ///
    /// See [`Firmware::parse`]; also returns a resource-limit error if the
    /// stream is larger than `max_size`.
    pub fn parse_with_config(
        &mut self,
        stream: &mut dyn InputStream,
        offset: u64,
        flags: ParseFlags,
        config: &ParseConfig,
    ) -> Result<()> {
        config.validate()?;
        let size = stream.stream_size()?;
        if size > config.max_size {
            return Err(FwupdError::resource_limit(format!(
                "stream of size 0x{size:x} exceeds limit of 0x{:x}",
                config.max_size
            )));
        }
        let ctx = ParseContext::new(config.clone(), flags);
        let offset = self.locate(stream, offset, flags)?;
        let mut view = PartialStream::new(&mut *stream, offset, UNTIL_END)?;
        self.base.offset = offset;
        self.parse_stream(&mut view, &ctx)
    }

    fn locate(&self, stream: &mut dyn InputStream, offset: u64, flags: ParseFlags) -> Result<u64> {
        let Some((magic_offset, magic)) = self.format.ops().magic() else {
            return Ok(offset);
        };
        let start = offset.checked_add(magic_offset).ok_or_else(|| {
            FwupdError::out_of_range(format!("offset 0x{offset:x} overflows"))
        })?;
        let mut probe = vec![0u8; magic.len()];
        if stream.read_exact_at(start, &mut probe).is_ok() && probe == magic {
            return Ok(offset);
        }
        if flags.contains(ParseFlags::NO_SEARCH) {
            return Err(FwupdError::invalid_file(format!(
                "no {} signature at 0x{offset:x}",
                self.format_name()
            )));
        }
        let haystack = stream.read_to_end_at(start)?;
        let found = memmem_safe(&haystack, magic)
            .prefix(&format!("no {} signature found", self.format_name()))?;
        let found = offset + found as u64;
        debug!(format = self.format_name(), offset = found, "found signature");
        Ok(found)
    }

    /// Parse an image that starts at the beginning of `stream`.
    ///
    /// Container formats call this for their children with a narrowed
    /// context.
    ///
    /// # Errors
    ///
    /// See [`Firmware::parse`].
    pub fn parse_stream(&mut self, stream: &mut dyn InputStream, ctx: &ParseContext) -> Result<()> {
        let name = self.format_name();
        let offset = self.base.offset;
        self.base.images_max = ctx.max_images();
        self.base.clear_images();
        let Self { base, format } = self;
        format
            .ops_mut()
            .parse(base, stream, ctx)
            .with_prefix(|| format!("failed to parse {name} at 0x{offset:x}"))?;
        debug!(
            format = name,
            offset,
            size = self.base.size,
            images = self.base.images.len(),
            depth = ctx.depth(),
            "parsed image"
        );
        Ok(())
    }

    /// Parse a child image at `offset` of `stream` and add it to `self`.
    ///
    /// # Errors
    ///
    /// Returns the child's parse error or a resource-limit error.
    pub(crate) fn parse_child(
        base: &mut FirmwareBase,
        mut child: Firmware,
        stream: &mut dyn InputStream,
        offset: u64,
        size: u64,
        ctx: &ParseContext,
    ) -> Result<u64> {
        if base.images.len() >= base.images_max {
            return Err(FwupdError::resource_limit(format!(
                "too many images, limit is {}",
                base.images_max
            )));
        }
        let ctx = ctx.child()?;
        let mut view = PartialStream::new(&mut *stream, offset, size)?;
        child.base.offset = offset;
        child.parse_stream(&mut view, &ctx)?;
        let child_size = child.base.size;
        base.add_image(child)?;
        Ok(child_size)
    }

    /// Serialize the image.
    ///
    /// # Errors
    ///
    /// Returns an error prefixed with the format name.
    pub fn write(&self) -> Result<Vec<u8>> {
        self.format
            .ops()
            .write(&self.base)
            .with_prefix(|| format!("failed to write {}", self.format_name()))
    }

    /// Build a tree from a `<firmware>` builder document.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error for malformed documents and a
    /// not-supported error for unknown formats.
    pub fn build_from_xml(xml: &str) -> Result<Self> {
        let node = XmlNode::parse(xml)?;
        if node.name() != "firmware" {
            return Err(FwupdError::invalid_data(format!(
                "expected <firmware> root, got <{}>",
                node.name()
            )));
        }
        let mut fw = Self::from_name(node.attr("format").unwrap_or("raw"))?;
        fw.build(&node)?;
        Ok(fw)
    }

    /// Apply a `<firmware>` element to this image.
    ///
    /// # Errors
    ///
    /// See [`Firmware::build_from_xml`].
    pub fn build(&mut self, node: &XmlNode) -> Result<()> {
        let base = &mut self.base;
        if let Some(id) = node.query_text("id") {
            base.id = Some(id.to_owned());
        }
        if let Some(idx) = node.query_uint("idx")? {
            base.idx = idx;
        }
        if let Some(version) = node.query_text("version") {
            base.version = Some(version.to_owned());
        }
        if let Some(offset) = node.query_uint("offset")? {
            base.offset = offset;
        }
        if let Some(size) = node.query_uint("size")? {
            base.size = size;
        }
        if let Some(alignment) = node.query_uint("alignment")? {
            base.alignment = u8::try_from(alignment)
                .ok()
                .filter(|&a| a < 64)
                .ok_or_else(|| FwupdError::invalid_data(format!("alignment 0x{alignment:x} invalid")))?;
        }
        if let Some(data) = node.child("data") {
            base.bytes = Some(decode_data(data)?);
        }
        let Self { base, format } = self;
        format
            .ops_mut()
            .build(base, node)
            .with_prefix(|| format!("failed to build {}", format.name()))?;
        for child in node.children().iter().filter(|c| c.name() == "firmware") {
            let mut image = Self::from_name(child.attr("format").unwrap_or("raw"))?;
            image.build(child)?;
            self.base.add_image(image)?;
        }
        Ok(())
    }

    /// Export the tree as an XML document.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the XML writer fails.
    pub fn export_xml(&self) -> Result<String> {
        let mut xb = XmlBuilder::new();
        self.export(&mut xb)?;
        xb.finish()
    }

    /// Export this image into an open builder.
    ///
    /// # Errors
    ///
    /// See [`Firmware::export_xml`].
    pub fn export(&self, xb: &mut XmlBuilder) -> Result<()> {
        let base = &self.base;
        xb.open_with_attrs("firmware", &[("format", self.format_name())])?;
        xb.insert_kv("id", base.id.as_deref())?;
        xb.insert_kx("idx", base.idx)?;
        xb.insert_kv("version", base.version.as_deref())?;
        xb.insert_kx("offset", base.offset)?;
        xb.insert_kx("size", base.size)?;
        xb.insert_kx("alignment", u64::from(base.alignment))?;
        self.format.ops().export(base, xb)?;
        if let Some(bytes) = base.bytes.as_deref().filter(|b| !b.is_empty()) {
            let size = format!("0x{:x}", bytes.len());
            xb.text_with_attrs(
                "data",
                &BASE64.encode(bytes),
                &[("encoding", "base64"), ("size", &size)],
            )?;
        }
        for image in base.images() {
            image.export(xb)?;
        }
        xb.close("firmware")
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn walk(fw: &Firmware, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:indent$}{}", "", fw.format_name(), indent = depth * 2)?;
            if let Some(id) = fw.id() {
                write!(f, " id={id}")?;
            }
            if fw.idx() != 0 {
                write!(f, " idx=0x{:x}", fw.idx())?;
            }
            writeln!(f, " offset=0x{:x} size=0x{:x}", fw.base.offset, fw.base.size)?;
            for image in fw.images() {
                walk(image, depth + 1, f)?;
            }
            Ok(())
        }
        walk(self, 0, f)
    }
}

/// Decode a `<data>` element honouring its `encoding` attribute.
///
/// # Errors
///
/// Returns an invalid-data error for malformed base64 or hex.
pub fn decode_data(node: &XmlNode) -> Result<Vec<u8>> {
    let text = node.text();
    match node.attr("encoding") {
        Some("base64") => BASE64
            .decode(text)
            .map_err(|e| FwupdError::invalid_data(format!("invalid base64 data: {e}"))),
        Some("hex") => decode_hex(text),
        None => Ok(text.as_bytes().to_vec()),
        Some(other) => Err(FwupdError::not_supported(format!(
            "data encoding {other} not supported"
        ))),
    }
}

/// Decode a hex string, ignoring whitespace.
///
/// # Errors
///
/// Returns an invalid-data error for odd lengths or non-hex characters.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(FwupdError::invalid_data(format!(
            "hex data has odd length 0x{:x}",
            digits.len()
        )));
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair)
                .map_err(|e| FwupdError::invalid_data(format!("invalid hex data: {e}")))?;
            u8::from_str_radix(pair, 16)
                .map_err(|e| FwupdError::invalid_data(format!("invalid hex data '{pair}': {e}")))
        })
        .collect()
}

/// Encode bytes as lowercase hex.
pub fn encode_hex(buf: &[u8]) -> String {
    buf.iter().map(|b| format!("{b:02x}")).collect()
}
