//! Wire frames of the sync and update interfaces.
//!
//! Sync frames are `cmd, payload_length, sequence_id` (all u32le) followed by
//! the payload; update frames drop the sequence id. A sync ACK names the
//! acknowledged command as a decimal ASCII string in a 6-byte field, while an
//! update ACK carries it as a u32le.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use fwupd_errors::{FwupdError, Result};
use fwupd_struct::StaticSchema;

/// Size of a sync frame header.
pub const SYNC_HEADER_SIZE: usize = 12;
/// Size of an update frame header.
pub const UPD_HEADER_SIZE: usize = 8;
/// Size of the ASCII command field of a sync ACK.
pub const ACK_PAYLOAD_SIZE: usize = 6;
/// Size of an MD5 digest.
pub const HASH_VALUE_SIZE: usize = 16;

static SYNC_HEADER: StaticSchema = StaticSchema::new(
    "BulkcontrollerSyncHeader{ cmd:u32le, payload_length:u32le, sequence_id:u32le }",
);
static UPD_HEADER: StaticSchema =
    StaticSchema::new("BulkcontrollerUpdHeader{ cmd:u32le, payload_length:u32le }");
static UPD_RESPONSE: StaticSchema = StaticSchema::new(
    "BulkcontrollerUpdResponse{ cmd:u32le, payload_length:u32le, cmd_req:u32le }",
);
static SYNC_ACK: StaticSchema = StaticSchema::new("BulkcontrollerSyncAck{ cmd:6s }");
static END_TRANSFER: StaticSchema = StaticSchema::new(
    "BulkcontrollerEndTransfer{ update:u32le, force:u32le, checksum_type:u32le }",
);

/// Commands of both interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Cmd {
    /// Probe for the large transfer buffer.
    CheckBufferSize = 0xCC00,
    /// Open an update session.
    Init = 0xCC01,
    /// Announce the image size.
    StartTransfer = 0xCC02,
    /// One packet of the image.
    DataTransfer = 0xCC03,
    /// Image complete, verify the hash.
    EndTransfer = 0xCC04,
    /// Close the update session.
    Uninit = 0xCC05,
    /// Device to host message.
    BufferRead = 0xCC06,
    /// Host to device message.
    BufferWrite = 0xCC07,
    /// End of a buffered exchange.
    UninitBuffer = 0xCC08,
    /// Positive acknowledgement.
    Ack = 0xFF01,
    /// The device timed out.
    Timeout = 0xFF02,
    /// Negative acknowledgement.
    Nack = 0xFF03,
}

impl Cmd {
    /// Decode a wire value.
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0xCC00 => Self::CheckBufferSize,
            0xCC01 => Self::Init,
            0xCC02 => Self::StartTransfer,
            0xCC03 => Self::DataTransfer,
            0xCC04 => Self::EndTransfer,
            0xCC05 => Self::Uninit,
            0xCC06 => Self::BufferRead,
            0xCC07 => Self::BufferWrite,
            0xCC08 => Self::UninitBuffer,
            0xFF01 => Self::Ack,
            0xFF02 => Self::Timeout,
            0xFF03 => Self::Nack,
            _ => return None,
        })
    }

    /// Wire value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Protocol name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckBufferSize => "CHECK_BUFFERSIZE",
            Self::Init => "INIT",
            Self::StartTransfer => "START_TRANSFER",
            Self::DataTransfer => "DATA_TRANSFER",
            Self::EndTransfer => "END_TRANSFER",
            Self::Uninit => "UNINIT",
            Self::BufferRead => "BUFFER_READ",
            Self::BufferWrite => "BUFFER_WRITE",
            Self::UninitBuffer => "UNINIT_BUFFER",
            Self::Ack => "ACK",
            Self::Timeout => "TIMEOUT",
            Self::Nack => "NACK",
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a raw command value, known or not.
pub fn cmd_to_string(value: u32) -> String {
    match Cmd::from_u32(value) {
        Some(cmd) => cmd.as_str().to_owned(),
        None => format!("0x{value:x}"),
    }
}

/// Algorithm of the END_TRANSFER checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChecksumType {
    /// SHA-256 digest.
    Sha256 = 0,
    /// SHA-512 digest.
    Sha512 = 1,
    /// MD5 digest.
    Md5 = 2,
}

fn payload_length(payload: &[u8]) -> Result<u32> {
    u32::try_from(payload.len())
        .map_err(|e| FwupdError::out_of_range(format!("payload of 0x{:x} bytes too large: {e}", payload.len())))
}

fn check_payload(buf: &[u8], header_size: usize, payload_length: u32) -> Result<usize> {
    let available = buf.len() - header_size;
    let length = usize::try_from(payload_length).map_err(|e| {
        FwupdError::out_of_range(format!("payload length 0x{payload_length:x} too large: {e}"))
    })?;
    if length > available {
        return Err(FwupdError::out_of_range(format!(
            "payload length 0x{length:x} exceeds received 0x{available:x} bytes"
        )));
    }
    Ok(length)
}

/// A frame of the sync interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFrame {
    /// Raw command value.
    pub cmd: u32,
    /// Sequence id assigned by the sender.
    pub sequence_id: u32,
    /// Frame payload.
    pub payload: Vec<u8>,
}

impl SyncFrame {
    /// A frame for a known command.
    pub fn new(cmd: Cmd, sequence_id: u32, payload: Vec<u8>) -> Self {
        Self {
            cmd: cmd.as_u32(),
            sequence_id,
            payload,
        }
    }

    /// An ACK for `cmd` echoing `sequence_id`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the header schema does not compile.
    pub fn ack(cmd: u32, sequence_id: u32) -> Result<Self> {
        Ok(Self {
            cmd: Cmd::Ack.as_u32(),
            sequence_id,
            payload: encode_ack_payload(cmd)?,
        })
    }

    /// The known command, if any.
    pub fn command(&self) -> Option<Cmd> {
        Cmd::from_u32(self.cmd)
    }

    /// Serialize the frame.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if the payload does not fit a u32 length.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut st = SYNC_HEADER.new_instance()?;
        st.set_u32("cmd", self.cmd);
        st.set_u32("payload_length", payload_length(&self.payload)?);
        st.set_u32("sequence_id", self.sequence_id);
        let mut buf = st.pack();
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a received frame; bytes past the declared payload are ignored.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error for a truncated header or payload.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let st = SYNC_HEADER.parse(buf, 0)?;
        let length = check_payload(buf, st.size(), st.get_u32("payload_length"))?;
        Ok(Self {
            cmd: st.get_u32("cmd"),
            sequence_id: st.get_u32("sequence_id"),
            payload: buf[st.size()..st.size() + length].to_vec(),
        })
    }

    /// The command named by an ACK payload.
    ///
    /// # Errors
    ///
    /// See [`decode_ack_payload`].
    pub fn acked_cmd(&self) -> Result<u32> {
        decode_ack_payload(&self.payload)
    }
}

/// Build an update frame.
///
/// # Errors
///
/// Returns an out-of-range error if the payload does not fit a u32 length.
pub fn encode_upd(cmd: Cmd, payload: &[u8]) -> Result<Vec<u8>> {
    let mut st = UPD_HEADER.new_instance()?;
    st.set_u32("cmd", cmd.as_u32());
    st.set_u32("payload_length", payload_length(payload)?);
    let mut buf = st.pack();
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Split an update frame into command and payload.
///
/// # Errors
///
/// Returns an out-of-range error for a truncated header or payload.
pub fn decode_upd(buf: &[u8]) -> Result<(u32, &[u8])> {
    let st = UPD_HEADER.parse(buf, 0)?;
    let length = check_payload(buf, st.size(), st.get_u32("payload_length"))?;
    Ok((st.get_u32("cmd"), &buf[st.size()..st.size() + length]))
}

/// Reply to an update command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdResponse {
    /// Raw reply command, ACK on success.
    pub cmd: u32,
    /// Raw command being answered.
    pub cmd_req: u32,
}

impl UpdResponse {
    /// Serialize the reply.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the schema does not compile.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut st = UPD_RESPONSE.new_instance()?;
        st.set_u32("cmd", self.cmd);
        st.set_u32("payload_length", 4);
        st.set_u32("cmd_req", self.cmd_req);
        Ok(st.pack())
    }

    /// Parse a reply.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error for a truncated reply.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let st = UPD_RESPONSE.parse(buf, 0)?;
        Ok(Self {
            cmd: st.get_u32("cmd"),
            cmd_req: st.get_u32("cmd_req"),
        })
    }
}

/// Encode the command named by a sync ACK.
///
/// # Errors
///
/// Returns an invalid-data error if the decimal form is longer than the field.
pub fn encode_ack_payload(cmd: u32) -> Result<Vec<u8>> {
    let mut st = SYNC_ACK.new_instance()?;
    st.set_string("cmd", &cmd.to_string())?;
    Ok(st.pack())
}

/// Decode the command named by a sync ACK.
///
/// # Errors
///
/// Returns an invalid-data error if the field is empty or not decimal.
pub fn decode_ack_payload(payload: &[u8]) -> Result<u32> {
    let field = &payload[..payload.len().min(ACK_PAYLOAD_SIZE)];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let text = std::str::from_utf8(&field[..end])
        .map_err(|e| FwupdError::invalid_data(format!("ACK payload is not text: {e}")))?;
    if text.is_empty() {
        return Err(FwupdError::invalid_data("ACK payload is empty"));
    }
    text.parse::<u32>()
        .map_err(|e| FwupdError::invalid_data(format!("ACK payload '{text}' is not a command: {e}")))
}

/// Payload of END_TRANSFER for an image with `md5` digest.
///
/// # Errors
///
/// Returns an internal error if the schema does not compile.
pub fn end_transfer_payload(force: bool, md5: &[u8; HASH_VALUE_SIZE]) -> Result<Vec<u8>> {
    let mut st = END_TRANSFER.new_instance()?;
    st.set_u32("update", 1);
    st.set_u32("force", u32::from(force));
    st.set_u32("checksum_type", ChecksumType::Md5 as u32);
    let mut buf = st.pack();
    buf.extend_from_slice(BASE64.encode(md5).as_bytes());
    Ok(buf)
}

/// Header of an END_TRANSFER payload and its base64 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTransfer {
    /// Apply the image.
    pub update: bool,
    /// Apply even if the version is not newer.
    pub force: bool,
    /// Raw checksum algorithm.
    pub checksum_type: u32,
    /// Base64 encoded digest.
    pub checksum: String,
}

impl EndTransfer {
    /// Parse an END_TRANSFER payload.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error for a truncated header or an
    /// invalid-data error if the digest is not text.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let st = END_TRANSFER.parse(payload, 0)?;
        let checksum = std::str::from_utf8(&payload[st.size()..])
            .map_err(|e| FwupdError::invalid_data(format!("checksum is not text: {e}")))?;
        Ok(Self {
            update: st.get_u32("update") != 0,
            force: st.get_u32("force") != 0,
            checksum_type: st.get_u32("checksum_type"),
            checksum: checksum.to_owned(),
        })
    }
}
