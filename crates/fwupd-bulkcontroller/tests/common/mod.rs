//! A simulated device speaking both interfaces over an in-memory pipe.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::VecDeque;
use std::time::Duration;

use fwupd_bulkcontroller::protocol::{
    Cmd, EndTransfer, SyncFrame, UpdResponse, decode_upd, encode_ack_payload,
};
use fwupd_bulkcontroller::{BulkTransport, Endpoint, FwupdError, Result};
use fwupd_common::protobuf::{ProtobufReader, ProtobufWriter};
use fwupd_errors::ErrorKind;

/// Order in which the device answers UNINIT_BUFFER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOrder {
    AckFirst,
    ReadFirst,
}

/// Deliberate protocol faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    AckWrongSequence,
    AckWrongCommand,
    DuplicateRead,
    UpdAckWrongCommand,
}

#[derive(Debug)]
pub struct SimDevice {
    pub name: String,
    pub version: String,
    pub accept_large_buffer: bool,
    pub init_nacks: u32,
    pub reply_order: ReplyOrder,
    pub fault: Fault,
    /// `(updateStatus, updateProgress)` reported by successive polls, then current.
    pub update_states: VecDeque<(i64, u32)>,
    /// Error returned by every update-interface write.
    pub upd_error: Option<ErrorKind>,

    pub sync_log: Vec<(String, u32)>,
    pub upd_log: Vec<String>,
    pub upd_writes: u32,
    pub polls: u32,
    pub init_count: u32,
    pub image_size: Option<u64>,
    pub image: Vec<u8>,
    pub largest_packet: usize,
    pub end_transfer: Option<EndTransfer>,
    pub time: Option<(u64, String)>,
    pub rebooted: bool,

    pub request: Vec<u8>,
    pub sync_in: VecDeque<Vec<u8>>,
    pub upd_in: VecDeque<Vec<u8>>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self {
            name: "Rally Bar".to_owned(),
            version: "1.4.23".to_owned(),
            accept_large_buffer: true,
            init_nacks: 0,
            reply_order: ReplyOrder::AckFirst,
            fault: Fault::None,
            update_states: VecDeque::new(),
            upd_error: None,
            sync_log: Vec::new(),
            upd_log: Vec::new(),
            upd_writes: 0,
            polls: 0,
            init_count: 0,
            image_size: None,
            image: Vec::new(),
            largest_packet: 0,
            end_transfer: None,
            time: None,
            rebooted: false,
            request: Vec::new(),
            sync_in: VecDeque::new(),
            upd_in: VecDeque::new(),
        }
    }
}

fn frame(cmd: Cmd, sequence_id: u32, payload: Vec<u8>) -> Result<Vec<u8>> {
    SyncFrame::new(cmd, sequence_id, payload).encode()
}

impl SimDevice {
    pub fn pending_sync(&self) -> usize {
        self.sync_in.len()
    }

    fn ack(&mut self, cmd: Cmd, sequence_id: u32) -> Result<Vec<u8>> {
        let (cmd, sequence_id) = match self.fault {
            Fault::AckWrongSequence => (cmd, sequence_id.wrapping_add(7)),
            Fault::AckWrongCommand => (Cmd::Init, sequence_id),
            _ => (cmd, sequence_id),
        };
        frame(Cmd::Ack, sequence_id, encode_ack_payload(cmd.as_u32())?)
    }

    fn device_info_reply(&mut self) -> Result<Vec<u8>> {
        self.polls += 1;
        let (status, progress) = self.update_states.pop_front().unwrap_or((0, 0));
        let json = serde_json::json!({
            "payload": {
                "devices": [
                    { "name": "Tap", "type": 3, "sw": "9.9.9" },
                    {
                        "name": self.name,
                        "type": 0,
                        "sw": self.version,
                        "status": 1,
                        "updateStatus": status,
                        "updateProgress": progress,
                    }
                ]
            }
        })
        .to_string();
        let mut info = ProtobufWriter::new();
        info.add_string(1, &json)?;
        let mut response = ProtobufWriter::new();
        response.add_embedded(1, &info)?;
        let mut msg = ProtobufWriter::new();
        msg.add_embedded(4, &response)?;
        Ok(msg.into_bytes())
    }

    /// Reply to the buffered request, or `None` if it expects none.
    fn reply(&mut self) -> Result<Option<Vec<u8>>> {
        let request = ProtobufReader::find(&self.request, 3)?
            .as_bytes()
            .ok_or_else(|| FwupdError::invalid_data("request is not a message"))?
            .to_vec();
        let (field, value) = ProtobufReader::new(&request)
            .next()
            .ok_or_else(|| FwupdError::invalid_data("empty request"))??;
        match field {
            1 => Ok(Some(self.device_info_reply()?)),
            2 => {
                let mut inner = ProtobufWriter::new();
                inner.add_varint(1, 1)?;
                let mut response = ProtobufWriter::new();
                response.add_embedded(2, &inner)?;
                let mut msg = ProtobufWriter::new();
                msg.add_embedded(4, &response)?;
                Ok(Some(msg.into_bytes()))
            }
            3 => {
                let body = value.as_bytes().unwrap_or_default();
                let ts = ProtobufReader::find(body, 1)?.as_u64().unwrap_or_default();
                let tz = ProtobufReader::find(body, 2)?.as_bytes().unwrap_or_default();
                self.time = Some((ts, String::from_utf8_lossy(tz).into_owned()));
                let mut ack = ProtobufWriter::new();
                ack.add_varint(1, 1)?;
                let mut msg = ProtobufWriter::new();
                msg.add_embedded(2, &ack)?;
                Ok(Some(msg.into_bytes()))
            }
            4 => {
                self.rebooted = true;
                Ok(None)
            }
            other => Err(FwupdError::not_supported(format!("request {other}"))),
        }
    }

    fn handle_sync(&mut self, data: &[u8]) -> Result<()> {
        let host = SyncFrame::decode(data)?;
        let cmd = host
            .command()
            .ok_or_else(|| FwupdError::protocol(format!("unknown command 0x{:x}", host.cmd)))?;
        self.sync_log.push((cmd.to_string(), host.sequence_id));
        match cmd {
            Cmd::BufferWrite => {
                self.request = host.payload;
                let ack = self.ack(Cmd::BufferWrite, host.sequence_id)?;
                self.sync_in.push_back(ack);
            }
            Cmd::UninitBuffer => {
                let ack = self.ack(Cmd::UninitBuffer, host.sequence_id)?;
                let Some(reply) = self.reply()? else {
                    self.sync_in.push_back(ack);
                    return Ok(());
                };
                let read = frame(Cmd::BufferRead, 0, reply)?;
                if self.fault == Fault::DuplicateRead {
                    self.sync_in.push_back(read.clone());
                }
                match self.reply_order {
                    ReplyOrder::AckFirst => {
                        self.sync_in.push_back(ack);
                        self.sync_in.push_back(read);
                    }
                    ReplyOrder::ReadFirst => {
                        self.sync_in.push_back(read);
                        self.sync_in.push_back(ack);
                    }
                }
            }
            Cmd::Ack => {
                if host.acked_cmd()? == Cmd::BufferRead.as_u32() {
                    self.sync_in.push_back(frame(Cmd::UninitBuffer, 0, Vec::new())?);
                }
            }
            other => return Err(FwupdError::protocol(format!("unexpected {other}"))),
        }
        Ok(())
    }

    fn handle_upd(&mut self, data: &[u8]) -> Result<()> {
        let (raw, payload) = decode_upd(data)?;
        let cmd = Cmd::from_u32(raw)
            .ok_or_else(|| FwupdError::protocol(format!("unknown command 0x{raw:x}")))?;
        self.upd_log.push(cmd.to_string());
        let mut reply = Cmd::Ack;
        match cmd {
            Cmd::CheckBufferSize if !self.accept_large_buffer => reply = Cmd::Nack,
            Cmd::Init => {
                self.init_count += 1;
                if self.init_nacks > 0 {
                    self.init_nacks -= 1;
                    reply = Cmd::Nack;
                }
            }
            Cmd::StartTransfer => {
                let mut size = [0u8; 8];
                size.copy_from_slice(payload);
                self.image_size = Some(u64::from_le_bytes(size));
            }
            Cmd::DataTransfer => {
                self.largest_packet = self.largest_packet.max(data.len());
                self.image.extend_from_slice(payload);
            }
            Cmd::EndTransfer => self.end_transfer = Some(EndTransfer::decode(payload)?),
            _ => {}
        }
        let cmd_req = if self.fault == Fault::UpdAckWrongCommand { Cmd::Uninit } else { cmd };
        self.upd_in.push_back(
            UpdResponse {
                cmd: reply.as_u32(),
                cmd_req: cmd_req.as_u32(),
            }
            .encode()?,
        );
        Ok(())
    }
}

impl BulkTransport for SimDevice {
    fn bulk_write(&mut self, endpoint: Endpoint, data: &[u8], _timeout: Duration) -> Result<usize> {
        match endpoint {
            Endpoint::SyncOut => self.handle_sync(data)?,
            Endpoint::UpdOut => {
                self.upd_writes += 1;
                if let Some(kind) = self.upd_error {
                    return Err(FwupdError::new(kind, "device went away"));
                }
                self.handle_upd(data)?;
            }
            _ => return Err(FwupdError::not_supported(format!("cannot write to {endpoint}"))),
        }
        Ok(data.len())
    }

    fn bulk_read(&mut self, endpoint: Endpoint, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let queue = match endpoint {
            Endpoint::SyncIn => &mut self.sync_in,
            Endpoint::UpdIn => &mut self.upd_in,
            _ => return Err(FwupdError::not_supported(format!("cannot read from {endpoint}"))),
        };
        let data = queue
            .pop_front()
            .ok_or_else(|| FwupdError::timed_out(format!("nothing to read on {endpoint}")))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}
