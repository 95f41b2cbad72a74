//! A session with one device over its sync and update interfaces.
//!
//! The sync interface carries protobuf requests through a buffered
//! handshake:
//!
//! ```text
//! host                          device
//! BUFFER_WRITE(request)  ->
//!                        <-     ACK(BUFFER_WRITE)
//! UNINIT_BUFFER          ->
//!                        <-     ACK(UNINIT_BUFFER) and BUFFER_READ(reply), either order
//! ACK(BUFFER_READ)       ->
//!                        <-     UNINIT_BUFFER
//! ACK(UNINIT_BUFFER)     ->
//! ```
//!
//! The update interface pushes an image with INIT, START_TRANSFER,
//! DATA_TRANSFER per chunk, END_TRANSFER and UNINIT, each answered by an ACK
//! naming the request.

use std::io::{Read, Seek};
use std::time::Duration;

use fwupd_errors::{ErrorKind, FwupdError, Result, ResultExt};
use fwupd_stream::{InputStream, StreamChunkArray};
use md5::{Digest, Md5};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::SessionConfig;
use crate::message::{
    DeviceInfo, MessageBody, MessageHeader, Request, Response, UsbMessage, decode_message,
    encode_request, parse_device_info,
};
use crate::protocol::{
    Cmd, HASH_VALUE_SIZE, SyncFrame, UPD_HEADER_SIZE, UpdResponse, cmd_to_string,
    encode_ack_payload, encode_upd, end_transfer_payload,
};
use crate::retry::{retry, retry_full};
use crate::state::{CoarseStatus, MonotonicProgress, ProgressSink, UpdateState, WriteFlags};
use crate::transport::{BulkTransport, Endpoint};

const HASH_BLOCK_SIZE: usize = 0x8000;
const UPD_RESPONSE_BUFFER_SIZE: usize = 64;

/// Share of the progress bar spent sending the image; polling fills the rest.
const TRANSFER_PERCENTAGE: u32 = 50;

fn percentage(done: usize, total: usize, span: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = done.saturating_mul(span as usize) / total;
    u32::try_from(pct).unwrap_or(span)
}

fn check_ack(frame: &SyncFrame, cmd: Cmd, sequence_id: u32) -> Result<()> {
    if frame.command() != Some(Cmd::Ack) {
        return Err(FwupdError::protocol(format!(
            "expected ACK for {cmd}, got {}",
            cmd_to_string(frame.cmd)
        )));
    }
    if frame.sequence_id != sequence_id {
        return Err(FwupdError::protocol(format!(
            "sequence id mismatch for {cmd}, got {} expected {sequence_id}",
            frame.sequence_id
        )));
    }
    let acked = frame.acked_cmd()?;
    if acked != cmd.as_u32() {
        return Err(FwupdError::protocol(format!(
            "ACK for wrong command, got {} expected {cmd}",
            cmd_to_string(acked)
        )));
    }
    Ok(())
}

/// Protocol state of one device.
#[derive(Debug)]
pub struct BulkSession<T> {
    transport: T,
    config: SessionConfig,
    cancel: CancellationToken,
    sequence_id: u32,
    transfer_bufsz: usize,
    device_info: Option<DeviceInfo>,
}

impl<T: BulkTransport> BulkSession<T> {
    /// Start a session over `transport`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-data error if `config` does not validate.
    pub fn new(transport: T, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            transfer_bufsz: config.default_buffer_size,
            config,
            cancel: CancellationToken::new(),
            sequence_id: 0,
            device_info: None,
        })
    }

    /// Use `cancel` instead of a private token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the session at the next transfer or delay.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sequence id of the last sync frame sent.
    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    /// Current transfer buffer size.
    pub fn transfer_buffer_size(&self) -> usize {
        self.transfer_bufsz
    }

    /// Last device info received.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// End the session, returning the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn write_all(&mut self, endpoint: Endpoint, buf: &[u8], timeout: Duration) -> Result<()> {
        self.cancel.check()?;
        if buf.len() > self.transfer_bufsz {
            return Err(FwupdError::out_of_range(format!(
                "frame of 0x{:x} bytes exceeds transfer buffer of 0x{:x}",
                buf.len(),
                self.transfer_bufsz
            )));
        }
        let sent = self.transport.bulk_write(endpoint, buf, timeout)?;
        if sent != buf.len() {
            return Err(FwupdError::write(format!(
                "only wrote 0x{sent:x} of 0x{:x} bytes to {endpoint}",
                buf.len()
            )));
        }
        Ok(())
    }

    fn read_transfer(&mut self, endpoint: Endpoint, size: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.cancel.check()?;
        let mut buf = vec![0u8; size];
        let n = self.transport.bulk_read(endpoint, &mut buf, timeout)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Send one sync frame under the next sequence id, returning that id.
    ///
    /// # Errors
    ///
    /// Returns the transport failure, or out-of-range if the frame does not
    /// fit the transfer buffer.
    pub fn sync_send(&mut self, cmd: Cmd, payload: &[u8]) -> Result<u32> {
        self.sync_send_raw(cmd, payload.to_vec())
    }

    fn sync_send_raw(&mut self, cmd: Cmd, payload: Vec<u8>) -> Result<u32> {
        let sequence_id = self.sequence_id.wrapping_add(1);
        let buf = SyncFrame::new(cmd, sequence_id, payload).encode()?;
        self.write_all(Endpoint::SyncOut, &buf, self.config.transfer_timeout())
            .with_prefix(|| format!("failed to send {cmd}"))?;
        self.sequence_id = sequence_id;
        debug!(%cmd, sequence_id, size = buf.len(), "sync sent");
        Ok(sequence_id)
    }

    fn sync_ack(&mut self, cmd: Cmd) -> Result<()> {
        let payload = encode_ack_payload(cmd.as_u32())?;
        self.sync_send_raw(Cmd::Ack, payload)?;
        Ok(())
    }

    /// Receive one sync frame.
    ///
    /// # Errors
    ///
    /// Returns the transport failure or a malformed-frame error.
    pub fn sync_receive(&mut self) -> Result<SyncFrame> {
        let buf = self.read_transfer(Endpoint::SyncIn, self.transfer_bufsz, self.config.transfer_timeout())?;
        let frame = SyncFrame::decode(&buf).prefix("failed to parse sync frame")?;
        debug!(
            cmd = %cmd_to_string(frame.cmd),
            sequence_id = frame.sequence_id,
            size = frame.payload.len(),
            "sync received"
        );
        Ok(frame)
    }

    fn sync_wait_ack(&mut self, cmd: Cmd, sequence_id: u32) -> Result<()> {
        let frame = self.sync_receive()?;
        check_ack(&frame, cmd, sequence_id)
    }

    /// Send `request` through the buffered handshake and return the raw
    /// reply, or `None` when `expect_reply` is false.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for any out-of-order, duplicate or
    /// mismatched frame, or the transport failure.
    pub fn sync_exchange(&mut self, request: &[u8], expect_reply: bool) -> Result<Option<Vec<u8>>> {
        let seq = self.sync_send(Cmd::BufferWrite, request)?;
        self.sync_wait_ack(Cmd::BufferWrite, seq)?;
        let seq = self.sync_send(Cmd::UninitBuffer, &[])?;
        if !expect_reply {
            self.sync_wait_ack(Cmd::UninitBuffer, seq)?;
            return Ok(None);
        }

        let mut acked = false;
        let mut reply = None;
        while !acked || reply.is_none() {
            let frame = self.sync_receive()?;
            match frame.command() {
                Some(Cmd::Ack) => {
                    if acked {
                        return Err(FwupdError::protocol("duplicate ACK for UNINIT_BUFFER"));
                    }
                    check_ack(&frame, Cmd::UninitBuffer, seq)?;
                    acked = true;
                }
                Some(Cmd::BufferRead) => {
                    if reply.is_some() {
                        return Err(FwupdError::protocol("duplicate BUFFER_READ"));
                    }
                    reply = Some(frame.payload);
                }
                _ => {
                    return Err(FwupdError::protocol(format!(
                        "expected ACK or BUFFER_READ, got {}",
                        cmd_to_string(frame.cmd)
                    )));
                }
            }
        }
        self.sync_ack(Cmd::BufferRead)?;

        // the device numbers this frame itself, so its id is not checked
        let frame = self.sync_receive()?;
        if frame.command() != Some(Cmd::UninitBuffer) {
            return Err(FwupdError::protocol(format!(
                "expected UNINIT_BUFFER, got {}",
                cmd_to_string(frame.cmd)
            )));
        }
        self.sync_ack(Cmd::UninitBuffer)?;
        Ok(reply)
    }

    fn sync_request(&mut self, request: &Request) -> Result<UsbMessage> {
        let buf = encode_request(&MessageHeader::now(), request)?;
        let reply = self
            .sync_exchange(&buf, true)?
            .ok_or_else(|| FwupdError::internal("no reply buffered"))?;
        decode_message(&reply).prefix("failed to decode reply")
    }

    fn query_device_info(&mut self) -> Result<DeviceInfo> {
        let msg = self.sync_request(&Request::GetDeviceInfo)?;
        let json = msg
            .device_info_json()
            .ok_or_else(|| FwupdError::busy("reply carries no device info"))?;
        let info = parse_device_info(json)?;
        debug!(
            name = %info.name,
            version = %info.version,
            state = %info.state(),
            update_state = %info.update_state(),
            progress = info.update_progress,
            "device info"
        );
        self.device_info = Some(info.clone());
        Ok(info)
    }

    /// Ask the device for its info, retrying while it is busy.
    ///
    /// # Errors
    ///
    /// Returns the last failure once the retry budget is spent.
    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        let cancel = self.cancel.clone();
        let attempts = self.config.device_info_retries;
        let delay = self.config.init_retry_delay();
        retry(attempts, delay, &cancel, |_attempt| self.query_device_info())
            .prefix("failed to get device info")
    }

    /// Set the device clock.
    ///
    /// # Errors
    ///
    /// Returns a write error if the device rejects the time.
    pub fn set_device_time(&mut self, ts: u64, time_zone: &str) -> Result<()> {
        let request = Request::SetDeviceTime {
            ts,
            time_zone: time_zone.to_owned(),
        };
        match self.sync_request(&request)?.body {
            MessageBody::Ack { success: false } => Err(FwupdError::write("device rejected time")),
            _ => Ok(()),
        }
    }

    /// Switch the device from host mode to standalone mode.
    ///
    /// # Errors
    ///
    /// Returns a write error if the device refuses, or a protocol error for
    /// an unrelated reply.
    pub fn transition_to_device_mode(&mut self) -> Result<()> {
        match self.sync_request(&Request::TransitionToDeviceMode)?.body {
            MessageBody::Response(Response::Transition { success: true, .. }) => Ok(()),
            MessageBody::Response(Response::Transition { error, .. }) => Err(FwupdError::write(
                format!("device refused to change mode, error {error}"),
            )),
            other => Err(FwupdError::protocol(format!(
                "unexpected reply to mode change: {other:?}"
            ))),
        }
    }

    /// Restart the device; it sends no reply.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub fn reboot(&mut self) -> Result<()> {
        let buf = encode_request(&MessageHeader::now(), &Request::RebootDevice)?;
        self.sync_exchange(&buf, false)?;
        info!("device rebooting");
        Ok(())
    }

    /// Send one update command and wait for its ACK.
    ///
    /// # Errors
    ///
    /// Returns busy for a NACK, timed-out for a TIMEOUT reply, and a
    /// protocol error for any other reply or an ACK naming another command.
    pub fn send_upd_cmd(&mut self, cmd: Cmd, payload: &[u8], timeout: Duration) -> Result<()> {
        let buf = encode_upd(cmd, payload)?;
        self.write_all(Endpoint::UpdOut, &buf, timeout)
            .with_prefix(|| format!("failed to send {cmd}"))?;
        let reply = self.read_transfer(Endpoint::UpdIn, UPD_RESPONSE_BUFFER_SIZE, timeout)?;
        let reply = UpdResponse::decode(&reply).with_prefix(|| format!("failed to parse reply to {cmd}"))?;
        match Cmd::from_u32(reply.cmd) {
            Some(Cmd::Ack) if reply.cmd_req == cmd.as_u32() => Ok(()),
            Some(Cmd::Ack) => Err(FwupdError::protocol(format!(
                "ACK for wrong command, got {} expected {cmd}",
                cmd_to_string(reply.cmd_req)
            ))),
            Some(Cmd::Nack) => Err(FwupdError::busy(format!("device rejected {cmd}"))),
            Some(Cmd::Timeout) => Err(FwupdError::timed_out(format!("device timed out on {cmd}"))),
            _ => Err(FwupdError::protocol(format!(
                "unexpected reply {} to {cmd}",
                cmd_to_string(reply.cmd)
            ))),
        }
    }

    /// Try to switch to the larger transfer buffer.
    ///
    /// A refused or failed probe keeps the default size.
    ///
    /// # Errors
    ///
    /// Returns terminal errors such as a missing device or cancellation.
    pub fn check_buffer_size(&mut self) -> Result<()> {
        let timeout = self.config.buffer_check_timeout();
        match self.send_upd_cmd(Cmd::CheckBufferSize, &[], timeout) {
            Ok(()) => {
                self.transfer_bufsz = self.config.negotiated_buffer_size;
                info!(size = self.transfer_bufsz, "using large transfer buffer");
                Ok(())
            }
            Err(err) if err.is_terminal() => Err(err),
            Err(err) => {
                debug!(size = self.transfer_bufsz, error = %err, "keeping default transfer buffer");
                Ok(())
            }
        }
    }

    /// Negotiate the buffer size and read the device info.
    ///
    /// # Errors
    ///
    /// See [`BulkSession::check_buffer_size`] and
    /// [`BulkSession::get_device_info`].
    pub fn setup(&mut self) -> Result<DeviceInfo> {
        self.check_buffer_size()?;
        let info = self.get_device_info()?;
        info!(name = %info.name, version = %info.version, "device ready");
        Ok(info)
    }

    fn hash_stream<R: InputStream + ?Sized>(stream: &mut R) -> Result<[u8; HASH_VALUE_SIZE]> {
        let mut hasher = Md5::new();
        stream.for_each_block(0, HASH_BLOCK_SIZE, &mut |block| {
            hasher.update(block);
            Ok(())
        })?;
        let mut digest = [0u8; HASH_VALUE_SIZE];
        digest.copy_from_slice(&hasher.finalize());
        Ok(digest)
    }

    fn poll_update_state(&mut self, progress: &mut MonotonicProgress<'_>) -> Result<()> {
        let info = self.query_device_info()?;
        match info.update_state() {
            UpdateState::Current => Ok(()),
            UpdateState::Error => Err(FwupdError::write("device reported update failure")),
            state => {
                progress.status(state.coarse_status());
                let pct = info.update_progress.min(100) / 2 + TRANSFER_PERCENTAGE;
                progress.percentage(pct);
                Err(FwupdError::busy(format!(
                    "device is {state}, {}%",
                    info.update_progress
                )))
            }
        }
    }

    /// Push an image and wait until the device runs it.
    ///
    /// # Errors
    ///
    /// Returns the first step that fails after its retries, prefixed with
    /// the step name.
    pub fn write_firmware<S: Read + Seek>(
        &mut self,
        mut stream: S,
        flags: WriteFlags,
        sink: &mut dyn ProgressSink,
    ) -> Result<()> {
        let mut progress = MonotonicProgress::new(sink);
        let cancel = self.cancel.clone();
        let timeout = self.config.transfer_timeout();
        let size = stream.stream_size()?;
        if size == 0 {
            return Err(FwupdError::invalid_file("firmware image is empty"));
        }
        let digest = Self::hash_stream(&mut stream).prefix("failed to hash image")?;

        progress.status(CoarseStatus::Downloading);
        progress.percentage(0);
        retry(self.config.init_retries, self.config.init_retry_delay(), &cancel, |_attempt| {
            self.send_upd_cmd(Cmd::Init, &[], timeout)
        })
        .prefix("failed to initialize update")?;
        self.send_upd_cmd(Cmd::StartTransfer, &size.to_le_bytes(), timeout)
            .prefix("failed to start transfer")?;

        let packet_size = self.transfer_bufsz - UPD_HEADER_SIZE;
        let mut chunks = StreamChunkArray::from_stream(&mut stream, 0, 0, packet_size)?;
        info!(size, chunks = chunks.len(), packet_size, "sending image");
        for idx in 0..chunks.len() {
            let chunk = chunks.index(idx)?;
            let data = chunk
                .data()
                .ok_or_else(|| FwupdError::internal(format!("chunk {idx} has no data")))?;
            self.send_upd_cmd(Cmd::DataTransfer, data, timeout)
                .with_prefix(|| format!("failed to send chunk {idx}"))?;
            progress.percentage(percentage(idx + 1, chunks.len(), TRANSFER_PERCENTAGE));
        }

        let payload = end_transfer_payload(flags.contains(WriteFlags::FORCE), &digest)?;
        self.send_upd_cmd(Cmd::EndTransfer, &payload, self.config.hash_timeout())
            .prefix("failed to end transfer")?;
        self.send_upd_cmd(Cmd::Uninit, &[], timeout)
            .prefix("failed to uninitialize")?;
        info!("image sent, waiting for device");

        progress.status(CoarseStatus::Verifying);
        let is_failure = |err: &FwupdError| err.kind() == ErrorKind::Write;
        retry_full(
            self.config.verify_attempts,
            self.config.verify_delay(),
            &cancel,
            is_failure,
            |_attempt| self.poll_update_state(&mut progress),
        )
        .prefix("failed to wait for update")?;
        progress.percentage(100);
        progress.status(CoarseStatus::Idle);
        if let Some(info) = &self.device_info {
            info!(version = %info.version, "update complete");
        } else {
            warn!("update complete without device info");
        }
        Ok(())
    }
}
