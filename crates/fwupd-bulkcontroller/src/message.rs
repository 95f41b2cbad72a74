//! Protobuf messages carried inside sync frames.
//!
//! ```text
//! UsbMsg   { header:1 { id:1, timestamp:2 }, ack:2 { success:1 },
//!            request:3, response:4, event:5 }
//! Request  { get_device_info:1, transition_to_device_mode:2,
//!            set_device_time:3 { ts:1, time_zone:2 }, reboot_device:4 }
//! Response { get_device_info:1 { payload:1 }, transition_to_device_mode:2 { success:1, error:2 } }
//! Event    { kong_event:1 { mqtt_event:1 } }
//! ```
//!
//! Device info travels as JSON in `payload` and `mqtt_event`.

use std::time::{SystemTime, UNIX_EPOCH};

use fwupd_common::protobuf::{ProtobufReader, ProtobufValue, ProtobufWriter};
use fwupd_errors::{ErrorKind, FwupdError, Result, ResultExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::state::{DeviceState, UpdateState};

const MSG_HEADER: u8 = 1;
const MSG_ACK: u8 = 2;
const MSG_REQUEST: u8 = 3;
const MSG_RESPONSE: u8 = 4;
const MSG_EVENT: u8 = 5;

const HEADER_ID: u8 = 1;
const HEADER_TIMESTAMP: u8 = 2;

const REQUEST_GET_DEVICE_INFO: u8 = 1;
const REQUEST_TRANSITION_TO_DEVICE_MODE: u8 = 2;
const REQUEST_SET_DEVICE_TIME: u8 = 3;
const REQUEST_REBOOT_DEVICE: u8 = 4;

const EVENT_KONG: u8 = 1;

/// Identity of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Random message id.
    pub id: String,
    /// Milliseconds since the epoch, as decimal text.
    pub timestamp: String,
}

impl MessageHeader {
    /// A fresh header stamped with the current time.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: ms.to_string(),
        }
    }

    fn encode(&self) -> Result<ProtobufWriter> {
        let mut pb = ProtobufWriter::new();
        pb.add_string(HEADER_ID, &self.id)?
            .add_string(HEADER_TIMESTAMP, &self.timestamp)?;
        Ok(pb)
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut header = Self {
            id: String::new(),
            timestamp: String::new(),
        };
        for item in ProtobufReader::new(buf) {
            match item? {
                (HEADER_ID, value) => header.id = decode_text(value, "header id")?,
                (HEADER_TIMESTAMP, value) => header.timestamp = decode_text(value, "header timestamp")?,
                _ => {}
            }
        }
        Ok(header)
    }
}

/// Host requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Ask for a device info response.
    GetDeviceInfo,
    /// Leave host mode and run standalone.
    TransitionToDeviceMode,
    /// Set the device clock.
    SetDeviceTime {
        /// Seconds since the epoch.
        ts: u64,
        /// IANA time zone name.
        time_zone: String,
    },
    /// Restart the device.
    RebootDevice,
}

impl Request {
    fn encode(&self) -> Result<ProtobufWriter> {
        let mut pb = ProtobufWriter::new();
        let empty = ProtobufWriter::new();
        match self {
            Self::GetDeviceInfo => pb.add_embedded(REQUEST_GET_DEVICE_INFO, &empty)?,
            Self::TransitionToDeviceMode => {
                pb.add_embedded(REQUEST_TRANSITION_TO_DEVICE_MODE, &empty)?
            }
            Self::SetDeviceTime { ts, time_zone } => {
                let mut inner = ProtobufWriter::new();
                inner.add_varint(1, *ts)?.add_string(2, time_zone)?;
                pb.add_embedded(REQUEST_SET_DEVICE_TIME, &inner)?
            }
            Self::RebootDevice => pb.add_embedded(REQUEST_REBOOT_DEVICE, &empty)?,
        };
        Ok(pb)
    }
}

/// Encode a request wrapped in a `UsbMsg`.
///
/// # Errors
///
/// Returns an error only if a field number is out of range.
pub fn encode_request(header: &MessageHeader, request: &Request) -> Result<Vec<u8>> {
    let mut pb = ProtobufWriter::new();
    pb.add_embedded(MSG_HEADER, &header.encode()?)?
        .add_embedded(MSG_REQUEST, &request.encode()?)?;
    Ok(pb.into_bytes())
}

/// Device replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// JSON device info.
    DeviceInfo(String),
    /// Result of a transition request.
    Transition {
        /// The device accepted the request.
        success: bool,
        /// Device error code, zero on success.
        error: u64,
    },
}

/// Unsolicited device events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// JSON device info pushed by the device.
    Kong(String),
}

/// Body of a decoded `UsbMsg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Protocol-level acknowledgement.
    Ack {
        /// The peer accepted the message.
        success: bool,
    },
    /// A request, raw.
    Request(Vec<u8>),
    /// A response.
    Response(Response),
    /// An event.
    Event(Event),
}

/// A decoded `UsbMsg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbMessage {
    /// Message identity, if sent.
    pub header: Option<MessageHeader>,
    /// Message body.
    pub body: MessageBody,
}

impl UsbMessage {
    /// Device info JSON carried by a response or event.
    pub fn device_info_json(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Response(Response::DeviceInfo(json))
            | MessageBody::Event(Event::Kong(json)) => Some(json),
            _ => None,
        }
    }
}

fn decode_text(value: ProtobufValue<'_>, what: &str) -> Result<String> {
    let bytes = value
        .as_bytes()
        .ok_or_else(|| FwupdError::invalid_data(format!("{what} is not a string")))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| FwupdError::invalid_data(format!("{what} is not UTF-8: {e}")))
}

fn decode_embedded<'a>(value: ProtobufValue<'a>, what: &str) -> Result<&'a [u8]> {
    value
        .as_bytes()
        .ok_or_else(|| FwupdError::invalid_data(format!("{what} is not a message")))
}

fn decode_response(buf: &[u8]) -> Result<Response> {
    for item in ProtobufReader::new(buf) {
        match item? {
            (1, value) => {
                let info = decode_embedded(value, "device info response")?;
                let payload = ProtobufReader::find(info, 1).prefix("device info response")?;
                return Ok(Response::DeviceInfo(decode_text(payload, "device info payload")?));
            }
            (2, value) => {
                let mut success = false;
                let mut error = 0;
                for field in ProtobufReader::new(decode_embedded(value, "transition response")?) {
                    match field? {
                        (1, v) => success = v.as_u64().unwrap_or_default() != 0,
                        (2, v) => error = v.as_u64().unwrap_or_default(),
                        _ => {}
                    }
                }
                return Ok(Response::Transition { success, error });
            }
            _ => {}
        }
    }
    Err(FwupdError::not_supported("response carries no known message"))
}

fn decode_event(buf: &[u8]) -> Result<Event> {
    let kong = ProtobufReader::find(buf, EVENT_KONG)
        .map_err(|e| FwupdError::not_supported(format!("event carries no known message: {e}")))?;
    let mqtt = ProtobufReader::find(decode_embedded(kong, "kong event")?, 1).prefix("kong event")?;
    Ok(Event::Kong(decode_text(mqtt, "mqtt event")?))
}

/// Decode a `UsbMsg`.
///
/// # Errors
///
/// Returns an invalid-data error for malformed protobuf, or not-supported if
/// the message has no body this crate understands.
pub fn decode_message(buf: &[u8]) -> Result<UsbMessage> {
    let mut header = None;
    let mut body = None;
    for item in ProtobufReader::new(buf) {
        let (field, value) = item?;
        match field {
            MSG_HEADER => header = Some(MessageHeader::decode(decode_embedded(value, "header")?)?),
            MSG_ACK => {
                let ack = decode_embedded(value, "ack")?;
                let success = match ProtobufReader::find(ack, 1) {
                    Ok(v) => v.as_u64().unwrap_or_default() != 0,
                    Err(e) if e.kind() == ErrorKind::NotFound => false,
                    Err(e) => return Err(e),
                };
                body = Some(MessageBody::Ack { success });
            }
            MSG_REQUEST => body = Some(MessageBody::Request(decode_embedded(value, "request")?.to_vec())),
            MSG_RESPONSE => body = Some(MessageBody::Response(decode_response(decode_embedded(value, "response")?)?)),
            MSG_EVENT => body = Some(MessageBody::Event(decode_event(decode_embedded(value, "event")?)?)),
            _ => {}
        }
    }
    let body = body.ok_or_else(|| FwupdError::not_supported("message has no body"))?;
    Ok(UsbMessage { header, body })
}

/// One device from a device info report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceInfo {
    /// Product name.
    #[serde(default)]
    pub name: String,
    /// Device type, zero for the main unit.
    #[serde(rename = "type", default)]
    pub kind: i64,
    /// Running firmware version.
    #[serde(rename = "sw", default)]
    pub version: String,
    /// Raw device state.
    #[serde(default = "unknown_state")]
    pub status: i64,
    /// Raw update state.
    #[serde(rename = "updateStatus", default = "unknown_state")]
    pub update_status: i64,
    /// Progress of a running update in percent.
    #[serde(rename = "updateProgress", default)]
    pub update_progress: u32,
}

fn unknown_state() -> i64 {
    -1
}

impl DeviceInfo {
    /// Decoded device state.
    pub fn state(&self) -> DeviceState {
        DeviceState::from_i64(self.status)
    }

    /// Decoded update state.
    pub fn update_state(&self) -> UpdateState {
        UpdateState::from_i64(self.update_status)
    }
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<DeviceInfo>,
}

#[derive(Debug, Deserialize)]
struct DeviceInfoReport {
    payload: DeviceList,
}

/// Parse a device info report and return the main unit.
///
/// # Errors
///
/// Returns an invalid-data error for malformed JSON or a report that lists
/// no devices.
pub fn parse_device_info(json: &str) -> Result<DeviceInfo> {
    let report: DeviceInfoReport = serde_json::from_str(json)
        .map_err(|e| FwupdError::invalid_data(format!("failed to parse device info: {e}")))?;
    let mut devices = report.payload.devices;
    let idx = devices.iter().position(|d| d.kind == 0).unwrap_or_default();
    if devices.is_empty() {
        return Err(FwupdError::invalid_data("device info lists no devices"));
    }
    Ok(devices.swap_remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> MessageHeader {
        MessageHeader {
            id: "id".to_owned(),
            timestamp: "5".to_owned(),
        }
    }

    #[test]
    fn test_encode_get_device_info() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let buf = encode_request(&header(), &Request::GetDeviceInfo)?;
        assert_eq!(
            buf,
            [0x0A, 0x07, 0x0A, 0x02, b'i', b'd', 0x12, 0x01, b'5', 0x1A, 0x02, 0x0A, 0x00]
        );
        Ok(())
    }

    #[test]
    fn test_encode_set_device_time() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let request = Request::SetDeviceTime {
            ts: 300,
            time_zone: "UTC".to_owned(),
        };
        let buf = encode_request(&header(), &request)?;
        assert_eq!(
            buf[9..],
            [0x1A, 0x0A, 0x1A, 0x08, 0x08, 0xAC, 0x02, 0x12, 0x03, b'U', b'T', b'C']
        );
        Ok(())
    }

    #[test]
    fn test_fresh_headers_differ() {
        let a = MessageHeader::now();
        let b = MessageHeader::now();
        assert_ne!(a.id, b.id);
        assert!(a.timestamp.parse::<u128>().is_ok());
    }

    #[test]
    fn test_decode_device_info_response() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let json = r#"{"payload":{"devices":[{"name":"Rally Bar","type":0,"sw":"1.2.3","status":1,"updateStatus":0,"updateProgress":0}]}}"#;
        let mut info = ProtobufWriter::new();
        info.add_string(1, json)?;
        let mut response = ProtobufWriter::new();
        response.add_embedded(1, &info)?;
        let mut msg = ProtobufWriter::new();
        msg.add_embedded(MSG_HEADER, &header().encode()?)?
            .add_embedded(MSG_RESPONSE, &response)?;

        let decoded = decode_message(msg.as_bytes())?;
        assert_eq!(decoded.header, Some(header()));
        let device = parse_device_info(decoded.device_info_json().ok_or("no json")?)?;
        assert_eq!(device.name, "Rally Bar");
        assert_eq!(device.version, "1.2.3");
        assert_eq!(device.state(), DeviceState::Online);
        assert_eq!(device.update_state(), UpdateState::Current);
        Ok(())
    }

    #[test]
    fn test_decode_transition_and_ack() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut inner = ProtobufWriter::new();
        inner.add_varint(1, 1)?;
        let mut response = ProtobufWriter::new();
        response.add_embedded(2, &inner)?;
        let mut msg = ProtobufWriter::new();
        msg.add_embedded(MSG_RESPONSE, &response)?;
        let decoded = decode_message(msg.as_bytes())?;
        assert_eq!(
            decoded.body,
            MessageBody::Response(Response::Transition { success: true, error: 0 })
        );

        let mut msg = ProtobufWriter::new();
        msg.add_embedded(MSG_ACK, &ProtobufWriter::new())?;
        assert_eq!(decode_message(msg.as_bytes())?.body, MessageBody::Ack { success: false });
        Ok(())
    }

    #[test]
    fn test_decode_without_body() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut msg = ProtobufWriter::new();
        msg.add_embedded(MSG_HEADER, &header().encode()?)?;
        let err = decode_message(msg.as_bytes()).err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(decode_message(&[0x0A, 0x05, 0x00]).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_device_info_picks_main_unit() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let json = r#"{"payload":{"devices":[
            {"name":"Tap","type":3,"sw":"9.9"},
            {"name":"Rally Bar","type":0,"sw":"1.0","status":2,"updateStatus":6,"updateProgress":42}
        ]}}"#;
        let device = parse_device_info(json)?;
        assert_eq!(device.name, "Rally Bar");
        assert_eq!(device.update_progress, 42);
        assert_eq!(device.update_state(), UpdateState::Updating);

        let err = parse_device_info(r#"{"payload":{"devices":[]}}"#).err().ok_or("expected error")?;
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(parse_device_info("{").is_err());
        Ok(())
    }
}
