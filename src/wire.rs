//! QMI wire format serialization and parsing.
//!
//! Every QMI message travels inside a mux frame:
//!
//! ```text
//! ┌──────────────┬────────────────────────┬──────────────┬──────────────────┐
//! │ Mux header   │ Control (2) or         │ Message      │ TLV payload      │
//! │ (6 bytes)    │ Service (3) header     │ header (4)   │ (length bytes)   │
//! └──────────────┴────────────────────────┴──────────────┴──────────────────┘
//! ```
//!
//! All multi-byte integers are little-endian. Parsing never trusts a length
//! field: a frame, message or TLV whose declared length runs past the end of
//! the buffer is rejected instead of being read.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ServiceType;

/// First byte of every mux frame.
pub const FRAME_MARKER: u8 = 0x01;

/// Mux flags value of a frame sent by the modem.
pub const FLAG_FROM_MODEM: u8 = 0x80;

/// Client id used for broadcast indications.
pub const BROADCAST_CLIENT: u8 = 0xFF;

/// Standard result TLV type.
pub const TLV_RESULT: u8 = 0x02;

/// Size of the standard result TLV value.
pub const RESULT_CODE_SIZE: usize = 4;

/// Error code reported when there is no response payload at all.
pub const ERROR_TRANSPORT: u16 = 0xFFFF;

/// Error code reported when the result TLV is missing or has the wrong size.
pub const ERROR_MALFORMED_RESULT: u16 = 0xFFFF;

// Control service messages
pub const CTL_SET_INSTANCE_ID: u16 = 0x0020;
pub const CTL_GET_VERSION_INFO: u16 = 0x0021;
pub const CTL_GET_CLIENT_ID: u16 = 0x0022;
pub const CTL_RELEASE_CLIENT_ID: u16 = 0x0023;

/// Service list TLV in a version info response.
pub const CTL_TLV_SERVICE_LIST: u8 = 0x01;
/// Optional firmware version string TLV in a version info response.
pub const CTL_TLV_VERSION_STRING: u8 = 0x10;
/// Client id TLV in get/release client id messages.
pub const CTL_TLV_CLIENT_ID: u8 = 0x01;

const CLIENT_ID_SIZE: usize = 2;
const SERVICE_ENTRY_SIZE: usize = 5;

// ============================================================================
// FIXED HEADERS
// ============================================================================

/// Mux frame header (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxHeader {
    /// Always [`FRAME_MARKER`]
    pub frame: u8,
    /// Frame size without the frame byte
    pub length: u16,
    /// `0x00` when sent by the host, [`FLAG_FROM_MODEM`] when received
    pub flags: u8,
    /// Service type (`0x00` for control)
    pub service: u8,
    /// Client id (`0x00` for control)
    pub client: u8,
}

impl MuxHeader {
    pub const SIZE: usize = 6;

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }

        Some(Self {
            frame: buf.get_u8(),
            length: buf.get_u16_le(),
            flags: buf.get_u8(),
            service: buf.get_u8(),
            client: buf.get_u8(),
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.frame);
        buf.put_u16_le(self.length);
        buf.put_u8(self.flags);
        buf.put_u8(self.service);
        buf.put_u8(self.client);
    }

    /// Total frame size including the frame byte.
    pub fn frame_len(&self) -> usize {
        usize::from(self.length) + 1
    }

    /// Whether this header starts a well-formed frame coming from the modem.
    pub fn is_valid_inbound(&self) -> bool {
        self.frame == FRAME_MARKER && self.flags == FLAG_FROM_MODEM
    }

    pub fn is_control(&self) -> bool {
        self.service == ServiceType::CONTROL.value()
    }
}

/// Control service transaction header (2 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHeader {
    pub msg_type: u8,
    pub transaction: u8,
}

impl ControlHeader {
    pub const SIZE: usize = 2;

    pub const REQUEST: u8 = 0x00;
    pub const RESPONSE: u8 = 0x01;
    pub const INDICATION: u8 = 0x02;

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }

        Some(Self {
            msg_type: buf.get_u8(),
            transaction: buf.get_u8(),
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.msg_type);
        buf.put_u8(self.transaction);
    }

    pub fn is_indication(&self) -> bool {
        self.msg_type == Self::INDICATION && self.transaction == 0
    }
}

/// Regular service transaction header (3 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceHeader {
    pub msg_type: u8,
    pub transaction: u16,
}

impl ServiceHeader {
    pub const SIZE: usize = 3;

    pub const REQUEST: u8 = 0x00;
    pub const RESPONSE: u8 = 0x02;
    pub const INDICATION: u8 = 0x04;

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }

        Some(Self {
            msg_type: buf.get_u8(),
            transaction: buf.get_u16_le(),
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.msg_type);
        buf.put_u16_le(self.transaction);
    }

    pub fn is_indication(&self) -> bool {
        self.msg_type & Self::INDICATION != 0 && self.transaction == 0
    }
}

/// Message header (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message: u16,
    /// Payload size without this header
    pub length: u16,
}

impl MessageHeader {
    pub const SIZE: usize = 4;

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }

        Some(Self {
            message: buf.get_u16_le(),
            length: buf.get_u16_le(),
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.message);
        buf.put_u16_le(self.length);
    }
}

/// TLV header (3 bytes), followed by `length` value bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvHeader {
    pub tlv_type: u8,
    pub length: u16,
}

impl TlvHeader {
    pub const SIZE: usize = 3;

    pub fn parse(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::SIZE {
            return None;
        }

        Some(Self {
            tlv_type: buf.get_u8(),
            length: buf.get_u16_le(),
        })
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.tlv_type);
        buf.put_u16_le(self.length);
    }
}

/// Control or service transaction header, depending on the frame's service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionHeader {
    Control(ControlHeader),
    Service(ServiceHeader),
}

impl TransactionHeader {
    pub fn msg_type(&self) -> u8 {
        match self {
            Self::Control(h) => h.msg_type,
            Self::Service(h) => h.msg_type,
        }
    }

    pub fn transaction(&self) -> u16 {
        match self {
            Self::Control(h) => u16::from(h.transaction),
            Self::Service(h) => h.transaction,
        }
    }

    pub fn is_indication(&self) -> bool {
        match self {
            Self::Control(h) => h.is_indication(),
            Self::Service(h) => h.is_indication(),
        }
    }

    /// Short suffix used in trace output (`_req`, `_resp`, `_ind`).
    pub fn kind_suffix(&self) -> &'static str {
        match self {
            Self::Control(h) => match h.msg_type {
                ControlHeader::REQUEST => "_req",
                ControlHeader::RESPONSE => "_resp",
                ControlHeader::INDICATION => "_ind",
                _ => "",
            },
            Self::Service(h) => match h.msg_type {
                ServiceHeader::REQUEST => "_req",
                ServiceHeader::RESPONSE => "_resp",
                ServiceHeader::INDICATION => "_ind",
                _ => "",
            },
        }
    }
}

// ============================================================================
// FRAMES
// ============================================================================

/// A complete, validated mux frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub mux: MuxHeader,
    pub transaction: TransactionHeader,
    pub message: MessageHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Parse one frame body (everything after the mux header).
    ///
    /// `body` must be exactly `mux.frame_len() - MuxHeader::SIZE` bytes.
    fn parse_body(mux: MuxHeader, mut body: Bytes) -> Result<Self, FrameError> {
        let transaction = if mux.is_control() {
            ControlHeader::parse(&mut body).map(TransactionHeader::Control)
        } else {
            ServiceHeader::parse(&mut body).map(TransactionHeader::Service)
        }
        .ok_or(FrameError::Malformed("transaction header truncated"))?;

        let message =
            MessageHeader::parse(&mut body).ok_or(FrameError::Malformed("message header truncated"))?;

        let payload_len = usize::from(message.length);
        if body.remaining() < payload_len {
            return Err(FrameError::Malformed("message length exceeds frame"));
        }
        let payload = body.split_to(payload_len);

        Ok(Self {
            mux,
            transaction,
            message,
            payload,
        })
    }
}

/// Reason why frame splitting stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than a mux header remain.
    Truncated { remaining: usize },
    /// Frame marker or flags byte is wrong.
    BadMarker { frame: u8, flags: u8 },
    /// Declared frame length runs past the end of the read.
    ShortFrame { declared: usize, available: usize },
    /// Inner headers do not fit the frame.
    Malformed(&'static str),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { remaining } => write!(f, "{remaining} trailing bytes"),
            Self::BadMarker { frame, flags } => {
                write!(f, "bad frame marker 0x{frame:02x} flags 0x{flags:02x}")
            }
            Self::ShortFrame {
                declared,
                available,
            } => write!(f, "frame declares {declared} bytes, only {available} read"),
            Self::Malformed(what) => f.write_str(what),
        }
    }
}

/// Iterator over the frames contained in one read.
///
/// Yields frames in order; on the first invalid frame it yields the error
/// (with the byte offset where it occurred) and then stops. Bytes after an
/// invalid frame are never looked at.
pub struct Frames {
    buf: Bytes,
    offset: usize,
    done: bool,
}

impl Frames {
    pub fn new(buf: Bytes) -> Self {
        Self {
            buf,
            offset: 0,
            done: false,
        }
    }

    /// The raw bytes of the frame that starts at `offset`, for tracing.
    pub fn raw(&self, offset: usize, len: usize) -> &[u8] {
        let end = (offset + len).min(self.buf.len());
        self.buf.get(offset..end).unwrap_or_default()
    }
}

impl Iterator for Frames {
    type Item = Result<(usize, Frame), (usize, FrameError)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buf.len() {
            return None;
        }

        let offset = self.offset;
        let available = self.buf.len() - offset;
        let result = (|| {
            let mut cursor = self.buf.slice(offset..);
            let mux = MuxHeader::parse(&mut cursor).ok_or(FrameError::Truncated {
                remaining: available,
            })?;

            if !mux.is_valid_inbound() {
                return Err(FrameError::BadMarker {
                    frame: mux.frame,
                    flags: mux.flags,
                });
            }

            let declared = mux.frame_len();
            if declared > available {
                return Err(FrameError::ShortFrame {
                    declared,
                    available,
                });
            }
            if declared < MuxHeader::SIZE {
                return Err(FrameError::Malformed("frame shorter than mux header"));
            }

            let body = self.buf.slice(offset + MuxHeader::SIZE..offset + declared);
            Frame::parse_body(mux, body).map(|frame| (declared, frame))
        })();

        match result {
            Ok((declared, frame)) => {
                self.offset += declared;
                Some(Ok((offset, frame)))
            }
            Err(e) => {
                self.done = true;
                Some(Err((offset, e)))
            }
        }
    }
}

// ============================================================================
// REQUEST BUILDERS
// ============================================================================

fn build_frame(
    service: u8,
    client: u8,
    transaction: TransactionHeader,
    message: u16,
    payload: &[u8],
) -> Option<Bytes> {
    let header_len = match transaction {
        TransactionHeader::Control(_) => ControlHeader::SIZE,
        TransactionHeader::Service(_) => ServiceHeader::SIZE,
    };
    let payload_len = u16::try_from(payload.len()).ok()?;
    let total = MuxHeader::SIZE + header_len + MessageHeader::SIZE + payload.len();
    let length = u16::try_from(total - 1).ok()?;

    let mut buf = BytesMut::with_capacity(total);
    MuxHeader {
        frame: FRAME_MARKER,
        length,
        flags: 0x00,
        service,
        client,
    }
    .serialize(&mut buf);
    match transaction {
        TransactionHeader::Control(h) => h.serialize(&mut buf),
        TransactionHeader::Service(h) => h.serialize(&mut buf),
    }
    MessageHeader {
        message,
        length: payload_len,
    }
    .serialize(&mut buf);
    buf.put_slice(payload);

    Some(buf.freeze())
}

/// Build a control service request. Returns `None` if the payload is too large.
pub fn build_control_request(transaction: u8, message: u16, payload: &[u8]) -> Option<Bytes> {
    build_frame(
        ServiceType::CONTROL.value(),
        0x00,
        TransactionHeader::Control(ControlHeader {
            msg_type: ControlHeader::REQUEST,
            transaction,
        }),
        message,
        payload,
    )
}

/// Build a request for a regular service. Returns `None` if the payload is too large.
pub fn build_service_request(
    service: ServiceType,
    client: u8,
    transaction: u16,
    message: u16,
    payload: &[u8],
) -> Option<Bytes> {
    build_frame(
        service.value(),
        client,
        TransactionHeader::Service(ServiceHeader {
            msg_type: ServiceHeader::REQUEST,
            transaction,
        }),
        message,
        payload,
    )
}

// ============================================================================
// TLV ACCESS
// ============================================================================

/// Iterator over the sequential TLVs of a payload.
///
/// Stops at the first TLV whose header or value does not fit the buffer.
pub struct Tlvs<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Tlvs<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }
}

impl<'a> Iterator for Tlvs<'a> {
    /// `(type, value offset, value)`
    type Item = (u8, usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let mut cursor = self.buf.get(self.offset..)?;
        let header = TlvHeader::parse(&mut cursor)?;
        let start = self.offset + TlvHeader::SIZE;
        let end = start.checked_add(usize::from(header.length))?;
        let value = self.buf.get(start..end)?;
        self.offset = end;
        Some((header.tlv_type, start, value))
    }
}

/// Locate the first TLV of `tlv_type` in `buf`.
///
/// Returns the value's `(offset, length)` within `buf`. A TLV whose declared
/// length would run past the end of the buffer ends the scan with `None`.
pub fn tlv_find(buf: &[u8], tlv_type: u8) -> Option<(usize, usize)> {
    Tlvs::new(buf)
        .find(|(t, _, _)| *t == tlv_type)
        .map(|(_, offset, value)| (offset, value.len()))
}

/// Value bytes of the first TLV of `tlv_type`.
pub fn tlv_get(buf: &[u8], tlv_type: u8) -> Option<&[u8]> {
    let (offset, len) = tlv_find(buf, tlv_type)?;
    buf.get(offset..offset + len)
}

/// Check the standard result TLV of a response payload.
///
/// Returns `None` on success and `Some(error)` otherwise. A missing payload
/// yields [`ERROR_TRANSPORT`]; a missing or wrong-sized result TLV yields
/// [`ERROR_MALFORMED_RESULT`].
pub fn result_has_error(payload: Option<&[u8]>) -> Option<u16> {
    let Some(payload) = payload else {
        return Some(ERROR_TRANSPORT);
    };

    let Some(mut value) = tlv_get(payload, TLV_RESULT).filter(|v| v.len() == RESULT_CODE_SIZE)
    else {
        return Some(ERROR_MALFORMED_RESULT);
    };

    let result = value.get_u16_le();
    let error = value.get_u16_le();
    if result == 0 {
        None
    } else {
        Some(error)
    }
}

// ============================================================================
// CONTROL SERVICE PAYLOADS
// ============================================================================

/// Version of one service as reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceVersion {
    pub service_type: ServiceType,
    pub major: u16,
    pub minor: u16,
}

impl ServiceVersion {
    /// Short service name, e.g. `"NAS"`.
    pub fn name(&self) -> Option<&'static str> {
        self.service_type.name()
    }
}

/// Result of version discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    /// Version of the control service itself
    pub control: Option<(u16, u16)>,
    /// Versions of every other service the modem supports
    pub services: Vec<ServiceVersion>,
    /// Firmware version string, when the modem reports one
    pub version_string: Option<String>,
}

impl VersionInfo {
    /// Parse a get-version-info response payload.
    ///
    /// Requires a well-sized result TLV and a complete service list TLV.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        tlv_get(payload, TLV_RESULT).filter(|v| v.len() == RESULT_CODE_SIZE)?;

        let mut list = tlv_get(payload, CTL_TLV_SERVICE_LIST)?;
        if list.is_empty() {
            return None;
        }
        let count = usize::from(list.get_u8());
        if list.remaining() < count * SERVICE_ENTRY_SIZE {
            return None;
        }

        let mut info = Self::default();
        for _ in 0..count {
            let service_type = ServiceType::new(list.get_u8());
            let major = list.get_u16_le();
            let minor = list.get_u16_le();

            if service_type == ServiceType::CONTROL {
                info.control = Some((major, minor));
                continue;
            }

            info.services.push(ServiceVersion {
                service_type,
                major,
                minor,
            });
        }

        info.version_string = tlv_get(payload, CTL_TLV_VERSION_STRING).and_then(|value| {
            let (&len, rest) = value.split_first()?;
            let raw = rest.get(..usize::from(len))?;
            let raw = raw.split(|&b| b == 0).next().unwrap_or_default();
            Some(String::from_utf8_lossy(raw).into_owned())
        });

        Some(info)
    }

    /// Version of `service_type`, if the modem listed it.
    pub fn find(&self, service_type: ServiceType) -> Option<&ServiceVersion> {
        self.services.iter().find(|s| s.service_type == service_type)
    }
}

/// Payload of a get-client-id request for `service_type`.
pub fn client_id_request(service_type: ServiceType) -> [u8; 4] {
    [CTL_TLV_CLIENT_ID, 0x01, 0x00, service_type.value()]
}

/// Payload of a release-client-id request.
pub fn release_client_request(service_type: ServiceType, client_id: u8) -> [u8; 5] {
    [
        CTL_TLV_CLIENT_ID,
        CLIENT_ID_SIZE as u8,
        0x00,
        service_type.value(),
        client_id,
    ]
}

/// Parse a get-client-id response into `(service type, client id)`.
///
/// Requires a successful, well-sized result TLV and a 2-byte client id TLV.
pub fn parse_client_id(payload: &[u8]) -> Option<(ServiceType, u8)> {
    if result_has_error(Some(payload)).is_some() {
        return None;
    }

    match tlv_get(payload, CTL_TLV_CLIENT_ID)? {
        [service, client] => Some((ServiceType::new(*service), *client)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_frame(tid: u8, message: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let total = MuxHeader::SIZE + ControlHeader::SIZE + MessageHeader::SIZE + payload.len();
        MuxHeader {
            frame: FRAME_MARKER,
            length: (total - 1) as u16,
            flags: FLAG_FROM_MODEM,
            service: 0,
            client: 0,
        }
        .serialize(&mut buf);
        ControlHeader {
            msg_type: ControlHeader::RESPONSE,
            transaction: tid,
        }
        .serialize(&mut buf);
        MessageHeader {
            message,
            length: payload.len() as u16,
        }
        .serialize(&mut buf);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn get_client_id_request_layout() {
        let payload = client_id_request(ServiceType::NAS);
        assert_eq!(payload, [0x01, 0x01, 0x00, 0x03]);

        let frame = build_control_request(1, CTL_GET_CLIENT_ID, &payload).unwrap();
        assert_eq!(
            &frame[..],
            &[
                0x01, 0x0F, 0x00, 0x00, 0x00, 0x00, // mux
                0x00, 0x01, // control header
                0x22, 0x00, 0x04, 0x00, // message header
                0x01, 0x01, 0x00, 0x03, // payload
            ]
        );
    }

    #[test]
    fn service_request_headers_decode() {
        let frame = build_service_request(ServiceType::DMS, 7, 0x0123, 0x0025, &[0xAA; 5]).unwrap();

        let mut cursor = frame.clone();
        let mux = MuxHeader::parse(&mut cursor).unwrap();
        assert_eq!(mux.service, ServiceType::DMS.value());
        assert_eq!(mux.client, 7);
        assert_eq!(mux.frame_len(), frame.len());

        let hdr = ServiceHeader::parse(&mut cursor).unwrap();
        assert_eq!(hdr.transaction, 0x0123);
        assert!(!hdr.is_indication());

        let msg = MessageHeader::parse(&mut cursor).unwrap();
        assert_eq!(msg.message, 0x0025);
        assert_eq!(msg.length, 5);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; usize::from(u16::MAX)];
        assert!(build_service_request(ServiceType::NAS, 1, 256, 1, &payload).is_none());
    }

    #[test]
    fn tlv_find_locates_values() {
        let buf = [0x01, 0x01, 0x00, 0x07, 0x10, 0x02, 0x00, 0xAB, 0xCD];
        assert_eq!(tlv_find(&buf, 0x01), Some((3, 1)));
        assert_eq!(tlv_find(&buf, 0x10), Some((7, 2)));
        assert_eq!(tlv_find(&buf, 0x11), None);
    }

    #[test]
    fn tlv_find_stops_at_overlong_tlv() {
        // Second TLV claims 0x0100 bytes but only 2 remain.
        let buf = [0x01, 0x01, 0x00, 0x07, 0x10, 0x00, 0x01, 0xAB, 0xCD];
        assert_eq!(tlv_find(&buf, 0x10), None);
        assert_eq!(tlv_find(&buf, 0x01), Some((3, 1)));
    }

    #[test]
    fn tlv_find_accepts_trailing_empty_tlv() {
        let buf = [0x05, 0x00, 0x00];
        assert_eq!(tlv_find(&buf, 0x05), Some((3, 0)));
    }

    #[test]
    fn result_has_error_cases() {
        assert_eq!(result_has_error(None), Some(ERROR_TRANSPORT));
        assert_eq!(result_has_error(Some(&[0x02, 0x04, 0x00, 0, 0, 0, 0])), None);
        assert_eq!(
            result_has_error(Some(&[0x02, 0x04, 0x00, 0x01, 0x00, 0x1A, 0x00])),
            Some(0x001A)
        );
        // Present but wrong-sized result TLV is a failure, not a success.
        assert_eq!(
            result_has_error(Some(&[0x02, 0x02, 0x00, 0x00, 0x00])),
            Some(ERROR_MALFORMED_RESULT)
        );
        assert_eq!(result_has_error(Some(&[])), Some(ERROR_MALFORMED_RESULT));
    }

    #[test]
    fn frames_split_multiple_in_one_read() {
        let mut read = response_frame(1, CTL_GET_CLIENT_ID, &[0x02, 0x04, 0x00, 0, 0, 0, 0]);
        read.extend(response_frame(2, CTL_RELEASE_CLIENT_ID, &[]));

        let frames: Vec<_> = Frames::new(Bytes::from(read)).collect();
        assert_eq!(frames.len(), 2);
        let (_, first) = frames[0].as_ref().unwrap();
        assert_eq!(first.transaction.transaction(), 1);
        assert_eq!(first.payload.len(), 7);
        let (offset, second) = frames[1].as_ref().unwrap();
        assert_eq!(*offset, 19);
        assert_eq!(second.message.message, CTL_RELEASE_CLIENT_ID);
    }

    #[test]
    fn frames_abandon_rest_after_bad_marker() {
        let mut read = response_frame(1, CTL_GET_CLIENT_ID, &[]);
        let good_len = read.len();
        read.push(0x7E);
        read.extend(response_frame(2, CTL_GET_CLIENT_ID, &[]));

        let frames: Vec<_> = Frames::new(Bytes::from(read)).collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        let (offset, err) = frames[1].as_ref().unwrap_err();
        assert_eq!(*offset, good_len);
        assert!(matches!(err, FrameError::BadMarker { frame: 0x7E, .. }));
    }

    #[test]
    fn frames_reject_host_flags() {
        let mut read = response_frame(1, CTL_GET_CLIENT_ID, &[]);
        read[3] = 0x00;
        let frames: Vec<_> = Frames::new(Bytes::from(read)).collect();
        assert!(matches!(frames[0], Err((0, FrameError::BadMarker { .. }))));
    }

    #[test]
    fn frames_reject_message_length_past_frame() {
        let mut read = response_frame(1, CTL_GET_CLIENT_ID, &[0xAA]);
        // message length field says 9, frame only carries 1
        read[10] = 0x09;
        let frames: Vec<_> = Frames::new(Bytes::from(read)).collect();
        assert!(matches!(frames[0], Err((0, FrameError::Malformed(_)))));
    }

    #[test]
    fn frames_report_partial_frame() {
        let read = response_frame(1, CTL_GET_CLIENT_ID, &[0xAA, 0xBB]);
        let cut = Bytes::copy_from_slice(&read[..read.len() - 1]);
        let frames: Vec<_> = Frames::new(cut).collect();
        assert!(matches!(frames[0], Err((0, FrameError::ShortFrame { .. }))));
    }

    #[test]
    fn indication_bits() {
        assert!(ServiceHeader {
            msg_type: ServiceHeader::INDICATION,
            transaction: 0
        }
        .is_indication());
        assert!(!ServiceHeader {
            msg_type: ServiceHeader::INDICATION,
            transaction: 300
        }
        .is_indication());
        assert!(!ServiceHeader {
            msg_type: ServiceHeader::RESPONSE,
            transaction: 0
        }
        .is_indication());
        assert!(ControlHeader {
            msg_type: ControlHeader::INDICATION,
            transaction: 0
        }
        .is_indication());
    }

    #[test]
    fn version_info_parse() {
        let payload = [
            0x02, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, // result
            0x01, 0x10, 0x00, 0x03, // service list, 3 entries
            0x00, 0x01, 0x00, 0x05, 0x00, // CTL 1.5
            0x02, 0x01, 0x00, 0x0E, 0x00, // DMS 1.14
            0x03, 0x01, 0x00, 0x19, 0x00, // NAS 1.25
            0x10, 0x05, 0x00, 0x03, b'1', b'.', b'0', 0x00, // version string "1.0"
        ];
        let info = VersionInfo::parse(&payload).unwrap();
        assert_eq!(info.control, Some((1, 5)));
        assert_eq!(info.services.len(), 2);
        assert_eq!(info.find(ServiceType::NAS).unwrap().minor, 25);
        assert_eq!(info.find(ServiceType::DMS).unwrap().name(), Some("DMS"));
        assert_eq!(info.version_string.as_deref(), Some("1.0"));
    }

    #[test]
    fn version_info_rejects_short_list() {
        let payload = [
            0x02, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, // result
            0x01, 0x06, 0x00, 0x02, 0x03, 0x01, 0x00, 0x19, 0x00, // claims 2, carries 1
        ];
        assert!(VersionInfo::parse(&payload).is_none());
    }

    #[test]
    fn client_id_parse() {
        let ok = [0x02, 0x04, 0x00, 0, 0, 0, 0, 0x01, 0x02, 0x00, 0x03, 0x05];
        assert_eq!(parse_client_id(&ok), Some((ServiceType::NAS, 5)));

        let failed = [0x02, 0x04, 0x00, 0x01, 0x00, 0x05, 0x00, 0x01, 0x02, 0x00, 0x03, 0x05];
        assert_eq!(parse_client_id(&failed), None);

        let short_id = [0x02, 0x04, 0x00, 0, 0, 0, 0, 0x01, 0x01, 0x00, 0x03];
        assert_eq!(parse_client_id(&short_id), None);
    }
}
