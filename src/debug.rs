//! Human-readable frame trace for the debug hook.
//!
//! Every frame written to or read from the device is rendered as a hex dump
//! followed by a decoded summary:
//!
//! ```text
//! > 01 0f 00 00 00 00 00 01 22 00 04 00 01 01 00 03  ........".......
//!     CTL_req msg=34 len=4 [client=0,type=0,tid=1,len=15]
//!       {type=1,len=1}
//! ```
//!
//! The trace carries no semantics and is independent of `tracing`.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use crate::wire::{
    ControlHeader, MessageHeader, MuxHeader, ServiceHeader, Tlvs, TransactionHeader, TLV_RESULT,
};
use crate::ServiceType;

/// Debug sink receiving one trace line per call.
pub type DebugHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Direction of a traced frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    fn marker(self) -> char {
        match self {
            Self::Sent => '>',
            Self::Received => '<',
        }
    }
}

/// Optional debug hook owned by the device task.
#[derive(Clone, Default)]
pub(crate) struct DebugSink {
    hook: Option<DebugHook>,
}

impl DebugSink {
    pub(crate) fn new(hook: Option<DebugHook>) -> Self {
        Self { hook }
    }

    pub(crate) fn set(&mut self, hook: Option<DebugHook>) {
        self.hook = hook;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.hook.is_some()
    }

    pub(crate) fn line(&self, args: fmt::Arguments<'_>) {
        if let Some(hook) = &self.hook {
            hook(&args.to_string());
        }
    }

    /// Hex dump of a whole read or write.
    pub(crate) fn dump(&self, direction: Direction, data: &[u8]) {
        if let Some(hook) = &self.hook {
            for line in hexdump(direction.marker(), data) {
                hook(&line);
            }
        }
    }

    /// Decoded summary of one frame.
    pub(crate) fn frame(&self, frame: &[u8]) {
        if let Some(hook) = &self.hook {
            for line in describe_frame(frame) {
                hook(&line);
            }
        }
    }
}

/// Render `data` as rows of 16 bytes with a printable ASCII column.
///
/// The first row starts with `dir`, continuation rows with a space.
pub fn hexdump(dir: char, data: &[u8]) -> Vec<String> {
    data.chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let mut line = String::with_capacity(68);
            line.push(if row == 0 { dir } else { ' ' });
            for byte in chunk {
                let _ = write!(line, " {byte:02x}");
            }
            for _ in chunk.len()..16 {
                line.push_str("   ");
            }
            line.push_str("  ");
            line.extend(chunk.iter().map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    char::from(b)
                } else {
                    '.'
                }
            }));
            line
        })
        .collect()
}

/// Decode the headers and TLV layout of one frame.
///
/// Returns nothing for input too short to hold the headers.
pub fn describe_frame(frame: &[u8]) -> Vec<String> {
    let mut cursor = frame;
    let Some(mux) = MuxHeader::parse(&mut cursor) else {
        return Vec::new();
    };

    let transaction = if mux.is_control() {
        ControlHeader::parse(&mut cursor).map(TransactionHeader::Control)
    } else {
        ServiceHeader::parse(&mut cursor).map(TransactionHeader::Service)
    };
    let (Some(transaction), Some(message)) = (transaction, MessageHeader::parse(&mut cursor))
    else {
        return Vec::new();
    };

    let service_type = ServiceType::new(mux.service);
    let mut header = String::from("    ");
    match service_type.name() {
        Some(name) => header.push_str(name),
        None => {
            let _ = write!(header, "{}", mux.service);
        }
    }
    let _ = write!(
        header,
        "{} msg={} len={} [client={},type={},tid={},len={}]",
        transaction.kind_suffix(),
        message.message,
        message.length,
        mux.client,
        transaction.msg_type(),
        transaction.transaction(),
        mux.length,
    );

    let mut lines = vec![header];
    if message.length == 0 {
        return lines;
    }

    let payload_len = usize::from(message.length).min(cursor.len());
    let mut tlvs = String::from("      ");
    for (tlv_type, _, value) in Tlvs::new(&cursor[..payload_len]) {
        if tlv_type == TLV_RESULT && value.len() == 4 {
            let error = u16::from_le_bytes([value[2], value[3]]);
            let _ = write!(tlvs, "{{type={tlv_type},error={error}}}");
        } else {
            let _ = write!(tlvs, "{{type={tlv_type},len={}}}", value.len());
        }
    }
    lines.push(tlvs);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{build_control_request, client_id_request, CTL_GET_CLIENT_ID};
    use std::sync::Mutex;

    #[test]
    fn hexdump_rows() {
        let data: Vec<u8> = (0x41..0x41 + 20).collect();
        let lines = hexdump('<', &data);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("< 41 42 43"));
        assert!(lines[0].ends_with("  ABCDEFGHIJKLMNOP"));
        assert!(lines[1].starts_with("  51 52 53 54"));
        assert!(lines[1].ends_with("  QRST"));
        assert_eq!(lines[0].len(), lines[1].len() + 12);
    }

    #[test]
    fn hexdump_replaces_unprintable() {
        let lines = hexdump('>', &[0x00, 0x7F, b'a']);
        assert!(lines[0].ends_with("  ..a"));
    }

    #[test]
    fn describes_control_request() {
        let frame = build_control_request(1, CTL_GET_CLIENT_ID, &client_id_request(ServiceType::NAS))
            .unwrap();
        let lines = describe_frame(&frame);
        assert_eq!(
            lines,
            vec![
                "    CTL_req msg=34 len=4 [client=0,type=0,tid=1,len=15]".to_string(),
                "      {type=1,len=1}".to_string(),
            ]
        );
    }

    #[test]
    fn describes_result_tlv_error() {
        let frame = [
            0x01, 0x13, 0x00, 0x80, 0x03, 0x05, // mux, NAS client 5
            0x02, 0x00, 0x01, // service response, tid 256
            0x24, 0x00, 0x07, 0x00, // msg 0x24, 7 bytes
            0x02, 0x04, 0x00, 0x01, 0x00, 0x0E, 0x00,
        ];
        let lines = describe_frame(&frame);
        assert_eq!(lines[0], "    NAS_resp msg=36 len=7 [client=5,type=2,tid=256,len=19]");
        assert_eq!(lines[1], "      {type=2,error=14}");
    }

    #[test]
    fn sink_forwards_lines() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook: DebugHook = {
            let seen = seen.clone();
            Arc::new(move |line: &str| seen.lock().unwrap().push(line.to_string()))
        };
        let sink = DebugSink::new(Some(hook));
        sink.line(format_args!("device new"));
        sink.dump(Direction::Sent, &[0x01]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], "device new");
        assert!(seen[1].starts_with("> 01"));
    }

    #[test]
    fn disabled_sink_is_silent() {
        let sink = DebugSink::default();
        assert!(!sink.is_enabled());
        sink.line(format_args!("ignored"));
    }
}
