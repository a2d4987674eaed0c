//! Response payload reader.
//!
//! A [`QmiResult`] wraps one response or indication payload. The standard
//! result TLV is checked once when the response arrives; a non-zero result is
//! not an [`Error`](crate::Error) but is reported by [`QmiResult::error`] so
//! drivers can decide how to treat specific codes.

use bytes::{Buf, Bytes};

use crate::wire::{result_has_error, tlv_get};

/// One response or indication payload.
#[derive(Debug, Clone)]
pub struct QmiResult {
    message: u16,
    data: Bytes,
    error: Option<u16>,
}

impl QmiResult {
    pub(crate) fn response(message: u16, data: Bytes) -> Self {
        let error = result_has_error(Some(&data));
        Self {
            message,
            data,
            error,
        }
    }

    /// Indications carry no result TLV and are always successful.
    pub(crate) fn indication(message: u16, data: Bytes) -> Self {
        Self {
            message,
            data,
            error: None,
        }
    }

    /// Message id of the response or indication.
    pub fn message(&self) -> u16 {
        self.message
    }

    /// Raw TLV payload.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// The modem's error code, or `None` if the request succeeded.
    ///
    /// A response without a well-formed result TLV reports
    /// [`ERROR_MALFORMED_RESULT`](crate::wire::ERROR_MALFORMED_RESULT).
    pub fn error(&self) -> Option<u16> {
        self.error
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Raw value of the TLV of `tlv_type`.
    pub fn get(&self, tlv_type: u8) -> Option<&[u8]> {
        if tlv_type == 0 {
            return None;
        }
        tlv_get(&self.data, tlv_type)
    }

    pub fn get_u8(&self, tlv_type: u8) -> Option<u8> {
        self.get(tlv_type)?.first().copied()
    }

    pub fn get_u16(&self, tlv_type: u8) -> Option<u16> {
        let mut value = self.get(tlv_type)?;
        (value.len() >= 2).then(|| value.get_u16_le())
    }

    pub fn get_u32(&self, tlv_type: u8) -> Option<u32> {
        let mut value = self.get(tlv_type)?;
        (value.len() >= 4).then(|| value.get_u32_le())
    }

    pub fn get_u64(&self, tlv_type: u8) -> Option<u64> {
        let mut value = self.get(tlv_type)?;
        (value.len() >= 8).then(|| value.get_u64_le())
    }

    /// TLV value as a string, cut at the first NUL byte.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected; modems
    /// occasionally pad version strings with garbage.
    pub fn get_string(&self, tlv_type: u8) -> Option<String> {
        let value = self.get(tlv_type)?;
        let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
        Some(String::from_utf8_lossy(&value[..end]).into_owned())
    }
}
