//! Request payload builder.
//!
//! A [`Param`] is a byte buffer of concatenated TLVs, built up by the caller
//! and handed to [`Service::send`](crate::Service::send).
//!
//! ```
//! use qmilink::Param;
//!
//! let mut param = Param::new();
//! param.append_u8(0x01, 1)?;
//! param.append(0x10, b"internet")?;
//! assert_eq!(param.len(), 4 + 11);
//! # Ok::<(), qmilink::Error>(())
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::wire::TlvHeader;

/// Append-only TLV payload.
#[derive(Debug, Clone, Default)]
pub struct Param {
    buf: BytesMut,
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }

    /// Param holding a single `u8` TLV.
    pub fn with_u8(tlv_type: u8, value: u8) -> Result<Self> {
        let mut param = Self::new();
        param.append_u8(tlv_type, value)?;
        Ok(param)
    }

    /// Param holding a single `u16` TLV.
    pub fn with_u16(tlv_type: u8, value: u16) -> Result<Self> {
        let mut param = Self::new();
        param.append_u16(tlv_type, value)?;
        Ok(param)
    }

    /// Param holding a single `u32` TLV.
    pub fn with_u32(tlv_type: u8, value: u32) -> Result<Self> {
        let mut param = Self::new();
        param.append_u32(tlv_type, value)?;
        Ok(param)
    }

    /// Append a TLV with raw value bytes.
    ///
    /// TLV type 0 is reserved and rejected. An empty value appends nothing and
    /// succeeds.
    pub fn append(&mut self, tlv_type: u8, value: &[u8]) -> Result<()> {
        if tlv_type == 0 {
            return Err(Error::InvalidParam);
        }
        if value.is_empty() {
            return Ok(());
        }
        let length = u16::try_from(value.len()).map_err(|_| Error::InvalidParam)?;

        self.buf.reserve(TlvHeader::SIZE + value.len());
        TlvHeader { tlv_type, length }.serialize(&mut self.buf);
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn append_u8(&mut self, tlv_type: u8, value: u8) -> Result<()> {
        self.append(tlv_type, &[value])
    }

    pub fn append_u16(&mut self, tlv_type: u8, value: u16) -> Result<()> {
        self.append(tlv_type, &value.to_le_bytes())
    }

    pub fn append_u32(&mut self, tlv_type: u8, value: u32) -> Result<()> {
        self.append(tlv_type, &value.to_le_bytes())
    }

    pub fn append_u64(&mut self, tlv_type: u8, value: u64) -> Result<()> {
        self.append(tlv_type, &value.to_le_bytes())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}
