//! Descriptor abstraction for the device event loop.
//!
//! The event loop polls a read and a write concurrently, so both operations
//! take `&self`. Production devices use [`CharDevice`]; tests can drive a
//! device over a `tokio::net::UnixDatagram` pair.

use std::future::Future;
use std::io;

mod char_device;
mod tokio_impl;

pub use char_device::CharDevice;

/// Async datagram-style transport carrying whole QMI frames.
///
/// Implemented by [`CharDevice`] and `tokio::net::UnixDatagram`.
///
/// Both futures must be cancel safe: dropping one before it completes must
/// not lose data.
pub trait Transport: Send + Sync + 'static {
    /// Read whatever the descriptor has available into `buf`.
    ///
    /// `Ok(0)` means the peer hung up.
    fn read(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Write `buf` in a single call, returning the number of bytes written.
    fn write(&self, buf: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;
}
