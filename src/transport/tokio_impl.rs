//! Tokio socket implementations.

use super::Transport;
use std::io;

impl Transport for tokio::net::UnixDatagram {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::UnixDatagram::recv(self, buf).await
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::UnixDatagram::send(self, buf).await
    }
}
