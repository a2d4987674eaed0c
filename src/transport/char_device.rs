//! QMI character device (`/dev/cdc-wdmN`) transport.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use super::Transport;

/// An already-open QMI character device registered with the tokio reactor.
///
/// Each `read` returns the bytes of one readiness event; each `write` is a
/// single `write(2)` call.
#[derive(Debug)]
pub struct CharDevice {
    fd: Option<AsyncFd<File>>,
    close_on_drop: bool,
}

impl CharDevice {
    /// Take ownership of `fd`, force it non-blocking and register it.
    ///
    /// With `close_on_drop == false` the descriptor is left open when the
    /// device goes away; the caller remains responsible for closing it.
    pub fn new(fd: OwnedFd, close_on_drop: bool) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        let fd = AsyncFd::try_with_interest(File::from(fd), Interest::READABLE | Interest::WRITABLE)
            .map_err(|e| e.into_parts().1)?;
        Ok(Self {
            fd: Some(fd),
            close_on_drop,
        })
    }

    fn fd(&self) -> io::Result<&AsyncFd<File>> {
        self.fd
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: `raw` is a valid open descriptor owned by `fd` for the duration of the call.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }
    // SAFETY: as above; F_SETFL only changes the file status flags.
    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl Transport for CharDevice {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.fd()?;
        loop {
            let mut guard = fd.readable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let fd = self.fd()?;
        loop {
            let mut guard = fd.writable().await?;
            match guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.write(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

impl Drop for CharDevice {
    fn drop(&mut self) {
        if self.close_on_drop {
            return;
        }
        if let Some(fd) = self.fd.take() {
            // Deregister from the reactor but leave the descriptor open.
            let _ = fd.into_inner().into_raw_fd();
        }
    }
}
