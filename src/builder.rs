//! Builder for configuring and starting a QMI [`Device`].
//!
//! ```no_run
//! use std::time::Duration;
//!
//! # fn example(fd: std::os::fd::OwnedFd) -> qmilink::Result<()> {
//! let device = qmilink::configure()
//!     .discover_timeout(Duration::from_secs(3))
//!     .debug(|line| eprintln!("qmi: {line}"))
//!     .start(fd)?;
//! # Ok(())
//! # }
//! ```

use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::{DeviceConfig, MIN_READ_BUFFER_SIZE};
use crate::debug::DebugHook;
use crate::error::{ConfigError, Error, Result};
use crate::handles::Device;
use crate::transport::{CharDevice, Transport};

/// Builder for configuring and starting a [`Device`].
///
/// Created via [`configure()`](crate::configure).
#[derive(Clone, Default)]
#[must_use]
pub struct DeviceBuilder {
    config: DeviceConfig,
    debug: Option<DebugHook>,
}

impl DeviceBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    ///
    /// `read_buffer_size` is raised to its minimum like
    /// [`read_buffer_size`](Self::read_buffer_size) does.
    pub fn config(mut self, config: DeviceConfig) -> Self {
        let size = config.read_buffer_size;
        self.config = config;
        self.read_buffer_size(size)
    }

    /// How long version discovery waits for the modem.
    ///
    /// Default: 5 seconds
    pub fn discover_timeout(mut self, timeout: Duration) -> Self {
        self.config.discover_timeout = timeout;
        self
    }

    /// Upper bound for service creation (discovery plus client id).
    ///
    /// Default: 8 seconds
    pub fn create_timeout(mut self, timeout: Duration) -> Self {
        self.config.create_timeout = timeout;
        self
    }

    /// Bytes read per readiness event.
    ///
    /// Values below 64 are raised to 64.
    ///
    /// Default: 2048
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        if size < MIN_READ_BUFFER_SIZE {
            warn!(
                "read_buffer_size {} below minimum, using {}",
                size, MIN_READ_BUFFER_SIZE
            );
        }
        self.config.read_buffer_size = size.max(MIN_READ_BUFFER_SIZE);
        self
    }

    /// Close the descriptor when the device is torn down.
    ///
    /// Default: true
    pub fn close_on_unref(mut self, close: bool) -> Self {
        self.config.close_on_unref = close;
        self
    }

    /// Install a debug sink receiving hex dumps and decoded frame summaries.
    pub fn debug(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.debug = Some(Arc::new(hook));
        self
    }

    /// Start a device on an already-open QMI character device.
    ///
    /// The descriptor is switched to non-blocking mode and registered with the
    /// tokio reactor. Must be called from within a tokio runtime.
    pub fn start(self, fd: OwnedFd) -> Result<Device> {
        ensure_runtime()?;
        let transport = CharDevice::new(fd, self.config.close_on_unref)?;
        self.start_generic(transport)
    }

    /// Start a device over any [`Transport`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_generic<T: Transport>(self, transport: T) -> Result<Device> {
        ensure_runtime()?;
        Ok(Device::spawn(transport, self.config, self.debug))
    }
}

fn ensure_runtime() -> Result<()> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|_| Error::Config(ConfigError::new("must be called within a tokio runtime")))
}
