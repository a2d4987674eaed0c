//! # Device Configuration
//!
//! Defaults work for real modems:
//!
//! ```no_run
//! # fn example(fd: std::os::fd::OwnedFd) -> qmilink::Result<()> {
//! let device = qmilink::configure().start(fd)?;
//! # Ok(())
//! # }
//! ```
//!
//! Tests usually shorten the timers:
//!
//! ```
//! use std::time::Duration;
//! use qmilink::DeviceConfig;
//!
//! let config = DeviceConfig {
//!     discover_timeout: Duration::from_millis(200),
//!     create_timeout: Duration::from_millis(400),
//!     ..DeviceConfig::default()
//! };
//! ```
//!
//! ## Configuration Options Reference
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `discover_timeout` | 5 s | How long version discovery waits for the modem |
//! | `create_timeout` | 8 s | Upper bound for discovery plus client id acquisition |
//! | `read_buffer_size` | 2048 | Bytes read from the descriptor per readiness event |
//! | `close_on_unref` | true | Close the descriptor when the device goes away |

use std::time::Duration;

/// Default version discovery timeout.
///
/// A timeout is not an error: waiters receive whatever version list is cached.
pub const DEFAULT_DISCOVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default service creation timeout.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(8);

/// Default read chunk size.
///
/// Frames are never carried over between reads, so this must be at least as
/// large as the biggest frame the modem sends in one write.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 2048;

/// Smallest accepted read chunk size (one mux header plus headers).
pub const MIN_READ_BUFFER_SIZE: usize = 64;

/// Device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Version discovery timeout (default: 5 s)
    pub discover_timeout: Duration,
    /// Service creation timeout (default: 8 s)
    pub create_timeout: Duration,
    /// Read chunk size in bytes (default: 2048)
    pub read_buffer_size: usize,
    /// Close the descriptor when the device is torn down (default: true)
    ///
    /// Only applies to devices started from a raw descriptor; a generic
    /// [`Transport`](crate::Transport) is simply dropped.
    pub close_on_unref: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            discover_timeout: DEFAULT_DISCOVER_TIMEOUT,
            create_timeout: DEFAULT_CREATE_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            close_on_unref: true,
        }
    }
}
