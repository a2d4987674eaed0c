//! # QMI `Device`
//!
//! The device is the **central coordinator** for one QMI character device.
//! It owns the descriptor (through its task), discovers supported services and
//! creates [`Service`] clients.
//!
//! ## Role in the Architecture
//!
//! 1. All state lives in a single `DeviceState` owned by the device task
//! 2. Handles send `Command` messages over an unbounded channel
//! 3. The task processes commands and descriptor I/O in a `tokio::select!` loop
//! 4. Results flow back through `oneshot` channels
//!
//! ## Lifetime and Shutdown
//!
//! [`Device`] and [`Service`] are cheap clones of shared handles. The task
//! runs until every `Device`, `Service` and
//! [`IndicationStream`](crate::IndicationStream) is dropped. It then fails
//! whatever is still pending with [`Error::DeviceShutdown`], waits briefly for
//! outstanding client id releases and drops the descriptor.
//!
//! Call [`Device::shutdown`] before dropping the last handle to make sure every
//! released client id has been acknowledged by the modem.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::DeviceConfig;
use crate::debug::{DebugHook, DebugSink};
use crate::error::{Error, Result};
use crate::handles::Service;
use crate::runtime::event_loop::device_task;
use crate::runtime::state::DeviceState;
use crate::runtime::Command;
use crate::transport::Transport;
use crate::wire::VersionInfo;
use crate::ServiceType;

// ============================================================================
// DEVICE INNER
// ============================================================================

/// Shared between every handle of one device.
///
/// Holding it keeps the device task's command channel open.
#[derive(Debug)]
pub(crate) struct DeviceInner {
    pub(crate) cmd_tx: mpsc::UnboundedSender<Command>,
}

impl DeviceInner {
    pub(crate) fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| Error::DeviceShutdown)
    }

    /// Send a command built around a reply channel and wait for the reply.
    pub(crate) async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx))?;
        rx.await.map_err(|_| Error::DeviceShutdown)
    }
}

// ============================================================================
// DEVICE
// ============================================================================

/// Handle to a running QMI device.
///
/// Created via [`configure()`](crate::configure). Clones share the same
/// device task.
///
/// # Example
///
/// ```no_run
/// use qmilink::prelude::*;
///
/// # async fn example(device: Device) -> Result<()> {
/// let versions = device.discover().await?;
/// if versions.find(ServiceType::NAS).is_some() {
///     let nas = device.create_service(ServiceType::NAS).await?;
///     let signal = nas.send(0x0020, None).await?;
///     println!("success: {}", signal.is_success());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Spawn the device task over `transport`.
    pub(crate) fn spawn<T: Transport>(
        transport: T,
        config: DeviceConfig,
        debug: Option<DebugHook>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(DeviceInner { cmd_tx });

        let debug = DebugSink::new(debug);
        debug.line(format_args!("device new"));
        tracing::debug!(
            "Starting QMI device (discover timeout {:?}, create timeout {:?})",
            config.discover_timeout,
            config.create_timeout
        );

        let state = DeviceState::new(config, debug, Arc::downgrade(&inner));
        tokio::spawn(device_task(transport, state, cmd_rx));

        Self { inner }
    }

    /// Install a debug sink receiving one trace line at a time.
    ///
    /// Every frame sent or received is rendered as a hex dump followed by a
    /// decoded header and TLV summary. Replaces any previous sink.
    pub fn set_debug(&self, hook: impl Fn(&str) + Send + Sync + 'static) -> Result<()> {
        self.inner.send(Command::SetDebug(Some(Arc::new(hook))))
    }

    /// Remove the debug sink.
    pub fn clear_debug(&self) -> Result<()> {
        self.inner.send(Command::SetDebug(None))
    }

    /// Discover the services supported by the modem.
    ///
    /// The first call queries the modem; later calls replay the cached list.
    /// If the modem does not answer within the discovery timeout the result
    /// is an empty list rather than an error.
    pub async fn discover(&self) -> Result<VersionInfo> {
        self.inner
            .request(|reply| Command::Discover { reply })
            .await?
    }

    /// The cached discovery result, if discovery has completed successfully.
    pub async fn version_info(&self) -> Result<Option<VersionInfo>> {
        self.inner
            .request(|reply| Command::VersionInfo { reply })
            .await
    }

    /// Acquire a new client id for `service_type`.
    ///
    /// Runs discovery first if it has not completed yet. Fails with
    /// [`Error::Timeout`] if the whole sequence exceeds the creation timeout.
    pub async fn create_service(&self, service_type: ServiceType) -> Result<Service> {
        self.create(service_type, false).await
    }

    /// Like [`create_service`](Self::create_service), but reuses a live shared
    /// service of the same type if one exists.
    pub async fn create_shared_service(&self, service_type: ServiceType) -> Result<Service> {
        self.create(service_type, true).await
    }

    async fn create(&self, service_type: ServiceType, shared: bool) -> Result<Service> {
        self.inner
            .request(|reply| Command::CreateService {
                service_type,
                shared,
                reply,
            })
            .await?
    }

    /// Wait until every released client id has been acknowledged.
    ///
    /// Resolves immediately if no release is outstanding.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner
            .request(|reply| Command::Shutdown { reply })
            .await
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("closed", &self.inner.cmd_tx.is_closed())
            .finish()
    }
}
