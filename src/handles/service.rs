//! Service client handle.
//!
//! - [`Service`]: one client id of one QMI service
//! - [`PendingResponse`]: a submitted request awaiting its response

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::handles::device::DeviceInner;
use crate::handles::{IndicationStream, SubscriptionId};
use crate::param::Param;
use crate::result::QmiResult;
use crate::runtime::state::ServiceKey;
use crate::runtime::Command;
use crate::ServiceType;

// ============================================================================
// SERVICE INNER
// ============================================================================

/// Shared by every clone of one [`Service`].
///
/// Dropping the last clone queues the client id release.
pub(crate) struct ServiceInner {
    device: Arc<DeviceInner>,
    key: ServiceKey,
    major: u16,
    minor: u16,
    shared: bool,
}

impl ServiceInner {
    pub(crate) fn new(
        device: Arc<DeviceInner>,
        key: ServiceKey,
        major: u16,
        minor: u16,
        shared: bool,
    ) -> Self {
        Self {
            device,
            key,
            major,
            minor,
            shared,
        }
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        if self.device.send(Command::Release { key: self.key }).is_err() {
            // Device task already gone; the modem reclaims the id on reset.
            tracing::debug!(
                "Release of {} client {} skipped: device shut down",
                self.key.service_type,
                self.key.client_id
            );
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// Client of one QMI service on a [`Device`](crate::Device).
///
/// Created via [`Device::create_service`](crate::Device::create_service).
/// Clones share the client id; it is released once the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use qmilink::prelude::*;
///
/// # async fn example(device: Device) -> Result<()> {
/// let dms = device.create_service(ServiceType::DMS).await?;
///
/// let mut param = Param::new();
/// param.append_u8(0x01, 1)?;
/// let result = dms.send(0x002E, Some(param)).await?;
/// match result.error() {
///     None => println!("done"),
///     Some(code) => println!("modem returned error {code}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl Service {
    pub(crate) fn from_inner(inner: Arc<ServiceInner>) -> Self {
        Self { inner }
    }

    /// The service type.
    pub fn service_type(&self) -> ServiceType {
        self.inner.key.service_type
    }

    /// The client id assigned by the modem.
    pub fn client_id(&self) -> u8 {
        self.inner.key.client_id
    }

    /// `(major, minor)` version reported by discovery, `(0, 0)` if unknown.
    pub fn version(&self) -> (u16, u16) {
        (self.inner.major, self.inner.minor)
    }

    /// Short name of the service type, e.g. `"NAS"`.
    pub fn identifier(&self) -> Option<&'static str> {
        self.service_type().name()
    }

    /// Whether this service was created as shared.
    pub fn is_shared(&self) -> bool {
        self.inner.shared
    }

    fn device(&self) -> &DeviceInner {
        &self.inner.device
    }

    /// Send a request and wait for its response.
    ///
    /// A response carrying a nonzero result code is still `Ok`; inspect
    /// [`QmiResult::error`].
    pub async fn send(&self, message: u16, param: Option<Param>) -> Result<QmiResult> {
        self.submit(message, param).await?.response().await
    }

    /// Queue a request and return as soon as it has a transaction id.
    ///
    /// The id can be passed to [`cancel`](Self::cancel).
    pub async fn submit(&self, message: u16, param: Option<Param>) -> Result<PendingResponse> {
        let payload = param.map_or_else(Bytes::new, Param::into_bytes);
        let (response, rx) = oneshot::channel();

        let tid = self
            .device()
            .request(|queued| Command::Send {
                key: self.inner.key,
                message,
                payload,
                queued,
                response,
            })
            .await??;

        Ok(PendingResponse { tid, rx })
    }

    /// Cancel one request. Returns `false` if it already completed.
    ///
    /// The waiting caller receives [`Error::Cancelled`].
    pub async fn cancel(&self, tid: u16) -> Result<bool> {
        let key = self.inner.key;
        self.device()
            .request(|reply| Command::Cancel { key, tid, reply })
            .await
    }

    /// Cancel every queued and in-flight request of this service.
    pub async fn cancel_all(&self) -> Result<usize> {
        let key = self.inner.key;
        self.device()
            .request(|reply| Command::CancelAll { key, reply })
            .await
    }

    /// Run `handler` for every indication with message id `message`.
    ///
    /// Handlers run on the device task, in registration order, and must not
    /// block. A handler that captures this service keeps it alive until it
    /// is unregistered.
    pub async fn register(
        &self,
        message: u16,
        handler: impl FnMut(&QmiResult) + Send + 'static,
    ) -> Result<SubscriptionId> {
        let key = self.inner.key;
        self.device()
            .request(|reply| Command::Register {
                key,
                message,
                handler: Box::new(handler),
                reply,
            })
            .await?
    }

    /// Receive indications with message id `message` as a stream.
    pub async fn indications(&self, message: u16) -> Result<IndicationStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .register(message, move |result: &QmiResult| {
                let _ = tx.send(result.clone());
            })
            .await?;
        Ok(IndicationStream::new(
            self.inner.device.clone(),
            self.inner.key,
            id,
            rx,
        ))
    }

    /// Remove one subscription. Returns `false` if it did not exist.
    pub async fn unregister(&self, id: SubscriptionId) -> Result<bool> {
        let key = self.inner.key;
        self.device()
            .request(|reply| Command::Unregister { key, id, reply })
            .await
    }

    /// Remove every subscription of this service.
    pub async fn unregister_all(&self) -> Result<usize> {
        let key = self.inner.key;
        self.device()
            .request(|reply| Command::UnregisterAll { key, reply })
            .await
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("service_type", &self.service_type())
            .field("client_id", &self.client_id())
            .field("version", &self.version())
            .field("shared", &self.is_shared())
            .finish()
    }
}

// ============================================================================
// PENDING RESPONSE
// ============================================================================

/// A queued request waiting for its response.
///
/// Dropping it does not cancel the request; the response is discarded.
#[derive(Debug)]
pub struct PendingResponse {
    tid: u16,
    rx: oneshot::Receiver<Result<QmiResult>>,
}

impl PendingResponse {
    /// Transaction id of the request.
    pub fn tid(&self) -> u16 {
        self.tid
    }

    /// Wait for the response.
    pub async fn response(self) -> Result<QmiResult> {
        self.rx.await.map_err(|_| Error::DeviceShutdown)?
    }
}
