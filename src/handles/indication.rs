//! Indication subscriptions.
//!
//! - [`SubscriptionId`]: handle returned by [`Service::register`](crate::Service::register)
//! - [`IndicationStream`]: channel-backed subscription implementing `Stream`

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::handles::device::DeviceInner;
use crate::result::QmiResult;
use crate::runtime::state::ServiceKey;
use crate::runtime::Command;

/// Identifies one indication subscription of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stream of indications for one message id.
///
/// Created via [`Service::indications`](crate::Service::indications).
///
/// # Example
///
/// ```no_run
/// use futures::StreamExt;
/// use qmilink::prelude::*;
///
/// # async fn example(nas: Service) -> Result<()> {
/// let mut serving_system = nas.indications(0x0024).await?;
/// while let Some(ind) = serving_system.next().await {
///     println!("serving system changed ({} bytes)", ind.payload().len());
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Lifecycle
///
/// Dropping the stream unregisters its subscription. The stream ends when
/// the service is released or the device shuts down.
pub struct IndicationStream {
    device: Arc<DeviceInner>,
    key: ServiceKey,
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<QmiResult>,
}

impl IndicationStream {
    pub(crate) fn new(
        device: Arc<DeviceInner>,
        key: ServiceKey,
        id: SubscriptionId,
        rx: mpsc::UnboundedReceiver<QmiResult>,
    ) -> Self {
        Self {
            device,
            key,
            id,
            rx,
        }
    }

    /// The underlying subscription.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next indication.
    pub async fn recv(&mut self) -> Option<QmiResult> {
        self.rx.recv().await
    }
}

impl Stream for IndicationStream {
    type Item = QmiResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for IndicationStream {
    fn drop(&mut self) {
        // Best effort: nobody waits for the answer.
        let (reply, _) = oneshot::channel();
        let cmd = Command::Unregister {
            key: self.key,
            id: self.id,
            reply,
        };
        if self.device.send(cmd).is_err() {
            tracing::trace!("Unregister of subscription {} skipped: device shut down", self.id);
        }
    }
}

impl fmt::Debug for IndicationStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndicationStream")
            .field("service_type", &self.key.service_type)
            .field("client_id", &self.key.client_id)
            .field("id", &self.id)
            .finish()
    }
}
