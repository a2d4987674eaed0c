//! # Commands (Internal)
//!
//! [`Command`]s carry requests from the [`Device`](crate::Device) and
//! [`Service`](crate::Service) handles to the device task:
//!
//! ```text
//! ┌─────────────────┐      Command channel      ┌─────────────────┐
//! │     Device      │ ────────────────────────▶ │   Device task   │
//! │     Service     │   cmd_tx.send(Command)    │   (event loop)  │
//! └─────────────────┘                           └─────────────────┘
//! ```
//!
//! Commands that produce a result carry a `oneshot::Sender`; the task answers
//! through it once the result is known. The channel is unbounded so that
//! `Drop` impls can always enqueue a release.
//!
//! | Category | Commands |
//! |----------|----------|
//! | Device | `SetDebug`, `Discover`, `VersionInfo`, `CreateService`, `Shutdown` |
//! | Requests | `Send`, `Cancel`, `CancelAll` |
//! | Indications | `Register`, `Unregister`, `UnregisterAll` |
//! | Teardown | `Release` |

use bytes::Bytes;
use tokio::sync::oneshot;

use super::state::ServiceKey;
use crate::debug::DebugHook;
use crate::error::Result;
use crate::handles::{Service, SubscriptionId};
use crate::result::QmiResult;
use crate::wire::VersionInfo;
use crate::ServiceType;

/// Handler run synchronously for every matching indication.
pub(crate) type IndicationHandler = Box<dyn FnMut(&QmiResult) + Send>;

/// Reply channel for a service request's response.
pub(crate) type ResponseSender = oneshot::Sender<Result<QmiResult>>;

/// Commands sent from handles to the device task
pub(crate) enum Command {
    /// Install or remove the debug hook
    SetDebug(Option<DebugHook>),
    /// Run (or replay) version discovery
    Discover {
        reply: oneshot::Sender<Result<VersionInfo>>,
    },
    /// Read the cached discovery result
    VersionInfo {
        reply: oneshot::Sender<Option<VersionInfo>>,
    },
    /// Create a service client
    CreateService {
        service_type: ServiceType,
        shared: bool,
        reply: oneshot::Sender<Result<Service>>,
    },
    /// Wait for all outstanding client id releases
    Shutdown { reply: oneshot::Sender<()> },
    /// Queue a service request
    Send {
        key: ServiceKey,
        message: u16,
        payload: Bytes,
        /// Receives the allocated transaction id once queued
        queued: oneshot::Sender<Result<u16>>,
        response: ResponseSender,
    },
    /// Cancel one request of a service
    Cancel {
        key: ServiceKey,
        tid: u16,
        reply: oneshot::Sender<bool>,
    },
    /// Cancel every request of a service
    CancelAll {
        key: ServiceKey,
        reply: oneshot::Sender<usize>,
    },
    /// Subscribe to an indication
    Register {
        key: ServiceKey,
        message: u16,
        handler: IndicationHandler,
        reply: oneshot::Sender<Result<SubscriptionId>>,
    },
    /// Remove one subscription
    Unregister {
        key: ServiceKey,
        id: SubscriptionId,
        reply: oneshot::Sender<bool>,
    },
    /// Remove every subscription of a service
    UnregisterAll {
        key: ServiceKey,
        reply: oneshot::Sender<usize>,
    },
    /// Last handle of a service dropped: release its client id
    Release { key: ServiceKey },
}

impl Command {
    /// Name for trace output.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::SetDebug(_) => "SetDebug",
            Self::Discover { .. } => "Discover",
            Self::VersionInfo { .. } => "VersionInfo",
            Self::CreateService { .. } => "CreateService",
            Self::Shutdown { .. } => "Shutdown",
            Self::Send { .. } => "Send",
            Self::Cancel { .. } => "Cancel",
            Self::CancelAll { .. } => "CancelAll",
            Self::Register { .. } => "Register",
            Self::Unregister { .. } => "Unregister",
            Self::UnregisterAll { .. } => "UnregisterAll",
            Self::Release { .. } => "Release",
        }
    }
}
