//! # Device State (Internal)
//!
//! All mutable device state lives in [`DeviceState`]. The device task owns it
//! exclusively; handler functions in `control`, `service` and `dispatch` take
//! `&mut DeviceState` and never perform I/O themselves. The event loop writes
//! whatever ends up at the front of [`DeviceState::outbound`].
//!
//! ## Key Data Structures
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`DeviceState`] | Top-level state container |
//! | [`ServiceKey`] | `(service type, client id)` registry key |
//! | [`OutboundRequest`] | Built frame waiting for its write |
//! | [`InFlight`] | Written request waiting for its response |
//! | [`Completion`] | What to do when a request completes or fails |
//! | [`ServiceEntry`] | Registry entry: weak service link plus subscriptions |
//! | [`Discovery`] / [`Creation`] | Version discovery and service creation in progress |
//!
//! ## Transaction Ids
//!
//! Control ids are 8-bit and skip 0; service ids are 16-bit and never drop
//! below 256. Both counters wrap, and an id still held by a queued or
//! in-flight request is skipped.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Weak;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::command::{IndicationHandler, ResponseSender};
use crate::config::DeviceConfig;
use crate::debug::DebugSink;
use crate::error::{Error, ProtocolError, Result};
use crate::handles::{DeviceInner, Service, ServiceInner, SubscriptionId};
use crate::result::QmiResult;
use crate::wire::{build_control_request, build_service_request, VersionInfo};
use crate::ServiceType;

/// First service transaction id.
pub(crate) const SERVICE_TID_BASE: u16 = 256;

// ============================================================================
// KEYS
// ============================================================================

/// Registry key of a created service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ServiceKey {
    pub(crate) service_type: ServiceType,
    pub(crate) client_id: u8,
}

impl ServiceKey {
    pub(crate) const CONTROL: Self = Self {
        service_type: ServiceType::CONTROL,
        client_id: 0,
    };

    pub(crate) fn new(service_type: ServiceType, client_id: u8) -> Self {
        Self {
            service_type,
            client_id,
        }
    }
}

/// Transaction id in its namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Tid {
    Control(u8),
    Service(u16),
}

// ============================================================================
// REQUESTS
// ============================================================================

/// Continuation of a request.
pub(crate) enum Completion {
    /// Service request: hand the response to the caller
    Response(ResponseSender),
    /// Version discovery
    Discover,
    /// Client id acquisition for a creation
    ClientId { creation: u64 },
    /// Client id release
    Release { key: ServiceKey },
}

impl Completion {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Response(_) => "response",
            Self::Discover => "discover",
            Self::ClientId { .. } => "client id",
            Self::Release { .. } => "release",
        }
    }
}

/// Request waiting in the outbound queue
pub(crate) struct OutboundRequest {
    pub(crate) tid: Tid,
    pub(crate) key: ServiceKey,
    pub(crate) message: u16,
    pub(crate) buf: Bytes,
    pub(crate) completion: Completion,
}

/// Written request waiting for its response
pub(crate) struct InFlight {
    pub(crate) key: ServiceKey,
    pub(crate) message: u16,
    pub(crate) completion: Completion,
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Indication subscription
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) message: u16,
    pub(crate) handler: IndicationHandler,
}

/// Registry entry of a created service.
///
/// The link to the service is weak: an entry whose service can no longer be
/// upgraded is releasing and must not be handed out again.
pub(crate) struct ServiceEntry {
    pub(crate) service: Weak<ServiceInner>,
    pub(crate) shared: bool,
    pub(crate) subscriptions: Vec<Subscription>,
}

impl ServiceEntry {
    pub(crate) fn new(service: Weak<ServiceInner>, shared: bool) -> Self {
        Self {
            service,
            shared,
            subscriptions: Vec::new(),
        }
    }

    /// Run every handler subscribed to the result's message, in registration order.
    pub(crate) fn notify(&mut self, result: &QmiResult) -> usize {
        let mut delivered = 0;
        for sub in &mut self.subscriptions {
            if sub.message == result.message() {
                (sub.handler)(result);
                delivered += 1;
            }
        }
        delivered
    }

    pub(crate) fn upgrade(&self) -> Option<Service> {
        self.service.upgrade().map(Service::from_inner)
    }
}

// ============================================================================
// DISCOVERY AND CREATION
// ============================================================================

/// Party waiting for version discovery
pub(crate) enum DiscoverWaiter {
    Caller(oneshot::Sender<Result<VersionInfo>>),
    Creation(u64),
}

/// Version discovery in progress
pub(crate) struct Discovery {
    pub(crate) tid: u8,
    pub(crate) deadline: Instant,
    pub(crate) waiters: Vec<DiscoverWaiter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CreationStage {
    Discovering,
    RequestingClientId,
}

/// Service creation in progress
pub(crate) struct Creation {
    pub(crate) service_type: ServiceType,
    pub(crate) shared: bool,
    pub(crate) deadline: Instant,
    pub(crate) stage: CreationStage,
    pub(crate) reply: oneshot::Sender<Result<Service>>,
}

// ============================================================================
// DEVICE STATE
// ============================================================================

pub(crate) struct DeviceState {
    pub(crate) config: DeviceConfig,
    pub(crate) debug: DebugSink,
    /// Used to build service handles; never upgraded to keep the device alive
    pub(crate) device: Weak<DeviceInner>,

    pub(crate) outbound: VecDeque<OutboundRequest>,
    pub(crate) control_pending: HashMap<u8, InFlight>,
    pub(crate) service_pending: HashMap<u16, InFlight>,
    next_control_tid: u8,
    next_service_tid: u16,

    pub(crate) registry: BTreeMap<ServiceKey, ServiceEntry>,
    next_subscription_id: u64,

    pub(crate) version_info: Option<VersionInfo>,
    pub(crate) discovery: Option<Discovery>,
    pub(crate) creations: HashMap<u64, Creation>,
    next_creation_id: u64,

    pub(crate) releases_outstanding: usize,
    pub(crate) shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl DeviceState {
    pub(crate) fn new(config: DeviceConfig, debug: DebugSink, device: Weak<DeviceInner>) -> Self {
        Self {
            config,
            debug,
            device,
            outbound: VecDeque::new(),
            control_pending: HashMap::new(),
            service_pending: HashMap::new(),
            next_control_tid: 1,
            next_service_tid: SERVICE_TID_BASE,
            registry: BTreeMap::new(),
            next_subscription_id: 1,
            version_info: None,
            discovery: None,
            creations: HashMap::new(),
            next_creation_id: 1,
            releases_outstanding: 0,
            shutdown_waiters: Vec::new(),
        }
    }

    fn tid_in_use(&self, tid: Tid) -> bool {
        let pending = match tid {
            Tid::Control(t) => self.control_pending.contains_key(&t),
            Tid::Service(t) => self.service_pending.contains_key(&t),
        };
        pending || self.outbound.iter().any(|req| req.tid == tid)
    }

    /// Next free control transaction id.
    ///
    /// When all 255 are outstanding, the id of the oldest client id request
    /// whose creation already timed out is reclaimed. `None` only if no such
    /// request exists.
    pub(crate) fn alloc_control_tid(&mut self) -> Option<u8> {
        for _ in 0..u8::MAX {
            let tid = self.next_control_tid;
            self.next_control_tid = match tid.wrapping_add(1) {
                0 => 1,
                next => next,
            };
            if !self.tid_in_use(Tid::Control(tid)) {
                return Some(tid);
            }
        }
        self.reclaim_orphaned_client_id()
    }

    /// Forget the oldest client id request nobody waits for any more.
    fn reclaim_orphaned_client_id(&mut self) -> Option<u8> {
        let (tid, creation) = self
            .control_pending
            .iter()
            .filter_map(|(tid, req)| match req.completion {
                Completion::ClientId { creation } if !self.creations.contains_key(&creation) => {
                    Some((*tid, creation))
                }
                _ => None,
            })
            .min_by_key(|(_, creation)| *creation)?;

        tracing::debug!(
            "Reclaiming control transaction {} of timed out creation {}",
            tid,
            creation
        );
        self.control_pending.remove(&tid);
        Some(tid)
    }

    /// Next free service transaction id, or `None` if all are outstanding.
    pub(crate) fn alloc_service_tid(&mut self) -> Option<u16> {
        for _ in SERVICE_TID_BASE..=u16::MAX {
            let tid = self.next_service_tid;
            self.next_service_tid = match tid.wrapping_add(1) {
                next if next < SERVICE_TID_BASE => SERVICE_TID_BASE,
                next => next,
            };
            if !self.tid_in_use(Tid::Service(tid)) {
                return Some(tid);
            }
        }
        None
    }

    /// Queue a control request. Hands the completion back if it cannot be queued.
    pub(crate) fn enqueue_control(
        &mut self,
        message: u16,
        payload: &[u8],
        completion: Completion,
    ) -> std::result::Result<u8, Completion> {
        let Some(tid) = self.alloc_control_tid() else {
            return Err(completion);
        };
        let Some(buf) = build_control_request(tid, message, payload) else {
            return Err(completion);
        };

        self.outbound.push_back(OutboundRequest {
            tid: Tid::Control(tid),
            key: ServiceKey::CONTROL,
            message,
            buf,
            completion,
        });
        Ok(tid)
    }

    /// Queue a service request, returning its transaction id.
    pub(crate) fn enqueue_service(
        &mut self,
        key: ServiceKey,
        message: u16,
        payload: &[u8],
        response: ResponseSender,
    ) -> Result<u16> {
        let tid = self.alloc_service_tid().ok_or_else(|| {
            Error::Protocol(ProtocolError::new("no free service transaction id"))
        })?;
        let buf = build_service_request(key.service_type, key.client_id, tid, message, payload)
            .ok_or(Error::InvalidParam)?;

        self.outbound.push_back(OutboundRequest {
            tid: Tid::Service(tid),
            key,
            message,
            buf,
            completion: Completion::Response(response),
        });
        Ok(tid)
    }

    pub(crate) fn next_subscription_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_subscription_id);
        self.next_subscription_id += 1;
        id
    }

    pub(crate) fn next_creation_id(&mut self) -> u64 {
        let id = self.next_creation_id;
        self.next_creation_id += 1;
        id
    }

    /// Earliest discovery or creation deadline.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.discovery
            .iter()
            .map(|d| d.deadline)
            .chain(self.creations.values().map(|c| c.deadline))
            .min()
    }
}
