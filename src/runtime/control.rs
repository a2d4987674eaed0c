//! # Control Service Handlers (Internal)
//!
//! Everything that rides on the control service: version discovery, service
//! creation (client id acquisition) and service teardown (client id release).
//!
//! ## Responsibilities
//!
//! | Handler | Trigger | Purpose |
//! |---------|---------|---------|
//! | `handle_discover` | `Discover` | Replay cached versions or start discovery |
//! | `handle_version_info` | response | Parse and cache the version list |
//! | `handle_create` | `CreateService` | Reuse a shared service or start creation |
//! | `handle_client_id` | response | Finish creation, register the service |
//! | `handle_release` | `Release` | Unregister, cancel, send release request |
//! | `release_done` | response / failure | Decrement counter, wake shutdown waiters |
//! | `handle_shutdown` | `Shutdown` | Resolve once no release is outstanding |
//! | `expire_timers` | timer | Discovery and creation timeouts |
//!
//! ## Creation
//!
//! ```text
//! CreateService ──▶ Discovering ──(versions or timeout)──▶ RequestingClientId
//!        │ (versions cached)                                      │
//!        └────────────────────────────────────────────────────────┤
//!                                                                 ▼
//!                                     client id response ──▶ registered Service
//! ```
//!
//! The whole sequence is bounded by the creation timeout. A client id that
//! arrives after its creation timed out is released straight away.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::dispatch::fail_completion;
use super::state::{
    Completion, Creation, CreationStage, DeviceState, DiscoverWaiter, Discovery, ServiceEntry,
    ServiceKey, Tid,
};
use super::service::cancel_all;
use crate::error::{ConfigError, Error, ProtocolError, Result};
use crate::handles::{Service, ServiceInner};
use crate::wire::{
    client_id_request, parse_client_id, release_client_request, VersionInfo, CTL_GET_CLIENT_ID,
    CTL_GET_VERSION_INFO, CTL_RELEASE_CLIENT_ID,
};
use crate::ServiceType;

/// Queue a control request, failing its completion if no id is free.
pub(crate) fn send_control(
    state: &mut DeviceState,
    message: u16,
    payload: &[u8],
    completion: Completion,
) -> Option<u8> {
    match state.enqueue_control(message, payload, completion) {
        Ok(tid) => Some(tid),
        Err(completion) => {
            tracing::warn!("Cannot queue control message 0x{:04x}", message);
            fail_completion(
                state,
                completion,
                Error::Protocol(ProtocolError::new("no free control transaction id")),
            );
            None
        }
    }
}

// ============================================================================
// DISCOVERY
// ============================================================================

pub(crate) fn handle_discover(state: &mut DeviceState, reply: oneshot::Sender<Result<VersionInfo>>) {
    if let Some(info) = &state.version_info {
        let _ = reply.send(Ok(info.clone()));
        return;
    }
    start_discovery(state, DiscoverWaiter::Caller(reply));
}

pub(crate) fn start_discovery(state: &mut DeviceState, waiter: DiscoverWaiter) {
    if let Some(discovery) = &mut state.discovery {
        discovery.waiters.push(waiter);
        return;
    }

    state.debug.line(format_args!("device discover"));
    tracing::debug!("Starting version discovery");

    match send_control(state, CTL_GET_VERSION_INFO, &[], Completion::Discover) {
        Some(tid) => {
            state.discovery = Some(Discovery {
                tid,
                deadline: Instant::now() + state.config.discover_timeout,
                waiters: vec![waiter],
            });
        }
        None => complete_waiters(state, vec![waiter]),
    }
}

/// Version info response arrived.
pub(crate) fn handle_version_info(state: &mut DeviceState, payload: &[u8]) {
    match VersionInfo::parse(payload) {
        Some(info) => {
            tracing::debug!(
                "Discovered {} services (control {:?})",
                info.services.len(),
                info.control
            );
            for service in &info.services {
                state.debug.line(format_args!(
                    "service {} {}.{}",
                    service.service_type, service.major, service.minor
                ));
            }
            state.version_info = Some(info);
        }
        None => {
            tracing::warn!("Malformed version info response ({} bytes)", payload.len());
        }
    }
    finish_discovery(state);
}

/// Deliver the cached list to everyone waiting on the current discovery.
pub(crate) fn finish_discovery(state: &mut DeviceState) {
    if let Some(discovery) = state.discovery.take() {
        complete_waiters(state, discovery.waiters);
    }
}

fn complete_waiters(state: &mut DeviceState, waiters: Vec<DiscoverWaiter>) {
    let info = state.version_info.clone().unwrap_or_default();
    for waiter in waiters {
        match waiter {
            DiscoverWaiter::Caller(reply) => {
                let _ = reply.send(Ok(info.clone()));
            }
            DiscoverWaiter::Creation(id) => request_client_id(state, id),
        }
    }
}

fn expire_discovery(state: &mut DeviceState, now: Instant) {
    let expired = state
        .discovery
        .as_ref()
        .is_some_and(|discovery| discovery.deadline <= now);
    if !expired {
        return;
    }
    let Some(discovery) = state.discovery.take() else {
        return;
    };

    tracing::debug!("Version discovery timed out");
    state.debug.line(format_args!("discover timeout"));

    // A late response must not be matched any more.
    state.control_pending.remove(&discovery.tid);
    state.outbound.retain(|req| req.tid != Tid::Control(discovery.tid));

    complete_waiters(state, discovery.waiters);
}

// ============================================================================
// CREATION
// ============================================================================

pub(crate) fn handle_create(
    state: &mut DeviceState,
    service_type: ServiceType,
    shared: bool,
    reply: oneshot::Sender<Result<Service>>,
) {
    if service_type == ServiceType::CONTROL {
        let _ = reply.send(Err(Error::Config(ConfigError::new(
            "the control service cannot be created",
        ))));
        return;
    }

    if shared {
        if let Some(service) = find_shared(state, service_type) {
            tracing::debug!(
                "Reusing shared {} service (client {})",
                service_type,
                service.client_id()
            );
            let _ = reply.send(Ok(service));
            return;
        }
    }

    state
        .debug
        .line(format_args!("service create [type={}]", service_type.value()));

    let id = state.next_creation_id();
    state.creations.insert(
        id,
        Creation {
            service_type,
            shared,
            deadline: Instant::now() + state.config.create_timeout,
            stage: CreationStage::Discovering,
            reply,
        },
    );

    if state.version_info.is_some() {
        request_client_id(state, id);
    } else {
        start_discovery(state, DiscoverWaiter::Creation(id));
    }
}

/// A live shared service of `service_type`, if one exists.
fn find_shared(state: &DeviceState, service_type: ServiceType) -> Option<Service> {
    state
        .registry
        .iter()
        .filter(|(key, entry)| key.service_type == service_type && entry.shared)
        .find_map(|(_, entry)| entry.upgrade())
}

fn request_client_id(state: &mut DeviceState, id: u64) {
    let Some(service_type) = state.creations.get(&id).map(|c| c.service_type) else {
        // Timed out while discovering.
        return;
    };

    let sent = send_control(
        state,
        CTL_GET_CLIENT_ID,
        &client_id_request(service_type),
        Completion::ClientId { creation: id },
    );
    if sent.is_some() {
        if let Some(creation) = state.creations.get_mut(&id) {
            creation.stage = CreationStage::RequestingClientId;
        }
    }
}

/// Client id response arrived.
pub(crate) fn handle_client_id(state: &mut DeviceState, id: u64, payload: &[u8]) {
    let parsed = parse_client_id(payload);

    let Some(creation) = state.creations.remove(&id) else {
        if let Some((service_type, client_id)) = parsed {
            tracing::debug!(
                "Client id {} for {} arrived after timeout, releasing",
                client_id,
                service_type
            );
            send_release(state, ServiceKey::new(service_type, client_id));
        }
        return;
    };

    let (service_type, client_id) = match parsed {
        Some((service_type, client_id)) if service_type == creation.service_type => {
            (service_type, client_id)
        }
        Some((service_type, client_id)) => {
            tracing::warn!(
                "Client id response for {} while creating {}",
                service_type,
                creation.service_type
            );
            send_release(state, ServiceKey::new(service_type, client_id));
            let _ = creation.reply.send(Err(Error::Protocol(ProtocolError::new(
                "client id response for wrong service type",
            ))));
            return;
        }
        None => {
            tracing::warn!("Invalid client id response for {}", creation.service_type);
            let _ = creation.reply.send(Err(Error::Protocol(ProtocolError::new(
                "invalid client id response",
            ))));
            return;
        }
    };

    let key = ServiceKey::new(service_type, client_id);
    let Some(device) = state.device.upgrade() else {
        send_release(state, key);
        let _ = creation.reply.send(Err(Error::DeviceShutdown));
        return;
    };

    let (major, minor) = state
        .version_info
        .as_ref()
        .and_then(|info| info.find(service_type))
        .map_or((0, 0), |v| (v.major, v.minor));

    let inner = Arc::new(ServiceInner::new(
        device,
        key,
        major,
        minor,
        creation.shared,
    ));
    if state
        .registry
        .insert(key, ServiceEntry::new(Arc::downgrade(&inner), creation.shared))
        .is_some()
    {
        tracing::warn!("Client id {} for {} was already registered", client_id, service_type);
    }

    tracing::debug!("Created {} service with client id {}", service_type, client_id);
    state.debug.line(format_args!(
        "service created [client={},type={}]",
        client_id,
        service_type.value()
    ));

    // If the caller is gone the service drops here and its release is queued.
    let _ = creation.reply.send(Ok(Service::from_inner(inner)));
}

fn expire_creations(state: &mut DeviceState, now: Instant) {
    let expired: Vec<u64> = state
        .creations
        .iter()
        .filter(|(_, creation)| creation.deadline <= now)
        .map(|(id, _)| *id)
        .collect();

    for id in expired {
        let Some(creation) = state.creations.remove(&id) else {
            continue;
        };
        tracing::debug!(
            "Creating {} service timed out ({:?})",
            creation.service_type,
            creation.stage
        );
        state.debug.line(format_args!(
            "service create timeout [type={}]",
            creation.service_type.value()
        ));
        if let Some(discovery) = &mut state.discovery {
            discovery
                .waiters
                .retain(|w| !matches!(w, DiscoverWaiter::Creation(waiting) if *waiting == id));
        }
        let _ = creation.reply.send(Err(Error::Timeout));
    }
}

pub(crate) fn expire_timers(state: &mut DeviceState, now: Instant) {
    expire_discovery(state, now);
    expire_creations(state, now);
}

// ============================================================================
// TEARDOWN
// ============================================================================

/// Last handle of a service dropped.
pub(crate) fn handle_release(state: &mut DeviceState, key: ServiceKey) {
    if state.registry.remove(&key).is_none() {
        tracing::warn!(
            "Releasing unregistered {} client {}",
            key.service_type,
            key.client_id
        );
    }
    let cancelled = cancel_all(state, key);
    if cancelled > 0 {
        tracing::debug!(
            "Cancelled {} requests of {} client {}",
            cancelled,
            key.service_type,
            key.client_id
        );
    }

    state.debug.line(format_args!(
        "service release [client={},type={}]",
        key.client_id,
        key.service_type.value()
    ));
    send_release(state, key);
}

fn send_release(state: &mut DeviceState, key: ServiceKey) {
    state.releases_outstanding += 1;
    send_control(
        state,
        CTL_RELEASE_CLIENT_ID,
        &release_client_request(key.service_type, key.client_id),
        Completion::Release { key },
    );
}

/// Release request answered or failed.
pub(crate) fn release_done(state: &mut DeviceState, key: ServiceKey) {
    state.releases_outstanding = state.releases_outstanding.saturating_sub(1);
    tracing::debug!(
        "Released {} client {} ({} outstanding)",
        key.service_type,
        key.client_id,
        state.releases_outstanding
    );
    if state.releases_outstanding == 0 {
        for waiter in state.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

pub(crate) fn handle_shutdown(state: &mut DeviceState, reply: oneshot::Sender<()>) {
    state.debug.line(format_args!("device shutdown"));
    if state.releases_outstanding == 0 {
        let _ = reply.send(());
    } else {
        tracing::debug!(
            "Shutdown waiting for {} releases",
            state.releases_outstanding
        );
        state.shutdown_waiters.push(reply);
    }
}
