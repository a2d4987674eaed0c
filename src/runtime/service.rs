//! # Service Request Handlers (Internal)
//!
//! | Handler | Command | Purpose |
//! |---------|---------|---------|
//! | `handle_send` | `Send` | Build and queue a service request |
//! | `handle_cancel` | `Cancel` | Remove one queued or in-flight request |
//! | `cancel_all` | `CancelAll`, `Release` | Remove every request of a service |
//! | `handle_register` | `Register` | Add an indication subscription |
//! | `handle_unregister` | `Unregister` | Remove one subscription |
//! | `handle_unregister_all` | `UnregisterAll` | Remove every subscription |
//!
//! A cancelled request is removed from exactly one of the outbound queue and
//! the in-flight table; its caller receives [`Error::Cancelled`] and the
//! response, should it still arrive, is dropped as unmatched.

use bytes::Bytes;
use tokio::sync::oneshot;

use super::command::{IndicationHandler, ResponseSender};
use super::state::{Completion, DeviceState, ServiceKey, Subscription, Tid};
use crate::error::{Error, Result};
use crate::handles::SubscriptionId;

pub(crate) fn handle_send(
    state: &mut DeviceState,
    key: ServiceKey,
    message: u16,
    payload: &Bytes,
    queued: oneshot::Sender<Result<u16>>,
    response: ResponseSender,
) {
    if !state.registry.contains_key(&key) {
        let _ = queued.send(Err(Error::NotCreated));
        return;
    }

    let result = state.enqueue_service(key, message, payload, response);
    if let Ok(tid) = &result {
        tracing::trace!(
            "Queued {} message 0x{:04x} tid {} ({} bytes)",
            key.service_type,
            message,
            tid,
            payload.len()
        );
    }
    let _ = queued.send(result);
}

fn cancelled(completion: Completion) {
    if let Completion::Response(tx) = completion {
        let _ = tx.send(Err(Error::Cancelled));
    }
}

/// Cancel request `tid` of service `key`. Returns whether anything was removed.
pub(crate) fn handle_cancel(state: &mut DeviceState, key: ServiceKey, tid: u16) -> bool {
    if let Some(pos) = state
        .outbound
        .iter()
        .position(|req| req.tid == Tid::Service(tid) && req.key == key)
    {
        if let Some(req) = state.outbound.remove(pos) {
            cancelled(req.completion);
            return true;
        }
    }

    if state
        .service_pending
        .get(&tid)
        .is_some_and(|pending| pending.key == key)
    {
        if let Some(pending) = state.service_pending.remove(&tid) {
            cancelled(pending.completion);
            return true;
        }
    }

    false
}

/// Cancel every queued and in-flight request of service `key`.
pub(crate) fn cancel_all(state: &mut DeviceState, key: ServiceKey) -> usize {
    let mut count = 0;

    let (matching, rest) = std::mem::take(&mut state.outbound)
        .into_iter()
        .partition::<Vec<_>, _>(|req| req.key == key && matches!(req.tid, Tid::Service(_)));
    state.outbound = rest.into();
    for req in matching {
        cancelled(req.completion);
        count += 1;
    }

    let tids: Vec<u16> = state
        .service_pending
        .iter()
        .filter(|(_, pending)| pending.key == key)
        .map(|(tid, _)| *tid)
        .collect();
    for tid in tids {
        if let Some(pending) = state.service_pending.remove(&tid) {
            cancelled(pending.completion);
            count += 1;
        }
    }

    count
}

pub(crate) fn handle_register(
    state: &mut DeviceState,
    key: ServiceKey,
    message: u16,
    handler: IndicationHandler,
) -> Result<SubscriptionId> {
    if !state.registry.contains_key(&key) {
        return Err(Error::NotCreated);
    }
    let id = state.next_subscription_id();
    let Some(entry) = state.registry.get_mut(&key) else {
        return Err(Error::NotCreated);
    };
    entry.subscriptions.push(Subscription {
        id,
        message,
        handler,
    });
    Ok(id)
}

pub(crate) fn handle_unregister(state: &mut DeviceState, key: ServiceKey, id: SubscriptionId) -> bool {
    let Some(entry) = state.registry.get_mut(&key) else {
        return false;
    };
    let before = entry.subscriptions.len();
    entry.subscriptions.retain(|sub| sub.id != id);
    entry.subscriptions.len() != before
}

pub(crate) fn handle_unregister_all(state: &mut DeviceState, key: ServiceKey) -> usize {
    state
        .registry
        .get_mut(&key)
        .map_or(0, |entry| entry.subscriptions.drain(..).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::debug::DebugSink;
    use crate::runtime::dispatch::{handle_read, handle_write};
    use crate::runtime::state::ServiceEntry;
    use crate::wire::FLAG_FROM_MODEM;
    use crate::ServiceType;
    use std::sync::{Arc, Mutex, Weak};

    const NAS: ServiceKey = ServiceKey {
        service_type: ServiceType::NAS,
        client_id: 5,
    };

    fn state() -> DeviceState {
        let mut state = DeviceState::new(DeviceConfig::default(), DebugSink::default(), Weak::new());
        state.registry.insert(NAS, ServiceEntry::new(Weak::new(), false));
        state
    }

    fn send(state: &mut DeviceState, message: u16) -> (u16, oneshot::Receiver<Result<crate::QmiResult>>) {
        let (queued_tx, mut queued_rx) = oneshot::channel();
        let (tx, rx) = oneshot::channel();
        handle_send(state, NAS, message, &Bytes::new(), queued_tx, tx);
        (queued_rx.try_recv().unwrap().unwrap(), rx)
    }

    fn indication(client: u8, message: u16) -> Bytes {
        let mut frame = vec![0x01, 0x0C, 0x00, FLAG_FROM_MODEM, 0x03, client, 0x04, 0x00, 0x00];
        frame.extend_from_slice(&message.to_le_bytes());
        frame.extend_from_slice(&[0x00, 0x00]);
        Bytes::from(frame)
    }

    #[test]
    fn send_requires_registered_service() {
        let mut state = state();
        let (queued_tx, mut queued_rx) = oneshot::channel();
        let (tx, _rx) = oneshot::channel();
        let other = ServiceKey::new(ServiceType::DMS, 1);
        handle_send(&mut state, other, 1, &Bytes::new(), queued_tx, tx);
        assert!(matches!(queued_rx.try_recv().unwrap(), Err(Error::NotCreated)));
    }

    #[test]
    fn cancel_queued_request() {
        let mut state = state();
        let (tid, mut rx) = send(&mut state, 0x20);
        assert!(handle_cancel(&mut state, NAS, tid));
        assert!(state.outbound.is_empty());
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Cancelled)));
        assert!(!handle_cancel(&mut state, NAS, tid));
    }

    #[test]
    fn cancel_in_flight_request_drops_late_response() {
        let mut state = state();
        let (tid, mut rx) = send(&mut state, 0x20);
        let len = state.outbound[0].buf.len();
        handle_write(&mut state, Ok(len));
        assert!(state.service_pending.contains_key(&tid));

        assert!(handle_cancel(&mut state, NAS, tid));
        assert!(state.service_pending.is_empty());
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::Cancelled)));
    }

    #[test]
    fn cancel_other_services_request_is_refused() {
        let mut state = state();
        let (tid, _rx) = send(&mut state, 0x20);
        assert!(!handle_cancel(&mut state, ServiceKey::new(ServiceType::NAS, 6), tid));
        assert_eq!(state.outbound.len(), 1);
    }

    #[test]
    fn cancel_all_covers_queue_and_table() {
        let mut state = state();
        let (_, _rx1) = send(&mut state, 0x20);
        let len = state.outbound[0].buf.len();
        handle_write(&mut state, Ok(len));
        let (_, _rx2) = send(&mut state, 0x21);
        assert_eq!(cancel_all(&mut state, NAS), 2);
        assert!(state.outbound.is_empty());
        assert!(state.service_pending.is_empty());
    }

    #[test]
    fn indications_fire_in_registration_order() {
        let mut state = state();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mk = |tag: &'static str| {
            let seen = seen.clone();
            Box::new(move |_: &crate::QmiResult| seen.lock().unwrap().push(tag)) as IndicationHandler
        };
        let first = handle_register(&mut state, NAS, 0x24, mk("first")).unwrap();
        handle_register(&mut state, NAS, 0x24, mk("second")).unwrap();
        handle_register(&mut state, NAS, 0x25, mk("other")).unwrap();

        handle_read(&mut state, indication(5, 0x24));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);

        assert!(handle_unregister(&mut state, NAS, first));
        handle_read(&mut state, indication(5, 0x24));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "second"]);

        assert_eq!(handle_unregister_all(&mut state, NAS), 2);
        handle_read(&mut state, indication(5, 0x25));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn broadcast_reaches_every_client_of_the_type() {
        let mut state = state();
        let other = ServiceKey::new(ServiceType::NAS, 9);
        let dms = ServiceKey::new(ServiceType::DMS, 5);
        state.registry.insert(other, ServiceEntry::new(Weak::new(), false));
        state.registry.insert(dms, ServiceEntry::new(Weak::new(), false));

        let count = Arc::new(Mutex::new(0));
        for key in [NAS, other, dms] {
            let count = count.clone();
            handle_register(
                &mut state,
                key,
                0x24,
                Box::new(move |_: &crate::QmiResult| *count.lock().unwrap() += 1),
            )
            .unwrap();
        }

        handle_read(&mut state, indication(0xFF, 0x24));
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn register_requires_registered_service() {
        let mut state = state();
        let result = handle_register(
            &mut state,
            ServiceKey::new(ServiceType::WMS, 1),
            1,
            Box::new(|_: &crate::QmiResult| {}),
        );
        assert!(matches!(result, Err(Error::NotCreated)));
    }
}
