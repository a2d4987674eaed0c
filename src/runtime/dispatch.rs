//! # Inbound Dispatch and Write Completion (Internal)
//!
//! ```text
//! read chunk ──▶ Frames ──▶ control frame ──▶ control_pending[tid] ──▶ complete
//!                   │
//!                   ├─────▶ service response ──▶ service_pending[tid] ──▶ complete
//!                   │
//!                   └─────▶ service indication ──▶ registry fan-out
//! ```
//!
//! The first invalid frame abandons the rest of its read; partial frames are
//! never carried over into the next read.

use std::io;

use bytes::Bytes;

use super::control::{finish_discovery, handle_client_id, handle_version_info, release_done};
use super::state::{Completion, DeviceState, InFlight, ServiceKey, Tid};
use crate::debug::Direction;
use crate::error::Error;
use crate::result::QmiResult;
use crate::wire::{Frame, Frames, BROADCAST_CLIENT};
use crate::ServiceType;

// ============================================================================
// COMPLETIONS
// ============================================================================

fn complete(state: &mut DeviceState, completion: Completion, message: u16, payload: Bytes) {
    match completion {
        Completion::Response(tx) => {
            let _ = tx.send(Ok(QmiResult::response(message, payload)));
        }
        Completion::Discover => handle_version_info(state, &payload),
        Completion::ClientId { creation } => handle_client_id(state, creation, &payload),
        Completion::Release { key } => release_done(state, key),
    }
}

/// Fail a request that will never see its response.
pub(crate) fn fail_completion(state: &mut DeviceState, completion: Completion, error: Error) {
    match completion {
        Completion::Response(tx) => {
            let _ = tx.send(Err(error));
        }
        Completion::Discover => finish_discovery(state),
        Completion::ClientId { creation } => {
            if let Some(creation) = state.creations.remove(&creation) {
                let _ = creation.reply.send(Err(error));
            }
        }
        Completion::Release { key } => release_done(state, key),
    }
}

// ============================================================================
// WRITE PATH
// ============================================================================

/// The write of the front outbound request finished.
///
/// On success the request moves to its in-flight table; on failure (including
/// a short write) its completion fails with [`Error::Transport`]. Nothing is
/// retried.
pub(crate) fn handle_write(state: &mut DeviceState, result: io::Result<usize>) {
    let Some(req) = state.outbound.pop_front() else {
        return;
    };

    let error = match result {
        Ok(n) if n == req.buf.len() => None,
        Ok(n) => {
            tracing::warn!("Short write to QMI device: {} of {} bytes", n, req.buf.len());
            Some(io::ErrorKind::WriteZero)
        }
        Err(e) => {
            tracing::error!("Error writing to QMI device: {}", e);
            Some(e.kind())
        }
    };

    if let Some(kind) = error {
        state.debug.line(format_args!(
            "write failed [type={},tid={:?}]",
            req.key.service_type.value(),
            req.tid
        ));
        fail_completion(state, req.completion, Error::Transport(kind));
        return;
    }

    tracing::trace!(
        "Sent {} message 0x{:04x} {:?} ({})",
        req.key.service_type,
        req.message,
        req.tid,
        req.completion.name()
    );
    if state.debug.is_enabled() {
        state.debug.dump(Direction::Sent, &req.buf);
        state.debug.frame(&req.buf);
    }

    let pending = InFlight {
        key: req.key,
        message: req.message,
        completion: req.completion,
    };
    match req.tid {
        Tid::Control(tid) => {
            state.control_pending.insert(tid, pending);
        }
        Tid::Service(tid) => {
            state.service_pending.insert(tid, pending);
        }
    }
}

// ============================================================================
// READ PATH
// ============================================================================

/// Split one read into frames and dispatch each.
pub(crate) fn handle_read(state: &mut DeviceState, data: Bytes) {
    state.debug.dump(Direction::Received, &data);

    let mut frames = Frames::new(data);
    while let Some(item) = frames.next() {
        match item {
            Ok((offset, frame)) => {
                if state.debug.is_enabled() {
                    state.debug.frame(frames.raw(offset, frame.mux.frame_len()));
                }
                handle_frame(state, frame);
            }
            Err((offset, e)) => {
                tracing::warn!("Dropping rest of read at offset {}: {}", offset, e);
                state
                    .debug
                    .line(format_args!("malformed frame at offset {offset}: {e}"));
            }
        }
    }
}

fn handle_frame(state: &mut DeviceState, frame: Frame) {
    let Frame {
        mux,
        transaction,
        message,
        payload,
    } = frame;

    if mux.is_control() {
        if mux.client != 0 {
            tracing::trace!("Ignoring control frame for client {}", mux.client);
            return;
        }
        if transaction.is_indication() {
            tracing::trace!("Ignoring control indication 0x{:04x}", message.message);
            return;
        }
        // Control transaction ids are 8 bit.
        let tid = transaction.transaction() as u8;
        match state.control_pending.remove(&tid) {
            Some(pending) => {
                check_message(&pending, message.message, u16::from(tid));
                complete(state, pending.completion, message.message, payload);
            }
            None => tracing::debug!("Unmatched control response tid {}", tid),
        }
        return;
    }

    let service_type = ServiceType::new(mux.service);
    if transaction.is_indication() {
        let result = QmiResult::indication(message.message, payload);
        dispatch_indication(state, service_type, mux.client, &result);
        return;
    }

    let tid = transaction.transaction();
    match state.service_pending.remove(&tid) {
        Some(pending) => {
            tracing::trace!(
                "Response for {} message 0x{:04x} tid {}",
                service_type,
                message.message,
                tid
            );
            check_message(&pending, message.message, tid);
            complete(state, pending.completion, message.message, payload);
        }
        None => tracing::debug!("Unmatched {} response tid {}", service_type, tid),
    }
}

/// The modem answers with the request's message id; a different one is
/// still delivered, under the id it carries.
fn check_message(pending: &InFlight, message: u16, tid: u16) {
    if pending.message != message {
        tracing::warn!(
            "{} response tid {} carries message 0x{:04x}, request was 0x{:04x}",
            pending.key.service_type,
            tid,
            message,
            pending.message
        );
    }
}

/// Fan an indication out to the addressed service, or to every service of
/// the type for the broadcast client id.
fn dispatch_indication(
    state: &mut DeviceState,
    service_type: ServiceType,
    client_id: u8,
    result: &QmiResult,
) {
    let delivered: usize = if client_id == BROADCAST_CLIENT {
        state
            .registry
            .range_mut(ServiceKey::new(service_type, 0)..=ServiceKey::new(service_type, u8::MAX))
            .map(|(_, entry)| entry.notify(result))
            .sum()
    } else {
        state
            .registry
            .get_mut(&ServiceKey::new(service_type, client_id))
            .map_or(0, |entry| entry.notify(result))
    };

    tracing::trace!(
        "Indication {} 0x{:04x} for client {} delivered to {} handlers",
        service_type,
        result.message(),
        client_id,
        delivered
    );
}
