//! # Device Event Loop
//!
//! `device_task` is the only code that touches a device's descriptor and its
//! [`DeviceState`]. It runs as a background tokio task and multiplexes:
//!
//! - commands from the [`Device`](crate::Device) and [`Service`](crate::Service) handles
//! - readable data from the descriptor
//! - the write of the front outbound request (at most one at a time)
//! - the next discovery or creation deadline
//!
//! When the last handle is gone the command channel closes. The loop then
//! fails everything still waiting, keeps running until outstanding client id
//! releases are answered (bounded by the discovery timeout), and exits,
//! dropping the transport.

use std::io;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use super::control::{
    expire_timers, finish_discovery, handle_create, handle_discover, handle_release,
    handle_shutdown,
};
use super::dispatch::{handle_read, handle_write};
use super::service::{
    cancel_all, handle_cancel, handle_register, handle_send, handle_unregister,
    handle_unregister_all,
};
use super::state::{Completion, DeviceState};
use super::Command;
use crate::config::MIN_READ_BUFFER_SIZE;
use crate::error::Error;
use crate::transport::Transport;

// ============================================================================
// DEVICE TASK
// ============================================================================

/// The main device task
pub(crate) async fn device_task<T: Transport>(
    transport: T,
    mut state: DeviceState,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut buf = vec![0u8; state.config.read_buffer_size.max(MIN_READ_BUFFER_SIZE)];
    let mut readable = true;
    let mut closing: Option<Instant> = None;

    loop {
        if let Some(deadline) = closing {
            if state.releases_outstanding == 0 {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Giving up on {} outstanding client id releases",
                    state.releases_outstanding
                );
                break;
            }
        }

        let pending_write = state.outbound.front().map(|req| req.buf.clone());
        let deadline = match (state.next_deadline(), closing) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        tokio::select! {
            cmd = cmd_rx.recv(), if closing.is_none() => {
                match cmd {
                    Some(cmd) => handle_command(&mut state, cmd),
                    None => {
                        tracing::debug!("All device handles dropped, tearing down");
                        closing = Some(begin_teardown(&mut state));
                    }
                }
            }

            result = transport.read(&mut buf), if readable => {
                match result {
                    Ok(0) => {
                        tracing::warn!("QMI device hung up");
                        state.debug.line(format_args!("device hangup"));
                        readable = false;
                    }
                    Ok(n) => handle_read(&mut state, Bytes::copy_from_slice(&buf[..n])),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        tracing::error!("Error reading from QMI device: {}", e);
                        readable = false;
                    }
                }
            }

            result = write_front(&transport, pending_write) => {
                handle_write(&mut state, result);
            }

            () = sleep_or_pending(deadline) => {
                expire_timers(&mut state, Instant::now());
            }
        }
    }

    state.debug.line(format_args!("device free"));
    tracing::debug!("QMI device task finished");
}

async fn write_front<T: Transport>(transport: &T, buf: Option<Bytes>) -> io::Result<usize> {
    match buf {
        Some(buf) => transport.write(&buf).await,
        None => std::future::pending().await,
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// COMMAND HANDLING
// ============================================================================

fn handle_command(state: &mut DeviceState, cmd: Command) {
    tracing::trace!("Device command: {}", cmd.name());

    match cmd {
        Command::SetDebug(hook) => state.debug.set(hook),
        Command::Discover { reply } => handle_discover(state, reply),
        Command::VersionInfo { reply } => {
            let _ = reply.send(state.version_info.clone());
        }
        Command::CreateService {
            service_type,
            shared,
            reply,
        } => handle_create(state, service_type, shared, reply),
        Command::Shutdown { reply } => handle_shutdown(state, reply),
        Command::Send {
            key,
            message,
            payload,
            queued,
            response,
        } => handle_send(state, key, message, &payload, queued, response),
        Command::Cancel { key, tid, reply } => {
            let _ = reply.send(handle_cancel(state, key, tid));
        }
        Command::CancelAll { key, reply } => {
            let _ = reply.send(cancel_all(state, key));
        }
        Command::Register {
            key,
            message,
            handler,
            reply,
        } => {
            let _ = reply.send(handle_register(state, key, message, handler));
        }
        Command::Unregister { key, id, reply } => {
            let _ = reply.send(handle_unregister(state, key, id));
        }
        Command::UnregisterAll { key, reply } => {
            let _ = reply.send(handle_unregister_all(state, key));
        }
        Command::Release { key } => handle_release(state, key),
    }
}

// ============================================================================
// TEARDOWN
// ============================================================================

/// Fail everything still waiting except client id releases.
///
/// Returns the deadline for the remaining releases.
fn begin_teardown(state: &mut DeviceState) -> Instant {
    let outbound = std::mem::take(&mut state.outbound);
    for req in outbound {
        match req.completion {
            Completion::Release { .. } => state.outbound.push_back(req),
            Completion::Response(tx) => {
                let _ = tx.send(Err(Error::DeviceShutdown));
            }
            _ => {}
        }
    }

    for (_, pending) in state.service_pending.drain() {
        if let Completion::Response(tx) = pending.completion {
            let _ = tx.send(Err(Error::DeviceShutdown));
        }
    }
    state
        .control_pending
        .retain(|_, pending| matches!(pending.completion, Completion::Release { .. }));

    for (_, creation) in state.creations.drain() {
        let _ = creation.reply.send(Err(Error::DeviceShutdown));
    }
    finish_discovery(state);
    state.registry.clear();

    if state.releases_outstanding > 0 {
        tracing::debug!(
            "Waiting for {} client id releases before closing",
            state.releases_outstanding
        );
    }
    Instant::now() + state.config.discover_timeout
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::debug::DebugSink;
    use crate::runtime::state::{ServiceEntry, ServiceKey};
    use crate::ServiceType;
    use std::sync::Weak;
    use tokio::sync::oneshot;

    #[test]
    fn teardown_keeps_only_releases() {
        let mut state = DeviceState::new(DeviceConfig::default(), DebugSink::default(), Weak::new());
        let nas = ServiceKey::new(ServiceType::NAS, 1);
        state.registry.insert(nas, ServiceEntry::new(Weak::new(), false));

        let (tx, mut rx) = oneshot::channel();
        state.enqueue_service(nas, 0x20, &[], tx).unwrap();
        handle_release(&mut state, ServiceKey::new(ServiceType::DMS, 2));
        assert_eq!(state.outbound.len(), 2);

        begin_teardown(&mut state);
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::DeviceShutdown)));
        assert_eq!(state.outbound.len(), 1);
        assert!(matches!(
            state.outbound[0].completion,
            Completion::Release { .. }
        ));
        assert_eq!(state.releases_outstanding, 1);
        assert!(state.registry.is_empty());
    }

    #[test]
    fn teardown_fails_creations() {
        let mut state = DeviceState::new(DeviceConfig::default(), DebugSink::default(), Weak::new());
        let (tx, mut rx) = oneshot::channel();
        handle_create(&mut state, ServiceType::WDS, false, tx);
        assert!(state.discovery.is_some());

        begin_teardown(&mut state);
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::DeviceShutdown)));
        assert!(state.discovery.is_none());
        assert!(state.outbound.is_empty());
    }
}
