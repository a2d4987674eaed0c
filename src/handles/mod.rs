//! # Handle Types for QMI Communication
//!
//! This module provides the **user-facing API** for interacting with a device.
//! All operations go through handles, which internally send commands to the
//! device task's event loop.
//!
//! ## Handle Types Overview
//!
//! | Handle | Role | Notes |
//! |--------|------|-------|
//! | [`Device`] | Discovery, service creation, shutdown | Created via `configure().start(fd)` |
//! | [`Service`] | Requests, cancellation, indication subscriptions | Created via `Device::create_service()` |
//! | [`PendingResponse`] | A submitted request awaiting its response | Created via `Service::submit()` |
//! | [`IndicationStream`] | Indications of one message id as a `Stream` | Unregisters on drop |
//!
//! ## Pattern
//!
//! ```no_run
//! use qmilink::prelude::*;
//!
//! # async fn example(fd: std::os::fd::OwnedFd) -> Result<()> {
//! let device = qmilink::configure().start(fd)?;
//! let wds = device.create_service(ServiceType::WDS).await?;
//!
//! // Callback subscription
//! let id = wds
//!     .register(0x0022, |ind| println!("packet service status: {:?}", ind.get_u8(0x01)))
//!     .await?;
//!
//! // Request with a cancellable transaction
//! let pending = wds.submit(0x0020, None).await?;
//! let result = pending.response().await?;
//! println!("start network: {:?}", result.error());
//!
//! wds.unregister(id).await?;
//! drop(wds);
//! device.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! All handles can be shared across tokio tasks. They hold an
//! `Arc<DeviceInner>` and communicate via channels.

mod device;
mod indication;
mod service;

pub(crate) use device::DeviceInner;
pub use device::Device;
pub use indication::{IndicationStream, SubscriptionId};
pub(crate) use service::ServiceInner;
pub use service::{PendingResponse, Service};
