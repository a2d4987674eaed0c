//! # qmilink
//!
//! An **async QMI (Qualcomm MSM Interface) transport engine** for
//! [tokio](https://tokio.rs).
//!
//! A QMI modem exposes a single character device. Every logical service on the
//! modem (network access, SMS, SIM, voice, ...) is multiplexed over that one
//! descriptor using a small binary framing with TLV payloads. This crate turns
//! the descriptor into a service-oriented RPC channel:
//!
//! - **Discovery**: query which services (and versions) the modem supports
//! - **Client ids**: acquire and release per-service client ids
//! - **Requests**: send a message, get the matching response by transaction id
//! - **Indications**: subscribe to unsolicited messages per service
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::fs::OpenOptions;
//! use qmilink::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let file = OpenOptions::new().read(true).write(true).open("/dev/cdc-wdm0")?;
//!     let device = qmilink::configure().start(file.into())?;
//!
//!     let versions = device.discover().await?;
//!     println!("modem supports {} services", versions.services.len());
//!
//!     let dms = device.create_service(ServiceType::DMS).await?;
//!     let result = dms.send(0x0025, None).await?;
//!     if let Some(imei) = result.get_string(0x11) {
//!         println!("IMEI: {imei}");
//!     }
//!
//!     device.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         Driver code                                  │
//! │   ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐     │
//! │   │   Device     │   │   Service    │   │  IndicationStream    │     │
//! │   └──────┬───────┘   └──────┬───────┘   └──────────┬───────────┘     │
//! └──────────┼──────────────────┼──────────────────────┼─────────────────┘
//!            │ Commands         │ Commands             │ Commands
//!            ▼                  ▼                      ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      Device task (event loop)                        │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │                        DeviceState                             │  │
//! │  │  • outbound: VecDeque<OutboundRequest>  (FIFO, one write)      │  │
//! │  │  • control / service in-flight tables  (keyed by tid)          │  │
//! │  │  • registry: (service type, client id) → ServiceEntry          │  │
//! │  │  • cached VersionInfo, pending creations, release counter      │  │
//! │  └────────────────────────────────────────────────────────────────┘  │
//! │  select!: commands │ readable descriptor │ writable descriptor │ timer│
//! └──────────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//!                        ┌─────────────────────┐
//!                        │  /dev/cdc-wdmN      │
//!                        └─────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Visibility | Responsibility |
//! |--------|------------|----------------|
//! | [`handles`] | Public | [`Device`], [`Service`], [`PendingResponse`], [`IndicationStream`] |
//! | [`config`] | Public | [`DeviceConfig`] and defaults |
//! | [`builder`] | Public | [`DeviceBuilder`], created by [`configure()`] |
//! | [`error`] | Public | [`Error`], [`Result`] |
//! | [`wire`] | Public | Header structs, frame splitting, TLV scanning |
//! | [`param`] | Public | [`Param`] request payload builder |
//! | [`result`] | Public | [`QmiResult`] response payload reader |
//! | [`debug`] | Public | Hex dump and decoded trace for the debug hook |
//! | [`transport`] | Public | [`Transport`] trait, character device implementation |
//! | `runtime` | Internal | Event loop, state, control/service handlers, dispatch |
//!
//! ## Key Concepts
//!
//! All device state is owned by a single tokio task. Handles never touch it;
//! they send commands over a channel and receive results over `oneshot`
//! channels. Responses are matched to requests by transaction id, indications
//! are fanned out to subscribers in registration order, and service teardown
//! (releasing the client id) completes asynchronously after the last
//! [`Service`] clone is dropped.

use std::fmt;

pub mod builder;
pub mod config;
pub mod debug;
pub mod error;
pub mod handles;
pub mod param;
pub mod result;
pub mod transport;

/// Wire format parsing for QMI headers, frames and TLVs.
/// Exposed for testing and interoperability verification.
pub mod wire;

pub(crate) mod runtime;

pub use builder::DeviceBuilder;
pub use config::DeviceConfig;
pub use debug::DebugHook;
pub use error::*;
pub use handles::{Device, IndicationStream, PendingResponse, Service, SubscriptionId};
pub use param::Param;
pub use result::QmiResult;
pub use transport::{CharDevice, Transport};
pub use wire::{ServiceVersion, VersionInfo};

/// Start configuring a [`Device`].
///
/// ```no_run
/// # fn example(fd: std::os::fd::OwnedFd) -> qmilink::Result<()> {
/// let device = qmilink::configure()
///     .create_timeout(std::time::Duration::from_secs(10))
///     .start(fd)?;
/// # Ok(())
/// # }
/// ```
pub fn configure() -> DeviceBuilder {
    DeviceBuilder::new()
}

// ============================================================================
// SERVICE TYPES
// ============================================================================

/// QMI service type as carried in the mux header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceType(u8);

impl ServiceType {
    /// Control service
    pub const CONTROL: Self = Self(0);
    /// Wireless data service
    pub const WDS: Self = Self(1);
    /// Device management service
    pub const DMS: Self = Self(2);
    /// Network access service
    pub const NAS: Self = Self(3);
    /// Quality of service
    pub const QOS: Self = Self(4);
    /// Wireless messaging service
    pub const WMS: Self = Self(5);
    /// Position determination service
    pub const PDS: Self = Self(6);
    /// Authentication service
    pub const AUTH: Self = Self(7);
    /// AT command processor service
    pub const AT: Self = Self(8);
    /// Voice service
    pub const VOICE: Self = Self(9);
    /// Card application toolkit service
    pub const CAT: Self = Self(10);
    /// User identity module service
    pub const UIM: Self = Self(11);
    /// Phonebook manager service
    pub const PBM: Self = Self(12);
    /// Remote file system service
    pub const RMTFS: Self = Self(14);
    /// Location service
    pub const LOC: Self = Self(16);
    /// Specific absorption rate service
    pub const SAR: Self = Self(17);
    /// Core sound driver service
    pub const CSD: Self = Self(20);
    /// Embedded file system service
    pub const EFS: Self = Self(21);
    /// Thermal sensors service
    pub const TS: Self = Self(23);
    /// Thermal mitigation device service
    pub const TMD: Self = Self(24);
    /// Card application toolkit service (legacy id)
    pub const CAT_OLD: Self = Self(224);
    /// Remote management service
    pub const RMS: Self = Self(225);
    /// Open mobile alliance device management service
    pub const OMA: Self = Self(226);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Short service name, `None` for types without a well-known name.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::CONTROL => "CTL",
            Self::WDS => "WDS",
            Self::DMS => "DMS",
            Self::NAS => "NAS",
            Self::QOS => "QOS",
            Self::WMS => "WMS",
            Self::PDS => "PDS",
            Self::AUTH => "AUTH",
            Self::AT => "AT",
            Self::VOICE => "VOICE",
            Self::CAT | Self::CAT_OLD => "CAT",
            Self::UIM => "UIM",
            Self::PBM => "PBM",
            Self::RMTFS => "RMTFS",
            Self::LOC => "LOC",
            Self::SAR => "SAR",
            Self::CSD => "CSD",
            Self::EFS => "EFS",
            Self::TS => "TS",
            Self::TMD => "TMD",
            Self::RMS => "RMS",
            Self::OMA => "OMA",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "QMI_{}", self.0),
        }
    }
}

impl From<u8> for ServiceType {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub mod prelude {
    pub use crate::{
        Device, DeviceConfig, Error, IndicationStream, Param, PendingResponse, QmiResult, Result,
        Service, ServiceType, SubscriptionId, VersionInfo,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names() {
        assert_eq!(ServiceType::NAS.name(), Some("NAS"));
        assert_eq!(ServiceType::CAT_OLD.name(), Some("CAT"));
        assert_eq!(ServiceType::new(0x42).name(), None);
        assert_eq!(ServiceType::new(0x42).to_string(), "QMI_66");
        assert_eq!(ServiceType::UIM.to_string(), "UIM");
    }
}
