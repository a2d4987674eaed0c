//! # Device Implementation (Internal)
//!
//! This module contains the internal implementation of the device task.
//! It is `pub(crate)`, internal to the library.
//!
//! ## Module Structure
//!
//! - [`command`]: Command enum for handle→task communication
//! - [`state`]: `DeviceState` and internal data structures
//! - [`control`]: Discovery, service creation and client id release
//! - [`service`]: Service requests, cancellation and subscriptions
//! - [`dispatch`]: Frame splitting, response matching and indication fan-out
//! - [`event_loop`]: The device task and its event loop

pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod dispatch;
pub(crate) mod event_loop;
pub(crate) mod service;
pub(crate) mod state;

pub(crate) use command::Command;
