//! # orbit-types
//!
//! Wire format types for the orbit transfer relay.
//!
//! This crate provides the types shared by the relay and its clients:
//! - [`AccountId`], [`DeviceId`], [`ConnectionId`] - Identity types
//! - [`Device`], [`DeviceKind`] - Presence records
//! - [`ControlMessage`], [`ServerMessage`] - JSON control frames
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod device;
mod error;
mod ids;
mod messages;

pub use device::{Device, DeviceKind};
pub use error::TypesError;
pub use ids::{AccountId, ConnectionId, DeviceId};
pub use messages::{
    ControlMessage, Register, ServerMessage, TransferFinish, TransferRequest, TransferResponse,
    Update, TARGET_OFFLINE,
};
