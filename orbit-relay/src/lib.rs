//! # orbit-relay
//!
//! Realtime relay for device-to-device file transfer within an account.
//!
//! This crate implements a relay server that:
//! - Accepts WebSocket connections from a user's devices
//! - Keeps a live presence list per account and pushes it to every device
//! - Routes the transfer handshake between two devices by device id
//! - Streams binary payload frames along the negotiated route
//! - Throttles each account's payload to its plan's bandwidth
//! - Never stores or inspects payload bytes
//!
//! ## Architecture
//!
//! ```text
//! Laptop ──┐                      ┌── Phone
//!          │      WebSocket       │
//!          ├─────────────────────►│
//!          │                      │
//!      ┌───┴──────────────────────┴───┐
//!      │          orbit-relay         │
//!      │  directory   registry        │
//!      │  presence    limiter         │
//!      └──────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! Text frames carry JSON control messages tagged by `type`:
//! - REGISTER → REGISTERED (announce a device)
//! - UPDATE (refresh device metadata)
//! - TRANSFER_REQUEST / TRANSFER_RESPONSE / TRANSFER_FINISH (forwarded verbatim)
//! - DEVICE_LIST (relay → client, presence snapshot)
//! - ERROR (relay → client, target offline)
//!
//! Binary frames are forwarded to the connection's current transfer target.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod directory;
pub mod error;
pub mod forward;
pub mod http;
pub mod identity;
pub mod limits;
pub mod plans;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
