//! Device records published in an account's presence set.

use serde::{Deserialize, Serialize};

use crate::{ConnectionId, DeviceId};

/// Broad category of a device, used by clients to pick an icon and layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceKind {
    /// Phone
    #[serde(alias = "phone", alias = "Phone", alias = "MOBILE", alias = "mobile")]
    Phone,
    /// Tablet
    #[serde(alias = "tablet", alias = "Tablet")]
    Tablet,
    /// Laptop
    #[serde(alias = "laptop", alias = "Laptop")]
    Laptop,
    /// Desktop
    #[serde(alias = "desktop", alias = "Desktop")]
    Desktop,
    /// Anything the relay does not recognise
    #[serde(other)]
    Other,
}

/// One online endpoint of an account.
///
/// Presence-set identity is the `device_id`; a second registration with the
/// same `device_id` replaces the first record wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Client-supplied device identifier.
    pub device_id: DeviceId,
    /// The live connection currently serving this device.
    pub connection_id: ConnectionId,
    /// Human-readable name.
    pub display_name: String,
    /// Device category.
    pub kind: DeviceKind,
    /// Battery percentage, if the client reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    /// Icon hint for UIs (e.g. "laptop", "smartphone").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}
