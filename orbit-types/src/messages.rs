//! Control messages exchanged over a transfer connection.
//!
//! Control frames are JSON text with a `type` discriminator. Binary frames
//! carry no envelope and never pass through these types.

use serde::{Deserialize, Serialize};

use crate::{Device, DeviceId, DeviceKind, TypesError};

/// Reply text for a control message whose target is not connected.
pub const TARGET_OFFLINE: &str = "Target device offline";

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Announce this connection as a device
    Register(Register),
    /// Replace the metadata of the already registered device
    Update(Update),
    /// Offer a file to another device
    TransferRequest(TransferRequest),
    /// Accept or decline an offer
    TransferResponse(TransferResponse),
    /// End of a transfer's binary stream
    TransferFinish(TransferFinish),
    /// Any other `type` value
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Parse a control frame.
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        serde_json::from_str(text).map_err(TypesError::Decode)
    }

    /// Serialize to a JSON control frame.
    pub fn to_json(&self) -> Result<String, TypesError> {
        serde_json::to_string(self).map_err(TypesError::Encode)
    }

    /// Wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register(_) => "REGISTER",
            Self::Update(_) => "UPDATE",
            Self::TransferRequest(_) => "TRANSFER_REQUEST",
            Self::TransferResponse(_) => "TRANSFER_RESPONSE",
            Self::TransferFinish(_) => "TRANSFER_FINISH",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// The device a handshake message is addressed to.
    pub fn target(&self) -> Option<&DeviceId> {
        match self {
            Self::TransferRequest(m) => Some(&m.target_device_id),
            Self::TransferResponse(m) => Some(&m.target_device_id),
            Self::TransferFinish(m) => Some(&m.target_device_id),
            _ => None,
        }
    }

    /// The transfer a handshake message belongs to.
    pub fn transfer_id(&self) -> Option<&str> {
        match self {
            Self::TransferRequest(m) => Some(&m.transfer_id),
            Self::TransferResponse(m) => Some(&m.transfer_id),
            Self::TransferFinish(m) => Some(&m.transfer_id),
            _ => None,
        }
    }
}

/// REGISTER payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    /// Persistent device id; the relay assigns a random one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    /// Human-readable device name
    #[serde(alias = "name")]
    pub display_name: String,
    /// Device category
    #[serde(alias = "deviceKind")]
    pub kind: DeviceKind,
    /// Battery percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    /// Icon hint
    #[serde(default, alias = "deviceIcon", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// UPDATE payload. Applies to the device the connection registered as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    /// Human-readable device name
    #[serde(alias = "name")]
    pub display_name: String,
    /// Device category
    #[serde(alias = "deviceKind")]
    pub kind: DeviceKind,
    /// Battery percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    /// Icon hint
    #[serde(default, alias = "deviceIcon", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// TRANSFER_REQUEST payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Receiving device
    #[serde(alias = "targetId")]
    pub target_device_id: DeviceId,
    /// Client-chosen transfer identifier
    pub transfer_id: String,
    /// File name as shown to the receiver
    #[serde(alias = "fileName")]
    pub filename: String,
    /// File size in bytes
    pub size: u64,
    /// MIME type or extension hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

/// TRANSFER_RESPONSE payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    /// The device that made the request
    #[serde(alias = "targetId")]
    pub target_device_id: DeviceId,
    /// Transfer being answered
    pub transfer_id: String,
    /// Whether the receiver accepted the file
    pub accepted: bool,
}

/// TRANSFER_FINISH payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFinish {
    /// The counterpart device
    #[serde(alias = "targetId")]
    pub target_device_id: DeviceId,
    /// Transfer being finished
    pub transfer_id: String,
}

/// Messages the relay originates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Acknowledges a REGISTER
    Registered {
        /// Always "OK"
        status: String,
    },
    /// A control message could not be routed
    Error {
        /// Human-readable reason
        message: String,
    },
    /// Current presence set of the connection's account
    DeviceList {
        /// Online devices
        devices: Vec<Device>,
    },
}

impl ServerMessage {
    /// The REGISTER acknowledgement.
    pub fn registered() -> Self {
        Self::Registered {
            status: "OK".to_string(),
        }
    }

    /// The reply sent when a handshake target is not connected.
    pub fn target_offline() -> Self {
        Self::Error {
            message: TARGET_OFFLINE.to_string(),
        }
    }

    /// Serialize to a JSON control frame.
    pub fn to_json(&self) -> Result<String, TypesError> {
        serde_json::to_string(self).map_err(TypesError::Encode)
    }

    /// Parse a relay-originated frame (client side and tests).
    pub fn from_json(text: &str) -> Result<Self, TypesError> {
        serde_json::from_str(text).map_err(TypesError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionId;

    #[test]
    fn accepts_legacy_web_client_request() {
        let text = r#"{"type":"TRANSFER_REQUEST","targetId":"phone-1","senderId":"laptop-1","transferId":"t9","fileName":"notes.txt","size":12,"targetIp":null}"#;

        match ControlMessage::from_json(text).unwrap() {
            ControlMessage::TransferRequest(request) => {
                assert_eq!(request.target_device_id.as_str(), "phone-1");
                assert_eq!(request.filename, "notes.txt");
                assert_eq!(request.size, 12);
            }
            other => panic!("expected TRANSFER_REQUEST, got {:?}", other),
        }
    }

    #[test]
    fn parses_transfer_request() {
        let text = r#"{"type":"TRANSFER_REQUEST","targetDeviceId":"phone-1","transferId":"t1","filename":"a.png","size":1024}"#;
        let msg = ControlMessage::from_json(text).unwrap();

        match &msg {
            ControlMessage::TransferRequest(req) => {
                assert_eq!(req.target_device_id, DeviceId::new("phone-1"));
                assert_eq!(req.transfer_id, "t1");
                assert_eq!(req.filename, "a.png");
                assert_eq!(req.size, 1024);
                assert_eq!(req.file_type, None);
            }
            other => panic!("expected TransferRequest, got {:?}", other),
        }
        assert_eq!(msg.target(), Some(&DeviceId::new("phone-1")));
        assert_eq!(msg.transfer_id(), Some("t1"));
    }

    #[test]
    fn accepts_legacy_target_id_field() {
        let text = r#"{"type":"TRANSFER_FINISH","targetId":"laptop-1","transferId":"t1"}"#;
        let msg = ControlMessage::from_json(text).unwrap();
        assert_eq!(msg.target(), Some(&DeviceId::new("laptop-1")));
    }

    #[test]
    fn register_device_id_is_optional() {
        let text = r#"{"type":"REGISTER","name":"My Phone","kind":"PHONE"}"#;
        match ControlMessage::from_json(text).unwrap() {
            ControlMessage::Register(reg) => {
                assert_eq!(reg.device_id, None);
                assert_eq!(reg.display_name, "My Phone");
                assert_eq!(reg.kind, DeviceKind::Phone);
            }
            other => panic!("expected Register, got {:?}", other),
        }
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let msg = ControlMessage::from_json(r#"{"type":"PING","seq":3}"#).unwrap();
        assert_eq!(msg, ControlMessage::Unknown);
        assert_eq!(msg.target(), None);
    }

    #[test]
    fn missing_required_field_is_malformed() {
        // TRANSFER_RESPONSE without `accepted`
        let text = r#"{"type":"TRANSFER_RESPONSE","targetDeviceId":"x","transferId":"t1"}"#;
        assert!(matches!(
            ControlMessage::from_json(text),
            Err(TypesError::Decode(_))
        ));

        assert!(ControlMessage::from_json("not json").is_err());
        assert!(ControlMessage::from_json(r#"{"deviceId":"x"}"#).is_err());
    }

    #[test]
    fn server_acks_have_fixed_shape() {
        assert_eq!(
            ServerMessage::registered().to_json().unwrap(),
            r#"{"type":"REGISTERED","status":"OK"}"#
        );
        assert_eq!(
            ServerMessage::target_offline().to_json().unwrap(),
            r#"{"type":"ERROR","message":"Target device offline"}"#
        );
    }

    #[test]
    fn device_list_carries_devices() {
        let msg = ServerMessage::DeviceList {
            devices: vec![Device {
                device_id: DeviceId::new("laptop-1"),
                connection_id: ConnectionId::new(),
                display_name: "Laptop".to_string(),
                kind: DeviceKind::Laptop,
                battery_level: None,
                icon: Some("laptop".to_string()),
            }],
        };

        let json = msg.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"DEVICE_LIST","devices":[{"#));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }
}
