//! Datagram framing.
//!
//! Every datagram on the wire is one JSON-encoded [`Frame`]. Data frames carry an
//! opaque JSON payload for the layer above; ack frames confirm a data frame by id.

use crate::error::{NetError, Result};
use fieldmesh_core::VehicleId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one logical message, stable across retransmissions.
pub type MessageId = Uuid;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// One datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Id of this frame
    pub message_id: MessageId,
    /// Vehicle that produced the frame
    pub sender: VehicleId,
    /// Frame contents
    pub body: FrameBody,
}

/// Frame contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameBody {
    /// Application payload
    Data {
        /// Whether the receiver must answer with an ack frame
        requires_ack: bool,
        /// Payload for the layer above
        payload: serde_json::Value,
    },
    /// Acknowledgment of a data frame
    Ack {
        /// Id of the acknowledged data frame
        acked: MessageId,
    },
}

impl Frame {
    /// Creates a data frame.
    pub fn data(
        message_id: MessageId,
        sender: VehicleId,
        requires_ack: bool,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id,
            sender,
            body: FrameBody::Data {
                requires_ack,
                payload,
            },
        }
    }

    /// Creates an ack for `acked`.
    pub fn ack(sender: VehicleId, acked: MessageId) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            sender,
            body: FrameBody::Ack { acked },
        }
    }

    /// Encodes to datagram bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(NetError::Frame(format!(
                "frame of {} bytes exceeds datagram limit",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Decodes datagram bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_frame_layout() {
        let id = Uuid::new_v4();
        let frame = Frame::data(id, "tractor-a".into(), true, json!({"msg_type": "HEARTBEAT"}));
        let value: serde_json::Value = serde_json::from_slice(&frame.encode().unwrap()).unwrap();

        assert_eq!(value["sender"], "tractor-a");
        assert_eq!(value["body"]["kind"], "data");
        assert_eq!(value["body"]["requires_ack"], true);
        assert_eq!(value["body"]["payload"]["msg_type"], "HEARTBEAT");
        assert_eq!(Frame::decode(&frame.encode().unwrap()).unwrap(), frame);
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let id = Uuid::new_v4();
        let raw = json!({
            "message_id": id,
            "sender": "tractor-b",
            "hop_count": 3,
            "body": {"kind": "ack", "acked": id, "extra": true}
        });
        let frame = Frame::decode(raw.to_string().as_bytes()).unwrap();
        assert_eq!(frame.body, FrameBody::Ack { acked: id });
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(Frame::decode(b"\x00\x01not json"), Err(NetError::Frame(_))));
        assert!(Frame::decode(br#"{"message_id": "nope"}"#).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let payload = json!("x".repeat(MAX_DATAGRAM_SIZE));
        let frame = Frame::data(Uuid::new_v4(), "a".into(), false, payload);
        assert!(frame.encode().is_err());
    }
}
