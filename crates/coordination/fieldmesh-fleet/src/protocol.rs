//! Fleet wire protocol
//!
//! Every protocol message is a JSON object with a common header and a
//! type-specific payload:
//!
//! ```json
//! {
//!   "msg_type": "TASK_CLAIM",
//!   "sender_id": "tractor-a",
//!   "vector_clock": {"tractor-a": 4, "tractor-b": 2},
//!   "payload": {"section_id": "north-40", "action": "claim"}
//! }
//! ```
//!
//! Unknown header or payload fields are ignored. Unknown message types decode to
//! [`MessagePayload::Unknown`] so the caller can log and drop them.

use crate::error::{FleetError, FleetResult};
use fieldmesh_core::VehicleId;
use fieldmesh_crdt::{AllocationSnapshot, ClaimAction, VectorClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::trace;

/// Status string announcing an orderly departure
pub const DEPARTING_STATUS: &str = "DEPARTING";

/// Message kinds on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Heartbeat,
    StateSyncRequest,
    StateSyncResponse,
    TaskClaim,
    EmergencyStop,
    LeaderElectionVote,
}

impl MessageType {
    /// Every known type
    pub const ALL: [MessageType; 6] = [
        MessageType::Heartbeat,
        MessageType::StateSyncRequest,
        MessageType::StateSyncResponse,
        MessageType::TaskClaim,
        MessageType::EmergencyStop,
        MessageType::LeaderElectionVote,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Heartbeat => "HEARTBEAT",
            MessageType::StateSyncRequest => "STATE_SYNC_REQUEST",
            MessageType::StateSyncResponse => "STATE_SYNC_RESPONSE",
            MessageType::TaskClaim => "TASK_CLAIM",
            MessageType::EmergencyStop => "EMERGENCY_STOP",
            MessageType::LeaderElectionVote => "LEADER_ELECTION_VOTE",
        }
    }

    /// Parse a wire name
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Create a new position
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Periodic status broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Sender's coordination state name, or `DEPARTING`
    pub status: String,
    pub position: Position,
    /// Ground speed in m/s
    pub speed: f64,
    /// Self-assessed health in `[0, 1]`
    pub health: f64,
}

impl Heartbeat {
    /// Whether this heartbeat announces departure
    pub fn is_departure(&self) -> bool {
        self.status == DEPARTING_STATUS
    }
}

/// Payload of a protocol message
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Heartbeat(Heartbeat),
    StateSyncRequest,
    StateSyncResponse {
        crdt_snapshot: AllocationSnapshot,
    },
    TaskClaim {
        section_id: String,
        action: ClaimAction,
    },
    EmergencyStop {
        reason_code: u32,
        source_position: Position,
    },
    LeaderElectionVote {
        election_id: String,
        candidate_id: VehicleId,
    },
    /// A message type this build does not know
    Unknown {
        msg_type: String,
    },
}

#[derive(Serialize, Deserialize)]
struct TaskClaimBody {
    section_id: String,
    action: ClaimAction,
}

#[derive(Serialize, Deserialize)]
struct StateSyncResponseBody {
    crdt_snapshot: AllocationSnapshot,
}

#[derive(Serialize, Deserialize)]
struct EmergencyStopBody {
    reason_code: u32,
    source_position: Position,
}

#[derive(Serialize, Deserialize)]
struct LeaderElectionVoteBody {
    election_id: String,
    candidate_id: VehicleId,
}

impl MessagePayload {
    /// Wire type name
    pub fn msg_type(&self) -> &str {
        match self {
            MessagePayload::Heartbeat(_) => MessageType::Heartbeat.as_str(),
            MessagePayload::StateSyncRequest => MessageType::StateSyncRequest.as_str(),
            MessagePayload::StateSyncResponse { .. } => MessageType::StateSyncResponse.as_str(),
            MessagePayload::TaskClaim { .. } => MessageType::TaskClaim.as_str(),
            MessagePayload::EmergencyStop { .. } => MessageType::EmergencyStop.as_str(),
            MessagePayload::LeaderElectionVote { .. } => MessageType::LeaderElectionVote.as_str(),
            MessagePayload::Unknown { msg_type } => msg_type,
        }
    }

    fn to_body(&self) -> FleetResult<Value> {
        let body = match self {
            MessagePayload::Heartbeat(hb) => serde_json::to_value(hb)?,
            MessagePayload::StateSyncRequest => Value::Object(Default::default()),
            MessagePayload::StateSyncResponse { crdt_snapshot } => {
                serde_json::to_value(StateSyncResponseBody {
                    crdt_snapshot: crdt_snapshot.clone(),
                })?
            }
            MessagePayload::TaskClaim { section_id, action } => serde_json::to_value(TaskClaimBody {
                section_id: section_id.clone(),
                action: *action,
            })?,
            MessagePayload::EmergencyStop {
                reason_code,
                source_position,
            } => serde_json::to_value(EmergencyStopBody {
                reason_code: *reason_code,
                source_position: *source_position,
            })?,
            MessagePayload::LeaderElectionVote {
                election_id,
                candidate_id,
            } => serde_json::to_value(LeaderElectionVoteBody {
                election_id: election_id.clone(),
                candidate_id: candidate_id.clone(),
            })?,
            MessagePayload::Unknown { msg_type } => {
                return Err(FleetError::Protocol(format!("cannot encode unknown type {msg_type}")))
            }
        };
        Ok(body)
    }

    fn from_body(msg_type: &str, body: Value) -> FleetResult<Self> {
        let Some(kind) = MessageType::from_wire(msg_type) else {
            return Ok(MessagePayload::Unknown {
                msg_type: msg_type.to_string(),
            });
        };

        let payload = match kind {
            MessageType::Heartbeat => MessagePayload::Heartbeat(serde_json::from_value(body)?),
            MessageType::StateSyncRequest => MessagePayload::StateSyncRequest,
            MessageType::StateSyncResponse => {
                let body: StateSyncResponseBody = serde_json::from_value(body)?;
                MessagePayload::StateSyncResponse {
                    crdt_snapshot: body.crdt_snapshot,
                }
            }
            MessageType::TaskClaim => {
                let body: TaskClaimBody = serde_json::from_value(body)?;
                if body.section_id.is_empty() {
                    return Err(FleetError::Protocol("TASK_CLAIM with empty section_id".into()));
                }
                MessagePayload::TaskClaim {
                    section_id: body.section_id,
                    action: body.action,
                }
            }
            MessageType::EmergencyStop => {
                let body: EmergencyStopBody = serde_json::from_value(body)?;
                MessagePayload::EmergencyStop {
                    reason_code: body.reason_code,
                    source_position: body.source_position,
                }
            }
            MessageType::LeaderElectionVote => {
                let body: LeaderElectionVoteBody = serde_json::from_value(body)?;
                MessagePayload::LeaderElectionVote {
                    election_id: body.election_id,
                    candidate_id: body.candidate_id,
                }
            }
        };
        Ok(payload)
    }
}

/// Header as it appears on the wire, with the payload still undecoded
#[derive(Serialize, Deserialize)]
struct RawMessage {
    msg_type: String,
    sender_id: String,
    vector_clock: VectorClock,
    #[serde(default)]
    payload: Value,
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    pub sender_id: VehicleId,
    /// Sender's clock at the time of sending
    pub vector_clock: VectorClock,
    pub payload: MessagePayload,
}

impl ProtocolMessage {
    /// Create a new message
    pub fn new(sender_id: VehicleId, vector_clock: VectorClock, payload: MessagePayload) -> Self {
        Self {
            sender_id,
            vector_clock,
            payload,
        }
    }

    /// Wire type name
    pub fn msg_type(&self) -> &str {
        self.payload.msg_type()
    }

    /// Encode as a JSON value for the delivery layer
    pub fn to_value(&self) -> FleetResult<Value> {
        let raw = RawMessage {
            msg_type: self.msg_type().to_string(),
            sender_id: self.sender_id.to_string(),
            vector_clock: self.vector_clock.clone(),
            payload: self.payload.to_body()?,
        };
        Ok(serde_json::to_value(raw)?)
    }

    /// Decode a JSON value received from the delivery layer
    pub fn from_value(value: Value) -> FleetResult<Self> {
        let raw: RawMessage = serde_json::from_value(value)?;
        let sender_id = VehicleId::parse(raw.sender_id)
            .map_err(|e| FleetError::Protocol(format!("bad sender_id: {e}")))?;
        let payload = MessagePayload::from_body(&raw.msg_type, raw.payload)?;
        trace!(msg_type = %raw.msg_type, sender = %sender_id, "Decoded protocol message");

        Ok(Self {
            sender_id,
            vector_clock: raw.vector_clock,
            payload,
        })
    }
}
