//! Per-vehicle coordination state machine
//!
//! ```text
//! DISCONNECTED --start--> IDLE
//! IDLE --sync request/response--> SYNCHRONIZING --merge complete--> IDLE
//! IDLE --claim--> WORKING --release / all sections lost--> IDLE
//! IDLE | SYNCHRONIZING | WORKING --stop--> DISCONNECTED
//! any --emergency--> EMERGENCY_STOP --manual reset--> DISCONNECTED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordination state of one vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleCoordinationState {
    /// Not participating; initial state
    Disconnected,
    /// Participating without work
    Idle,
    /// Applying a state sync exchange
    Synchronizing,
    /// Holding at least one work section
    Working,
    /// Halted until a manual reset
    EmergencyStop,
}

impl VehicleCoordinationState {
    /// Wire and log name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Idle => "IDLE",
            Self::Synchronizing => "SYNCHRONIZING",
            Self::Working => "WORKING",
            Self::EmergencyStop => "EMERGENCY_STOP",
        }
    }

    /// Whether the machine may move from `self` to `next`
    pub fn can_transition_to(&self, next: VehicleCoordinationState) -> bool {
        use VehicleCoordinationState::*;
        match (self, next) {
            (EmergencyStop, EmergencyStop) => false,
            (_, EmergencyStop) => true,
            (Disconnected, Idle) => true,
            (Idle, Synchronizing) | (Synchronizing, Idle) => true,
            (Idle, Working) | (Working, Idle) => true,
            (Idle | Synchronizing | Working, Disconnected) => true,
            (EmergencyStop, Disconnected) => true,
            _ => false,
        }
    }

    /// Whether inbound traffic is processed
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Whether new section claims are accepted
    pub fn accepts_claims(&self) -> bool {
        matches!(self, Self::Idle | Self::Working)
    }
}

impl Default for VehicleCoordinationState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl fmt::Display for VehicleCoordinationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::VehicleCoordinationState::*;
    use super::*;

    const ALL: [VehicleCoordinationState; 5] = [Disconnected, Idle, Synchronizing, Working, EmergencyStop];

    #[test]
    fn test_emergency_reachable_from_everywhere_else() {
        for state in ALL {
            assert_eq!(state.can_transition_to(EmergencyStop), state != EmergencyStop);
        }
    }

    #[test]
    fn test_emergency_only_exits_to_disconnected() {
        for next in ALL {
            assert_eq!(EmergencyStop.can_transition_to(next), next == Disconnected);
        }
    }

    #[test]
    fn test_disconnected_only_starts() {
        for next in ALL {
            let expected = matches!(next, Idle | EmergencyStop);
            assert_eq!(Disconnected.can_transition_to(next), expected, "{next}");
        }
    }

    #[test]
    fn test_no_shortcuts() {
        assert!(!Synchronizing.can_transition_to(Working));
        assert!(!Working.can_transition_to(Synchronizing));
        assert!(!Idle.can_transition_to(Idle));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&EmergencyStop).unwrap(), "\"EMERGENCY_STOP\"");
        assert_eq!(Synchronizing.to_string(), "SYNCHRONIZING");
    }
}
