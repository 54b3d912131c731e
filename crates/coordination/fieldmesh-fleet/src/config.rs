//! Fleet engine configuration

use fieldmesh_core::{
    load_config, FieldMeshError, FieldMeshResult, ObservabilityConfig, Validatable, VehicleId,
};
use fieldmesh_net::{DeliveryConfig, SendOptions, EMERGENCY_PRIORITY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Delivery parameters for one kind of protocol message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageClass {
    /// Priority class, 0 is highest
    pub priority: u8,
    /// Whether receivers must ack
    pub requires_ack: bool,
    /// Retransmissions after the first send
    pub max_retries: u32,
    /// Initial retry interval
    pub retry_interval_ms: u64,
    /// Give-up deadline
    pub timeout_ms: u64,
}

impl MessageClass {
    /// Task claims and releases
    pub fn claim() -> Self {
        Self {
            priority: 3,
            requires_ack: true,
            max_retries: 5,
            retry_interval_ms: 200,
            timeout_ms: 10_000,
        }
    }

    /// State sync requests and responses
    pub fn sync() -> Self {
        Self {
            priority: 4,
            requires_ack: true,
            max_retries: 3,
            retry_interval_ms: 500,
            timeout_ms: 10_000,
        }
    }

    /// Emergency stops
    pub fn emergency() -> Self {
        Self {
            priority: EMERGENCY_PRIORITY,
            requires_ack: true,
            max_retries: 10,
            retry_interval_ms: 50,
            timeout_ms: 5_000,
        }
    }

    /// Leader election votes
    pub fn election() -> Self {
        Self {
            priority: 4,
            requires_ack: true,
            max_retries: 3,
            retry_interval_ms: 500,
            timeout_ms: 10_000,
        }
    }

    /// Tracker options for this class
    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            priority: self.priority,
            requires_ack: self.requires_ack,
            max_retries: self.max_retries,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_peer_timeout_ms() -> u64 {
    10_000
}

fn default_tick_interval_ms() -> u64 {
    20
}

/// Longest runtime tick; emergency retransmissions wait for ticks
const MAX_TICK_INTERVAL_MS: u64 = 60_000;

fn default_true() -> bool {
    true
}

fn default_heartbeat_priority() -> u8 {
    5
}

/// Configuration for one vehicle's coordination engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// This vehicle's id
    pub vehicle_id: VehicleId,

    /// Heartbeat period
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Peers silent for longer than this are dropped from the status table
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,

    /// Scheduler tick period of the node runtime
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Broadcast a state sync request right after start
    #[serde(default = "default_true")]
    pub sync_on_start: bool,

    /// Delivery tracker tuning
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Claim and release messages
    #[serde(default = "MessageClass::claim")]
    pub claim: MessageClass,

    /// Sync messages
    #[serde(default = "MessageClass::sync")]
    pub sync: MessageClass,

    /// Emergency stops
    #[serde(default = "MessageClass::emergency")]
    pub emergency: MessageClass,

    /// Leader election votes
    #[serde(default = "MessageClass::election")]
    pub election: MessageClass,

    /// Priority of heartbeats, which are never acked
    #[serde(default = "default_heartbeat_priority")]
    pub heartbeat_priority: u8,

    /// Logging setup
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl FleetConfig {
    /// Default configuration for `vehicle_id`
    pub fn new(vehicle_id: impl Into<VehicleId>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            peer_timeout_ms: default_peer_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            sync_on_start: true,
            delivery: DeliveryConfig::default(),
            claim: MessageClass::claim(),
            sync: MessageClass::sync(),
            emergency: MessageClass::emergency(),
            election: MessageClass::election(),
            heartbeat_priority: default_heartbeat_priority(),
            observability: ObservabilityConfig::default(),
        }
    }

    /// Load from a TOML or JSON file with `FIELDMESH_` environment overrides
    pub fn load(path: impl AsRef<Path>) -> FieldMeshResult<Self> {
        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Heartbeat period
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Status table expiry
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// Runtime tick period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Tracker options for heartbeats
    pub fn heartbeat_options(&self) -> SendOptions {
        SendOptions {
            timeout: self.heartbeat_interval(),
            ..SendOptions::unacked(self.heartbeat_priority)
        }
    }
}

impl Validatable for FleetConfig {
    fn validate(&self) -> FieldMeshResult<()> {
        VehicleId::parse(self.vehicle_id.as_str())
            .map_err(|e| FieldMeshError::config(format!("vehicle_id: {e}")))?;

        if self.heartbeat_interval_ms == 0 || self.tick_interval_ms == 0 {
            return Err(FieldMeshError::config(
                "heartbeat_interval_ms and tick_interval_ms must be positive",
            ));
        }
        if self.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(FieldMeshError::config(format!(
                "tick_interval_ms must be at most {MAX_TICK_INTERVAL_MS}"
            )));
        }
        if self.peer_timeout_ms <= self.heartbeat_interval_ms {
            return Err(FieldMeshError::config(
                "peer_timeout_ms must exceed heartbeat_interval_ms",
            ));
        }
        if self.emergency.priority != EMERGENCY_PRIORITY {
            return Err(FieldMeshError::config("emergency.priority must be 0"));
        }
        for (name, class) in [("claim", &self.claim), ("sync", &self.sync), ("election", &self.election)] {
            if class.priority == EMERGENCY_PRIORITY {
                return Err(FieldMeshError::config(format!(
                    "{name}.priority 0 is reserved for emergency stops"
                )));
            }
            if class.retry_interval_ms < self.emergency.retry_interval_ms {
                return Err(FieldMeshError::config(format!(
                    "{name}.retry_interval_ms is shorter than the emergency retry interval"
                )));
            }
        }
        if self.heartbeat_priority == EMERGENCY_PRIORITY {
            return Err(FieldMeshError::config("heartbeat_priority 0 is reserved"));
        }
        for class in [&self.claim, &self.sync, &self.emergency, &self.election] {
            if class.retry_interval_ms == 0 || class.timeout_ms == 0 {
                return Err(FieldMeshError::config(
                    "message class intervals and timeouts must be positive",
                ));
            }
        }
        self.delivery.validate()
    }
}
