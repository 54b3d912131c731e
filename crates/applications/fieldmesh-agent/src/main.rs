//! Vehicle agent: runs one fleet coordination node over UDP
//!
//! Usage: `fieldmesh-agent [config.toml]`. Without an argument the path is taken
//! from `FIELDMESH_CONFIG`.

mod config;

use anyhow::Context;
use config::AgentConfig;
use fieldmesh_core::init_tracing;
use fieldmesh_fleet::{FleetCoordinationEngine, FleetNode};
use fieldmesh_net::UdpTransport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const INBOUND_QUEUE: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FIELDMESH_CONFIG").ok())
        .context("usage: fieldmesh-agent <config.toml>")?;
    let config = AgentConfig::load(&path).with_context(|| format!("loading {path}"))?;

    init_tracing(&config.fleet.observability)?;
    fieldmesh_fleet::observability::describe_metrics();
    info!(vehicle = %config.fleet.vehicle_id, config = %path, "Starting FieldMesh agent");

    let transport = UdpTransport::bind(&config.udp).await?;
    let local_addr = transport.local_addr()?;
    info!(addr = %local_addr, "UDP transport bound");

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let receiver = transport.spawn_receiver(inbound_tx);

    let engine = FleetCoordinationEngine::new(config.fleet.clone(), Arc::new(transport))?;
    let (handle, node) = FleetNode::spawn(engine, inbound_rx);

    handle
        .on_state_change(|from, to| info!(%from, %to, "Coordination state changed"))
        .await?;
    handle
        .on_emergency(|event| {
            error!(
                source = %event.source,
                reason_code = event.reason_code,
                latitude = event.source_position.latitude,
                longitude = event.source_position.longitude,
                "EMERGENCY STOP from fleet"
            )
        })
        .await?;

    handle.start().await?;
    info!("Agent running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Err(e) = handle.stop().await {
        warn!(error = %e, "Engine not stopped cleanly");
    }
    handle.shutdown().await?;
    node.await?;
    receiver.abort();

    info!("Agent shutdown gracefully");
    Ok(())
}
