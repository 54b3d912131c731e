//! UDP transport for field radios bridged onto IP.

use crate::config::UdpConfig;
use crate::error::{NetError, Result, TransportError};
use crate::frame::MAX_DATAGRAM_SIZE;
use crate::transport::traits::{Destination, RawTransport};
use fieldmesh_core::VehicleId;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Datagram transport over a single bound UDP socket.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peers: Arc<BTreeMap<VehicleId, SocketAddr>>,
    broadcast_addr: Option<SocketAddr>,
}

impl UdpTransport {
    /// Binds the socket described by `config`.
    pub async fn bind(config: &UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|e| NetError::Transport(TransportError::Udp(e.to_string())))?;
        if config.broadcast_addr.is_some() {
            socket.set_broadcast(true)?;
        }
        let local = socket.local_addr()?;
        info!(
            %local,
            peers = config.peers.len(),
            "UDP transport bound"
        );

        Ok(Self {
            socket: Arc::new(socket),
            peers: Arc::new(config.peers.clone()),
            broadcast_addr: config.broadcast_addr,
        })
    }

    /// Returns the bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns a task forwarding every received datagram into `inbound`.
    ///
    /// The task ends when the receiving side of `inbound` is dropped.
    pub fn spawn_receiver(&self, inbound: mpsc::Sender<Vec<u8>>) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        debug!(%from, len, "UDP datagram received");
                        if inbound.send(buf[..len].to_vec()).await.is_err() {
                            debug!("Inbound channel closed, stopping UDP receiver");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "UDP receive failed"),
                }
            }
        })
    }

    fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> std::result::Result<(), TransportError> {
        match self.socket.try_send_to(bytes, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(TransportError::Busy),
            Err(e) => Err(TransportError::Udp(e.to_string())),
        }
    }
}

impl RawTransport for UdpTransport {
    fn send_raw(&self, bytes: &[u8], destination: &Destination) -> std::result::Result<(), TransportError> {
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::PayloadTooLarge(bytes.len()));
        }

        match destination {
            Destination::Peer(id) => {
                let addr = self
                    .peers
                    .get(id)
                    .ok_or_else(|| TransportError::UnknownPeer(id.to_string()))?;
                self.send_to(bytes, *addr)
            }
            Destination::Broadcast => match self.broadcast_addr {
                Some(addr) => self.send_to(bytes, addr),
                None => {
                    // Fan out; succeed if any peer took it
                    let mut last_err = None;
                    let mut any_ok = false;
                    for addr in self.peers.values() {
                        match self.send_to(bytes, *addr) {
                            Ok(()) => any_ok = true,
                            Err(e) => last_err = Some(e),
                        }
                    }
                    match (any_ok, last_err) {
                        (true, _) | (false, None) => Ok(()),
                        (false, Some(e)) => Err(e),
                    }
                }
            },
        }
    }

    fn known_peers(&self) -> Vec<VehicleId> {
        self.peers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    async fn loopback(peers: BTreeMap<VehicleId, SocketAddr>) -> UdpTransport {
        let config = UdpConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            broadcast_addr: None,
            peers,
        };
        UdpTransport::bind(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_unicast_over_loopback() {
        let receiver = loopback(BTreeMap::new()).await;
        let mut peers = BTreeMap::new();
        peers.insert(VehicleId::from("b"), receiver.local_addr().unwrap());
        let sender = loopback(peers).await;

        let (tx, mut rx) = mpsc::channel(8);
        let handle = receiver.spawn_receiver(tx);

        assert_ok!(sender.send_raw(b"ping", &Destination::Peer("b".into())));
        assert_eq!(rx.recv().await.unwrap(), b"ping".to_vec());

        // Broadcast without a broadcast address fans out to the address book
        assert_ok!(sender.send_raw(b"all", &Destination::Broadcast));
        assert_eq!(rx.recv().await.unwrap(), b"all".to_vec());

        handle.abort();
    }

    #[tokio::test]
    async fn test_unknown_peer_and_oversized() {
        let transport = loopback(BTreeMap::new()).await;
        assert_eq!(
            transport.send_raw(b"x", &Destination::Peer("ghost".into())),
            Err(TransportError::UnknownPeer("ghost".into()))
        );
        let big = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        assert_eq!(
            transport.send_raw(&big, &Destination::Broadcast),
            Err(TransportError::PayloadTooLarge(MAX_DATAGRAM_SIZE + 1))
        );
    }
}
