//! In-process peer network.
//!
//! Every joined peer gets a [`LocalTransport`] and an event receiver. Detaching a
//! peer simulates a dropped connection: its broadcasts fail, nothing is delivered
//! to it, and the remaining peers see [`TransportEvent::Disconnected`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures::channel::mpsc;
use ludo_types::PlayerId;
use tracing::{debug, info};

use crate::transport::{DeliveryMode, Transport, TransportError, TransportEvent};

struct Peer {
    events: mpsc::UnboundedSender<TransportEvent>,
    attached: bool,
}

#[derive(Default)]
struct Hub {
    peers: BTreeMap<PlayerId, Peer>,
    fail_sends: bool,
}

impl Hub {
    fn notify_others(&self, origin: &PlayerId, event: TransportEvent) {
        for (id, peer) in &self.peers {
            if id != origin && peer.attached {
                let _ = peer.events.unbounded_send(event.clone());
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct LocalNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add `id` to the network. Existing peers see it connect.
    pub fn join(&self, id: PlayerId) -> (LocalTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (sender, receiver) = mpsc::unbounded();
        let mut hub = self.hub();
        hub.peers.insert(
            id.clone(),
            Peer {
                events: sender,
                attached: true,
            },
        );
        hub.notify_others(&id, TransportEvent::Connected(id.clone()));
        debug!(peer = %id, "joined local network");
        (
            LocalTransport {
                id,
                hub: self.hub.clone(),
            },
            receiver,
        )
    }

    /// Cut `id` off from the other peers.
    pub fn detach(&self, id: &PlayerId) {
        let mut hub = self.hub();
        let Some(peer) = hub.peers.get_mut(id) else {
            return;
        };
        if !peer.attached {
            return;
        }
        peer.attached = false;
        hub.notify_others(id, TransportEvent::Disconnected(id.clone()));
        info!(peer = %id, "peer detached");
    }

    /// Restore a detached peer.
    pub fn attach(&self, id: &PlayerId) {
        let mut hub = self.hub();
        let Some(peer) = hub.peers.get_mut(id) else {
            return;
        };
        if peer.attached {
            return;
        }
        peer.attached = true;
        hub.notify_others(id, TransportEvent::Connected(id.clone()));
        info!(peer = %id, "peer attached");
    }

    /// Make every broadcast fail until cleared.
    pub fn set_fail_sends(&self, fail: bool) {
        self.hub().fail_sends = fail;
    }

    pub fn is_attached(&self, id: &PlayerId) -> bool {
        self.hub().peers.get(id).is_some_and(|peer| peer.attached)
    }
}

/// One peer's handle on a [`LocalNetwork`]. Both delivery modes are delivered in order.
#[derive(Clone)]
pub struct LocalTransport {
    id: PlayerId,
    hub: Arc<Mutex<Hub>>,
}

impl LocalTransport {
    pub fn id(&self) -> &PlayerId {
        &self.id
    }
}

impl Transport for LocalTransport {
    fn broadcast(&self, bytes: Bytes, _mode: DeliveryMode) -> Result<(), TransportError> {
        let hub = self
            .hub
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if hub.fail_sends {
            return Err(TransportError::Send("sends disabled".to_string()));
        }
        if !hub.peers.get(&self.id).is_some_and(|peer| peer.attached) {
            return Err(TransportError::Closed);
        }
        hub.notify_others(
            &self.id,
            TransportEvent::Received {
                bytes,
                sender: self.id.clone(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(receiver: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = receiver.try_next() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_broadcast_reaches_other_peers_only() {
        let network = LocalNetwork::new();
        let (alice, mut alice_rx) = network.join(PlayerId::from("alice"));
        let (_bob, mut bob_rx) = network.join(PlayerId::from("bob"));
        assert_eq!(
            drain(&mut alice_rx),
            vec![TransportEvent::Connected(PlayerId::from("bob"))]
        );

        alice
            .broadcast(Bytes::from_static(b"hi"), DeliveryMode::Reliable)
            .unwrap();
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(
            drain(&mut bob_rx),
            vec![TransportEvent::Received {
                bytes: Bytes::from_static(b"hi"),
                sender: PlayerId::from("alice"),
            }]
        );
    }

    #[test]
    fn test_detach_and_attach() {
        let network = LocalNetwork::new();
        let (alice, mut alice_rx) = network.join(PlayerId::from("alice"));
        let (bob, mut bob_rx) = network.join(PlayerId::from("bob"));
        drain(&mut alice_rx);

        network.detach(&PlayerId::from("bob"));
        assert!(!network.is_attached(&PlayerId::from("bob")));
        assert_eq!(
            drain(&mut alice_rx),
            vec![TransportEvent::Disconnected(PlayerId::from("bob"))]
        );
        assert_eq!(
            bob.broadcast(Bytes::new(), DeliveryMode::BestEffort),
            Err(TransportError::Closed)
        );
        alice
            .broadcast(Bytes::from_static(b"lost"), DeliveryMode::Reliable)
            .unwrap();
        assert!(drain(&mut bob_rx).is_empty());

        network.attach(&PlayerId::from("bob"));
        assert_eq!(
            drain(&mut alice_rx),
            vec![TransportEvent::Connected(PlayerId::from("bob"))]
        );
    }

    #[test]
    fn test_failing_sends() {
        let network = LocalNetwork::new();
        let (alice, _alice_rx) = network.join(PlayerId::from("alice"));
        network.set_fail_sends(true);
        assert!(matches!(
            alice.broadcast(Bytes::new(), DeliveryMode::Reliable),
            Err(TransportError::Send(_))
        ));
        network.set_fail_sends(false);
        assert!(alice.broadcast(Bytes::new(), DeliveryMode::Reliable).is_ok());
    }
}
