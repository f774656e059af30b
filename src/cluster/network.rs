//! Point-to-point messaging between machines

use super::{CommError, CommResult, MachineId};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::error;

/// A message tagged with its sending machine
#[derive(Debug, Clone)]
pub struct Envelope<M> {
    pub from: MachineId,
    pub payload: M,
}

/// One typed channel per machine, created once per registration index and
/// shared by every machine of the cluster.
pub(crate) struct ChannelSet<M> {
    senders: Arc<Vec<UnboundedSender<Envelope<M>>>>,
    receivers: Vec<Option<UnboundedReceiver<Envelope<M>>>>,
}

impl<M: Send + 'static> ChannelSet<M> {
    pub(crate) fn new(num_machines: usize) -> Self {
        let mut senders = Vec::with_capacity(num_machines);
        let mut receivers = Vec::with_capacity(num_machines);
        for _ in 0..num_machines {
            let (tx, rx) = unbounded_channel();
            senders.push(tx);
            receivers.push(Some(rx));
        }
        Self {
            senders: Arc::new(senders),
            receivers,
        }
    }

    /// Hand out the endpoint of `machine`. Each endpoint can be taken once.
    pub(crate) fn take(&mut self, machine: MachineId) -> Option<Endpoint<M>> {
        let inbox = self.receivers.get_mut(machine)?.take()?;
        Some(Endpoint {
            outbox: Outbox {
                from: machine,
                peers: Arc::clone(&self.senders),
            },
            inbox,
        })
    }
}

/// Cloneable sending half of an endpoint.
///
/// Delivery between any pair of machines is reliable and FIFO.
pub struct Outbox<M> {
    from: MachineId,
    peers: Arc<Vec<UnboundedSender<Envelope<M>>>>,
}

impl<M> Clone for Outbox<M> {
    fn clone(&self) -> Self {
        Self {
            from: self.from,
            peers: Arc::clone(&self.peers),
        }
    }
}

impl<M: Send + 'static> Outbox<M> {
    /// Machine this outbox sends from
    pub fn machine(&self) -> MachineId {
        self.from
    }

    /// Number of machines reachable through this outbox (including itself)
    pub fn num_machines(&self) -> usize {
        self.peers.len()
    }

    /// Send a message to `target`
    pub fn send(&self, target: MachineId, payload: M) -> CommResult<()> {
        let peer = self
            .peers
            .get(target)
            .ok_or(CommError::Disconnected(target))?;
        peer.send(Envelope {
            from: self.from,
            payload,
        })
        .map_err(|_| {
            error!("Machine {} dropped its inbox", target);
            CommError::Disconnected(target)
        })
    }
}

impl<M: Clone + Send + 'static> Outbox<M> {
    /// Send a copy of `payload` to every other machine. Returns the number of
    /// messages sent.
    pub fn broadcast(&self, payload: M) -> CommResult<usize> {
        let mut sent = 0;
        for target in 0..self.peers.len() {
            if target != self.from {
                self.send(target, payload.clone())?;
                sent += 1;
            }
        }
        Ok(sent)
    }
}

/// A machine's typed endpoint: its inbox plus an [`Outbox`]
pub struct Endpoint<M> {
    outbox: Outbox<M>,
    inbox: UnboundedReceiver<Envelope<M>>,
}

impl<M: Send + 'static> Endpoint<M> {
    /// Machine owning this endpoint
    pub fn machine(&self) -> MachineId {
        self.outbox.from
    }

    pub fn num_machines(&self) -> usize {
        self.outbox.num_machines()
    }

    /// Cloneable sending half, for tasks that send but never receive
    pub fn outbox(&self) -> Outbox<M> {
        self.outbox.clone()
    }

    pub fn send(&self, target: MachineId, payload: M) -> CommResult<()> {
        self.outbox.send(target, payload)
    }

    /// Wait for the next message
    pub async fn recv(&mut self) -> CommResult<Envelope<M>> {
        self.inbox
            .recv()
            .await
            .ok_or(CommError::Disconnected(self.outbox.from))
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<Envelope<M>> {
        self.inbox.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_receive() {
        let mut set: ChannelSet<u32> = ChannelSet::new(2);
        let a = set.take(0).unwrap();
        let mut b = set.take(1).unwrap();

        a.send(1, 7).unwrap();
        a.send(1, 8).unwrap();

        let first = b.recv().await.unwrap();
        assert_eq!(first.from, 0);
        assert_eq!(first.payload, 7);
        assert_eq!(b.recv().await.unwrap().payload, 8);
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_broadcast_skips_self() {
        let mut set: ChannelSet<&'static str> = ChannelSet::new(3);
        let mut a = set.take(0).unwrap();
        let mut b = set.take(1).unwrap();
        let mut c = set.take(2).unwrap();

        assert_eq!(a.outbox().broadcast("stop").unwrap(), 2);
        assert_eq!(b.recv().await.unwrap().payload, "stop");
        assert_eq!(c.recv().await.unwrap().payload, "stop");
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn test_endpoint_taken_once() {
        let mut set: ChannelSet<u8> = ChannelSet::new(1);
        assert!(set.take(0).is_some());
        assert!(set.take(0).is_none());
        assert!(set.take(5).is_none());
    }

    #[test]
    fn test_send_to_unknown_machine() {
        let mut set: ChannelSet<u8> = ChannelSet::new(1);
        let a = set.take(0).unwrap();
        assert_eq!(a.send(3, 1), Err(CommError::Disconnected(3)));
    }
}
