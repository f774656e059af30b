//! All-to-all batch exchange
//!
//! Each call to [`Exchange::exchange`] is one epoch: every machine sends exactly
//! one (possibly empty) batch to every machine, itself included, and waits for
//! one batch from every machine. A completed exchange therefore also acts as a
//! barrier: no machine leaves epoch `e` before every machine has entered it.

use super::{CommResult, Endpoint, MachineId};
use std::collections::VecDeque;

/// One epoch's batch from a single machine
#[derive(Debug)]
pub struct Batch<T> {
    epoch: u64,
    items: Vec<T>,
}

pub struct Exchange<T> {
    endpoint: Endpoint<Batch<T>>,
    epoch: u64,
    /// Batches of a later epoch received while still collecting the current one
    early: VecDeque<(MachineId, Batch<T>)>,
}

impl<T: Send + 'static> Exchange<T> {
    pub fn new(endpoint: Endpoint<Batch<T>>) -> Self {
        Self {
            endpoint,
            epoch: 0,
            early: VecDeque::new(),
        }
    }

    pub fn machine(&self) -> MachineId {
        self.endpoint.machine()
    }

    pub fn num_machines(&self) -> usize {
        self.endpoint.num_machines()
    }

    /// Empty outgoing buffers, one per machine
    pub fn buffers(&self) -> Vec<Vec<T>> {
        (0..self.num_machines()).map(|_| Vec::new()).collect()
    }

    /// Send `outgoing[m]` to machine `m` for every `m`, then collect what every
    /// machine sent here. The result is indexed by source machine.
    pub async fn exchange(&mut self, outgoing: Vec<Vec<T>>) -> CommResult<Vec<Vec<T>>> {
        let epoch = self.epoch;
        self.epoch += 1;

        let num_machines = self.num_machines();
        let mut outgoing = outgoing;
        outgoing.resize_with(num_machines, Vec::new);
        for (target, items) in outgoing.into_iter().enumerate() {
            self.endpoint.send(target, Batch { epoch, items })?;
        }

        let mut incoming: Vec<Option<Vec<T>>> = (0..num_machines).map(|_| None).collect();
        let mut pending = num_machines;

        let mut deferred = VecDeque::new();
        while let Some((from, batch)) = self.early.pop_front() {
            if batch.epoch == epoch {
                incoming[from] = Some(batch.items);
                pending -= 1;
            } else {
                deferred.push_back((from, batch));
            }
        }
        self.early = deferred;

        while pending > 0 {
            let envelope = self.endpoint.recv().await?;
            if envelope.payload.epoch == epoch {
                incoming[envelope.from] = Some(envelope.payload.items);
                pending -= 1;
            } else {
                self.early.push_back((envelope.from, envelope.payload));
            }
        }

        Ok(incoming.into_iter().map(Option::unwrap_or_default).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::network::ChannelSet;

    #[tokio::test]
    async fn test_exchange_routes_batches() {
        let mut set: ChannelSet<Batch<(usize, u32)>> = ChannelSet::new(3);
        let mut handles = Vec::new();
        for id in 0..3 {
            let mut exchange = Exchange::new(set.take(id).unwrap());
            handles.push(tokio::spawn(async move {
                let mut received = Vec::new();
                for round in 0..3u32 {
                    let mut out = exchange.buffers();
                    for (target, buf) in out.iter_mut().enumerate() {
                        buf.push((target, round));
                    }
                    let incoming = exchange.exchange(out).await.unwrap();
                    received.push(incoming);
                }
                (id, received)
            }));
        }

        for handle in handles {
            let (id, rounds) = handle.await.unwrap();
            for (round, incoming) in rounds.into_iter().enumerate() {
                assert_eq!(incoming.len(), 3);
                for batch in incoming {
                    assert_eq!(batch, vec![(id, round as u32)]);
                }
            }
        }
    }
}
