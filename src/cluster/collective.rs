//! Barrier and all-gather / all-reduce collectives

use super::{CommError, CommResult, MachineId};
use parking_lot::Mutex;
use std::any::Any;
use tokio::sync::Barrier;

/// Collective operations shared by all machines of a cluster.
///
/// Every machine must enter every collective, in the same order.
pub struct Collective {
    barrier: Barrier,
    slots: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
}

impl Collective {
    pub fn new(num_machines: usize) -> Self {
        Self {
            barrier: Barrier::new(num_machines),
            slots: Mutex::new((0..num_machines).map(|_| None).collect()),
        }
    }

    pub async fn barrier(&self) {
        self.barrier.wait().await;
    }

    /// Contribute `value` and receive every machine's contribution, indexed
    /// by machine id.
    pub async fn all_gather<T>(&self, machine: MachineId, value: T) -> CommResult<Vec<T>>
    where
        T: Clone + Send + 'static,
    {
        {
            let mut slots = self.slots.lock();
            slots[machine] = Some(Box::new(value));
        }
        self.barrier.wait().await;

        let gathered = {
            let slots = self.slots.lock();
            slots
                .iter()
                .map(|slot| {
                    slot.as_ref()
                        .and_then(|boxed| boxed.downcast_ref::<T>())
                        .cloned()
                })
                .collect::<Option<Vec<T>>>()
        };

        // Nobody may overwrite a slot before everyone has read it.
        self.barrier.wait().await;
        gathered.ok_or(CommError::CollectiveMismatch)
    }

    /// Fold every machine's contribution with `op`, in machine order. All
    /// machines receive the same result.
    pub async fn all_reduce<T, F>(&self, machine: MachineId, value: T, op: F) -> CommResult<T>
    where
        T: Clone + Send + 'static,
        F: Fn(T, T) -> T,
    {
        let values = self.all_gather(machine, value).await?;
        values
            .into_iter()
            .reduce(op)
            .ok_or(CommError::CollectiveMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_all_gather_and_reduce() {
        let collective = Arc::new(Collective::new(3));
        let mut handles = Vec::new();
        for id in 0..3usize {
            let collective = Arc::clone(&collective);
            handles.push(tokio::spawn(async move {
                let all = collective.all_gather(id, id * 10).await.unwrap();
                let sum = collective.all_reduce(id, id as u64 + 1, |a, b| a + b).await.unwrap();
                (all, sum)
            }));
        }
        for handle in handles {
            let (all, sum) = handle.await.unwrap();
            assert_eq!(all, vec![0, 10, 20]);
            assert_eq!(sum, 6);
        }
    }

    #[tokio::test]
    async fn test_single_machine_collective() {
        let collective = Collective::new(1);
        collective.barrier().await;
        let any = collective.all_reduce(0, true, |a, b| a || b).await.unwrap();
        assert!(any);
    }
}
