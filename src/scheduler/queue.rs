//! Per-machine active-vertex queues

use super::message::Message;
use crate::graph::LocalVid;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// Active set of locally owned vertices with coalesced messages.
///
/// A vertex is present at most once; scheduling it again merges messages.
pub trait Scheduler<M: Message>: Send + Sync {
    /// Insert `vertex` or merge into its pending message. Returns true if
    /// the vertex was not already pending.
    fn schedule(&self, vertex: LocalVid, message: M) -> bool;

    /// Remove the next vertex to run
    fn pop(&self) -> Option<(LocalVid, M)>;

    /// Remove every pending vertex, in pop order
    fn drain(&self) -> Vec<(LocalVid, M)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name(&self) -> &'static str;
}

struct FifoState<M> {
    queue: VecDeque<LocalVid>,
    pending: FxHashMap<LocalVid, M>,
}

/// First-signaled, first-run
pub struct FifoScheduler<M> {
    state: Mutex<FifoState<M>>,
}

impl<M: Message> FifoScheduler<M> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FifoState {
                queue: VecDeque::new(),
                pending: FxHashMap::default(),
            }),
        }
    }
}

impl<M: Message> Default for FifoScheduler<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message> Scheduler<M> for FifoScheduler<M> {
    fn schedule(&self, vertex: LocalVid, message: M) -> bool {
        let mut state = self.state.lock();
        if let Some(pending) = state.pending.get_mut(&vertex) {
            pending.merge(message);
            return false;
        }
        state.pending.insert(vertex, message);
        state.queue.push_back(vertex);
        true
    }

    fn pop(&self) -> Option<(LocalVid, M)> {
        let mut state = self.state.lock();
        let vertex = state.queue.pop_front()?;
        let message = state.pending.remove(&vertex)?;
        Some((vertex, message))
    }

    fn drain(&self) -> Vec<(LocalVid, M)> {
        let mut state = self.state.lock();
        let queue = std::mem::take(&mut state.queue);
        let mut pending = std::mem::take(&mut state.pending);
        queue
            .into_iter()
            .filter_map(|v| pending.remove(&v).map(|m| (v, m)))
            .collect()
    }

    fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}

/// Heap entry. Ordered by priority, then by insertion sequence (earlier first).
#[derive(Debug, Clone, Copy)]
struct Entry {
    priority: f64,
    seq: u64,
    version: u64,
    vertex: LocalVid,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| other.version.cmp(&self.version))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Pending<M> {
    message: M,
    seq: u64,
    version: u64,
}

struct PriorityState<M> {
    /// May hold stale entries for re-prioritized vertices; those are
    /// discarded by checking the version against `pending`.
    heap: BinaryHeap<Entry>,
    pending: FxHashMap<LocalVid, Pending<M>>,
    next_seq: u64,
}

/// Highest message priority first; ties run in signal order
pub struct PriorityScheduler<M> {
    state: Mutex<PriorityState<M>>,
}

impl<M: Message> PriorityScheduler<M> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PriorityState {
                heap: BinaryHeap::new(),
                pending: FxHashMap::default(),
                next_seq: 0,
            }),
        }
    }
}

impl<M: Message> Default for PriorityScheduler<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message> PriorityState<M> {
    fn pop(&mut self) -> Option<(LocalVid, M)> {
        while let Some(entry) = self.heap.pop() {
            let current = match self.pending.get(&entry.vertex) {
                Some(p) => p.version == entry.version,
                None => false,
            };
            if current {
                return self.pending.remove(&entry.vertex).map(|p| (entry.vertex, p.message));
            }
        }
        None
    }
}

impl<M: Message> Scheduler<M> for PriorityScheduler<M> {
    fn schedule(&self, vertex: LocalVid, message: M) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(pending) = state.pending.get_mut(&vertex) {
            let before = pending.message.priority();
            pending.message.merge(message);
            let after = pending.message.priority();
            if after.total_cmp(&before) != Ordering::Equal {
                pending.version += 1;
                state.heap.push(Entry {
                    priority: after,
                    seq: pending.seq,
                    version: pending.version,
                    vertex,
                });
            }
            return false;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry {
            priority: message.priority(),
            seq,
            version: 0,
            vertex,
        });
        state.pending.insert(
            vertex,
            Pending {
                message,
                seq,
                version: 0,
            },
        );
        true
    }

    fn pop(&self) -> Option<(LocalVid, M)> {
        self.state.lock().pop()
    }

    fn drain(&self) -> Vec<(LocalVid, M)> {
        let mut state = self.state.lock();
        let mut drained = Vec::with_capacity(state.pending.len());
        while let Some(item) = state.pop() {
            drained.push(item);
        }
        state.heap.clear();
        drained
    }

    fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn name(&self) -> &'static str {
        "priority"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::message::{MaxPriority, MinValue, Summed};

    #[test]
    fn test_fifo_order_and_coalescing() {
        let s: FifoScheduler<Summed> = FifoScheduler::new();
        assert!(s.schedule(3, Summed(1.0)));
        assert!(s.schedule(1, Summed(1.0)));
        assert!(!s.schedule(3, Summed(2.0)));
        assert_eq!(s.len(), 2);

        assert_eq!(s.pop(), Some((3, Summed(3.0))));
        assert_eq!(s.pop(), Some((1, Summed(1.0))));
        assert_eq!(s.pop(), None);
        assert!(s.is_empty());
    }

    #[test]
    fn test_fifo_drain() {
        let s: FifoScheduler<()> = FifoScheduler::new();
        for v in [5, 2, 5, 9] {
            s.schedule(v, ());
        }
        let drained: Vec<LocalVid> = s.drain().into_iter().map(|(v, _)| v).collect();
        assert_eq!(drained, vec![5, 2, 9]);
        assert!(s.is_empty());
        // Rescheduling after a drain starts a fresh entry
        assert!(s.schedule(5, ()));
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let s: PriorityScheduler<MaxPriority> = PriorityScheduler::new();
        s.schedule(0, MaxPriority(1.0));
        s.schedule(1, MaxPriority(5.0));
        s.schedule(2, MaxPriority(1.0));
        s.schedule(3, MaxPriority(3.0));

        let order: Vec<LocalVid> = std::iter::from_fn(|| s.pop()).map(|(v, _)| v).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_priority_merge_reprioritizes() {
        let s: PriorityScheduler<MinValue> = PriorityScheduler::new();
        s.schedule(0, MinValue(10.0));
        s.schedule(1, MinValue(5.0));
        assert!(!s.schedule(0, MinValue(1.0)));
        assert_eq!(s.len(), 2);

        assert_eq!(s.pop(), Some((0, MinValue(1.0))));
        assert_eq!(s.pop(), Some((1, MinValue(5.0))));
        // The stale heap entry for vertex 0 is skipped
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn test_priority_drain_order() {
        let s: PriorityScheduler<Summed> = PriorityScheduler::new();
        s.schedule(7, Summed(0.5));
        s.schedule(8, Summed(-2.0));
        s.schedule(7, Summed(3.0));
        let drained = s.drain();
        assert_eq!(drained, vec![(7, Summed(3.5)), (8, Summed(-2.0))]);
        assert!(s.is_empty());
    }
}
