//! FIFO reader/writer lock queue per owned vertex

use super::LockMode;
use crate::graph::VertexId;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

struct LockState<W> {
    readers: usize,
    writer: bool,
    queue: VecDeque<(LockMode, W)>,
}

impl<W> LockState<W> {
    fn new() -> Self {
        Self {
            readers: 0,
            writer: false,
            queue: VecDeque::new(),
        }
    }

    fn can_grant(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => !self.writer,
            LockMode::Write => !self.writer && self.readers == 0,
        }
    }

    fn grant(&mut self, mode: LockMode) {
        match mode {
            LockMode::Read => self.readers += 1,
            LockMode::Write => self.writer = true,
        }
    }

    fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writer && self.queue.is_empty()
    }
}

/// Lock table for the vertices a machine owns.
///
/// Requests are granted strictly in arrival order; consecutive readers at the
/// head of a queue are granted together. `W` identifies whoever waits.
pub struct LockTable<W> {
    locks: FxHashMap<VertexId, LockState<W>>,
}

impl<W> Default for LockTable<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> LockTable<W> {
    pub fn new() -> Self {
        Self {
            locks: FxHashMap::default(),
        }
    }

    /// Request `mode` on `vertex`. Returns the waiter back if the lock was
    /// granted immediately, otherwise queues it.
    pub fn acquire(&mut self, vertex: VertexId, mode: LockMode, waiter: W) -> Option<W> {
        let state = self.locks.entry(vertex).or_insert_with(LockState::new);
        if state.queue.is_empty() && state.can_grant(mode) {
            state.grant(mode);
            Some(waiter)
        } else {
            state.queue.push_back((mode, waiter));
            None
        }
    }

    /// Release a held lock and return the waiters that now hold it.
    pub fn release(&mut self, vertex: VertexId, mode: LockMode) -> Vec<W> {
        let mut granted = Vec::new();
        let Some(state) = self.locks.get_mut(&vertex) else {
            return granted;
        };
        match mode {
            LockMode::Read => state.readers = state.readers.saturating_sub(1),
            LockMode::Write => state.writer = false,
        }

        while let Some((next, _)) = state.queue.front() {
            let next = *next;
            if !state.can_grant(next) {
                break;
            }
            if let Some((_, waiter)) = state.queue.pop_front() {
                state.grant(next);
                granted.push(waiter);
            }
            if next == LockMode::Write {
                break;
            }
        }

        if state.is_idle() {
            self.locks.remove(&vertex);
        }
        granted
    }

    /// Vertices with a holder or a waiter
    pub fn num_locked(&self) -> usize {
        self.locks.len()
    }

    pub fn num_waiting(&self, vertex: VertexId) -> usize {
        self.locks.get(&vertex).map(|s| s.queue.len()).unwrap_or(0)
    }
}
