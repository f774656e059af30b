//! Distributed scheduler
//!
//! - [`Message`]: signal payloads and how pending signals coalesce
//! - [`Scheduler`]: per-machine queues ([`FifoScheduler`], [`PriorityScheduler`])
//! - [`ActiveSet`]: a machine's view of the distributed active set
//! - [`TerminationDetector`]: quiescence detection for the asynchronous engine

pub mod active_set;
pub mod message;
pub mod queue;
pub mod termination;

pub use active_set::{ActiveSet, VertexIndex};
pub use message::{Latest, MaxPriority, Message, MinValue, Summed};
pub use queue::{FifoScheduler, PriorityScheduler, Scheduler};
pub use termination::{Step, TerminationDetector, Token};

use serde::{Deserialize, Serialize};

/// Queue discipline for the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    #[default]
    Fifo,
    Priority,
}

impl SchedulerKind {
    pub fn build<M: Message>(&self) -> Box<dyn Scheduler<M>> {
        match self {
            SchedulerKind::Fifo => Box::new(FifoScheduler::new()),
            SchedulerKind::Priority => Box::new(PriorityScheduler::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_build() {
        let fifo = SchedulerKind::Fifo.build::<()>();
        assert_eq!(fifo.name(), "fifo");
        let priority = SchedulerKind::Priority.build::<MaxPriority>();
        assert_eq!(priority.name(), "priority");
        assert_eq!(SchedulerKind::default(), SchedulerKind::Fifo);
    }
}
