//! Vertex placement
//!
//! A partitioner maps each vertex to the machine that owns it. The engines are
//! correct for any deterministic assignment.

use super::types::VertexId;
use crate::cluster::MachineId;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

pub trait Partitioner: Send + Sync + Debug {
    /// Machine owning `vertex` in a cluster of `num_machines`
    fn owner(&self, vertex: VertexId, num_machines: usize) -> MachineId;
}

/// Default placement: a 64-bit mix of the id, modulo the cluster size.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn owner(&self, vertex: VertexId, num_machines: usize) -> MachineId {
        // splitmix64 finalizer
        let mut x = vertex.as_u64();
        x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        x ^= x >> 31;
        (x % num_machines as u64) as MachineId
    }
}

/// `id % num_machines`, handy for hand-built test layouts
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuloPartitioner;

impl Partitioner for ModuloPartitioner {
    fn owner(&self, vertex: VertexId, num_machines: usize) -> MachineId {
        (vertex.as_u64() % num_machines as u64) as MachineId
    }
}

/// Partitioner selection for configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PartitionerKind {
    #[default]
    Hash,
    Modulo,
}

impl PartitionerKind {
    pub fn build(&self) -> Arc<dyn Partitioner> {
        match self {
            PartitionerKind::Hash => Arc::new(HashPartitioner),
            PartitionerKind::Modulo => Arc::new(ModuloPartitioner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_partitioner_in_range_and_stable() {
        let p = HashPartitioner;
        for id in 0..1000u64 {
            let owner = p.owner(VertexId::new(id), 7);
            assert!(owner < 7);
            assert_eq!(owner, p.owner(VertexId::new(id), 7));
        }
    }

    #[test]
    fn test_hash_partitioner_spreads_sequential_ids() {
        let p = HashPartitioner;
        let mut counts = [0usize; 4];
        for id in 0..4000u64 {
            counts[p.owner(VertexId::new(id), 4)] += 1;
        }
        assert!(counts.iter().all(|&c| c > 800), "skewed placement: {:?}", counts);
    }

    #[test]
    fn test_modulo_partitioner() {
        let p = ModuloPartitioner;
        assert_eq!(p.owner(VertexId::new(5), 3), 2);
        assert_eq!(p.owner(VertexId::new(6), 3), 0);
        assert_eq!(p.owner(VertexId::new(6), 1), 0);
    }

    #[test]
    fn test_kind_build() {
        let p = PartitionerKind::Modulo.build();
        assert_eq!(p.owner(VertexId::new(9), 4), 1);
        assert_eq!(PartitionerKind::default(), PartitionerKind::Hash);
    }
}
