//! Core type definitions for the distributed graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique identifier for a vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct VertexId(pub u64);

impl VertexId {
    /// Reserved id that can never be assigned to a user vertex
    pub const SENTINEL: VertexId = VertexId(u64::MAX);

    pub fn new(id: u64) -> Self {
        VertexId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VertexId({})", self.0)
    }
}

impl From<u64> for VertexId {
    fn from(id: u64) -> Self {
        VertexId(id)
    }
}

/// Dense index of a vertex inside one machine's arena
pub type LocalVid = usize;

/// Dense index of an edge inside one machine's arena
pub type LocalEid = usize;

/// Which adjacent edges of a vertex take part in a gather or scatter phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    #[default]
    None,
    In,
    Out,
    All,
}

impl EdgeDirection {
    pub fn includes_in(&self) -> bool {
        matches!(self, EdgeDirection::In | EdgeDirection::All)
    }

    pub fn includes_out(&self) -> bool {
        matches!(self, EdgeDirection::Out | EdgeDirection::All)
    }

    pub fn is_none(&self) -> bool {
        *self == EdgeDirection::None
    }
}

impl fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeDirection::None => "none",
            EdgeDirection::In => "in",
            EdgeDirection::Out => "out",
            EdgeDirection::All => "all",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_id() {
        let id = VertexId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(format!("{}", id), "VertexId(42)");

        let id2: VertexId = 100.into();
        assert_eq!(id2.as_u64(), 100);
        assert!(id < id2);
    }

    #[test]
    fn test_sentinel() {
        assert!(VertexId::SENTINEL.is_sentinel());
        assert!(!VertexId::new(0).is_sentinel());
        assert_eq!(VertexId::SENTINEL.as_u64(), u64::MAX);
    }

    #[test]
    fn test_edge_direction() {
        assert!(EdgeDirection::All.includes_in());
        assert!(EdgeDirection::All.includes_out());
        assert!(EdgeDirection::In.includes_in());
        assert!(!EdgeDirection::In.includes_out());
        assert!(!EdgeDirection::None.includes_in());
        assert!(EdgeDirection::None.is_none());
        assert_eq!(EdgeDirection::default(), EdgeDirection::None);
        assert_eq!(format!("{}", EdgeDirection::Out), "out");
    }
}
