//! Bulk loading and result output
//!
//! Loading is line oriented: [`load_lines`] feeds every line of a source to
//! a [`LineParser`] closure, which adds vertices and edges to the open graph.
//! Output visits owned vertices and local edges only, so running the writers
//! on every machine emits each vertex and edge exactly once.

pub mod loader;
pub mod writer;

pub use loader::{load_lines, parse_edge_list, LineParser};
pub use writer::{write_edges, write_vertices, GraphWriter, JsonLinesWriter};

use crate::graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IoResult<T> = Result<T, IoError>;
