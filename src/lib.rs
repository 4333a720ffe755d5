#![doc = include_str!("../README.md")]

pub mod forest;
pub mod graph;
pub mod handle;
pub mod library;
pub mod tree;

pub use forest::{Forest, ForestCursor, ForestError, TreeCaller};
pub use graph::{Edge, Graph, Nid, Pid, PortId, Vid};
pub use handle::{Node, Pin, Tnode};
pub use library::{GraphCursor, GraphLibrary, GraphRef, LibraryError};
pub use tree::{Tree, TreePos, INVALID, ROOT};
