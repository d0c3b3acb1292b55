//! Mutable, arena-backed parse tree that serializes back to the exact
//! source text.
//!
//! Nodes are addressed by index into a per-tree arena. Every child keeps a
//! parent index that is used for upward lookup only; ownership always flows
//! root-down through the children lists.

mod kind;
mod text;
mod tree;

pub use kind::SyntaxKind;
pub use text::split_lines;
pub use tree::{NodeId, Position, Tree};
