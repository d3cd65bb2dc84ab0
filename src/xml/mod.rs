/// Owned XML element tree for WordprocessingML parts.
///
/// The replacement engine needs in-place structural edits (clone a table
/// row, remove a paragraph, splice runs), which a streaming reader cannot
/// provide. This module parses a part into a small arena-backed tree,
/// exposes the structural queries the replacers need, and serializes the
/// tree back to bytes.
pub mod tree;

pub use tree::{NodeId, XmlError, XmlTree};
