//! IR entity references.
//!
//! Nodes in the graph reference each other through small `u32` handles into the graph's node
//! table instead of Rust references. Rust's ownership rules make a cyclic, mutable graph of
//! references awkward, and 32-bit handles keep the edge arrays compact.
//!
//! Compact data structures use the `PackedOption<EntityRef>` representation, while function
//! arguments and return values prefer the more Rust-like `Option<EntityRef>` variant.

use crate::entity::entity_impl;

/// An opaque reference to a node of the ideal or machine graph.
///
/// Input nodes and the machine nodes built from them share one table while matching is in
/// progress. After matching, the machine nodes are renumbered from zero into a fresh table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(u32);
entity_impl!(Node, "n");

/// An alias-analysis class of memory.
///
/// Two memory operations with different alias indices never touch the same location.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AliasIdx(u32);
entity_impl!(AliasIdx, "alias");

impl AliasIdx {
    /// The alias class covering all of memory.
    pub const BOTTOM: Self = Self(0);

    /// The alias class of raw, untyped memory.
    pub const RAW: Self = Self(1);

    /// Create an alias index from its number.
    pub fn with_number(n: u32) -> Self {
        Self(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::entity::packed_option::PackedOption;
    use core::mem;

    #[test]
    fn node_display() {
        assert_eq!(Node::new(7).to_string(), "n7");
        assert_eq!(AliasIdx::RAW.to_string(), "alias1");
    }

    #[test]
    fn packed_node_is_compact() {
        assert_eq!(mem::size_of::<PackedOption<Node>>(), mem::size_of::<Node>());
    }
}
