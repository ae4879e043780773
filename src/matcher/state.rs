//! Labeling states.
//!
//! Every node labeled while matching one tree gets a [`State`]: the cheapest rule per operand
//! class plus the states of its match-tree children. States only live until the tree is
//! reduced, so they are bump-allocated in a [`StateArena`] that is reset per tree. Handles carry
//! the arena generation they were allocated in and may not outlive it.

use crate::grammar::{Entry, Leaf, OperandClass};
use crate::ir::Node;
use smallvec::SmallVec;

/// A handle to a state of the current tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StateRef {
    index: u32,
    generation: u32,
}

/// The labels of one node of the tree being matched.
#[derive(Clone, Debug)]
pub struct State {
    /// The labeled node.
    pub leaf: Node,
    /// How the node was labeled: through its opcode, or as a register.
    pub kind: Leaf,
    /// States of the match-edge children, in input order.
    pub kids: SmallVec<[StateRef; 2]>,
    /// The cheapest entry per operand class.
    pub entries: Vec<Option<Entry>>,
}

impl State {
    /// The cheapest entry producing `class`, if any.
    pub fn entry(&self, class: OperandClass) -> Option<Entry> {
        use crate::entity::EntityRef;
        self.entries.get(class.index()).copied().flatten()
    }
}

/// Bump allocator of states, reset for every tree.
#[derive(Debug, Default)]
pub struct StateArena {
    states: Vec<State>,
    generation: u32,
}

impl StateArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every state, invalidating all outstanding handles.
    pub fn reset(&mut self) {
        self.states.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Allocate a state.
    pub fn alloc(&mut self, state: State) -> StateRef {
        let index = self.states.len() as u32;
        self.states.push(state);
        StateRef {
            index,
            generation: self.generation,
        }
    }

    /// The state behind `r`.
    ///
    /// Panics if `r` was allocated before the last reset.
    pub fn get(&self, r: StateRef) -> &State {
        assert_eq!(
            r.generation, self.generation,
            "stale state handle {r:?} used after the arena was reset"
        );
        &self.states[r.index as usize]
    }

    /// Number of live states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Are there no live states?
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::IdealReg;

    fn leaf_state(n: u32) -> State {
        State {
            leaf: Node::new(n as usize),
            kind: Leaf::Reg(IdealReg::RegI),
            kids: SmallVec::new(),
            entries: Vec::new(),
        }
    }

    #[test]
    fn handles_resolve_until_reset() {
        let mut arena = StateArena::new();
        let a = arena.alloc(leaf_state(1));
        let b = arena.alloc(leaf_state(2));
        assert_eq!(arena.get(a).leaf, Node::new(1));
        assert_eq!(arena.get(b).leaf, Node::new(2));
        assert_eq!(arena.len(), 2);
        arena.reset();
        assert!(arena.is_empty());
        let c = arena.alloc(leaf_state(3));
        assert_ne!(a, c);
    }

    #[test]
    #[should_panic(expected = "stale state handle")]
    fn stale_handles_panic() {
        let mut arena = StateArena::new();
        let a = arena.alloc(leaf_state(1));
        arena.reset();
        arena.alloc(leaf_state(2));
        arena.get(a);
    }
}
