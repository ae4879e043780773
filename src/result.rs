//! Result and error types representing the outcome of matching a compilation unit.

use crate::ir::{Node, Opcode};
use crate::verifier::VerifierErrors;
use thiserror::Error;

/// A matching error.
///
/// Every variant means the same thing to the caller: the unit cannot be compiled by this
/// backend and a simpler execution strategy has to be selected. None of them are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// A tree root has no valid covering in the grammar.
    #[error("no matching rule for {opcode} node {node}")]
    GrammarMiss {
        /// The root of the tree that could not be covered.
        node: Node,
        /// Its opcode.
        opcode: Opcode,
    },

    /// A stack slot or argument area does not fit in the fixed-width register mask encoding.
    #[error("not representable in a register mask: {0}")]
    Unrepresentable(&'static str),

    /// A recursion-depth or node-count limit was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(&'static str),

    /// A list of graph verifier errors.
    ///
    /// This always represents a bug, either in the code that built the input graph or in the
    /// matcher itself.
    #[error("Verifier errors")]
    Verifier(#[from] VerifierErrors),

    /// The rebuilt graph lost its root or still refers to input nodes.
    #[error("graph lost")]
    GraphLost,
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error type.
pub type CodegenResult<T> = Result<T, CodegenError>;
