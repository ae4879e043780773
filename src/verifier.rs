//! A verifier for the def-use edges of a graph.
//!
//! Every input reference from a consumer to a producer in the same space must show up in the
//! producer's output list exactly once, and nothing else may. The verifier compares the two
//! directions node by node and reports every mismatch it finds instead of stopping at the first.
//!
//! The matcher runs it on the input graph after partitioning and on the compacted output graph,
//! when the `verify_graph` setting is on.

use crate::entity::EntityRef;
use crate::ir::{Graph, Node};
use core::fmt;
use thiserror::Error;

/// A verifier error.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("{location}: {message}")]
pub struct VerifierError {
    /// The node whose output list is wrong.
    pub location: Node,
    /// The error message.
    pub message: String,
}

/// Result of a step in the verification process.
///
/// Functions that return `VerifierStepResult` should also take a mutable reference to
/// `VerifierErrors` as argument in order to report errors.
pub type VerifierStepResult = Result<(), ()>;

/// Result of a verification operation.
pub type VerifierResult<T> = Result<T, VerifierErrors>;

/// List of verifier errors.
#[derive(Error, Debug, Default, PartialEq, Eq, Clone)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl VerifierErrors {
    /// Return a new `VerifierErrors` struct.
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Return whether no errors were reported.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return whether one or more errors were reported.
    #[inline]
    pub fn has_error(&self) -> bool {
        !self.0.is_empty()
    }

    /// Return a `VerifierStepResult` that is fatal if at least one error was reported.
    #[inline]
    pub fn as_result(&self) -> VerifierStepResult {
        if self.is_empty() { Ok(()) } else { Err(()) }
    }

    /// Report an error, adding it to the list of errors.
    pub fn report(&mut self, location: Node, message: impl Into<String>) {
        self.0.push(VerifierError {
            location,
            message: message.into(),
        });
    }
}

impl From<Vec<VerifierError>> for VerifierErrors {
    fn from(v: Vec<VerifierError>) -> Self {
        Self(v)
    }
}

impl From<VerifierErrors> for Vec<VerifierError> {
    fn from(errors: VerifierErrors) -> Vec<VerifierError> {
        errors.0
    }
}

impl fmt::Display for VerifierErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "- {err}")?;
        }
        Ok(())
    }
}

/// Check def-use symmetry of every node in `graph`.
pub fn verify_def_use(graph: &Graph) -> VerifierResult<()> {
    let mut errors = VerifierErrors::default();
    let mut expected: Vec<Vec<Node>> = vec![Vec::new(); graph.num_nodes()];

    for user in graph.nodes() {
        let defs = graph
            .inputs(user)
            .flatten()
            .chain(graph.prec(user).iter().copied());
        for def in defs {
            if !graph.contains(def) {
                errors.report(user, format!("refers to missing node {def}"));
                continue;
            }
            if graph.is_new(def) == graph.is_new(user) {
                expected[def.index()].push(user);
            }
        }
    }

    for def in graph.nodes() {
        let want = &mut expected[def.index()];
        want.sort();
        let mut have = graph.outs(def).to_vec();
        have.sort();
        if *want != have {
            errors.report(
                def,
                format!("outputs {have:?} do not match input references {want:?}"),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{NodeData, Opcode};

    #[test]
    fn symmetric_graph_passes() {
        let mut g = Graph::new();
        let a = g.add_node(NodeData::new(Opcode::ConI));
        let b = g.add_node(NodeData::new(Opcode::ConI));
        let s = g.add_node(NodeData::new(Opcode::AddI).with_inputs(&[None, Some(a), Some(b)]));
        let copy = g.clone_node(s);
        g.set_req(copy, 1, None);
        g.add_prec(s, copy);
        assert_eq!(verify_def_use(&g), Ok(()));
    }

    #[test]
    fn display_lists_errors() {
        let mut errors = VerifierErrors::new();
        assert!(errors.as_result().is_ok());
        errors.report(Node::from_u32(3), "outputs [] do not match input references [n4]");
        assert!(errors.has_error());
        assert_eq!(
            errors.to_string(),
            "- n3: outputs [] do not match input references [n4]\n"
        );
    }
}
