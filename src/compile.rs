//! Compilation units and the matching entry point.

use crate::env::CompileEnv;
use crate::ir::{Graph, Node, Signature};
use crate::matcher::{MatchOutput, Matcher};
use crate::result::CodegenResult;
use crate::timing;
use std::sync::Arc;

/// One method or stub to be matched: its ideal graph and what is known about its frame.
///
/// Use [`GraphBuilder`](crate::ir::GraphBuilder) to create one.
#[derive(Clone, Debug)]
pub struct CompileUnit {
    /// The ideal graph.
    pub graph: Graph,
    /// The root, whose inputs are the exits.
    pub root: Node,
    /// The node standing for values that do not exist.
    pub top: Node,
    /// The entry, projecting control, I/O, memory, frame pointer, return address and parameters.
    pub start: Node,
    /// Parameter and result types.
    pub signature: Signature,
    /// A method, or a runtime stub that may not rely on save-on-entry registers.
    pub is_method: bool,
    /// Stack slots reserved below the incoming arguments, such as monitor slots.
    pub fixed_slots: u32,
}

/// Match `unit` in `env`.
///
/// This is the same as running a fresh [`Matcher`], with the whole step timed.
pub fn match_unit(env: Arc<CompileEnv>, unit: CompileUnit) -> CodegenResult<MatchOutput> {
    let _tt = timing::match_unit();
    log::debug!(
        "matching {} nodes on {}",
        unit.graph.num_nodes(),
        env.platform().name()
    );
    Matcher::new(env, unit).run()
}
