//! Instruction selection.
//!
//! The [`Matcher`] turns one compilation unit's ideal graph into a graph of machine nodes in five
//! steps:
//!
//! 1. Lay out the incoming arguments and the frame, and compute the fixed register masks.
//! 2. Partition the graph into trees: mark the nodes that must be tree roots (shared values,
//!    phis, projections, forced roots) and the ones that are never matched, and reshape a few
//!    node shapes into binary trees.
//! 3. Walk the graph from the root. Every tree root is labeled bottom-up with the cheapest rule
//!    per operand class and then reduced top-down into machine nodes. Everything else is cloned
//!    or turned into a machine projection. New nodes are created above a watermark in the same
//!    node table, and their pending edges to input nodes are retargeted as the walk unwinds.
//! 4. Compute spill and debug masks, the exit input-mask templates and the save-on-entry
//!    projections.
//! 5. Drop the input nodes.
//!
//! Failures are sticky: the first one is recorded and returned from every later call to
//! [`Matcher::run`].

use crate::compile::CompileUnit;
use crate::entity::EntitySet;
use crate::env::CompileEnv;
use crate::ir::{Graph, Node, NodeMap, Signature};
use crate::regmask::RegMask;
use crate::result::{CodegenError, CodegenResult};
use crate::settings::MIN_LABEL_ROOT_DEPTH;
use crate::timing;
use crate::verifier::verify_def_use;
use std::sync::Arc;

mod frame;
mod label;
mod nullcheck;
mod partition;
mod reduce;
mod state;
mod xform;

pub use self::frame::{FrameLayout, MaskTables};
pub use self::nullcheck::NullCheck;
pub use self::state::{State, StateArena, StateRef};

/// The memory state claimed by the tree being matched.
///
/// A tree may fold in loads from a single memory state only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MemClaim {
    /// No memory state claimed yet.
    Unclaimed,
    /// Every folded load must read this memory state.
    Claimed(Node),
}

/// Matches one compilation unit.
pub struct Matcher {
    env: Arc<CompileEnv>,
    graph: Graph,
    root: Node,
    top: Node,
    start: Node,
    signature: Signature,
    is_method: bool,
    fixed_slots: u32,

    // Tree partitioning.
    shared: EntitySet<Node>,
    dontcare: EntitySet<Node>,
    visited: EntitySet<Node>,

    // Old-to-new mapping of matched, cloned and projected nodes.
    old2new: NodeMap,
    // Machine nodes built for constants and narrow-pointer decodes, by ideal leaf.
    shared_nodes: NodeMap,
    new_root: Option<Node>,
    new_top: Option<Node>,

    // Labeling.
    states: StateArena,
    label_depth: u32,
    max_label_depth: u32,

    frame: FrameLayout,
    masks: MaskTables,
    null_checks: Vec<NullCheck>,
    save_on_entry: Vec<Node>,
    failure: Option<CodegenError>,
    matched: bool,
}

impl Matcher {
    /// Prepare to match `unit` in environment `env`.
    pub fn new(env: Arc<CompileEnv>, unit: CompileUnit) -> Self {
        let max_label_depth = env.flags().max_label_root_depth();
        Self {
            env,
            graph: unit.graph,
            root: unit.root,
            top: unit.top,
            start: unit.start,
            signature: unit.signature,
            is_method: unit.is_method,
            fixed_slots: unit.fixed_slots,
            shared: EntitySet::new(),
            dontcare: EntitySet::new(),
            visited: EntitySet::new(),
            old2new: NodeMap::new(),
            shared_nodes: NodeMap::new(),
            new_root: None,
            new_top: None,
            states: StateArena::new(),
            label_depth: 0,
            max_label_depth,
            frame: FrameLayout::default(),
            masks: MaskTables::default(),
            null_checks: Vec::new(),
            save_on_entry: Vec::new(),
            failure: None,
            matched: false,
        }
    }

    /// Match the unit.
    ///
    /// On success the returned output owns the machine graph. Once matching has failed, every
    /// call returns the first failure again.
    pub fn run(&mut self) -> CodegenResult<MatchOutput> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        debug_assert!(!self.matched, "a matcher runs once");
        self.matched = true;

        let flags = self.env.flags().clone();
        if self.max_label_depth < MIN_LABEL_ROOT_DEPTH {
            log::debug!(
                "raising the label depth limit from {} to {MIN_LABEL_ROOT_DEPTH}",
                self.max_label_depth
            );
            self.max_label_depth = MIN_LABEL_ROOT_DEPTH;
        }

        {
            let _tt = timing::frame_layout();
            self.layout_frame()?;
        }
        {
            let _tt = timing::find_shared();
            self.find_shared(self.root);
            self.find_shared(self.top);
        }
        if flags.verify_graph() {
            let _tt = timing::verifier();
            let res = verify_def_use(&self.graph);
            res.map_err(|e| self.fail(e.into()))?;
        }

        self.graph.begin_new_space();
        self.visited = EntitySet::new();
        {
            let _tt = timing::xform();
            let new_top = self.xform(self.top)?;
            self.new_top = Some(new_top);
            let new_root = self.xform(self.root)?;
            self.new_root = Some(new_root);
            self.adopt_root_users(new_root);
            if self.graph.opcode(new_root) != self.graph.opcode(self.root) {
                return Err(self.fail(CodegenError::GraphLost));
            }
            self.validate_null_checks();
        }
        {
            let _tt = timing::fixup_save_on_entry();
            self.fixup_save_on_entry()?;
        }

        let (graph, map) = {
            let _tt = timing::compact();
            let res = self.graph.compact_new_space();
            res.map_err(|e| self.fail(e))?
        };
        if flags.verify_graph() {
            let _tt = timing::verifier();
            let res = verify_def_use(&graph);
            res.map_err(|e| self.fail(e.into()))?;
        }

        let remap = |n: Option<Node>| -> CodegenResult<Node> {
            n.and_then(|n| map[n].expand())
                .ok_or(CodegenError::GraphLost)
        };
        let remapped = (|| {
            let root = remap(self.new_root)?;
            let top = remap(self.new_top)?;
            let start = remap(self.old2new[self.start].expand())?;
            let null_checks = self
                .null_checks
                .iter()
                .map(|c| {
                    Ok(NullCheck {
                        proj: remap(Some(c.proj))?,
                        value: remap(Some(c.value))?,
                        decode: c.decode,
                    })
                })
                .collect::<CodegenResult<Vec<_>>>()?;
            let save_on_entry = self
                .save_on_entry
                .iter()
                .map(|&n| remap(Some(n)))
                .collect::<CodegenResult<Vec<_>>>()?;
            Ok((root, top, start, null_checks, save_on_entry))
        })();
        let (root, top, start, null_checks, save_on_entry) =
            remapped.map_err(|e| self.fail(e))?;

        log::debug!(
            "matched {} input nodes into {} machine graph nodes",
            self.graph.num_nodes() - graph.num_nodes(),
            graph.num_nodes()
        );
        Ok(MatchOutput {
            graph,
            root,
            top,
            start,
            null_checks,
            frame: self.frame,
            masks: self.masks.clone(),
            save_on_entry,
            env: Arc::clone(&self.env),
        })
    }

    /// The first failure, if matching failed.
    pub fn failure(&self) -> Option<&CodegenError> {
        self.failure.as_ref()
    }

    /// The graph being matched, input and machine nodes alike.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Is `n` the root of its own match tree?
    pub fn is_shared(&self, n: Node) -> bool {
        self.shared.contains(n)
    }

    /// Is `n` never matched by the grammar?
    pub fn is_dontcare(&self, n: Node) -> bool {
        self.dontcare.contains(n)
    }

    /// The frame layout computed so far.
    pub fn frame(&self) -> &FrameLayout {
        &self.frame
    }

    /// The mask tables computed so far.
    pub fn masks(&self) -> &MaskTables {
        &self.masks
    }

    /// Locations input `idx` of machine node `n` may be read from.
    pub fn in_reg_mask(&self, n: Node, idx: usize) -> RegMask {
        frame::input_mask(self.env.grammar(), &self.masks, &self.graph, n, idx)
    }

    /// Locations machine node `n` may produce its value in.
    pub fn out_reg_mask(&self, n: Node) -> RegMask {
        frame::output_mask(self.env.grammar(), &self.graph, n)
    }

    /// Record a failure. The first one sticks.
    fn fail(&mut self, err: CodegenError) -> CodegenError {
        if self.failure.is_none() {
            log::warn!("matching failed: {err}");
            self.failure = Some(err.clone());
        }
        err
    }

    /// The machine node that replaced input node `n`, if any.
    fn new_node(&self, n: Node) -> Option<Node> {
        self.old2new[n].expand()
    }

    fn set_new_node(&mut self, old: Node, new: Node) {
        self.old2new[old] = new.into();
    }
}

/// The result of matching one compilation unit.
#[derive(Debug)]
pub struct MatchOutput {
    /// The machine graph. It holds no input nodes.
    pub graph: Graph,
    /// The new root.
    pub root: Node,
    /// The new top.
    pub top: Node,
    /// The new start.
    pub start: Node,
    /// Candidate implicit null checks.
    pub null_checks: Vec<NullCheck>,
    /// Incoming and outgoing argument areas.
    pub frame: FrameLayout,
    /// Register masks derived while matching.
    pub masks: MaskTables,
    /// Projections of `start` standing for the save-on-entry registers, in register order.
    pub save_on_entry: Vec<Node>,
    env: Arc<CompileEnv>,
}

impl MatchOutput {
    /// Locations input `idx` of machine node `n` may be read from.
    pub fn in_reg_mask(&self, n: Node, idx: usize) -> RegMask {
        frame::input_mask(self.env.grammar(), &self.masks, &self.graph, n, idx)
    }

    /// Locations machine node `n` may produce its value in.
    pub fn out_reg_mask(&self, n: Node) -> RegMask {
        frame::output_mask(self.env.grammar(), &self.graph, n)
    }

    /// The name of the rule machine node `n` was built from.
    pub fn rule_name(&self, n: Node) -> Option<&'static str> {
        self.graph
            .mach(n)
            .map(|m| self.env.grammar().rule(m.rule).name)
    }
}
