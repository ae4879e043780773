//! Rebuilding the graph out of machine nodes.
//!
//! The walk starts at an input node and maps every node it reaches: tree roots are matched,
//! projections of multi-valued nodes become machine projections, and everything else is cloned.
//! The new nodes still point at input nodes; each edge is retargeted to the input's replacement
//! once that replacement has been walked. The walk is iterative so deep graphs cannot overflow
//! the native stack.

use super::Matcher;
use crate::ir::Node;
use crate::result::{CodegenError, CodegenResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Step {
    Visit,
    PostVisit,
}

// Where a walked node hangs off its parent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Slot {
    Req(usize),
    Prec,
    None,
}

#[derive(Copy, Clone, Debug)]
struct Frame {
    node: Node,
    step: Step,
    parent: Option<Node>,
    slot: Slot,
}

impl Frame {
    fn new(node: Node, step: Step, parent: Option<Node>, slot: Slot) -> Self {
        Self {
            node,
            step,
            parent,
            slot,
        }
    }
}

impl Matcher {
    /// Map every node reachable from input node `from` and return `from`'s replacement.
    pub(super) fn xform(&mut self, from: Node) -> CodegenResult<Node> {
        let flags = self.env.flags().clone();
        let limit = flags.node_limit() as usize;
        let fudge = flags.node_limit_fudge() as usize;
        let mut stack = vec![Frame::new(from, Step::Visit, None, Slot::None)];

        while let Some(&frame) = stack.last() {
            if let Some(err) = &self.failure {
                return Err(err.clone());
            }
            if self.graph.num_new_nodes() + fudge > limit {
                return Err(self.fail(CodegenError::ResourceLimit(
                    "too many nodes matching instructions",
                )));
            }

            if frame.step == Step::PostVisit {
                stack.pop();
                match (frame.parent, frame.slot) {
                    (Some(parent), Slot::Req(i)) => {
                        self.graph.set_req(parent, i, Some(frame.node))
                    }
                    (Some(parent), Slot::Prec) => self.graph.add_prec(parent, frame.node),
                    _ => {}
                }
                continue;
            }

            let old = if self.graph.is_new(frame.node) {
                None
            } else {
                Some(frame.node)
            };
            let n = match old {
                Some(o) => self.map_node(o)?,
                None => frame.node,
            };
            if let Some(top) = stack.last_mut() {
                top.node = n;
                top.step = Step::PostVisit;
            }
            if self.visited.contains(n) {
                continue;
            }
            self.visited.insert(n);

            // Ordering edges of the input node carry over to its replacement.
            if let Some(o) = old.filter(|&o| o != n) {
                for &p in self.graph.prec(o) {
                    stack.push(Frame::new(p, Step::Visit, Some(n), Slot::Prec));
                }
            }
            let pending: Vec<Node> = self
                .graph
                .prec(n)
                .iter()
                .copied()
                .filter(|&p| !self.graph.is_new(p))
                .collect();
            for p in pending {
                self.graph.rm_prec(n, p);
                stack.push(Frame::new(p, Step::Visit, Some(n), Slot::Prec));
            }

            let op = self.graph.opcode(n);
            let debug_start = match self.graph.mach(n) {
                Some(_) if op.is_safepoint() => self
                    .graph
                    .payload(n)
                    .debug_start
                    .map_or(usize::MAX, |d| d as usize),
                _ => usize::MAX,
            };
            for i in (0..self.graph.req(n)).rev() {
                let Some(m) = self.graph.input(n, i) else {
                    continue;
                };
                if i >= debug_start && !self.graph.is_new(m) && self.graph.opcode(m).is_con() {
                    // Debug info keeps its own copy of constants; they are never matched.
                    let con = self.graph.clone_node(m);
                    stack.push(Frame::new(con, Step::PostVisit, Some(n), Slot::Req(i)));
                    if let Some(ctrl) = self.graph.input(con, 0) {
                        stack.push(Frame::new(ctrl, Step::Visit, Some(con), Slot::Req(0)));
                    }
                    continue;
                }
                stack.push(Frame::new(m, Step::Visit, Some(n), Slot::Req(i)));
            }
        }

        self.new_node(from)
            .ok_or_else(|| self.fail(CodegenError::GraphLost))
    }

    /// The replacement of input node `old`, building it on first sight.
    fn map_node(&mut self, old: Node) -> CodegenResult<Node> {
        if let Some(n) = self.new_node(old) {
            return Ok(n);
        }
        let op = self.graph.opcode(old);
        let multi = self
            .graph
            .input(old, 0)
            .filter(|&m| self.graph.opcode(m).is_multi());
        let n = if !self.dontcare.contains(old) {
            if op.is_safepoint() {
                self.match_sfpt(old)?
            } else {
                self.match_tree(old)?
            }
        } else if let (true, Some(multi)) = (op.is_proj(), multi) {
            let n = self.match_projection(old, multi)?;
            if self.graph.input(n, 0).is_some() {
                self.collect_null_checks(n, old);
            }
            n
        } else {
            self.graph.clone_node(old)
        };
        crate::trace!("{} -> {}", self.graph.display_node(old), n);
        self.set_new_node(old, n);
        Ok(n)
    }

    /// Point the users of the input root at its replacement.
    pub(super) fn adopt_root_users(&mut self, new_root: Node) {
        let users: Vec<Node> = self
            .graph
            .nodes()
            .filter(|&n| self.graph.is_new(n))
            .collect();
        for n in users {
            self.graph.replace_edge(n, self.root, new_root);
        }
    }
}
