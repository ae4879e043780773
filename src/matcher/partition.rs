//! Partitioning the input graph into match trees.
//!
//! A depth-first walk from the root marks every node reached more than once as shared, which
//! makes it the root of its own tree and forces its value into a register. Some nodes are roots
//! regardless of sharing, and nodes the grammar never matches are marked don't-care. Conditional
//! moves, compare-and-swaps and branches are reshaped on the way out so every matched node has at
//! most two match-edge children.

use super::Matcher;
use crate::entity::EntitySet;
use crate::ir::slots::{addp, cmove, mem};
use crate::ir::{Node, NodeData, NodeFlags, Opcode};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Step {
    // Reached through an edge; shared if already visited.
    PreVisit,
    // Walk the inputs.
    Visit,
    // Inputs done.
    PostVisit,
    // Inputs of a branch done; move its compare next to its condition.
    BranchPostVisit,
}

impl Matcher {
    /// Mark the shared and don't-care nodes reachable from `from`.
    pub(super) fn find_shared(&mut self, from: Node) {
        let env = Arc::clone(&self.env);
        let hooks = env.hooks();
        let mut address_visited = EntitySet::new();
        let mut stack = vec![(from, Step::Visit)];

        while let Some(&(n, step)) = stack.last() {
            let op = self.graph.opcode(n);
            let mut step = step;
            if step == Step::PreVisit {
                if address_visited.contains(n) {
                    self.visited.insert(n);
                }
                if self.visited.contains(n) {
                    self.shared.insert(n);
                    if op == Opcode::DecodeN {
                        // The decoded load reaches its users through the decode only.
                        if let Some(load) = self.graph.input(n, 1) {
                            self.shared.insert(load);
                        }
                    }
                    stack.pop();
                    continue;
                }
                step = Step::Visit;
            }

            match step {
                Step::Visit => {
                    if let Some(top) = stack.last_mut() {
                        top.1 = Step::PostVisit;
                    }
                    self.visited.insert(n);
                    if hooks.must_be_root(&self.graph, n) {
                        self.shared.insert(n);
                    }
                    let mut mem_op = false;
                    if self.find_shared_visit(&mut stack, n, op, &mut mem_op) {
                        continue;
                    }
                    for i in (0..self.graph.req(n)).rev() {
                        let Some(m) = self.graph.input(n, i) else {
                            continue;
                        };
                        let m_op = self.graph.opcode(m);
                        if m_op.flags().contains(NodeFlags::MUST_CLONE) {
                            // Flag producers are matched again at every use.
                            stack.push((m, Step::Visit));
                            continue;
                        }
                        if mem_op
                            && i == mem::ADDRESS
                            && m_op == Opcode::AddP
                            && !self.visited.contains(m)
                            && self.clone_address(m, &mut stack, &mut address_visited)
                        {
                            continue;
                        }
                        stack.push((m, Step::PreVisit));
                    }
                }
                Step::BranchPostVisit => {
                    stack.pop();
                    let cmp = self
                        .graph
                        .input(n, 1)
                        .and_then(|cond| self.graph.input(cond, 1));
                    self.graph.add_req(n, cmp);
                }
                Step::PostVisit => {
                    stack.pop();
                    if !hooks.find_shared_post_visit(&mut self.graph, n) {
                        self.find_shared_post_visit(n, op);
                    }
                }
                Step::PreVisit => unreachable!(),
            }
        }
    }

    // Opcode-specific handling on the first visit. Returns true if the inputs were pushed
    // already.
    fn find_shared_visit(
        &mut self,
        stack: &mut Vec<(Node, Step)>,
        n: Node,
        op: Opcode,
        mem_op: &mut bool,
    ) -> bool {
        let g = &self.graph;
        match op {
            Opcode::Phi | Opcode::Parm | Opcode::Proj => {
                self.shared.insert(n);
                self.dontcare.insert(n);
            }
            Opcode::If => {
                if let Some(top) = stack.last_mut() {
                    top.1 = Step::BranchPostVisit;
                }
                // The condition is cloned into every branch so the compare is matched with it.
                if let Some(cond) = g.input(n, 1) {
                    stack.push((cond, Step::Visit));
                }
                if let Some(ctrl) = g.input(n, 0) {
                    stack.push((ctrl, Step::PreVisit));
                }
                return true;
            }
            Opcode::ConvI2D | Opcode::ConvI2F => {
                // Fold into a prior load, never into a following store.
                let from_load = g.input(n, 1).is_some_and(|i| g.opcode(i).is_load());
                let into_store = g.unique_out(n).is_some_and(|u| g.opcode(u).is_store());
                if from_load && into_store {
                    self.shared.insert(n);
                }
            }
            Opcode::ReverseBytesI | Opcode::ReverseBytesL => {
                let from_load = g.input(n, 1).is_some_and(|i| g.opcode(i).is_load());
                if from_load && g.outcnt(n) == 1 {
                    self.shared.insert(n);
                }
            }
            Opcode::IfTrue
            | Opcode::IfFalse
            | Opcode::MergeMem
            | Opcode::Catch
            | Opcode::CatchProj => {
                self.dontcare.insert(n);
            }
            Opcode::SafePoint => *mem_op = true,
            _ if op.is_store() => *mem_op = true,
            _ => {
                if op.is_mem_access() {
                    *mem_op = true;
                    if !self.env.flags().subsume_loads() {
                        self.shared.insert(n);
                    }
                }
                if g.ideal_reg(n).is_none() && !op.flags().contains(NodeFlags::MATCH_WITHOUT_REG) {
                    self.dontcare.insert(n);
                }
            }
        }
        false
    }

    // Clone an address with a constant offset into the memory access using it, so the offset
    // folds into the addressing mode. Returns false if the address is left alone.
    fn clone_address(
        &mut self,
        m: Node,
        stack: &mut Vec<(Node, Step)>,
        address_visited: &mut EntitySet<Node>,
    ) -> bool {
        let g = &self.graph;
        let Some(off) = g.input(m, addp::OFFSET) else {
            return false;
        };
        if !g.opcode(off).is_con() {
            return false;
        }
        address_visited.insert(m);
        if let Some(adr) = g.input(m, addp::ADDRESS) {
            stack.push((adr, Step::PreVisit));
        }
        stack.push((off, Step::Visit));
        if let Some(base) = g.input(m, addp::BASE) {
            stack.push((base, Step::PreVisit));
        }
        true
    }

    // Reshape nodes with more than two match-edge inputs into binary trees.
    fn find_shared_post_visit(&mut self, n: Node, op: Opcode) {
        let g = &mut self.graph;
        if op.is_cmove() {
            let cond = g.input(n, cmove::CONDITION);
            let cmp = cond.and_then(|b| g.input(b, 1));
            let pair1 = g.add_node(NodeData::new(Opcode::Binary).with_inputs(&[None, cond, cmp]));
            g.set_req(n, cmove::CONDITION, Some(pair1));
            let if_false = g.input(n, cmove::IF_FALSE);
            let if_true = g.input(n, cmove::IF_TRUE);
            let pair2 =
                g.add_node(NodeData::new(Opcode::Binary).with_inputs(&[None, if_false, if_true]));
            g.set_req(n, cmove::IF_FALSE, Some(pair2));
            g.del_req(n, cmove::IF_TRUE);
        } else if op.is_cas() {
            let new_val = g.input(n, mem::VALUE_IN);
            let expected = g.input(n, mem::EXPECTED_IN);
            let pair =
                g.add_node(NodeData::new(Opcode::Binary).with_inputs(&[None, expected, new_val]));
            g.set_req(n, mem::VALUE_IN, Some(pair));
            g.del_req(n, mem::EXPECTED_IN);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::env::CompileEnv;
    use crate::ir::slots::{cmove, func, mem};
    use crate::ir::{AliasIdx, BasicType, BoolTest, GraphBuilder, Opcode, Signature};
    use crate::matcher::Matcher;
    use crate::settings::Flags;
    use std::sync::Arc;

    fn env() -> Arc<CompileEnv> {
        Arc::new(CompileEnv::x64(Flags::default()))
    }

    #[test]
    fn shared_values_and_dontcares() {
        let sig = Signature::new(&[BasicType::Int], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let p = b.parm(0);
        let sum = b.binary(Opcode::AddI, p, p);
        let twice = b.binary(Opcode::MulI, sum, sum);
        let (c, io, m) = (b.control(), b.i_o(), b.memory());
        b.ret(c, io, m, Some(twice));
        let unit = b.finish();
        let (root, top) = (unit.root, unit.top);
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        matcher.find_shared(top);
        assert!(matcher.is_shared(sum));
        assert!(!matcher.is_shared(twice));
        assert!(matcher.is_shared(p));
        assert!(matcher.is_dontcare(p));
        assert!(matcher.is_dontcare(root));
        assert!(!matcher.is_dontcare(twice));
    }

    #[test]
    fn branches_get_their_compare() {
        let sig = Signature::new(&[BasicType::Int], &[]);
        let mut b = GraphBuilder::new(sig);
        let p = b.parm(0);
        let zero = b.iconst(0);
        let cmp = b.binary(Opcode::CmpI, p, zero);
        let cond = b.test(cmp, BoolTest::Lt);
        let ctrl = b.control();
        let (iff, t, f) = b.branch(ctrl, cond);
        let (io, m) = (b.i_o(), b.memory());
        b.ret(t, io, m, None);
        b.ret(f, io, m, None);
        let unit = b.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        let g = matcher.graph();
        assert_eq!(g.req(iff), 3);
        assert_eq!(g.input(iff, 1), Some(cond));
        assert_eq!(g.input(iff, 2), Some(cmp));
        assert!(!matcher.is_shared(cmp));
        assert!(!matcher.is_shared(cond));
        assert!(matcher.is_dontcare(t));
    }

    #[test]
    fn conditional_moves_become_binary() {
        let sig = Signature::new(&[BasicType::Int, BasicType::Int], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let (x, y) = (b.parm(0), b.parm(1));
        let cmp = b.binary(Opcode::CmpI, x, y);
        let cond = b.test(cmp, BoolTest::Gt);
        let sel = b.cmove(Opcode::CMoveI, cond, y, x);
        let (c, io, m) = (b.control(), b.i_o(), b.memory());
        b.ret(c, io, m, Some(sel));
        let unit = b.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        let g = matcher.graph();
        assert_eq!(g.req(sel), 3);
        let pair1 = g.input(sel, cmove::CONDITION).unwrap();
        assert_eq!(g.opcode(pair1), Opcode::Binary);
        assert_eq!(g.input(pair1, 1), Some(cond));
        assert_eq!(g.input(pair1, 2), Some(cmp));
        let pair2 = g.input(sel, cmove::IF_FALSE).unwrap();
        assert_eq!(g.input(pair2, 1), Some(y));
        assert_eq!(g.input(pair2, 2), Some(x));
        assert!(crate::verify_def_use(g).is_ok());
    }

    #[test]
    fn compare_and_swap_pairs_its_values() {
        let sig = Signature::new(&[BasicType::Object, BasicType::Int], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let (obj, v) = (b.parm(0), b.parm(1));
        let zero = b.iconst(0);
        let m = b.memory();
        let cas = b.compare_and_swap(
            Opcode::CompareAndSwapI,
            None,
            m,
            obj,
            v,
            zero,
            AliasIdx::RAW,
        );
        let (c, io) = (b.control(), b.i_o());
        b.ret(c, io, m, Some(cas));
        let unit = b.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        let g = matcher.graph();
        assert_eq!(g.req(cas), mem::EXPECTED_IN);
        let pair = g.input(cas, mem::VALUE_IN).unwrap();
        assert_eq!(g.opcode(pair), Opcode::Binary);
        assert_eq!(g.input(pair, 1), Some(zero));
        assert_eq!(g.input(pair, 2), Some(v));
        assert_eq!(g.input(root, 1).map(|r| g.req(r)), Some(func::PARMS + 1));
    }

    #[test]
    fn constant_offsets_stay_in_the_address() {
        let sig = Signature::new(&[BasicType::Object], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let obj = b.parm(0);
        let off = b.lconst(16);
        let adr = b.add_p(obj, obj, off);
        let m = b.memory();
        let a = b.load(Opcode::LoadI, None, m, adr, AliasIdx::RAW);
        let c = b.load(Opcode::LoadI, None, m, adr, AliasIdx::RAW);
        let sum = b.binary(Opcode::AddI, a, c);
        let (ctrl, io) = (b.control(), b.i_o());
        b.ret(ctrl, io, m, Some(sum));
        let unit = b.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        assert!(!matcher.is_shared(adr));
        assert!(!matcher.is_shared(off));
        assert!(matcher.is_shared(obj));
    }
}
