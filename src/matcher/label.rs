//! Labeling match trees.
//!
//! Labeling walks a tree bottom-up and records, for every node and every operand class, the
//! cheapest rule producing that class together with the total cost of the subtree. Children that
//! cannot be folded into their parent's instruction are labeled as plain registers of their kind
//! and become inputs of the finished instruction instead.

use super::state::{State, StateRef};
use super::{Matcher, MemClaim};
use crate::grammar::{Entry, Leaf};
use crate::ir::slots::mem;
use crate::ir::{Node, Opcode};
use crate::result::{CodegenError, CodegenResult};
use smallvec::SmallVec;
use std::sync::Arc;

// How far to walk up the control chain looking for a common dominator.
const MAX_CONTROL_SCAN: usize = 6;

// Memory states read by the loads among a node's children.
#[derive(Copy, Clone, PartialEq, Eq)]
enum InputMem {
    None,
    One(Node),
    // Loads reading different memory states; none of them may be folded.
    Conflict,
}

impl Matcher {
    /// Label the tree rooted at `n`.
    ///
    /// `control` is the control input adopted by the whole tree so far, and `claim` the memory
    /// state claimed by loads already folded into it.
    pub(super) fn label_root(
        &mut self,
        n: Node,
        control: &mut Option<Node>,
        claim: &mut MemClaim,
    ) -> CodegenResult<StateRef> {
        self.label_depth += 1;
        if self.label_depth > self.max_label_depth {
            return Err(self.fail(CodegenError::ResourceLimit(
                "out of stack space, increase max-label-root-depth",
            )));
        }

        let op = self.graph.opcode(n);
        let edges: SmallVec<[(usize, Node); 2]> = (1..self.graph.req(n))
            .filter(|&i| op.match_edge(i))
            .filter_map(|i| self.graph.input(n, i).map(|m| (i, m)))
            .collect();

        let mut input_mem = InputMem::None;
        for &(_, m) in &edges {
            if !self.graph.opcode(m).is_load() {
                continue;
            }
            let Some(m_mem) = self.graph.input(m, mem::MEMORY) else {
                continue;
            };
            match input_mem {
                InputMem::None => {
                    input_mem = InputMem::One(m_mem);
                    if *claim == MemClaim::Unclaimed {
                        *claim = MemClaim::Claimed(m_mem);
                    }
                }
                InputMem::One(other) if other != m_mem => input_mem = InputMem::Conflict,
                _ => {}
            }
        }

        let mut kids = SmallVec::<[StateRef; 2]>::new();
        for &(idx, m) in &edges {
            let other_memory = match *claim {
                MemClaim::Claimed(c) => {
                    self.graph.opcode(m).is_load() && self.graph.input(m, mem::MEMORY) != Some(c)
                }
                MemClaim::Unclaimed => false,
            };
            let into_reg = self.match_into_reg(n, m, *control, idx, self.shared.contains(m))
                || other_memory
                || input_mem == InputMem::Conflict;
            let kid = if into_reg {
                self.label_register(m)
            } else {
                if control.is_none() && self.graph.req(m) > 1 {
                    if let Some(c) = self.graph.input(m, 0) {
                        *control = Some(c);
                    }
                }
                self.label_root(m, control, claim)?
            };
            kids.push(kid);
        }

        let env = Arc::clone(&self.env);
        let entries = {
            let kid_entries: SmallVec<[&[Option<Entry>]; 2]> = kids
                .iter()
                .map(|&k| self.states.get(k).entries.as_slice())
                .collect();
            env.grammar()
                .label(&self.graph, n, Leaf::Op(op), &kid_entries)
        };
        if entries.iter().all(Option::is_none) {
            log::debug!("no rule covers {}", self.graph.display_node(n));
        }
        Ok(self.states.alloc(State {
            leaf: n,
            kind: Leaf::Op(op),
            kids,
            entries,
        }))
    }

    // Label `m` as a value that is already in a register.
    fn label_register(&mut self, m: Node) -> StateRef {
        let (kind, entries) = match self.graph.ideal_reg(m) {
            Some(ireg) => {
                let leaf = Leaf::Reg(ireg);
                let entries = self.env.grammar().label(&self.graph, m, leaf, &[]);
                (leaf, entries)
            }
            None => (
                Leaf::Op(self.graph.opcode(m)),
                vec![None; self.env.grammar().num_classes()],
            ),
        };
        self.states.alloc(State {
            leaf: m,
            kind,
            kids: SmallVec::new(),
            entries,
        })
    }

    /// Must child `m` of `n`, reached through input `idx`, be matched into a register instead
    /// of being folded into `n`'s tree?
    pub(super) fn match_into_reg(
        &self,
        n: Node,
        m: Node,
        control: Option<Node>,
        idx: usize,
        shared: bool,
    ) -> bool {
        let g = &self.graph;
        let m_op = g.opcode(m);
        if m_op.is_con() {
            // Constants match as immediates or get their own instruction, never a shared
            // register.
            return false;
        }
        let m_control = g.input(m, 0);
        // A load can move up to the control of its memory state.
        let mem_control = if m_op.is_load() {
            g.input(m, mem::MEMORY).and_then(|s| g.input(s, 0))
        } else {
            None
        };
        if let (Some(control), Some(m_control)) = (control, m_control) {
            if control != m_control && Some(control) != mem_control {
                // Fold `m` only if its control is found by walking up from the tree's.
                let mut x = control;
                let mut found = false;
                for _ in 0..MAX_CONTROL_SCAN {
                    if g.opcode(x) == Opcode::Region {
                        return true;
                    }
                    let Some(up) = g.input(x, 0) else {
                        return true;
                    };
                    x = up;
                    if x == m_control || Some(x) == mem_control {
                        found = true;
                        break;
                    }
                }
                if !found {
                    crate::trace!("{n} input {idx}: {m} control not dominated");
                    return true;
                }
            }
        }
        if m_op == Opcode::DecodeN && self.env.platform().narrow_oop_use_complex_address() {
            return false;
        }
        shared
    }

    /// Label the tree rooted at `n` from scratch and return the cheapest instruction covering it.
    ///
    /// `claim` is the memory state the root itself touches, if it is a store.
    pub(super) fn label_tree(
        &mut self,
        n: Node,
        mut claim: MemClaim,
    ) -> CodegenResult<(StateRef, Entry)> {
        self.states.reset();
        self.label_depth = 0;
        let mut control = self.graph.input(n, 0);
        let s = self.label_root(n, &mut control, &mut claim)?;

        let grammar = self.env.grammar();
        let mut best: Option<Entry> = None;
        for e in self.states.get(s).entries.iter().flatten() {
            if grammar.rule(e.rule).kind != crate::grammar::RuleKind::Instruction {
                continue;
            }
            if best.is_none_or(|b| (e.cost, e.rule) < (b.cost, b.rule)) {
                best = Some(*e);
            }
        }
        match best {
            Some(best) => Ok((s, best)),
            None => {
                let opcode = self.graph.opcode(n);
                Err(self.fail(CodegenError::GrammarMiss { node: n, opcode }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::env::CompileEnv;
    use crate::ir::{AliasIdx, BasicType, GraphBuilder, Opcode, Signature};
    use crate::matcher::{Matcher, MemClaim};
    use crate::settings::Flags;
    use std::sync::Arc;

    fn env() -> Arc<CompileEnv> {
        Arc::new(CompileEnv::x64(Flags::default()))
    }

    #[test]
    fn loads_from_one_memory_state_fold() {
        let sig = Signature::new(&[BasicType::Object, BasicType::Int], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let (obj, x) = (b.parm(0), b.parm(1));
        let m = b.memory();
        let ld = b.load(Opcode::LoadI, None, m, obj, AliasIdx::RAW);
        let sum = b.binary(Opcode::AddI, x, ld);
        let (c, io) = (b.control(), b.i_o());
        b.ret(c, io, m, Some(sum));
        let unit = b.finish();
        let root = unit.root;
        let env = env();
        let mut matcher = Matcher::new(Arc::clone(&env), unit);
        matcher.find_shared(root);
        let (_, best) = matcher.label_tree(sum, MemClaim::Unclaimed).unwrap();
        assert_eq!(env.grammar().rule(best.rule).name, "addI_rReg_mem");
    }

    #[test]
    fn loads_from_different_memory_states_stay_apart() {
        let sig = Signature::new(&[BasicType::Object], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let obj = b.parm(0);
        let m = b.memory();
        let one = b.iconst(1);
        let m2 = b.store(Opcode::StoreI, None, m, obj, one, AliasIdx::RAW);
        let a = b.load(Opcode::LoadI, None, m, obj, AliasIdx::RAW);
        let c2 = b.load(Opcode::LoadI, None, m2, obj, AliasIdx::RAW);
        let sum = b.binary(Opcode::AddI, a, c2);
        let (c, io) = (b.control(), b.i_o());
        b.ret(c, io, m2, Some(sum));
        let unit = b.finish();
        let root = unit.root;
        let env = env();
        let mut matcher = Matcher::new(Arc::clone(&env), unit);
        matcher.find_shared(root);
        let (_, best) = matcher.label_tree(sum, MemClaim::Unclaimed).unwrap();
        assert_eq!(env.grammar().rule(best.rule).name, "addI_rReg");
    }

    #[test]
    fn depth_limit_is_enforced() {
        let sig = Signature::new(&[BasicType::Int], &[BasicType::Int]);
        let mut gb = GraphBuilder::new(sig);
        let mut v = gb.parm(0);
        for i in 0..150 {
            let k = gb.iconst(i);
            v = gb.binary(Opcode::AddI, v, k);
        }
        let (c, io, m) = (gb.control(), gb.i_o(), gb.memory());
        gb.ret(c, io, m, Some(v));
        let unit = gb.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.max_label_depth = 100;
        matcher.find_shared(root);
        let err = matcher.label_tree(v, MemClaim::Unclaimed).unwrap_err();
        assert!(matches!(err, crate::CodegenError::ResourceLimit(_)));
        assert_eq!(matcher.failure(), Some(&err));
    }
}
