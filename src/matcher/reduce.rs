//! Reducing labeled trees into machine nodes.
//!
//! Reduction walks a labeled tree top-down along the chosen rules. Every instruction rule becomes
//! a machine node; operand and internal rules only contribute operands and inputs to the
//! instruction they are part of. Inputs of the new nodes still point at input-graph nodes; the
//! transform walk retargets them later.

use super::state::StateRef;
use super::{Matcher, MemClaim};
use crate::grammar::{OperandClass, Pattern, RuleId, RuleKind};
use crate::ir::graph::{Graph, NodeData, NodeKind};
use crate::ir::slots::{addp, mem};
use crate::ir::{MachInst, MachOperand, Node, Opcode};
use crate::result::{CodegenError, CodegenResult};
use smallvec::SmallVec;
use std::sync::Arc;

/// A machine node under construction.
struct MachBuilder {
    inst: MachInst,
    inputs: SmallVec<[Option<Node>; 6]>,
    classes: SmallVec<[Option<OperandClass>; 6]>,
    prec: SmallVec<[Node; 2]>,
}

impl MachBuilder {
    fn new(inst: MachInst) -> Self {
        let mut b = Self {
            inst,
            inputs: SmallVec::new(),
            classes: SmallVec::new(),
            prec: SmallVec::new(),
        };
        // Control.
        b.add_input(None, None);
        b
    }

    fn add_input(&mut self, input: Option<Node>, class: Option<OperandClass>) {
        self.inputs.push(input);
        self.classes.push(class);
    }

    fn insert_input(&mut self, idx: usize, input: Option<Node>) {
        self.inputs.insert(idx, input);
        self.classes.insert(idx, None);
    }

    fn push_operand(&mut self, class: OperandClass) -> usize {
        self.inst.operands.push(MachOperand::new(class));
        self.inst.operands.len() - 1
    }

    fn adopt_control(&mut self, control: Option<Node>) {
        if self.inputs[0].is_none() {
            self.inputs[0] = control;
        }
    }
}

impl Matcher {
    /// Match the tree rooted at `n` into a machine node.
    pub(super) fn match_tree(&mut self, n: Node) -> CodegenResult<Node> {
        let op = self.graph.opcode(n);
        let mut claim = match self.graph.input(n, mem::MEMORY) {
            Some(m) if op.is_store() => MemClaim::Claimed(m),
            _ => MemClaim::Unclaimed,
        };
        let (s, best) = self.label_tree(n, claim)?;
        crate::trace!(
            "{} matched by {} at cost {}",
            self.graph.display_node(n),
            self.env.grammar().rule(best.rule).name,
            best.cost
        );
        let m = self.reduce_inst(s, best.rule, &mut claim)?;

        // Inputs the grammar does not look at are carried over unchanged.
        let start = if op == Opcode::AddP {
            addp::BASE + 1
        } else if matches!(claim, MemClaim::Claimed(_)) {
            mem::MEMORY + 1
        } else {
            1
        };
        for i in start..self.graph.req(n) {
            if op.match_edge(i) {
                continue;
            }
            let input = self.graph.input(n, i);
            if i < self.graph.req(m) {
                self.graph.ins_req(m, i, input);
            } else {
                self.graph.add_req(m, input);
            }
        }
        Ok(m)
    }

    fn grammar_miss(&mut self, node: Node) -> CodegenError {
        let opcode = self.graph.opcode(node);
        self.fail(CodegenError::GrammarMiss { node, opcode })
    }

    /// Reduce state `s` along instruction rule `rule` into a new machine node.
    fn reduce_inst(
        &mut self,
        s: StateRef,
        rule: RuleId,
        claim: &mut MemClaim,
    ) -> CodegenResult<Node> {
        let leaf = self.states.get(s).leaf;
        if let Some(shared) = self.find_shared_node(leaf, rule) {
            return Ok(shared);
        }

        let env = Arc::clone(&self.env);
        let grammar = env.grammar();
        let r = grammar.rule(rule);
        let op = self.graph.opcode(leaf);
        let mut mb = MachBuilder::new(MachInst::new(rule, r.result));
        if let Pattern::Chain(from) = r.pattern {
            // Instruction chains depend on their data inputs only.
            self.reduce_inst_chain_rule(s, from, claim, &mut mb)?;
        } else {
            mb.inputs[0] = self.graph.input(leaf, 0);
            self.reduce_inst_interior(s, rule, claim, &mut mb)?;
        }

        if let MemClaim::Claimed(m) = *claim {
            mb.insert_input(mem::MEMORY, Some(m));
        }
        if op == Opcode::AddP {
            mb.insert_input(addp::BASE, self.graph.input(leaf, addp::BASE));
        }
        if op.is_mem_access() {
            mb.inst.barrier = env.hooks().barrier_data(&self.graph, leaf);
        }

        let ideal = grammar
            .class_ideal(r.result)
            .or_else(|| self.graph.ideal_reg(leaf));
        let MachBuilder {
            mut inst,
            inputs,
            classes,
            prec,
        } = mb;
        inst.in_classes = classes;
        let data = NodeData::new(op)
            .with_inputs(&inputs)
            .with_ideal(ideal)
            .with_payload(self.graph.payload(leaf).clone())
            .with_kind(NodeKind::Mach(Box::new(inst)));
        let m = self.graph.add_node(data);
        for p in prec {
            self.graph.add_prec(m, p);
        }
        if op.is_con() || op == Opcode::DecodeN {
            self.shared_nodes[leaf] = m.into();
        }
        Ok(m)
    }

    /// The machine node already built for constant or narrow-pointer decode `leaf` by `rule`.
    fn find_shared_node(&mut self, leaf: Node, rule: RuleId) -> Option<Node> {
        let op = self.graph.opcode(leaf);
        if !op.is_con() && op != Opcode::DecodeN {
            return None;
        }
        let last = self.shared_nodes[leaf].expand()?;
        if self.graph.mach(last)?.rule != rule {
            return None;
        }
        if op == Opcode::DecodeN {
            return Some(last);
        }
        // A constant used in several places hangs off the root.
        let new_root = self.new_node(self.root)?;
        match self.graph.input(last, 0) {
            Some(c) if c == new_root => {}
            None => self.graph.set_req(last, 0, Some(new_root)),
            Some(c) if c == self.root => self.graph.set_req(last, 0, Some(new_root)),
            Some(_) => return None,
        }
        Some(last)
    }

    // The single operand of an instruction chain comes from the same state.
    fn reduce_inst_chain_rule(
        &mut self,
        s: StateRef,
        from: OperandClass,
        claim: &mut MemClaim,
        mb: &mut MachBuilder,
    ) -> CodegenResult<()> {
        let (leaf, entry) = {
            let st = self.states.get(s);
            (st.leaf, st.entry(from))
        };
        let Some(entry) = entry else {
            return Err(self.grammar_miss(leaf));
        };
        let opnd = mb.push_operand(from);
        if self.env.grammar().rule(entry.rule).kind == RuleKind::Instruction {
            let mut fresh = MemClaim::Unclaimed;
            let input = self.reduce_inst(s, entry.rule, &mut fresh)?;
            mb.add_input(Some(input), Some(from));
        } else {
            self.reduce_oper(s, from, claim, mb, opnd)?;
        }
        Ok(())
    }

    fn reduce_inst_interior(
        &mut self,
        s: StateRef,
        rule: RuleId,
        claim: &mut MemClaim,
        mb: &mut MachBuilder,
    ) -> CodegenResult<()> {
        let leaf = self.states.get(s).leaf;
        self.absorb_leaf(leaf, claim, mb);

        let env = Arc::clone(&self.env);
        let grammar = env.grammar();
        let wants: SmallVec<[OperandClass; 2]> =
            grammar.rule(rule).pattern.kids().iter().flatten().copied().collect();
        let kids = self.states.get(s).kids.clone();
        for (want, kid) in wants.into_iter().zip(kids) {
            let (kid_leaf, entry) = {
                let st = self.states.get(kid);
                (st.leaf, st.entry(want))
            };
            let Some(entry) = entry else {
                return Err(self.grammar_miss(kid_leaf));
            };
            match grammar.rule(entry.rule).kind {
                RuleKind::Internal => self.reduce_inst_interior(kid, entry.rule, claim, mb)?,
                RuleKind::Operand | RuleKind::Instruction => {
                    let opnd = mb.push_operand(want);
                    self.reduce_oper(kid, want, claim, mb, opnd)?;
                }
            }
        }
        Ok(())
    }

    /// Reduce state `s` as a value of class `want` into operand `opnd` of `mb`.
    fn reduce_oper(
        &mut self,
        s: StateRef,
        want: OperandClass,
        claim: &mut MemClaim,
        mb: &mut MachBuilder,
        opnd: usize,
    ) -> CodegenResult<()> {
        let (leaf, entry) = {
            let st = self.states.get(s);
            (st.leaf, st.entry(want))
        };
        let Some(entry) = entry else {
            return Err(self.grammar_miss(leaf));
        };
        let env = Arc::clone(&self.env);
        let rule = env.grammar().rule(entry.rule);
        match rule.kind {
            RuleKind::Instruction => {
                // The value is produced by an instruction of its own.
                let mut fresh = MemClaim::Unclaimed;
                let input = self.reduce_inst(s, entry.rule, &mut fresh)?;
                if cfg!(debug_assertions) {
                    let grammar = env.grammar();
                    let out = grammar.class_mask(rule.result);
                    let catch = grammar.class_mask(want);
                    debug_assert!(
                        out.is_empty() || catch.is_empty() || out.overlap(&catch),
                        "{} result cannot reach class {}",
                        rule.name,
                        grammar.class(want).name
                    );
                }
                mb.add_input(Some(input), Some(want));
                return Ok(());
            }
            RuleKind::Internal => return self.reduce_inst_interior(s, entry.rule, claim, mb),
            RuleKind::Operand => {}
        }

        match rule.pattern {
            Pattern::Chain(from) => return self.reduce_oper(s, from, claim, mb, opnd),
            Pattern::Reg(_) => {
                mb.add_input(Some(leaf), Some(want));
                return Ok(());
            }
            Pattern::Node { .. } => {}
        }
        if rule.swallowed {
            let payload = self.graph.payload(leaf);
            let operand = &mut mb.inst.operands[opnd];
            if let Some(con) = payload.con {
                operand.cons.push(con);
            }
            if let Some(test) = payload.test {
                operand.cond = Some(test);
            }
            absorb_prec(&self.graph, leaf, mb);
            return Ok(());
        }
        let wants: SmallVec<[OperandClass; 2]> =
            rule.pattern.kids().iter().flatten().copied().collect();
        if wants.is_empty() {
            mb.add_input(Some(leaf), Some(want));
            return Ok(());
        }

        self.absorb_leaf(leaf, claim, mb);
        let kids = self.states.get(s).kids.clone();
        for (kid_want, kid) in wants.into_iter().zip(kids) {
            self.reduce_oper(kid, kid_want, claim, mb, opnd)?;
        }
        Ok(())
    }

    // Fold the interior node `leaf` into `mb`: its memory, precedence and control.
    fn absorb_leaf(&mut self, leaf: Node, claim: &mut MemClaim, mb: &mut MachBuilder) {
        let g = &self.graph;
        if g.opcode(leaf).is_load() {
            if let Some(m) = g.input(leaf, mem::MEMORY) {
                debug_assert!(
                    *claim == MemClaim::Unclaimed || *claim == MemClaim::Claimed(m),
                    "multiple memory states matched into one instruction"
                );
                *claim = MemClaim::Claimed(m);
            }
        }
        absorb_prec(g, leaf, mb);
        if g.req(leaf) > 1 {
            mb.adopt_control(g.input(leaf, 0));
        }
    }
}

// Ordering edges of a node folded into `mb` move to the instruction.
fn absorb_prec(g: &Graph, leaf: Node, mb: &mut MachBuilder) {
    for &p in g.prec(leaf) {
        if !mb.prec.contains(&p) {
            mb.prec.push(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::entity::EntityRef;
    use crate::env::CompileEnv;
    use crate::ir::slots::{func, mem};
    use crate::ir::{AliasIdx, BasicType, ConstValue, GraphBuilder, Opcode, Signature};
    use crate::matcher::Matcher;
    use crate::settings::Flags;
    use std::sync::Arc;

    fn env() -> Arc<CompileEnv> {
        Arc::new(CompileEnv::x64(Flags::default()))
    }

    fn rule_name(m: &Matcher, n: crate::ir::Node) -> &'static str {
        let rule = m.graph().mach(n).unwrap().rule;
        m.env.grammar().rule(rule).name
    }

    #[test]
    fn folded_load_brings_its_memory() {
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
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        matcher.graph.begin_new_space();
        let mach = matcher.match_tree(sum).unwrap();
        let g = matcher.graph();
        assert_eq!(rule_name(&matcher, mach), "addI_rReg_mem");
        assert_eq!(g.input(mach, mem::MEMORY), Some(m));
        assert_eq!(g.input(mach, 2), Some(x));
        assert_eq!(g.input(mach, 3), Some(obj));
        let inst = g.mach(mach).unwrap();
        assert_eq!(inst.in_class(mem::MEMORY), None);
        assert!(inst.in_class(2).is_some());
        assert!(g.is_new(mach));
    }

    #[test]
    fn folded_immediates_keep_their_ordering_edges() {
        let sig = Signature::new(&[BasicType::Int], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let x = b.parm(0);
        let k = b.iconst(5);
        let sum = b.binary(Opcode::AddI, x, k);
        let (c, io, m) = (b.control(), b.i_o(), b.memory());
        b.ret(c, io, m, Some(sum));
        b.graph_mut().add_prec(k, io);
        let unit = b.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        matcher.graph.begin_new_space();
        let mach = matcher.match_tree(sum).unwrap();
        let g = matcher.graph();
        assert_eq!(rule_name(&matcher, mach), "addI_rReg_imm");
        let inst = g.mach(mach).unwrap();
        assert_eq!(inst.operands[2].cons.as_slice(), &[ConstValue::Int(5)]);
        assert_eq!(g.prec(mach), &[io]);
    }

    #[test]
    fn stores_keep_their_memory_and_fold_immediates() {
        let sig = Signature::new(&[BasicType::Object], &[]);
        let mut b = GraphBuilder::new(sig);
        let obj = b.parm(0);
        let m = b.memory();
        let seven = b.iconst(7);
        let st = b.store(Opcode::StoreI, None, m, obj, seven, AliasIdx::RAW);
        let (c, io) = (b.control(), b.i_o());
        b.ret(c, io, st, None);
        let unit = b.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        matcher.graph.begin_new_space();
        let mach = matcher.match_tree(st).unwrap();
        let g = matcher.graph();
        assert_eq!(rule_name(&matcher, mach), "storeImmI");
        assert_eq!(g.req(mach), 3);
        assert_eq!(g.input(mach, mem::MEMORY), Some(m));
        assert_eq!(g.input(mach, mem::ADDRESS), Some(obj));
        let inst = g.mach(mach).unwrap();
        assert_eq!(inst.operands.len(), 3);
        assert_eq!(inst.operands[2].cons.as_slice(), &[ConstValue::Int(7)]);
    }

    #[test]
    fn exits_carry_their_unmatched_inputs() {
        let sig = Signature::new(&[], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let k = b.iconst(42);
        let (c, io, m) = (b.control(), b.i_o(), b.memory());
        let ret = b.ret(c, io, m, Some(k));
        let unit = b.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        matcher.graph.begin_new_space();
        let mach = matcher.match_tree(ret).unwrap();
        let g = matcher.graph();
        assert_eq!(rule_name(&matcher, mach), "RetImmI");
        assert_eq!(g.req(mach), func::PARMS);
        assert_eq!(g.input(mach, func::CONTROL), Some(c));
        assert_eq!(g.input(mach, func::I_O), Some(io));
        assert_eq!(g.input(mach, func::MEMORY), Some(m));
    }

    #[test]
    fn constants_are_built_once_per_rule() {
        let sig = Signature::new(&[BasicType::Int], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let x = b.parm(0);
        let k = b.iconst(1_000);
        let a = b.binary(Opcode::MulI, x, k);
        let a2 = b.binary(Opcode::XorI, a, k);
        let (c, io, m) = (b.control(), b.i_o(), b.memory());
        b.ret(c, io, m, Some(a2));
        let unit = b.finish();
        let root = unit.root;
        let mut matcher = Matcher::new(env(), unit);
        matcher.find_shared(root);
        matcher.graph.begin_new_space();
        let new_root = matcher.graph.clone_node(root);
        matcher.set_new_node(root, new_root);
        let xor = matcher.match_tree(a2).unwrap();
        let g = matcher.graph();
        assert_eq!(rule_name(&matcher, xor), "xorI_rReg");
        let con = g.input(xor, 2).unwrap();
        assert_eq!(rule_name(&matcher, con), "loadConI");
        assert_eq!(g.input(con, 0), None);
        assert_eq!(matcher.shared_nodes[k].expand(), Some(con));
        // The constant is shared, so a later tree reuses the same machine node.
        let again = matcher.match_tree(a2).unwrap();
        let g = matcher.graph();
        assert_eq!(g.input(again, 2), Some(con));
        assert_eq!(g.input(con, 0), Some(new_root));
        assert!(con.index() > k.index());
    }
}
