//! Instruction grammars.
//!
//! A grammar describes a target's instructions as tree patterns over ideal opcodes. Each rule
//! produces a value of one operand class from a pattern whose children are operand classes, at a
//! fixed cost. Three kinds of rules exist:
//!
//! - Operand rules describe values that are folded into an instruction: registers, immediates
//!   and addressing modes.
//! - Internal rules describe interior pieces of larger instruction patterns.
//! - Instruction rules describe machine instructions producing their result class.
//!
//! Chain rules convert one class into another. An operand chain makes one class usable where
//! another is expected (operand unions are built this way); an instruction chain materializes a
//! value, such as loading an immediate into a register.
//!
//! [`Grammar::label`] is the labeling step of the tree matcher: given the best entries of a
//! node's children, it computes the cheapest rule producing each class at the node.

use crate::entity::{EntityRef, PrimaryMap, entity_impl};
use crate::ir::{Graph, IdealReg, Node, Opcode};
use crate::regmask::RegMask;
use core::fmt;
use rustc_hash::FxHashMap;

mod builder;

pub use self::builder::GrammarBuilder;

/// An operand class of a grammar.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperandClass(u32);
entity_impl!(OperandClass, "opnd");

/// A rule of a grammar. Rules are numbered in declaration order, which breaks cost ties.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);
entity_impl!(RuleId, "rule");

/// What values an operand class stands for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassKind {
    /// A value in a register of kind `ideal`, allocated from `mask`.
    Register {
        /// Register kind.
        ideal: IdealReg,
        /// Allowed registers.
        mask: RegMask,
    },
    /// A constant folded into the instruction.
    Immediate,
    /// An addressing mode whose register inputs come from `mask`.
    Composite {
        /// Allowed registers of the register inputs.
        mask: RegMask,
    },
    /// An interior piece of a larger pattern.
    Internal,
    /// Any value of one of `members`.
    Union {
        /// Member classes.
        members: Vec<OperandClass>,
        /// Union of the members' masks.
        mask: RegMask,
    },
    /// Any value at all, used by instructions that produce nothing.
    Universe,
}

/// One operand class.
#[derive(Clone, Debug)]
pub struct ClassData {
    /// Name, for dumps.
    pub name: &'static str,
    /// What the class stands for.
    pub kind: ClassKind,
}

/// The kinds of rules.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Produces an operand folded into the consuming instruction.
    Operand,
    /// Produces an interior piece of a larger pattern.
    Internal,
    /// Produces a machine instruction.
    Instruction,
}

/// An extra check on the node a pattern matches.
pub type Predicate = fn(&Graph, Node) -> bool;

/// What a rule matches.
#[derive(Clone, Debug)]
pub enum Pattern {
    /// A node of `opcode` whose match-edge children produce `kids`, in input order.
    Node {
        /// The matched opcode.
        opcode: Opcode,
        /// Classes expected from the children. Leading entries are used first.
        kids: [Option<OperandClass>; 2],
        /// Extra check on the node.
        predicate: Option<Predicate>,
    },
    /// A value that has to be in a register of the given kind.
    Reg(IdealReg),
    /// A value of another class.
    Chain(OperandClass),
}

impl Pattern {
    /// A node of `opcode` with no children.
    pub fn leaf(opcode: Opcode) -> Self {
        Self::Node {
            opcode,
            kids: [None, None],
            predicate: None,
        }
    }

    /// A node of `opcode` with one child of class `a`.
    pub fn unary(opcode: Opcode, a: OperandClass) -> Self {
        Self::Node {
            opcode,
            kids: [Some(a), None],
            predicate: None,
        }
    }

    /// A node of `opcode` with children of classes `a` and `b`.
    pub fn binary(opcode: Opcode, a: OperandClass, b: OperandClass) -> Self {
        Self::Node {
            opcode,
            kids: [Some(a), Some(b)],
            predicate: None,
        }
    }

    /// Add a predicate to a node pattern.
    pub fn when(mut self, check: Predicate) -> Self {
        if let Self::Node { predicate, .. } = &mut self {
            *predicate = Some(check);
        }
        self
    }

    /// The child classes of a node pattern.
    pub fn kids(&self) -> &[Option<OperandClass>] {
        match self {
            Self::Node { kids, .. } => kids,
            Self::Reg(_) | Self::Chain(_) => &[],
        }
    }

    fn arity(&self) -> usize {
        self.kids().iter().flatten().count()
    }
}

/// One grammar rule.
#[derive(Clone, Debug)]
pub struct Rule {
    /// Name, for dumps.
    pub name: &'static str,
    /// The class produced.
    pub result: OperandClass,
    /// What the rule matches.
    pub pattern: Pattern,
    /// Static cost of the rule itself.
    pub cost: u32,
    /// What the rule produces.
    pub kind: RuleKind,
    /// Is the matched leaf folded into its operand without becoming an input?
    pub swallowed: bool,
}

impl Rule {
    /// Is this an instruction chain rule?
    pub fn is_chain_instruction(&self) -> bool {
        self.kind == RuleKind::Instruction && matches!(self.pattern, Pattern::Chain(_))
    }
}

/// What the labeling step is asked to match.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Leaf {
    /// The node's own opcode, with its children labeled.
    Op(Opcode),
    /// A value that is already in a register of this kind.
    Reg(IdealReg),
}

/// The cheapest known way to produce one class at one node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// The rule that produces it.
    pub rule: RuleId,
    /// Total cost of the subtree.
    pub cost: u32,
}

/// An immutable instruction grammar.
#[derive(Clone, Debug)]
pub struct Grammar {
    classes: PrimaryMap<OperandClass, ClassData>,
    rules: PrimaryMap<RuleId, Rule>,
    by_opcode: FxHashMap<Opcode, Vec<RuleId>>,
    by_reg: FxHashMap<IdealReg, Vec<RuleId>>,
    chains: Vec<RuleId>,
}

impl Grammar {
    /// Number of operand classes.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Number of rules.
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// The operand class `c`.
    pub fn class(&self, c: OperandClass) -> &ClassData {
        &self.classes[c]
    }

    /// The rule `r`.
    pub fn rule(&self, r: RuleId) -> &Rule {
        &self.rules[r]
    }

    /// Look up a class by name.
    pub fn class_named(&self, name: &str) -> Option<OperandClass> {
        self.classes
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(c, _)| c)
    }

    /// Look up a rule by name.
    pub fn rule_named(&self, name: &str) -> Option<RuleId> {
        self.rules
            .iter()
            .find(|(_, r)| r.name == name)
            .map(|(r, _)| r)
    }

    /// Registers a value of class `c` may be in or come from.
    ///
    /// Non-register classes have an empty mask.
    pub fn class_mask(&self, c: OperandClass) -> RegMask {
        match &self.classes[c].kind {
            ClassKind::Register { mask, .. }
            | ClassKind::Composite { mask }
            | ClassKind::Union { mask, .. } => *mask,
            ClassKind::Immediate | ClassKind::Internal | ClassKind::Universe => RegMask::EMPTY,
        }
    }

    /// The register kind of values of class `c`, if it is a register class.
    pub fn class_ideal(&self, c: OperandClass) -> Option<IdealReg> {
        match self.classes[c].kind {
            ClassKind::Register { ideal, .. } => Some(ideal),
            _ => None,
        }
    }

    /// The rules that may match `leaf` directly.
    fn candidates(&self, leaf: Leaf) -> &[RuleId] {
        let rules = match leaf {
            Leaf::Op(op) => self.by_opcode.get(&op),
            Leaf::Reg(ireg) => self.by_reg.get(&ireg),
        };
        rules.map_or(&[], Vec::as_slice)
    }

    /// Label node `node` of `graph` matched as `leaf`.
    ///
    /// `kids` holds the labels of the node's match-edge children, in input order. Returns the
    /// cheapest entry per operand class; the first-declared rule wins ties.
    pub fn label(
        &self,
        graph: &Graph,
        node: Node,
        leaf: Leaf,
        kids: &[&[Option<Entry>]],
    ) -> Vec<Option<Entry>> {
        let mut entries = vec![None; self.classes.len()];

        for &r in self.candidates(leaf) {
            let rule = &self.rules[r];
            if rule.pattern.arity() != kids.len() {
                continue;
            }
            let mut cost = rule.cost;
            let mut valid = true;
            for (want, labels) in rule.pattern.kids().iter().flatten().zip(kids) {
                match labels.get(want.index()).copied().flatten() {
                    Some(e) => cost += e.cost,
                    None => {
                        valid = false;
                        break;
                    }
                }
            }
            if !valid {
                continue;
            }
            if let Pattern::Node {
                predicate: Some(check),
                ..
            } = &rule.pattern
            {
                if !check(graph, node) {
                    continue;
                }
            }
            Self::improve(&mut entries, rule.result, r, cost);
        }

        self.close_chains(&mut entries);
        entries
    }

    // Apply chain rules until nothing gets cheaper.
    fn close_chains(&self, entries: &mut [Option<Entry>]) {
        let mut changed = true;
        while changed {
            changed = false;
            for &r in &self.chains {
                let rule = &self.rules[r];
                let Pattern::Chain(from) = rule.pattern else {
                    continue;
                };
                let Some(src) = entries[from.index()] else {
                    continue;
                };
                let cost = rule.cost + src.cost;
                // An operand chain over an instruction's result is that instruction.
                let producer = if rule.kind == RuleKind::Operand
                    && self.rules[src.rule].kind == RuleKind::Instruction
                {
                    src.rule
                } else {
                    r
                };
                changed |= Self::improve(entries, rule.result, producer, cost);
            }
        }
    }

    fn improve(entries: &mut [Option<Entry>], class: OperandClass, rule: RuleId, cost: u32) -> bool {
        let slot = &mut entries[class.index()];
        match slot {
            Some(e) if e.cost <= cost => false,
            _ => {
                *slot = Some(Entry { rule, cost });
                true
            }
        }
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (r, rule) in self.rules.iter() {
            write!(f, "{r} {}: {} <- ", rule.name, self.classes[rule.result].name)?;
            match &rule.pattern {
                Pattern::Node { opcode, kids, .. } => {
                    write!(f, "({opcode}")?;
                    for k in kids.iter().flatten() {
                        write!(f, " {}", self.classes[*k].name)?;
                    }
                    write!(f, ")")?;
                }
                Pattern::Reg(ireg) => write!(f, "{ireg}")?,
                Pattern::Chain(from) => write!(f, "{}", self.classes[*from].name)?,
            }
            writeln!(f, " cost {}", rule.cost)?;
        }
        Ok(())
    }
}

/// Does every entry of `a` cost at most the matching entry of `b`?
///
/// Used to check that labeling never makes a class more expensive when a cheaper rule appears.
pub fn entries_no_worse(a: &[Option<Entry>], b: &[Option<Entry>]) -> bool {
    a.iter().zip(b).all(|(x, y)| match (x, y) {
        (Some(x), Some(y)) => x.cost <= y.cost,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, Signature};
    use proptest::prelude::*;

    fn tiny() -> (Grammar, OperandClass, OperandClass, OperandClass) {
        tiny_with(None)
    }

    // `extra` adds one more register-immediate add of that cost.
    fn tiny_with(extra: Option<u32>) -> (Grammar, OperandClass, OperandClass, OperandClass) {
        let mut b = GrammarBuilder::new();
        let mut mask = RegMask::new();
        mask.insert(crate::isa::registers::OptoReg::new(0));
        let reg = b.register("reg", IdealReg::RegI, mask);
        let imm = b.immediate("imm");
        let any = b.universe("any");
        b.reg_operand("reg", reg, IdealReg::RegI);
        b.swallowed("imm", imm, Pattern::leaf(Opcode::ConI));
        b.chain("any_reg", any, reg, 0);
        b.chain_instruction("load_con", reg, imm, 100);
        b.instruction("add", reg, Pattern::binary(Opcode::AddI, reg, reg), 100);
        b.instruction("add_imm_slow", reg, Pattern::binary(Opcode::AddI, reg, imm), 100);
        b.instruction("add_imm_fast", reg, Pattern::binary(Opcode::AddI, reg, imm), 50);
        if let Some(cost) = extra {
            b.instruction("add_imm_extra", reg, Pattern::binary(Opcode::AddI, reg, imm), cost);
        }
        (b.build(), reg, imm, any)
    }

    #[test]
    fn constants_label_through_chains() {
        let (g, reg, imm, any) = tiny();
        let mut gb = GraphBuilder::new(Signature::default());
        let c = gb.iconst(7);
        let entries = g.label(gb.graph(), c, Leaf::Op(Opcode::ConI), &[]);
        let imm_e = entries[imm.index()].unwrap();
        assert_eq!(g.rule(imm_e.rule).name, "imm");
        assert_eq!(imm_e.cost, 0);
        let reg_e = entries[reg.index()].unwrap();
        assert_eq!(g.rule(reg_e.rule).name, "load_con");
        // The operand chain over the instruction result records the instruction.
        assert_eq!(entries[any.index()], Some(reg_e));
    }

    #[test]
    fn cheapest_wins_and_ties_go_first() {
        let (g, reg, imm, _) = tiny();
        let mut gb = GraphBuilder::new(Signature::default());
        let c = gb.iconst(7);
        let p = gb.iconst(8);
        let add = gb.binary(Opcode::AddI, p, c);
        let reg_kid = g.label(gb.graph(), p, Leaf::Reg(IdealReg::RegI), &[]);
        let imm_kid = g.label(gb.graph(), c, Leaf::Op(Opcode::ConI), &[]);
        let entries = g.label(gb.graph(), add, Leaf::Op(Opcode::AddI), &[&reg_kid, &imm_kid]);
        let e = entries[reg.index()].unwrap();
        assert_eq!(g.rule(e.rule).name, "add_imm_fast");
        assert_eq!(e.cost, 50);
        assert!(entries[imm.index()].is_none());

        // Wrong arity never matches.
        let none = g.label(gb.graph(), add, Leaf::Op(Opcode::AddI), &[&reg_kid]);
        assert!(none.iter().all(Option::is_none));
    }

    #[test]
    fn equal_costs_keep_the_first_rule() {
        let (g, reg, ..) = tiny_with(Some(50));
        let mut gb = GraphBuilder::new(Signature::default());
        let c = gb.iconst(7);
        let p = gb.iconst(8);
        let add = gb.binary(Opcode::AddI, p, c);
        let reg_kid = g.label(gb.graph(), p, Leaf::Reg(IdealReg::RegI), &[]);
        let imm_kid = g.label(gb.graph(), c, Leaf::Op(Opcode::ConI), &[]);
        let entries = g.label(gb.graph(), add, Leaf::Op(Opcode::AddI), &[&reg_kid, &imm_kid]);
        let e = entries[reg.index()].unwrap();
        assert_eq!(g.rule(e.rule).name, "add_imm_fast");
    }

    proptest! {
        #[test]
        fn extra_rules_never_make_labels_dearer(cost in 0u32..300) {
            let (without, ..) = tiny();
            let (with, ..) = tiny_with(Some(cost));
            let mut gb = GraphBuilder::new(Signature::default());
            let c = gb.iconst(7);
            let p = gb.iconst(8);
            let add = gb.binary(Opcode::AddI, p, c);
            let label = |g: &Grammar| {
                let reg_kid = g.label(gb.graph(), p, Leaf::Reg(IdealReg::RegI), &[]);
                let imm_kid = g.label(gb.graph(), c, Leaf::Op(Opcode::ConI), &[]);
                g.label(gb.graph(), add, Leaf::Op(Opcode::AddI), &[&reg_kid, &imm_kid])
            };
            let a = label(&with);
            let b = label(&without);
            prop_assert!(entries_no_worse(&a, &b));
            prop_assert_eq!(entries_no_worse(&b, &a), cost >= 50);
        }
    }

    #[test]
    fn display_lists_rules() {
        let (g, ..) = tiny();
        let text = g.to_string();
        assert!(text.contains("rule4 add: reg <- (AddI reg reg) cost 100\n"), "{text}");
    }
}
