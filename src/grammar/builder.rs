//! Incremental construction of grammars.

use crate::entity::PrimaryMap;
use crate::grammar::{ClassData, ClassKind, Grammar, OperandClass, Pattern, Rule, RuleId, RuleKind};
use crate::ir::IdealReg;
use crate::regmask::RegMask;
use rustc_hash::FxHashMap;

/// Collects operand classes and rules, then freezes them into a [`Grammar`].
///
/// Rules are numbered in the order they are added. When two rules produce the same class at the
/// same cost, the one added first wins.
#[derive(Default)]
pub struct GrammarBuilder {
    classes: PrimaryMap<OperandClass, ClassData>,
    rules: PrimaryMap<RuleId, Rule>,
}

impl GrammarBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn class(&mut self, name: &'static str, kind: ClassKind) -> OperandClass {
        debug_assert!(
            self.classes.values().all(|c| c.name != name),
            "duplicate operand class {name}"
        );
        self.classes.push(ClassData { name, kind })
    }

    fn rule(
        &mut self,
        name: &'static str,
        result: OperandClass,
        pattern: Pattern,
        cost: u32,
        kind: RuleKind,
        swallowed: bool,
    ) -> RuleId {
        self.rules.push(Rule {
            name,
            result,
            pattern,
            cost,
            kind,
            swallowed,
        })
    }

    /// Declare a register class for values of kind `ideal` living in `mask`.
    pub fn register(&mut self, name: &'static str, ideal: IdealReg, mask: RegMask) -> OperandClass {
        self.class(name, ClassKind::Register { ideal, mask })
    }

    /// Declare a class of constants folded into instructions.
    pub fn immediate(&mut self, name: &'static str) -> OperandClass {
        self.class(name, ClassKind::Immediate)
    }

    /// Declare an addressing-mode class whose register inputs come from `mask`.
    pub fn composite(&mut self, name: &'static str, mask: RegMask) -> OperandClass {
        self.class(name, ClassKind::Composite { mask })
    }

    /// Declare a class for interior pieces of larger patterns.
    pub fn internal(&mut self, name: &'static str) -> OperandClass {
        self.class(name, ClassKind::Internal)
    }

    /// Declare a class standing for any value of `members`.
    ///
    /// Every member converts into the union through a free chain rule.
    pub fn union(&mut self, name: &'static str, members: &[OperandClass]) -> OperandClass {
        let mut mask = RegMask::new();
        for &m in members {
            match &self.classes[m].kind {
                ClassKind::Register { mask: m, .. }
                | ClassKind::Composite { mask: m }
                | ClassKind::Union { mask: m, .. } => mask.union(m),
                ClassKind::Immediate | ClassKind::Internal | ClassKind::Universe => {}
            }
        }
        let union = self.class(
            name,
            ClassKind::Union {
                members: members.to_vec(),
                mask,
            },
        );
        for &m in members {
            self.chain(name, union, m, 0);
        }
        union
    }

    /// Declare the class produced by instructions without a register result.
    pub fn universe(&mut self, name: &'static str) -> OperandClass {
        self.class(name, ClassKind::Universe)
    }

    /// Accept a value already in a register of kind `ideal` as class `class`.
    pub fn reg_operand(&mut self, name: &'static str, class: OperandClass, ideal: IdealReg) -> RuleId {
        self.rule(name, class, Pattern::Reg(ideal), 0, RuleKind::Operand, false)
    }

    /// An operand rule whose matched leaf is folded into the operand, such as an immediate.
    pub fn swallowed(&mut self, name: &'static str, class: OperandClass, pattern: Pattern) -> RuleId {
        debug_assert!(pattern.kids().iter().all(Option::is_none));
        self.rule(name, class, pattern, 0, RuleKind::Operand, true)
    }

    /// An operand rule whose children become inputs of the consuming instruction.
    pub fn operand(
        &mut self,
        name: &'static str,
        class: OperandClass,
        pattern: Pattern,
        cost: u32,
    ) -> RuleId {
        self.rule(name, class, pattern, cost, RuleKind::Operand, false)
    }

    /// An interior piece of a larger pattern.
    pub fn internal_rule(
        &mut self,
        name: &'static str,
        class: OperandClass,
        pattern: Pattern,
        cost: u32,
    ) -> RuleId {
        self.rule(name, class, pattern, cost, RuleKind::Internal, false)
    }

    /// A machine instruction producing `result`.
    pub fn instruction(
        &mut self,
        name: &'static str,
        result: OperandClass,
        pattern: Pattern,
        cost: u32,
    ) -> RuleId {
        self.rule(name, result, pattern, cost, RuleKind::Instruction, false)
    }

    /// Make class `from` usable where `to` is expected, at `cost`.
    pub fn chain(
        &mut self,
        name: &'static str,
        to: OperandClass,
        from: OperandClass,
        cost: u32,
    ) -> RuleId {
        self.rule(name, to, Pattern::Chain(from), cost, RuleKind::Operand, false)
    }

    /// A machine instruction converting class `from` into `to`, such as loading a constant.
    pub fn chain_instruction(
        &mut self,
        name: &'static str,
        to: OperandClass,
        from: OperandClass,
        cost: u32,
    ) -> RuleId {
        self.rule(name, to, Pattern::Chain(from), cost, RuleKind::Instruction, false)
    }

    /// Freeze the grammar, indexing rules by what they match.
    pub fn build(self) -> Grammar {
        let mut by_opcode: FxHashMap<_, Vec<RuleId>> = FxHashMap::default();
        let mut by_reg: FxHashMap<_, Vec<RuleId>> = FxHashMap::default();
        let mut chains = Vec::new();
        for (r, rule) in self.rules.iter() {
            match rule.pattern {
                Pattern::Node { opcode, .. } => by_opcode.entry(opcode).or_default().push(r),
                Pattern::Reg(ireg) => by_reg.entry(ireg).or_default().push(r),
                Pattern::Chain(_) => chains.push(r),
            }
        }
        log::debug!(
            "grammar with {} classes and {} rules",
            self.classes.len(),
            self.rules.len()
        );
        Grammar {
            classes: self.classes,
            rules: self.rules,
            by_opcode,
            by_reg,
            chains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::registers::OptoReg;

    #[test]
    fn unions_collect_masks_and_chains() {
        let mut b = GrammarBuilder::new();
        let a = b.register("a", IdealReg::RegP, RegMask::from_reg(OptoReg::new(0)));
        let c = b.composite("c", RegMask::from_reg(OptoReg::new(2)));
        let u = b.union("u", &[a, c]);
        let g = b.build();
        let mut want = RegMask::from_reg(OptoReg::new(0));
        want.insert(OptoReg::new(2));
        assert_eq!(g.class_mask(u), want);
        assert_eq!(g.num_rules(), 2);
        assert!(matches!(g.rule(RuleId::from_u32(1)).pattern, Pattern::Chain(x) if x == c));
        assert_eq!(g.class_ideal(a), Some(IdealReg::RegP));
        assert_eq!(g.class_ideal(u), None);
        assert_eq!(g.class_named("u"), Some(u));
    }
}
