//! Machine node payloads.
//!
//! Matching turns ideal nodes into machine instructions ([`MachInst`]) and projections of
//! multi-valued machine nodes ([`MachProj`]). Both live in the same [`Graph`](super::Graph) as
//! ideal nodes and keep the ideal opcode they came from.

use crate::grammar::{OperandClass, RuleId};
use crate::ir::opcode::Opcode;
use crate::ir::types::{BoolTest, ConstValue, IdealReg};
use crate::regmask::RegMask;
use smallvec::SmallVec;

/// One operand of a machine instruction.
///
/// Register operands only carry their class; their value arrives through an input edge.
/// Immediates and condition codes matched inside the instruction are stored here instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachOperand {
    /// The operand class this operand was matched as.
    pub class: OperandClass,
    /// Constants folded into the operand, in match order.
    pub cons: SmallVec<[ConstValue; 1]>,
    /// The condition code of a folded `Bool`.
    pub cond: Option<BoolTest>,
}

impl MachOperand {
    /// A register or composite operand of class `class`.
    pub fn new(class: OperandClass) -> Self {
        Self {
            class,
            cons: SmallVec::new(),
            cond: None,
        }
    }
}

/// The exit shapes hanging off the root, which share one input-mask template per shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExitKind {
    /// Normal method return.
    Return,
    /// Exception unwind to the caller.
    Rethrow,
    /// Tail call.
    TailCall,
    /// Tail jump to an exception handler.
    TailJump,
    /// Forced halt.
    Halt,
}

impl ExitKind {
    /// Number of exit kinds.
    pub const COUNT: usize = 5;

    /// Dense index of this kind.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The exit kind of opcode `op`, if it is an exit.
    pub fn of(op: Opcode) -> Option<Self> {
        Some(match op {
            Opcode::Return => Self::Return,
            Opcode::Rethrow => Self::Rethrow,
            Opcode::TailCall => Self::TailCall,
            Opcode::TailJump => Self::TailJump,
            Opcode::Halt => Self::Halt,
            _ => return None,
        })
    }
}

/// A machine instruction built from one grammar rule.
#[derive(Clone, Debug)]
pub struct MachInst {
    /// The rule that produced this instruction.
    pub rule: RuleId,
    /// Operand 0 is the result; the rest follow match order.
    pub operands: SmallVec<[MachOperand; 4]>,
    /// The operand class that caught each required input, parallel to the node inputs.
    pub(crate) in_classes: SmallVec<[Option<OperandClass>; 6]>,
    /// Collector-specific barrier data copied from a memory access.
    pub barrier: u8,
    /// Per-input masks of a safepoint or call, over its domain.
    pub in_rms: Option<Vec<RegMask>>,
    /// The shared input-mask template of an exit.
    pub exit: Option<ExitKind>,
}

impl MachInst {
    /// Create an instruction for `rule` with result operand `result`.
    pub fn new(rule: RuleId, result: OperandClass) -> Self {
        let mut operands = SmallVec::new();
        operands.push(MachOperand::new(result));
        Self {
            rule,
            operands,
            in_classes: SmallVec::new(),
            barrier: 0,
            in_rms: None,
            exit: None,
        }
    }

    /// The operand class that caught input `idx`, if any.
    pub fn in_class(&self, idx: usize) -> Option<OperandClass> {
        self.in_classes.get(idx).copied().flatten()
    }
}

/// How a machine projection is allocated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProjFlavour {
    /// Not a register value: control, I/O or memory.
    Unmatched,
    /// A value in the locations of its mask.
    Value,
    /// A kill of every location in its mask.
    Fat,
}

/// A projection of a multi-valued machine node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachProj {
    /// Projection number.
    pub con: u32,
    /// Locations the projected value lives in, or kills.
    pub mask: RegMask,
    /// Register kind of the projected value.
    pub ideal: Option<IdealReg>,
    /// How the projection is allocated.
    pub flavour: ProjFlavour,
}
