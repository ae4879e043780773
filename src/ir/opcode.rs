//! Node opcodes and their static properties.

use crate::ir::slots::{addp, func, mem};
use crate::ir::types::IdealReg;
use core::fmt;

bitflags::bitflags! {
    /// Static capabilities of an opcode.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u16 {
        /// Produces or consumes control.
        const CONTROL = 1 << 0;
        /// Produces or consumes memory state.
        const MEMORY = 1 << 1;
        /// Reads memory.
        const LOAD = 1 << 2;
        /// Writes memory.
        const STORE = 1 << 3;
        /// Atomically reads and writes memory.
        const LOAD_STORE = 1 << 4;
        /// A compile-time constant.
        const CONSTANT = 1 << 5;
        /// Produces a tuple consumed through projections.
        const MULTI = 1 << 6;
        /// Selects one element of a tuple.
        const PROJ = 1 << 7;
        /// Carries debug info for deoptimization.
        const SAFEPOINT = 1 << 8;
        /// A call.
        const CALL = 1 << 9;
        /// Starts a basic block.
        const BLOCK_START = 1 << 10;
        /// Re-matched at every use instead of being shared.
        const MUST_CLONE = 1 << 11;
        /// Matched by the grammar even though it produces no register value.
        const MATCH_WITHOUT_REG = 1 << 12;
    }
}

/// An ideal node opcode.
///
/// Machine nodes keep the opcode of the ideal node they were built from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs, reason = "opcode names are self-describing")]
pub enum Opcode {
    // Graph structure.
    Root,
    Start,
    Region,
    Phi,
    Parm,
    Proj,
    Top,
    MergeMem,

    // Control flow.
    If,
    IfTrue,
    IfFalse,
    Return,
    Rethrow,
    Halt,
    TailCall,
    TailJump,
    SafePoint,
    CallStaticJava,
    CallDynamicJava,
    CallRuntime,
    CallLeaf,
    Catch,
    CatchProj,
    MemBarAcquire,
    MemBarRelease,

    // Constants.
    ConI,
    ConL,
    ConF,
    ConD,
    ConP,
    ConN,

    // Arithmetic and conversions.
    AddI,
    SubI,
    MulI,
    AndI,
    OrI,
    XorI,
    LShiftI,
    AddL,
    SubL,
    MulL,
    AndL,
    AddF,
    AddD,
    AddP,
    ConvI2L,
    ConvL2I,
    ConvI2D,
    ConvI2F,
    ReverseBytesI,
    ReverseBytesL,
    EncodeP,
    DecodeN,

    // Compares and conditions.
    CmpI,
    CmpU,
    CmpL,
    CmpP,
    CmpN,
    CmpF,
    CmpD,
    Bool,
    CMoveI,
    CMoveL,
    CMoveP,
    Binary,

    // Memory.
    LoadB,
    LoadI,
    LoadL,
    LoadF,
    LoadD,
    LoadP,
    LoadN,
    StoreB,
    StoreI,
    StoreL,
    StoreF,
    StoreD,
    StoreP,
    StoreN,
    CompareAndSwapI,
    CompareAndSwapL,
    CompareAndSwapP,
    CompareAndSwapN,
}

impl Opcode {
    /// Static capabilities of this opcode.
    pub fn flags(self) -> NodeFlags {
        use Opcode::*;
        let ctrl = NodeFlags::CONTROL;
        match self {
            Root => ctrl,
            Start => ctrl | NodeFlags::MULTI | NodeFlags::BLOCK_START,
            Region => ctrl | NodeFlags::BLOCK_START,
            Parm | Proj => NodeFlags::PROJ,
            MergeMem => NodeFlags::MEMORY,
            If => ctrl | NodeFlags::MULTI | NodeFlags::MATCH_WITHOUT_REG,
            IfTrue | IfFalse | CatchProj => ctrl | NodeFlags::PROJ | NodeFlags::BLOCK_START,
            Catch => ctrl | NodeFlags::MULTI,
            Return | Rethrow | Halt | TailCall | TailJump => ctrl | NodeFlags::MATCH_WITHOUT_REG,
            SafePoint => {
                ctrl | NodeFlags::MULTI | NodeFlags::SAFEPOINT | NodeFlags::MATCH_WITHOUT_REG
            }
            CallStaticJava | CallDynamicJava | CallRuntime | CallLeaf => {
                ctrl | NodeFlags::MULTI
                    | NodeFlags::SAFEPOINT
                    | NodeFlags::CALL
                    | NodeFlags::MATCH_WITHOUT_REG
            }
            MemBarAcquire | MemBarRelease => {
                ctrl | NodeFlags::MULTI | NodeFlags::MEMORY | NodeFlags::MATCH_WITHOUT_REG
            }
            ConI | ConL | ConF | ConD | ConP | ConN => NodeFlags::CONSTANT,
            CmpI | CmpU | CmpL | CmpP | CmpN | CmpF | CmpD => NodeFlags::MUST_CLONE,
            LoadB | LoadI | LoadL | LoadF | LoadD | LoadP | LoadN => {
                NodeFlags::MEMORY | NodeFlags::LOAD
            }
            StoreB | StoreI | StoreL | StoreF | StoreD | StoreP | StoreN => {
                NodeFlags::MEMORY | NodeFlags::STORE | NodeFlags::MATCH_WITHOUT_REG
            }
            CompareAndSwapI | CompareAndSwapL | CompareAndSwapP | CompareAndSwapN => {
                NodeFlags::MEMORY | NodeFlags::LOAD_STORE
            }
            _ => NodeFlags::empty(),
        }
    }

    /// The register kind of the value this opcode produces, when it is fixed by the opcode.
    ///
    /// Phis and projections get theirs from the graph builder.
    pub fn ideal_reg(self) -> Option<IdealReg> {
        use IdealReg::*;
        use Opcode::*;
        Some(match self {
            ConI | AddI | SubI | MulI | AndI | OrI | XorI | LShiftI | ConvL2I | ReverseBytesI
            | Bool | CMoveI | LoadB | LoadI | CompareAndSwapI | CompareAndSwapL
            | CompareAndSwapP | CompareAndSwapN => RegI,
            ConL | AddL | SubL | MulL | AndL | ConvI2L | ReverseBytesL | CMoveL | LoadL => RegL,
            ConF | AddF | ConvI2F | LoadF => RegF,
            ConD | AddD | ConvI2D | LoadD => RegD,
            ConP | AddP | DecodeN | CMoveP | LoadP => RegP,
            ConN | EncodeP | LoadN => RegN,
            CmpI | CmpU | CmpL | CmpP | CmpN | CmpF | CmpD => RegFlags,
            _ => return None,
        })
    }

    /// Is input `idx` of a node with this opcode part of its match tree?
    ///
    /// Inputs that are not match edges are copied to the machine node verbatim.
    pub fn match_edge(self, idx: usize) -> bool {
        use Opcode::*;
        match self {
            Return | SafePoint => idx == func::PARMS,
            TailCall | TailJump => idx == func::PARMS || idx == func::PARMS + 1,
            Rethrow | Halt | CallStaticJava | CallDynamicJava | CallRuntime | CallLeaf
            | MemBarAcquire | MemBarRelease | Bool => false,
            AddP => idx > addp::BASE,
            _ if self.is_load() => idx == mem::ADDRESS,
            _ if self.is_store() || self.is_load_store() => {
                idx == mem::ADDRESS || idx == mem::VALUE_IN
            }
            _ => idx != 0,
        }
    }

    /// Is this a constant?
    pub fn is_con(self) -> bool {
        self.flags().contains(NodeFlags::CONSTANT)
    }

    /// Is this a load?
    pub fn is_load(self) -> bool {
        self.flags().contains(NodeFlags::LOAD)
    }

    /// Is this a store?
    pub fn is_store(self) -> bool {
        self.flags().contains(NodeFlags::STORE)
    }

    /// Is this an atomic read-modify-write?
    pub fn is_load_store(self) -> bool {
        self.flags().contains(NodeFlags::LOAD_STORE)
    }

    /// Does this opcode access memory through an address input?
    pub fn is_mem_access(self) -> bool {
        self.flags()
            .intersects(NodeFlags::LOAD | NodeFlags::STORE | NodeFlags::LOAD_STORE)
    }

    /// Is this a projection?
    pub fn is_proj(self) -> bool {
        self.flags().contains(NodeFlags::PROJ)
    }

    /// Does this opcode produce a tuple?
    pub fn is_multi(self) -> bool {
        self.flags().contains(NodeFlags::MULTI)
    }

    /// Is this a safepoint or call?
    pub fn is_safepoint(self) -> bool {
        self.flags().contains(NodeFlags::SAFEPOINT)
    }

    /// Is this a call?
    pub fn is_call(self) -> bool {
        self.flags().contains(NodeFlags::CALL)
    }

    /// Is this a call into the C runtime?
    pub fn is_call_runtime(self) -> bool {
        matches!(self, Self::CallRuntime | Self::CallLeaf)
    }

    /// Does this opcode start a basic block?
    pub fn is_block_start(self) -> bool {
        self.flags().contains(NodeFlags::BLOCK_START)
    }

    /// Is this a compare-and-swap?
    pub fn is_cas(self) -> bool {
        self.is_load_store()
    }

    /// Is this a conditional move?
    pub fn is_cmove(self) -> bool {
        matches!(self, Self::CMoveI | Self::CMoveL | Self::CMoveP)
    }

    /// Is this one of the method exits hanging off the root?
    pub fn is_exit(self) -> bool {
        matches!(
            self,
            Self::Return | Self::Rethrow | Self::Halt | Self::TailCall | Self::TailJump
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_edges() {
        assert!(Opcode::Return.match_edge(func::PARMS));
        assert!(!Opcode::Return.match_edge(func::MEMORY));
        assert!(!Opcode::CallStaticJava.match_edge(func::PARMS));
        assert!(Opcode::LoadI.match_edge(mem::ADDRESS));
        assert!(!Opcode::LoadI.match_edge(mem::MEMORY));
        assert!(Opcode::StoreI.match_edge(mem::VALUE_IN));
        assert!(!Opcode::AddP.match_edge(addp::BASE));
        assert!(Opcode::AddP.match_edge(addp::OFFSET));
        assert!(Opcode::AddI.match_edge(2));
        assert!(!Opcode::AddI.match_edge(0));
        assert!(!Opcode::Bool.match_edge(1));
    }

    #[test]
    fn flags_and_kinds() {
        assert!(Opcode::CmpI.flags().contains(NodeFlags::MUST_CLONE));
        assert_eq!(Opcode::CmpP.ideal_reg(), Some(IdealReg::RegFlags));
        assert_eq!(Opcode::StoreI.ideal_reg(), None);
        assert!(Opcode::StoreI.flags().contains(NodeFlags::MATCH_WITHOUT_REG));
        assert!(Opcode::CallLeaf.is_call_runtime());
        assert!(!Opcode::Start.flags().contains(NodeFlags::MATCH_WITHOUT_REG));
        assert_eq!(Opcode::ConvI2D.to_string(), "ConvI2D");
    }
}
