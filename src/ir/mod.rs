//! Representation of the ideal and machine node graphs.

pub mod builder;
pub mod entities;
pub mod graph;
pub mod mach;
pub mod opcode;
pub mod slots;
pub mod types;

pub use crate::ir::builder::{CallProjs, GraphBuilder};
pub use crate::ir::entities::{AliasIdx, Node};
pub use crate::ir::graph::{
    Graph, MemAccess, MemOrder, NodeData, NodeKind, NodeMap, OutsCursor, Payload,
};
pub use crate::ir::mach::{ExitKind, MachInst, MachOperand, MachProj, ProjFlavour};
pub use crate::ir::opcode::{NodeFlags, Opcode};
pub use crate::ir::types::{BasicType, BoolTest, ConstValue, IdealReg, Signature};
