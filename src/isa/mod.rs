//! Platform descriptions.
//!
//! A [`Platform`] tells the matcher everything it needs to know about the target beyond the
//! grammar: how registers are numbered and saved, where the stack area begins, how values are
//! passed and returned, and the register masks of each ideal register kind.
//!
//! The matcher itself is target-independent. The bundled [`x64`] module describes an x86-64
//! platform and comes with a sample grammar.

use crate::ir::types::{BasicType, IdealReg};
use crate::isa::call_conv::CallingConvention;
use crate::isa::registers::{OptoReg, OptoRegPair, VMReg};
use crate::regmask::RegMask;
use core::fmt;

pub mod call_conv;
pub mod registers;
pub mod x64;

/// How a register is preserved across calls.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SavePolicy {
    /// Save-on-call: clobbered by calls.
    CallerSaved,
    /// Save-on-entry: preserved by callees, so every method saves it before use.
    CalleeSaved,
    /// Always saved: clobbered by calls and preserved by callees.
    AlwaysSave,
    /// Never saved: not available to the register allocator.
    NoSave,
}

impl SavePolicy {
    /// The one-letter code of this policy.
    pub fn letter(self) -> char {
        match self {
            Self::CallerSaved => 'C',
            Self::CalleeSaved => 'E',
            Self::AlwaysSave => 'A',
            Self::NoSave => 'N',
        }
    }

    /// Is the register clobbered by calls?
    pub fn is_caller_save(self) -> bool {
        matches!(self, Self::CallerSaved | Self::AlwaysSave)
    }

    /// Must a method save the register on entry?
    pub fn is_save_on_entry(self) -> bool {
        matches!(self, Self::CalleeSaved | Self::AlwaysSave)
    }
}

impl fmt::Display for SavePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// One machine register half.
#[derive(Clone, Debug)]
pub struct RegInfo {
    /// Assembly name.
    pub name: &'static str,
    /// Allocator location.
    pub reg: OptoReg,
    /// How the register is preserved across calls.
    pub save_policy: SavePolicy,
    /// The register kind used to save and restore it.
    pub save_type: IdealReg,
}

/// Everything the matcher needs to know about a target besides its grammar.
pub trait Platform: Send + Sync {
    /// Name of the platform.
    fn name(&self) -> &'static str;

    /// Every machine register half, in location order.
    ///
    /// Locations below [`Platform::stack0`] that are missing from the list are not registers.
    fn registers(&self) -> &[RegInfo];

    /// The first stack-slot location.
    fn stack0(&self) -> OptoReg;

    /// Slots between the caller's outgoing arguments and the callee's frame.
    fn in_preserve_stack_slots(&self) -> u32;

    /// Slots below the outgoing argument area a callee may clobber.
    fn out_preserve_stack_slots(&self) -> u32;

    /// Stack alignment, in slots.
    fn stack_alignment_in_slots(&self) -> u32;

    /// Slots past the outgoing arguments a C call may clobber.
    fn varargs_c_out_slots_killed(&self) -> u32;

    /// Location of the return address in a frame with `fixed_slots` fixed slots.
    fn return_addr(&self, fixed_slots: u32) -> OptoReg;

    /// The frame-pointer register seen by C code.
    fn c_frame_pointer(&self) -> OptoReg;

    /// Locations a value of kind `ideal` is returned in, for a C callee when `is_c`.
    fn return_value(&self, ideal: IdealReg, is_c: bool) -> OptoRegPair;

    /// The convention compiled code uses for its own calls.
    fn java_calling_convention(&self) -> &dyn CallingConvention;

    /// The convention of the C runtime.
    fn c_calling_convention(&self) -> &dyn CallingConvention;

    /// Registers a value of kind `ideal` may live in.
    fn ideal_reg_mask(&self, ideal: IdealReg) -> RegMask;

    /// Can a `DecodeN` fold into the address expressions that use it?
    fn narrow_oop_use_complex_address(&self) -> bool;

    /// The register holding the receiver, the first argument of a Java call.
    fn receiver(&self) -> Option<OptoReg> {
        match self.java_calling_convention().assign(&[BasicType::Object])[..] {
            [pair] => match pair.first {
                Some(VMReg::Reg(r)) => Some(r),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Debug for dyn Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Platform")
            .field("name", &self.name())
            .field("stack0", &self.stack0())
            .finish_non_exhaustive()
    }
}
