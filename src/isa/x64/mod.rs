//! The x86-64 platform.

use crate::ir::types::IdealReg;
use crate::isa::call_conv::CallingConvention;
use crate::isa::registers::{OptoReg, OptoRegPair};
use crate::isa::{Platform, RegInfo};
use crate::regmask::RegMask;

mod abi;
pub mod grammar;
pub(crate) mod regs;

/// Description of an x86-64 target.
#[derive(Clone, Debug)]
pub struct X64Platform {
    registers: Vec<RegInfo>,
    masks: [RegMask; IdealReg::COUNT],
    compressed_oops: bool,
}

impl X64Platform {
    /// Create the platform description.
    pub fn new() -> Self {
        Self {
            registers: regs::register_table(),
            masks: IdealReg::ALL.map(regs::class_mask),
            compressed_oops: true,
        }
    }

    /// Decide whether a `DecodeN` may fold into address expressions.
    ///
    /// That is only possible with a zero-based compressed-pointer encoding, which is the default.
    pub fn with_complex_narrow_addresses(mut self, enable: bool) -> Self {
        self.compressed_oops = enable;
        self
    }
}

impl Default for X64Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for X64Platform {
    fn name(&self) -> &'static str {
        "x64"
    }

    fn registers(&self) -> &[RegInfo] {
        &self.registers
    }

    fn stack0(&self) -> OptoReg {
        regs::STACK0
    }

    fn in_preserve_stack_slots(&self) -> u32 {
        // Return address and saved frame pointer.
        4
    }

    fn out_preserve_stack_slots(&self) -> u32 {
        0
    }

    fn stack_alignment_in_slots(&self) -> u32 {
        4
    }

    fn varargs_c_out_slots_killed(&self) -> u32 {
        0
    }

    fn return_addr(&self, fixed_slots: u32) -> OptoReg {
        let align = self.stack_alignment_in_slots();
        let above = (self.in_preserve_stack_slots() + fixed_slots).next_multiple_of(align);
        OptoReg::new(regs::STACK0.index() - 2 + above)
    }

    fn c_frame_pointer(&self) -> OptoReg {
        regs::opto_reg(regs::rsp())
    }

    fn return_value(&self, ideal: IdealReg, _is_c: bool) -> OptoRegPair {
        let (first, second) = regs::return_reg(ideal);
        OptoRegPair::new(first, second)
    }

    fn java_calling_convention(&self) -> &dyn CallingConvention {
        &abi::JAVA_CC
    }

    fn c_calling_convention(&self) -> &dyn CallingConvention {
        &abi::C_CC
    }

    fn ideal_reg_mask(&self, ideal: IdealReg) -> RegMask {
        self.masks[ideal.index()]
    }

    fn narrow_oop_use_complex_address(&self) -> bool {
        self.compressed_oops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::SavePolicy;

    #[test]
    fn frame_constants() {
        let p = X64Platform::new();
        assert_eq!(p.stack0(), OptoReg::new(98));
        assert_eq!(p.return_addr(0), OptoReg::new(100));
        assert_eq!(p.return_addr(1), OptoReg::new(104));
        assert_eq!(p.receiver(), Some(regs::gpr_slot(regs::ENC_RSI)));
        assert_eq!(
            p.return_value(IdealReg::RegL, false),
            OptoRegPair::new(Some(OptoReg::new(0)), Some(OptoReg::new(1)))
        );
    }

    #[test]
    fn save_on_entry_registers() {
        let p = X64Platform::new();
        let soe: Vec<_> = p
            .registers()
            .iter()
            .filter(|r| r.save_policy.is_save_on_entry())
            .map(|r| r.name)
            .collect();
        assert_eq!(soe, ["rbx", "rbx_H", "r12", "r12_H", "xmm15", "xmm15b"]);
        assert_eq!(p.registers()[8].save_policy, SavePolicy::NoSave);
    }
}
