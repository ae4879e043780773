//! Calling conventions of the x86-64 platform.

use crate::isa::call_conv::RegisterSequenceCC;
use crate::isa::registers::OptoReg;
use crate::isa::x64::regs::{
    ENC_R8, ENC_R9, ENC_RCX, ENC_RDI, ENC_RDX, ENC_RSI, XMM_SLOTS, gpr_slot, xmm_slot,
};

// Compiled code passes the receiver in rsi, leaving rdi free for the callee.
static JAVA_INT_ARGS: [OptoReg; 6] = [
    gpr_slot(ENC_RSI),
    gpr_slot(ENC_RDX),
    gpr_slot(ENC_RCX),
    gpr_slot(ENC_R8),
    gpr_slot(ENC_R9),
    gpr_slot(ENC_RDI),
];

// System V.
static C_INT_ARGS: [OptoReg; 6] = [
    gpr_slot(ENC_RDI),
    gpr_slot(ENC_RSI),
    gpr_slot(ENC_RDX),
    gpr_slot(ENC_RCX),
    gpr_slot(ENC_R8),
    gpr_slot(ENC_R9),
];

static FLOAT_ARGS: [OptoReg; 8] = [
    xmm_slot(0),
    xmm_slot(1),
    xmm_slot(2),
    xmm_slot(3),
    xmm_slot(4),
    xmm_slot(5),
    xmm_slot(6),
    xmm_slot(7),
];

/// The convention of calls between compiled methods.
pub static JAVA_CC: RegisterSequenceCC =
    RegisterSequenceCC::new(&JAVA_INT_ARGS, &FLOAT_ARGS, XMM_SLOTS);

/// The convention of calls into the C runtime.
pub static C_CC: RegisterSequenceCC = RegisterSequenceCC::new(&C_INT_ARGS, &FLOAT_ARGS, XMM_SLOTS);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::BasicType;
    use crate::isa::call_conv::CallingConvention;
    use crate::isa::registers::{VMReg, VMRegPair};

    #[test]
    fn receiver_goes_first() {
        let java = JAVA_CC.assign(&[BasicType::Object, BasicType::Int]);
        assert_eq!(java[0], VMRegPair::two(VMReg::Reg(gpr_slot(ENC_RSI))));
        assert_eq!(java[1], VMRegPair::one(VMReg::Reg(gpr_slot(ENC_RDX))));
        let c = C_CC.assign(&[BasicType::Address]);
        assert_eq!(c[0], VMRegPair::two(VMReg::Reg(gpr_slot(ENC_RDI))));
    }

    #[test]
    fn seventh_int_spills() {
        let sig = [BasicType::Int; 7];
        let regs = JAVA_CC.assign(&sig);
        assert_eq!(regs[6], VMRegPair::one(VMReg::Stack(0)));
    }
}
