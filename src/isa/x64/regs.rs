//! Registers of the x86-64 platform and their allocator locations.
//!
//! Every general-purpose register spans two 32-bit locations and every XMM register four, so a
//! 16-byte vector fits in one register. The flags register takes one location. Stack slots start
//! right after, at an even location.

use crate::ir::types::IdealReg;
use crate::isa::registers::OptoReg;
use crate::isa::{RegInfo, SavePolicy};
use crate::regmask::RegMask;
use regalloc2::{PReg, RegClass};

// Hardware encodings.

pub const ENC_RAX: u8 = 0;
pub const ENC_RCX: u8 = 1;
pub const ENC_RDX: u8 = 2;
pub const ENC_RBX: u8 = 3;
pub const ENC_RSP: u8 = 4;
pub const ENC_RBP: u8 = 5;
pub const ENC_RSI: u8 = 6;
pub const ENC_RDI: u8 = 7;
pub const ENC_R8: u8 = 8;
pub const ENC_R9: u8 = 9;
pub const ENC_R12: u8 = 12;
pub const ENC_R15: u8 = 15;

/// Number of general-purpose and of XMM registers.
pub const NUM_REGS: u8 = 16;

/// Locations per XMM register.
pub const XMM_SLOTS: u32 = 4;

/// Location of the first XMM register.
const XMM_BASE: u32 = 2 * NUM_REGS as u32;

/// Location of the flags register.
pub const RFLAGS: OptoReg = OptoReg::new(XMM_BASE + XMM_SLOTS * NUM_REGS as u32);

/// The first stack slot.
pub const STACK0: OptoReg = OptoReg::new(RFLAGS.index() + 2);

/// Low location of general-purpose register `enc`.
pub const fn gpr_slot(enc: u8) -> OptoReg {
    OptoReg::new(enc as u32 * 2)
}

/// First location of XMM register `enc`.
pub const fn xmm_slot(enc: u8) -> OptoReg {
    OptoReg::new(XMM_BASE + enc as u32 * XMM_SLOTS)
}

fn gpr(enc: u8) -> PReg {
    PReg::new(usize::from(enc), RegClass::Int)
}

fn fpr(enc: u8) -> PReg {
    PReg::new(usize::from(enc), RegClass::Float)
}

pub(crate) fn rax() -> PReg {
    gpr(ENC_RAX)
}
pub(crate) fn rsp() -> PReg {
    gpr(ENC_RSP)
}
pub(crate) fn rbp() -> PReg {
    gpr(ENC_RBP)
}
pub(crate) fn r15() -> PReg {
    // Holds the current thread.
    gpr(ENC_R15)
}
pub(crate) fn xmm0() -> PReg {
    fpr(0)
}

/// The first allocator location of `reg`.
pub(crate) fn opto_reg(reg: PReg) -> OptoReg {
    let enc = reg.hw_enc() as u8;
    match reg.class() {
        RegClass::Int => gpr_slot(enc),
        RegClass::Float | RegClass::Vector => xmm_slot(enc),
    }
}

const GPR_NAMES: [&str; NUM_REGS as usize] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15",
];

const GPR_HIGH_NAMES: [&str; NUM_REGS as usize] = [
    "rax_H", "rcx_H", "rdx_H", "rbx_H", "rsp_H", "rbp_H", "rsi_H", "rdi_H", "r8_H", "r9_H",
    "r10_H", "r11_H", "r12_H", "r13_H", "r14_H", "r15_H",
];

const XMM_NAMES: [[&str; XMM_SLOTS as usize]; NUM_REGS as usize] = [
    ["xmm0", "xmm0b", "xmm0c", "xmm0d"],
    ["xmm1", "xmm1b", "xmm1c", "xmm1d"],
    ["xmm2", "xmm2b", "xmm2c", "xmm2d"],
    ["xmm3", "xmm3b", "xmm3c", "xmm3d"],
    ["xmm4", "xmm4b", "xmm4c", "xmm4d"],
    ["xmm5", "xmm5b", "xmm5c", "xmm5d"],
    ["xmm6", "xmm6b", "xmm6c", "xmm6d"],
    ["xmm7", "xmm7b", "xmm7c", "xmm7d"],
    ["xmm8", "xmm8b", "xmm8c", "xmm8d"],
    ["xmm9", "xmm9b", "xmm9c", "xmm9d"],
    ["xmm10", "xmm10b", "xmm10c", "xmm10d"],
    ["xmm11", "xmm11b", "xmm11c", "xmm11d"],
    ["xmm12", "xmm12b", "xmm12c", "xmm12d"],
    ["xmm13", "xmm13b", "xmm13c", "xmm13d"],
    ["xmm14", "xmm14b", "xmm14c", "xmm14d"],
    ["xmm15", "xmm15b", "xmm15c", "xmm15d"],
];

fn gpr_policy(enc: u8) -> SavePolicy {
    match enc {
        ENC_RBX | ENC_R12 => SavePolicy::CalleeSaved,
        ENC_RSP | ENC_RBP | ENC_R15 => SavePolicy::NoSave,
        _ => SavePolicy::CallerSaved,
    }
}

fn xmm_policy(enc: u8, slot: u32) -> SavePolicy {
    // The low double of xmm15 survives calls.
    if enc == 15 && slot < 2 {
        SavePolicy::CalleeSaved
    } else {
        SavePolicy::CallerSaved
    }
}

/// Every register half, in location order.
pub(crate) fn register_table() -> Vec<RegInfo> {
    let mut regs = Vec::with_capacity(STACK0.index() as usize);
    for enc in 0..NUM_REGS {
        let low = opto_reg(gpr(enc));
        let save_policy = gpr_policy(enc);
        regs.push(RegInfo {
            name: GPR_NAMES[usize::from(enc)],
            reg: low,
            save_policy,
            save_type: IdealReg::RegI,
        });
        regs.push(RegInfo {
            name: GPR_HIGH_NAMES[usize::from(enc)],
            reg: low.add(1),
            save_policy,
            save_type: IdealReg::RegI,
        });
    }
    for enc in 0..NUM_REGS {
        let first = opto_reg(fpr(enc));
        for slot in 0..XMM_SLOTS {
            regs.push(RegInfo {
                name: XMM_NAMES[usize::from(enc)][slot as usize],
                reg: first.add(slot),
                save_policy: xmm_policy(enc, slot),
                save_type: IdealReg::RegF,
            });
        }
    }
    regs.push(RegInfo {
        name: "rflags",
        reg: RFLAGS,
        save_policy: SavePolicy::CallerSaved,
        save_type: IdealReg::RegFlags,
    });
    regs
}

fn allocatable_gpr(reg: PReg) -> bool {
    reg != rsp() && reg != rbp() && reg != r15()
}

/// Registers a value of kind `ideal` may be allocated to.
pub(crate) fn class_mask(ideal: IdealReg) -> RegMask {
    let mut mask = RegMask::new();
    match ideal {
        IdealReg::RegN | IdealReg::RegI => {
            for enc in 0..NUM_REGS {
                if allocatable_gpr(gpr(enc)) {
                    mask.insert(opto_reg(gpr(enc)));
                }
            }
        }
        IdealReg::RegL | IdealReg::RegP => {
            for enc in 0..NUM_REGS {
                if allocatable_gpr(gpr(enc)) {
                    let low = opto_reg(gpr(enc));
                    mask.insert_range(low, low.add(2));
                }
            }
        }
        IdealReg::RegF | IdealReg::VecS | IdealReg::RegD | IdealReg::VecD | IdealReg::VecX => {
            let width = ideal.slots();
            for enc in 0..NUM_REGS {
                let first = opto_reg(fpr(enc));
                mask.insert_range(first, first.add(width));
            }
        }
        // Wider vectors do not fit in one XMM register.
        IdealReg::VecY | IdealReg::VecZ => {}
        IdealReg::RegFlags => mask.insert(RFLAGS),
    }
    mask
}

/// Every pointer register, the stack, frame and thread pointers included.
pub(crate) fn any_reg_p_mask() -> RegMask {
    let mut mask = RegMask::new();
    for enc in 0..NUM_REGS {
        let low = opto_reg(gpr(enc));
        mask.insert_range(low, low.add(2));
    }
    mask
}

/// The register pair holding a returned value of kind `ideal`.
pub(crate) fn return_reg(ideal: IdealReg) -> (Option<OptoReg>, Option<OptoReg>) {
    let rax = opto_reg(rax());
    let xmm0 = opto_reg(xmm0());
    match ideal {
        IdealReg::RegI | IdealReg::RegN => (Some(rax), None),
        IdealReg::RegL | IdealReg::RegP => (Some(rax), Some(rax.add(1))),
        IdealReg::RegF | IdealReg::VecS => (Some(xmm0), None),
        IdealReg::RegD | IdealReg::VecD => (Some(xmm0), Some(xmm0.add(1))),
        IdealReg::VecX => (Some(xmm0), Some(xmm0.add(XMM_SLOTS - 1))),
        IdealReg::VecY | IdealReg::VecZ | IdealReg::RegFlags => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_dense() {
        let regs = register_table();
        assert_eq!(regs.len(), RFLAGS.index() as usize + 1);
        for (i, r) in regs.iter().enumerate() {
            assert_eq!(r.reg.index() as usize, i, "{}", r.name);
        }
        assert_eq!(regs[6].name, "rbx");
        assert_eq!(regs[6].save_policy, SavePolicy::CalleeSaved);
        assert_eq!(regs[xmm_slot(15).index() as usize + 1].name, "xmm15b");
        assert_eq!(STACK0.index() % 2, 0);
    }

    #[test]
    fn class_masks() {
        let ints = class_mask(IdealReg::RegI);
        assert!(ints.member(opto_reg(rax())));
        assert!(!ints.member(opto_reg(rsp())));
        assert!(!ints.member(opto_reg(rax()).add(1)));
        let longs = class_mask(IdealReg::RegL);
        assert!(longs.member(opto_reg(rax()).add(1)));
        assert_eq!(class_mask(IdealReg::VecX).count(), 64);
        assert!(class_mask(IdealReg::VecY).is_empty());
        assert!(any_reg_p_mask().member(opto_reg(rsp())));
    }
}
