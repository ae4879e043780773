//! Calling conventions.

use crate::ir::types::BasicType;
use crate::isa::registers::{OptoReg, VMReg, VMRegPair};

/// Assigns locations to the entries of a signature.
pub trait CallingConvention: Send + Sync {
    /// Assign one location pair per signature entry.
    ///
    /// `Void` entries get [`VMRegPair::bad`]. Stack slots are reported as [`VMReg::Stack`]
    /// offsets from the start of the argument area.
    fn assign(&self, sig: &[BasicType]) -> Vec<VMRegPair>;
}

/// A convention that passes values in fixed register sequences and spills the rest to the
/// stack, two slots per entry.
#[derive(Clone, Debug)]
pub struct RegisterSequenceCC {
    int_regs: &'static [OptoReg],
    float_regs: &'static [OptoReg],
    float_slots: u32,
}

impl RegisterSequenceCC {
    /// Pass integers and pointers in `int_regs`, floats and vectors in `float_regs`.
    ///
    /// A float register spans `float_slots` locations; vectors use as many of them as they need.
    pub const fn new(
        int_regs: &'static [OptoReg],
        float_regs: &'static [OptoReg],
        float_slots: u32,
    ) -> Self {
        Self {
            int_regs,
            float_regs,
            float_slots,
        }
    }
}

impl CallingConvention for RegisterSequenceCC {
    fn assign(&self, sig: &[BasicType]) -> Vec<VMRegPair> {
        let mut ints = self.int_regs.iter();
        let mut floats = self.float_regs.iter();
        let mut stk_args = 0;
        let mut next_stack = || {
            let slot = VMReg::Stack(stk_args);
            stk_args += 2;
            slot
        };
        sig.iter()
            .map(|&ty| match ty {
                BasicType::Void => VMRegPair::bad(),
                BasicType::Int => match ints.next() {
                    Some(&r) => VMRegPair::one(VMReg::Reg(r)),
                    None => VMRegPair::one(next_stack()),
                },
                BasicType::Long | BasicType::Object | BasicType::Address => match ints.next() {
                    Some(&r) => VMRegPair::two(VMReg::Reg(r)),
                    None => VMRegPair::two(next_stack()),
                },
                BasicType::NarrowOop => match ints.next() {
                    Some(&r) => VMRegPair::one(VMReg::Reg(r)),
                    None => VMRegPair::one(next_stack()),
                },
                BasicType::Float => match floats.next() {
                    Some(&r) => VMRegPair::one(VMReg::Reg(r)),
                    None => VMRegPair::one(next_stack()),
                },
                BasicType::Double => match floats.next() {
                    Some(&r) => VMRegPair::two(VMReg::Reg(r)),
                    None => VMRegPair::two(next_stack()),
                },
                BasicType::Vector(ideal) => {
                    let last = ideal.slots().min(self.float_slots) - 1;
                    match floats.next() {
                        Some(&r) => VMRegPair::range(VMReg::Reg(r), VMReg::Reg(r.add(last))),
                        None => VMRegPair::bad(),
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::IdealReg;

    static INTS: [OptoReg; 2] = [OptoReg::new(10), OptoReg::new(12)];
    static FLOATS: [OptoReg; 1] = [OptoReg::new(40)];

    #[test]
    fn registers_then_stack() {
        let cc = RegisterSequenceCC::new(&INTS, &FLOATS, 4);
        let regs = cc.assign(&[
            BasicType::Long,
            BasicType::Void,
            BasicType::Int,
            BasicType::Object,
            BasicType::Float,
            BasicType::Double,
            BasicType::Void,
        ]);
        assert_eq!(regs[0], VMRegPair::two(VMReg::Reg(OptoReg::new(10))));
        assert!(regs[1].is_bad());
        assert_eq!(regs[2], VMRegPair::one(VMReg::Reg(OptoReg::new(12))));
        assert_eq!(regs[3], VMRegPair::two(VMReg::Stack(0)));
        assert_eq!(regs[4], VMRegPair::one(VMReg::Reg(OptoReg::new(40))));
        assert_eq!(regs[5], VMRegPair::two(VMReg::Stack(2)));
        assert!(regs[6].is_bad());
    }

    #[test]
    fn vectors_take_a_register_range() {
        let cc = RegisterSequenceCC::new(&INTS, &FLOATS, 4);
        let regs = cc.assign(&[BasicType::Vector(IdealReg::VecX)]);
        assert_eq!(
            regs[0],
            VMRegPair::range(VMReg::Reg(OptoReg::new(40)), VMReg::Reg(OptoReg::new(43)))
        );
    }
}
