//! Value kinds, constants and condition codes carried by graph nodes.

use core::fmt;

/// The kind of machine register a value lives in.
///
/// Every value-producing node has an ideal register kind; it selects the register class, the
/// spill mask and the register-leaf rules of the grammar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdealReg {
    /// Compressed (narrow) pointer.
    RegN,
    /// 32-bit integer.
    RegI,
    /// 64-bit integer.
    RegL,
    /// Single-precision float.
    RegF,
    /// Double-precision float.
    RegD,
    /// Full-width pointer.
    RegP,
    /// 4-byte vector.
    VecS,
    /// 8-byte vector.
    VecD,
    /// 16-byte vector.
    VecX,
    /// 32-byte vector.
    VecY,
    /// 64-byte vector.
    VecZ,
    /// Condition flags.
    RegFlags,
}

impl IdealReg {
    /// Number of distinct ideal register kinds.
    pub const COUNT: usize = 12;

    /// All ideal register kinds, in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::RegN,
        Self::RegI,
        Self::RegL,
        Self::RegF,
        Self::RegD,
        Self::RegP,
        Self::VecS,
        Self::VecD,
        Self::VecX,
        Self::VecY,
        Self::VecZ,
        Self::RegFlags,
    ];

    /// Dense index of this kind, for per-kind tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Number of 32-bit register-mask slots a value of this kind occupies.
    pub fn slots(self) -> u32 {
        match self {
            Self::RegN | Self::RegI | Self::RegF | Self::VecS | Self::RegFlags => 1,
            Self::RegL | Self::RegD | Self::RegP | Self::VecD => 2,
            Self::VecX => 4,
            Self::VecY => 8,
            Self::VecZ => 16,
        }
    }

    /// Is this a vector kind?
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            Self::VecS | Self::VecD | Self::VecX | Self::VecY | Self::VecZ
        )
    }
}

impl fmt::Display for IdealReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The kind of one entry of a signature, as seen by a calling convention.
///
/// Longs and doubles are followed by a `Void` entry standing for their upper half.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BasicType {
    /// 32-bit integer, also used for booleans and sub-word integers.
    Int,
    /// 64-bit integer.
    Long,
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    /// Object reference.
    Object,
    /// Compressed object reference.
    NarrowOop,
    /// Raw address.
    Address,
    /// Upper half of the preceding long or double.
    Void,
    /// Vector of the given register kind.
    Vector(IdealReg),
}

impl BasicType {
    /// The register kind holding a value of this type, or `None` for `Void` halves.
    pub fn ideal_reg(self) -> Option<IdealReg> {
        match self {
            Self::Int => Some(IdealReg::RegI),
            Self::Long => Some(IdealReg::RegL),
            Self::Float => Some(IdealReg::RegF),
            Self::Double => Some(IdealReg::RegD),
            Self::Object | Self::Address => Some(IdealReg::RegP),
            Self::NarrowOop => Some(IdealReg::RegN),
            Self::Void => None,
            Self::Vector(ireg) => Some(ireg),
        }
    }

    /// Does a value of this type occupy two signature entries?
    pub fn is_two_word(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }
}

/// The parameter and result types of a method, stub or call site.
///
/// Entries are numbered from `slots::func::PARMS` in the node's input and projection numbering.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Parameter types, with `Void` after every long and double.
    pub params: Vec<BasicType>,
    /// Result types, with `Void` after a long or double result.
    pub returns: Vec<BasicType>,
}

impl Signature {
    /// Create a signature, inserting the `Void` halves after two-word types.
    pub fn new(params: &[BasicType], returns: &[BasicType]) -> Self {
        fn expand(types: &[BasicType]) -> Vec<BasicType> {
            let mut out = Vec::with_capacity(types.len() * 2);
            for &ty in types {
                out.push(ty);
                if ty.is_two_word() {
                    out.push(BasicType::Void);
                }
            }
            out
        }
        Self {
            params: expand(params),
            returns: expand(returns),
        }
    }

    /// Number of inputs up to and including the last parameter.
    pub fn domain_cnt(&self) -> usize {
        crate::ir::slots::func::PARMS + self.params.len()
    }

    /// Number of projections up to and including the last result.
    pub fn range_cnt(&self) -> usize {
        crate::ir::slots::func::PARMS + self.returns.len()
    }

    /// The register kind of the returned value, if any.
    pub fn return_reg(&self) -> Option<IdealReg> {
        self.returns.first().and_then(|ty| ty.ideal_reg())
    }
}

/// The value of a constant node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// Single-precision float, as raw bits.
    Float(u32),
    /// Double-precision float, as raw bits.
    Double(u64),
    /// Pointer.
    Ptr(u64),
    /// Compressed pointer.
    NarrowPtr(u32),
}

impl ConstValue {
    /// Is this the null pointer, compressed or not?
    pub fn is_null(self) -> bool {
        matches!(self, Self::Ptr(0) | Self::NarrowPtr(0))
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Int(v) => write!(f, "#{v}"),
            Self::Long(v) => write!(f, "#{v}L"),
            Self::Float(bits) => write!(f, "#{}f", f32::from_bits(bits)),
            Self::Double(bits) => write!(f, "#{}d", f64::from_bits(bits)),
            Self::Ptr(0) | Self::NarrowPtr(0) => f.write_str("#NULL"),
            Self::Ptr(p) => write!(f, "#ptr:{p:#x}"),
            Self::NarrowPtr(p) => write!(f, "#narrow:{p:#x}"),
        }
    }
}

/// The condition tested by a `Bool` node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BoolTest {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl BoolTest {
    /// The test that holds exactly when this one does not.
    pub fn negate(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
        }
    }
}

impl fmt::Display for BoolTest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_powers_of_two() {
        for ireg in IdealReg::ALL {
            assert!(ireg.slots().is_power_of_two(), "{ireg}");
        }
        assert_eq!(IdealReg::ALL[IdealReg::VecX.index()], IdealReg::VecX);
    }

    #[test]
    fn null_constants() {
        assert!(ConstValue::Ptr(0).is_null());
        assert!(ConstValue::NarrowPtr(0).is_null());
        assert!(!ConstValue::Long(0).is_null());
        assert_eq!(ConstValue::Ptr(0).to_string(), "#NULL");
        assert_eq!(ConstValue::Int(42).to_string(), "#42");
    }

    #[test]
    fn signature_halves() {
        let sig = Signature::new(&[BasicType::Int, BasicType::Long], &[BasicType::Double]);
        assert_eq!(
            sig.params,
            [BasicType::Int, BasicType::Long, BasicType::Void]
        );
        assert_eq!(sig.domain_cnt(), 8);
        assert_eq!(sig.range_cnt(), 7);
        assert_eq!(sig.return_reg(), Some(IdealReg::RegD));
        assert_eq!(Signature::default().return_reg(), None);
    }

    #[test]
    fn negated_tests() {
        assert_eq!(BoolTest::Ne.negate(), BoolTest::Eq);
        assert_eq!(BoolTest::Lt.negate().negate(), BoolTest::Lt);
    }
}
