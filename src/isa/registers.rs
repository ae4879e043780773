//! Register and stack-slot numbering.
//!
//! The matcher numbers every allocatable location with an [`OptoReg`]: machine register halves
//! first, then stack slots starting at the platform's `stack0`. Calling conventions report
//! locations as [`VMReg`]s, where stack slots are counted from the start of the argument area;
//! the matcher biases them into `OptoReg` numbers once it knows the frame layout.

use core::fmt;

/// A location number as seen by the register allocator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptoReg(u32);

impl OptoReg {
    /// Create a location from its number.
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// The location number.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// The location `n` slots above this one.
    pub const fn add(self, n: u32) -> Self {
        Self(self.0 + n)
    }
}

impl fmt::Display for OptoReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A location as reported by a calling convention.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VMReg {
    /// A machine register half.
    Reg(OptoReg),
    /// A stack slot, counted in 32-bit slots from the start of the argument area.
    Stack(u32),
}

impl VMReg {
    /// The next 32-bit location: the upper half of a register pair, or the next stack slot.
    pub fn next(self) -> Self {
        match self {
            Self::Reg(r) => Self::Reg(r.add(1)),
            Self::Stack(s) => Self::Stack(s + 1),
        }
    }

    /// Is this a stack slot?
    pub fn is_stack(self) -> bool {
        matches!(self, Self::Stack(_))
    }
}

/// The one or two locations holding one signature entry.
///
/// Both halves are absent for the `Void` upper half of a long or double.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VMRegPair {
    /// The low half.
    pub first: Option<VMReg>,
    /// The high half, for values wider than one slot.
    pub second: Option<VMReg>,
}

impl VMRegPair {
    /// A value occupying the single location `r`.
    pub fn one(r: VMReg) -> Self {
        Self {
            first: Some(r),
            second: None,
        }
    }

    /// A value occupying `r` and the location after it.
    pub fn two(r: VMReg) -> Self {
        Self {
            first: Some(r),
            second: Some(r.next()),
        }
    }

    /// A value occupying the locations `first` through `last`.
    pub fn range(first: VMReg, last: VMReg) -> Self {
        Self {
            first: Some(first),
            second: Some(last),
        }
    }

    /// No location at all.
    pub fn bad() -> Self {
        Self::default()
    }

    /// Is neither half assigned?
    pub fn is_bad(&self) -> bool {
        self.first.is_none() && self.second.is_none()
    }
}

/// The one or two allocator locations holding a value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OptoRegPair {
    /// The low half.
    pub first: Option<OptoReg>,
    /// The high half, for values wider than one slot.
    pub second: Option<OptoReg>,
}

impl OptoRegPair {
    /// A pair of locations.
    pub fn new(first: Option<OptoReg>, second: Option<OptoReg>) -> Self {
        Self { first, second }
    }
}
