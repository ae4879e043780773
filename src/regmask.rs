//! Register masks.
//!
//! A register mask is a fixed-width bit set over [`OptoReg`] location numbers: machine register
//! halves first, then stack slots. Locations past the end of the bit set cannot be named
//! individually; the "all stack" flag stands for every one of them at once.
//!
//! Masks describe where an instruction may put its result, where each input may come from, and
//! which locations a calling convention or a call clobbers.

use crate::isa::registers::OptoReg;
use core::fmt;

/// Number of 64-bit words in a mask.
pub const WORDS: usize = 6;

/// Number of locations a mask can name individually.
pub const BITS: u32 = WORDS as u32 * 64;

/// Largest number of adjacent slots a single value can occupy.
pub const SLOTS_PER_VECZ: u32 = 16;

/// A set of locations plus an "all stack" flag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegMask {
    bits: [u64; WORDS],
    all_stack: bool,
}

// Word index and bit within the word for location `r`.
fn bitpos(r: OptoReg) -> (usize, u64) {
    let n = r.index();
    ((n / 64) as usize, 1u64 << (n % 64))
}

impl RegMask {
    /// The empty mask.
    pub const EMPTY: Self = Self {
        bits: [0; WORDS],
        all_stack: false,
    };

    /// Create an empty mask.
    pub fn new() -> Self {
        Self::EMPTY
    }

    /// Create a mask holding the single location `r`.
    pub fn from_reg(r: OptoReg) -> Self {
        let mut m = Self::EMPTY;
        m.insert(r);
        m
    }

    /// Can `r` be named individually in a mask?
    pub fn can_represent(r: OptoReg) -> bool {
        r.index() < BITS
    }

    /// Can `r` hold an argument?
    ///
    /// Arguments have to leave room for the widest vector above them.
    pub fn can_represent_arg(r: OptoReg) -> bool {
        r.index() < BITS - SLOTS_PER_VECZ
    }

    /// Add `r` to the mask.
    pub fn insert(&mut self, r: OptoReg) {
        debug_assert!(Self::can_represent(r), "{r} out of mask range");
        let (word, bit) = bitpos(r);
        self.bits[word] |= bit;
    }

    /// Add every location in `from..to`.
    pub fn insert_range(&mut self, from: OptoReg, to: OptoReg) {
        for n in from.index()..to.index() {
            self.insert(OptoReg::new(n));
        }
    }

    /// Remove `r` from the mask.
    pub fn remove(&mut self, r: OptoReg) {
        if Self::can_represent(r) {
            let (word, bit) = bitpos(r);
            self.bits[word] &= !bit;
        }
    }

    /// Is `r` in the mask?
    pub fn member(&self, r: OptoReg) -> bool {
        if !Self::can_represent(r) {
            return false;
        }
        let (word, bit) = bitpos(r);
        self.bits[word] & bit != 0
    }

    /// Add every location of `other`.
    pub fn union(&mut self, other: &Self) {
        for (x, &y) in self.bits.iter_mut().zip(&other.bits) {
            *x |= y;
        }
        self.all_stack |= other.all_stack;
    }

    /// Keep only the locations also in `other`.
    pub fn intersect(&mut self, other: &Self) {
        for (x, &y) in self.bits.iter_mut().zip(&other.bits) {
            *x &= y;
        }
        self.all_stack &= other.all_stack;
    }

    /// Remove every location of `other`.
    pub fn subtract(&mut self, other: &Self) {
        for (x, &y) in self.bits.iter_mut().zip(&other.bits) {
            *x &= !y;
        }
        self.all_stack &= !other.all_stack;
    }

    /// Do the two masks share a location?
    pub fn overlap(&self, other: &Self) -> bool {
        self.bits.iter().zip(&other.bits).any(|(&x, &y)| x & y != 0)
            || (self.all_stack && other.all_stack)
    }

    /// Is the mask empty, "all stack" flag included?
    pub fn is_empty(&self) -> bool {
        !self.all_stack && self.bits.iter().all(|&w| w == 0)
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    /// Number of individually named locations.
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    /// The lowest named location.
    pub fn first(&self) -> Option<OptoReg> {
        self.iter().next()
    }

    /// Does the mask stand for every stack slot past its named range?
    pub fn is_all_stack(&self) -> bool {
        self.all_stack
    }

    /// Make the mask stand for every stack slot past its named range.
    pub fn set_all_stack(&mut self) {
        self.all_stack = true;
    }

    /// Keep only aligned pairs of locations that are both present.
    pub fn clear_to_pairs(&mut self) {
        for w in &mut self.bits {
            let pairs = *w & (*w >> 1) & 0x5555_5555_5555_5555;
            *w = pairs | (pairs << 1);
        }
    }

    /// Keep only aligned groups of `size` locations that are all present.
    ///
    /// `size` must be a power of two no larger than [`SLOTS_PER_VECZ`].
    pub fn clear_to_sets(&mut self, size: u32) {
        debug_assert!(size.is_power_of_two() && size <= SLOTS_PER_VECZ);
        let group = (1u64 << size) - 1;
        for w in &mut self.bits {
            let mut kept = 0;
            for shift in (0..64).step_by(size as usize) {
                if (*w >> shift) & group == group {
                    kept |= group << shift;
                }
            }
            *w = kept;
        }
    }

    /// Iterate over the named locations, lowest first.
    pub fn iter(&self) -> RegMaskIter {
        RegMaskIter {
            bits: self.bits,
            word: 0,
        }
    }
}

/// Iterator over the locations of a [`RegMask`].
#[derive(Clone)]
pub struct RegMaskIter {
    bits: [u64; WORDS],
    word: usize,
}

impl Iterator for RegMaskIter {
    type Item = OptoReg;

    fn next(&mut self) -> Option<OptoReg> {
        while self.word < WORDS {
            let w = self.bits[self.word];
            if w != 0 {
                let bit = w.trailing_zeros();
                self.bits[self.word] &= w - 1;
                return Some(OptoReg::new(self.word as u32 * 64 + bit));
            }
            self.word += 1;
        }
        None
    }
}

impl fmt::Display for RegMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("[")?;
        let mut sep = "";
        for r in self.iter() {
            write!(f, "{sep}{r}")?;
            sep = ",";
        }
        if self.all_stack {
            write!(f, "{sep}...")?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for RegMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reg(n: u32) -> OptoReg {
        OptoReg::new(n)
    }

    fn mask_of(regs: &[u32]) -> RegMask {
        let mut m = RegMask::new();
        for &r in regs {
            m.insert(reg(r));
        }
        m
    }

    #[test]
    fn basics() {
        let mut m = mask_of(&[0, 1, 64, 200]);
        assert!(m.member(reg(64)));
        assert!(!m.member(reg(65)));
        assert!(!m.member(reg(BITS + 3)));
        assert_eq!(m.count(), 4);
        assert_eq!(m.first(), Some(reg(0)));
        m.remove(reg(0));
        assert_eq!(m.iter().collect::<Vec<_>>(), [reg(1), reg(64), reg(200)]);
        assert_eq!(m.to_string(), "[r1,r64,r200]");
        m.set_all_stack();
        assert_eq!(m.to_string(), "[r1,r64,r200,...]");
        m.clear();
        assert!(m.is_empty());
    }

    #[test]
    fn set_algebra() {
        let a = mask_of(&[1, 2, 3]);
        let b = mask_of(&[3, 4]);
        let mut u = a;
        u.union(&b);
        assert_eq!(u, mask_of(&[1, 2, 3, 4]));
        let mut i = a;
        i.intersect(&b);
        assert_eq!(i, mask_of(&[3]));
        let mut d = a;
        d.subtract(&b);
        assert_eq!(d, mask_of(&[1, 2]));
        assert!(a.overlap(&b));
        assert!(!d.overlap(&b));
    }

    #[test]
    fn pairs_and_sets() {
        let mut m = mask_of(&[0, 1, 3, 4, 6, 7, 64, 65]);
        m.clear_to_pairs();
        assert_eq!(m, mask_of(&[0, 1, 6, 7, 64, 65]));

        let mut v = mask_of(&[0, 1, 2, 3, 5, 6, 7, 8, 9, 10, 11]);
        v.clear_to_sets(4);
        assert_eq!(v, mask_of(&[0, 1, 2, 3, 8, 9, 10, 11]));
    }

    #[test]
    fn representable() {
        assert!(RegMask::can_represent(reg(BITS - 1)));
        assert!(!RegMask::can_represent(reg(BITS)));
        assert!(RegMask::can_represent_arg(reg(BITS - SLOTS_PER_VECZ - 1)));
        assert!(!RegMask::can_represent_arg(reg(BITS - SLOTS_PER_VECZ)));
    }

    proptest! {
        #[test]
        fn subtract_then_overlap_is_disjoint(
            a in proptest::collection::vec(0..BITS, 0..40),
            b in proptest::collection::vec(0..BITS, 0..40),
        ) {
            let ma = mask_of(&a);
            let mb = mask_of(&b);
            let mut d = ma;
            d.subtract(&mb);
            prop_assert!(!d.overlap(&mb));
            let mut i = ma;
            i.intersect(&mb);
            let mut back = d;
            back.union(&i);
            prop_assert_eq!(back, ma);
        }

        #[test]
        fn pairs_are_aligned(a in proptest::collection::vec(0..BITS, 0..80)) {
            let mut m = mask_of(&a);
            m.clear_to_pairs();
            for r in m.iter() {
                let other = r.index() ^ 1;
                prop_assert!(m.member(reg(other)));
            }
        }
    }
}
