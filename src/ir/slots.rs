//! Fixed input positions of the node shapes the matcher understands.

/// Inputs of `Start`-shaped nodes: returns, calls, safepoints and halts.
pub mod func {
    /// Control antecedent.
    pub const CONTROL: usize = 0;
    /// I/O state.
    pub const I_O: usize = 1;
    /// Memory state.
    pub const MEMORY: usize = 2;
    /// Frame pointer.
    pub const FRAME_PTR: usize = 3;
    /// Return address.
    pub const RETURN_ADR: usize = 4;
    /// First parameter, return value or exception.
    pub const PARMS: usize = 5;
}

/// Inputs of memory-access nodes.
pub mod mem {
    /// Control antecedent.
    pub const CONTROL: usize = 0;
    /// Memory state.
    pub const MEMORY: usize = 1;
    /// Address.
    pub const ADDRESS: usize = 2;
    /// Stored or new value.
    pub const VALUE_IN: usize = 3;
    /// Expected value of a compare-and-swap.
    pub const EXPECTED_IN: usize = 4;
}

/// Inputs of `AddP` address arithmetic.
pub mod addp {
    /// Base object.
    pub const BASE: usize = 1;
    /// Derived address being offset.
    pub const ADDRESS: usize = 2;
    /// Offset.
    pub const OFFSET: usize = 3;
}

/// Inputs of conditional moves.
pub mod cmove {
    /// The `Bool` selecting the value.
    pub const CONDITION: usize = 1;
    /// Value when the condition is false.
    pub const IF_FALSE: usize = 2;
    /// Value when the condition is true.
    pub const IF_TRUE: usize = 3;
}
