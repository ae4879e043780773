//! Tree-covering instruction selection for a sea-of-nodes compiler backend.
//!
//! This crate takes one compilation unit's ideal graph, partitions it into trees, covers every
//! tree with the cheapest rules of a machine grammar and rebuilds the graph out of machine
//! instruction nodes. Along the way it derives the register-legality facts the register
//! allocator needs: incoming and outgoing argument locations, the frame layout, spill and
//! debug-info masks, and the save-on-entry uses at every exit.
//!
//! The main entry point is [`match_unit`], or [`matcher::Matcher`] for finer control. A sample
//! x86-64 platform and grammar live in [`isa::x64`].
#![deny(missing_docs)]

pub use crate::compile::{CompileUnit, match_unit};
pub use crate::env::CompileEnv;
pub use crate::matcher::{MatchOutput, Matcher};
pub use crate::result::{CodegenError, CodegenResult};
pub use crate::verifier::{VerifierError, VerifierErrors, verify_def_use};

pub use cranelift_entity as entity;

pub mod env;
pub mod gc;
pub mod grammar;
pub mod ir;
pub mod isa;
pub mod matcher;
pub mod regmask;
pub mod settings;
pub mod timing;
pub mod verifier;

mod compile;
mod result;

/// Even when trace logging is disabled, the trace macro has a significant performance cost so we
/// disable it by default.
#[macro_export]
macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(any(feature = "trace-log", debug_assertions)) {
            ::log::trace!($($tt)*);
        }
    };
}

/// Dynamic check for whether trace logging is enabled.
#[macro_export]
macro_rules! trace_log_enabled {
    () => {
        cfg!(any(feature = "trace-log", debug_assertions))
            && ::log::log_enabled!(::log::Level::Trace)
    };
}
