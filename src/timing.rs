//! Pass timing.
//!
//! Every matching phase starts a timer with its pass function and stops it by dropping the
//! returned token. Times accumulate per thread until [`take_current`] collects them.

use core::fmt;
use std::cell::{Cell, RefCell};
use std::mem;
use std::time::{Duration, Instant};

// Defines the `Pass` enum with a trailing `None`, its descriptions, and one timer function per
// pass.
macro_rules! define_passes {
    ($($pass:ident: $desc:expr,)+) => {
        /// A timed matching phase.
        #[allow(non_camel_case_types, reason = "pass names double as function names")]
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum Pass {
            $(#[doc=$desc] $pass,)+
            /// No active pass.
            None,
        }

        const PASSES: [Pass; Pass::None as usize] = [ $(Pass::$pass),+ ];
        const DESCRIPTIONS: [&str; Pass::None as usize] = [ $($desc),+ ];

        $(
            #[doc=$desc]
            #[must_use]
            pub fn $pass() -> TimingToken {
                TimingToken::start(Pass::$pass)
            }
        )+
    }
}

define_passes! {
    match_unit: "Instruction selection",
    frame_layout: "Incoming argument and frame layout",
    find_shared: "Tree partitioning",
    verifier: "Verify def-use edges",
    xform: "Label and reduce match trees",
    fixup_save_on_entry: "Spill masks and save-on-entry projections",
    compact: "Reclaim input graph",
}

impl Pass {
    fn idx(self) -> usize {
        self as usize
    }

    /// Description of the pass.
    pub fn description(self) -> &'static str {
        DESCRIPTIONS.get(self.idx()).copied().unwrap_or("<no pass>")
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.description())
    }
}

thread_local! {
    static CURRENT_PASS: Cell<Pass> = const { Cell::new(Pass::None) };
    static PASS_TIME: RefCell<PassTimes> = RefCell::new(PassTimes::default());
}

/// Times one pass from creation until drop.
///
/// Tokens nest: a pass started while another runs is charged to it as child time. They must
/// be dropped in reverse order of creation.
pub struct TimingToken {
    start: Instant,
    pass: Pass,
    parent: Pass,
}

impl TimingToken {
    fn start(pass: Pass) -> Self {
        let parent = CURRENT_PASS.with(|p| p.replace(pass));
        crate::trace!("timing: start {pass} in {parent}");
        Self {
            start: Instant::now(),
            pass,
            parent,
        }
    }
}

impl Drop for TimingToken {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let cur = CURRENT_PASS.with(|p| p.replace(self.parent));
        debug_assert_eq!(cur, self.pass, "timing tokens dropped out of order");
        PASS_TIME.with(|t| {
            let mut t = t.borrow_mut();
            t.total[self.pass.idx()] += elapsed;
            if let Some(child) = t.child.get_mut(self.parent.idx()) {
                *child += elapsed;
            }
        });
    }
}

/// Time spent per pass on one thread.
#[derive(Clone, Default)]
pub struct PassTimes {
    total: [Duration; PASSES.len()],
    child: [Duration; PASSES.len()],
}

impl PassTimes {
    /// Time spent in `pass`, including the passes it started.
    pub fn total(&self, pass: Pass) -> Duration {
        self.total.get(pass.idx()).copied().unwrap_or_default()
    }

    /// Time spent in `pass` itself.
    pub fn own(&self, pass: Pass) -> Duration {
        let i = pass.idx();
        match (self.total.get(i), self.child.get(i)) {
            (Some(&t), Some(&c)) => t.saturating_sub(c),
            _ => Duration::ZERO,
        }
    }

    /// Time spent in all passes.
    pub fn sum(&self) -> Duration {
        PASSES.iter().map(|&p| self.own(p)).sum()
    }
}

impl fmt::Display for PassTimes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{:>10} {:>10}  pass", "total", "self")?;
        for &pass in PASSES.iter().filter(|&&p| !self.total(p).is_zero()) {
            writeln!(
                f,
                "{:>10.3?} {:>10.3?}  {pass}",
                self.total(pass),
                self.own(pass)
            )?;
        }
        Ok(())
    }
}

/// Take the pass times collected on this thread and start over.
pub fn take_current() -> PassTimes {
    PASS_TIME.with(|t| mem::take(&mut *t.borrow_mut()))
}
