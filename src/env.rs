//! The immutable environment shared by every compilation.

use crate::gc::GcMatcherHooks;
use crate::grammar::Grammar;
use crate::isa::Platform;
use crate::isa::x64::{self, X64Platform};
use crate::settings::Flags;
use std::sync::Arc;

/// Everything a matcher needs besides the unit it compiles.
///
/// An environment is built once and shared between threads as `Arc<CompileEnv>`; each matcher
/// only reads from it.
#[derive(Debug, Clone)]
pub struct CompileEnv {
    grammar: Arc<Grammar>,
    platform: Arc<dyn Platform>,
    flags: Flags,
    hooks: Arc<dyn GcMatcherHooks>,
}

impl CompileEnv {
    /// Create an environment, installing the hooks of the collector named by `flags`.
    pub fn new(grammar: Arc<Grammar>, platform: Arc<dyn Platform>, flags: Flags) -> Self {
        let hooks = flags.collector().hooks();
        Self {
            grammar,
            platform,
            flags,
            hooks,
        }
    }

    /// The bundled x86-64 platform and grammar.
    pub fn x64(flags: Flags) -> Self {
        let platform = X64Platform::new();
        let grammar = x64::grammar::build(&platform);
        Self::new(Arc::new(grammar), Arc::new(platform), flags)
    }

    /// Replace the collector hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn GcMatcherHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// The instruction grammar.
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The target platform.
    pub fn platform(&self) -> &dyn Platform {
        &*self.platform
    }

    /// Matcher settings.
    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// The collector hooks.
    pub fn hooks(&self) -> &dyn GcMatcherHooks {
        &*self.hooks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::CollectorKind;
    use crate::settings::{self, Configurable};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn shared_across_threads() {
        assert_send_sync::<CompileEnv>();
        let mut b = settings::builder();
        b.set("collector", "z").unwrap();
        let env = Arc::new(CompileEnv::x64(Flags::new(b)));
        assert_eq!(env.flags().collector(), CollectorKind::Z);
        assert_eq!(env.platform().name(), "x64");
        let other = Arc::clone(&env);
        std::thread::spawn(move || other.grammar().num_rules())
            .join()
            .unwrap();
    }
}
