//! Implicit null check candidates.
//!
//! A branch on `p != null` (or `p == null` on the other arm) can be folded into the first memory
//! access through `p` when the platform traps on null dereferences. The matcher only records the
//! candidates; a later pass decides which of them to fold.

use super::Matcher;
use crate::ir::{BoolTest, Node, Opcode};

/// A branch projection that is only taken when `value` is not null.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NullCheck {
    /// The `IfTrue` or `IfFalse` projection on the not-null path.
    pub proj: Node,
    /// The tested pointer.
    pub value: Node,
    /// `value` is a narrow-pointer decode, unpinned so it can move up to the access.
    pub decode: bool,
}

impl Matcher {
    /// Record `proj`, the replacement of branch projection `orig`, if its branch tests a pointer
    /// against null.
    ///
    /// `proj` still points at the input-graph branch.
    pub(super) fn collect_null_checks(&mut self, proj: Node, orig: Node) {
        let g = &self.graph;
        let wanted = match g.opcode(proj) {
            Opcode::IfTrue => BoolTest::Ne,
            Opcode::IfFalse => BoolTest::Eq,
            _ => return,
        };
        let Some(iff) = g.input(proj, 0).filter(|&i| g.opcode(i) == Opcode::If) else {
            return;
        };
        let (Some(bol), Some(cmp)) = (g.input(iff, 1), g.input(iff, 2)) else {
            return;
        };
        if g.payload(bol).test != Some(wanted) {
            return;
        }
        let cmp_op = g.opcode(cmp);
        if cmp_op != Opcode::CmpP && cmp_op != Opcode::CmpN {
            return;
        }
        let against_null = g
            .input(cmp, 2)
            .filter(|&k| g.opcode(k).is_con())
            .and_then(|k| g.payload(k).con)
            .is_some_and(|c| c.is_null());
        let Some(mut value) = g.input(cmp, 1).filter(|_| against_null) else {
            return;
        };

        let mut decode = false;
        if cmp_op == Opcode::CmpN && !self.env.platform().narrow_oop_use_complex_address() {
            // The access goes through the decoded pointer pinned below the test.
            let decoded = g
                .outs(orig)
                .iter()
                .copied()
                .find(|&d| g.opcode(d) == Opcode::DecodeN && g.input(d, 1) == Some(value));
            if let Some(d) = decoded {
                self.graph.set_req(d, 0, None);
                value = d;
                decode = true;
            }
        }
        crate::trace!("null check candidate {proj} on {value}");
        self.null_checks.push(NullCheck {
            proj,
            value,
            decode,
        });
    }

    /// Map the tested values to their replacements and drop the candidates whose value was not
    /// rebuilt.
    pub(super) fn validate_null_checks(&mut self) {
        let checks = std::mem::take(&mut self.null_checks);
        for mut check in checks {
            let Some(value) = self.new_node(check.value) else {
                log::debug!("dropping null check on {}: value not matched", check.value);
                continue;
            };
            if check.decode {
                self.graph.set_req(value, 0, None);
            }
            check.value = value;
            self.null_checks.push(check);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::env::CompileEnv;
    use crate::ir::{AliasIdx, BasicType, BoolTest, GraphBuilder, Opcode, Signature};
    use crate::isa::x64::X64Platform;
    use crate::matcher::Matcher;
    use crate::settings::Flags;
    use std::sync::Arc;

    #[test]
    fn not_null_arm_of_a_pointer_test_is_a_candidate() {
        let sig = Signature::new(&[BasicType::Object], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let p = b.parm(0);
        let null = b.null();
        let cmp = b.binary(Opcode::CmpP, p, null);
        let bol = b.test(cmp, BoolTest::Ne);
        let c = b.control();
        let (_, if_true, if_false) = b.branch(c, bol);
        let (io, m) = (b.i_o(), b.memory());
        let ld = b.load(Opcode::LoadI, Some(if_true), m, p, AliasIdx::RAW);
        b.ret(if_true, io, m, Some(ld));
        b.halt(if_false, io, m);
        let unit = b.finish();

        let env = Arc::new(CompileEnv::x64(Flags::default()));
        let mut matcher = Matcher::new(env, unit);
        let out = matcher.run().unwrap();
        assert_eq!(out.null_checks.len(), 1);
        let check = out.null_checks[0];
        assert_eq!(out.graph.opcode(check.proj), Opcode::IfTrue);
        assert_eq!(out.graph.opcode(check.value), Opcode::Parm);
        assert!(!check.decode);
    }

    #[test]
    fn equality_on_the_true_arm_is_not_a_candidate() {
        let sig = Signature::new(&[BasicType::Object], &[]);
        let mut b = GraphBuilder::new(sig);
        let p = b.parm(0);
        let null = b.null();
        let cmp = b.binary(Opcode::CmpP, p, null);
        let bol = b.test(cmp, BoolTest::Eq);
        let c = b.control();
        let (_, if_true, if_false) = b.branch(c, bol);
        let (io, m) = (b.i_o(), b.memory());
        b.halt(if_true, io, m);
        b.ret(if_false, io, m, None);
        let unit = b.finish();

        let env = Arc::new(CompileEnv::x64(Flags::default()));
        let out = Matcher::new(env, unit).run().unwrap();
        // Only the false arm proves the pointer non-null.
        assert_eq!(out.null_checks.len(), 1);
        assert_eq!(out.graph.opcode(out.null_checks[0].proj), Opcode::IfFalse);
    }

    #[test]
    fn narrow_tests_go_through_the_pinned_decode() {
        let sig = Signature::new(&[BasicType::NarrowOop], &[BasicType::Int]);
        let mut b = GraphBuilder::new(sig);
        let n = b.parm(0);
        let null = b.nconst(0);
        let cmp = b.binary(Opcode::CmpN, n, null);
        let bol = b.test(cmp, BoolTest::Ne);
        let c = b.control();
        let (_, if_true, if_false) = b.branch(c, bol);
        let decoded = b.unary(Opcode::DecodeN, n);
        b.graph_mut().set_req(decoded, 0, Some(if_true));
        let (io, m) = (b.i_o(), b.memory());
        let first = b.load(Opcode::LoadI, Some(if_true), m, decoded, AliasIdx::RAW);
        let second = b.load(Opcode::LoadI, Some(if_true), m, decoded, AliasIdx::RAW);
        let sum = b.binary(Opcode::AddI, first, second);
        b.ret(if_true, io, m, Some(sum));
        b.halt(if_false, io, m);
        let unit = b.finish();

        let platform = X64Platform::new().with_complex_narrow_addresses(false);
        let env = Arc::new(CompileEnv::new(
            Arc::new(crate::isa::x64::grammar::build(&platform)),
            Arc::new(platform),
            Flags::default(),
        ));
        let out = Matcher::new(env, unit).run().unwrap();
        assert_eq!(out.null_checks.len(), 1);
        let check = out.null_checks[0];
        assert!(check.decode);
        assert_eq!(out.graph.opcode(check.value), Opcode::DecodeN);
        assert_eq!(out.graph.input(check.value, 0), None);
    }
}
