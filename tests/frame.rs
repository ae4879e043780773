//! Register masks of exits, calls and safepoints after matching on the sample x86-64 platform.

use std::sync::Arc;
use tessel::ir::slots::func;
use tessel::ir::{
    BasicType, BoolTest, GraphBuilder, IdealReg, Node, NodeKind, Opcode, ProjFlavour, Signature,
};
use tessel::isa::Platform;
use tessel::isa::registers::OptoReg;
use tessel::isa::x64::X64Platform;
use tessel::regmask::RegMask;
use tessel::settings::Flags;
use tessel::{CompileEnv, MatchOutput, match_unit};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn env() -> Arc<CompileEnv> {
    Arc::new(CompileEnv::x64(Flags::default()))
}

fn mask(regs: &[u32]) -> RegMask {
    let mut m = RegMask::new();
    for &r in regs {
        m.insert(OptoReg::new(r));
    }
    m
}

fn find(out: &MatchOutput, op: Opcode) -> Node {
    out.graph
        .nodes()
        .find(|&n| out.graph.opcode(n) == op && out.graph.mach(n).is_some())
        .expect("matched node")
}

fn projs_of(out: &MatchOutput, multi: Node) -> Vec<Node> {
    out.graph
        .nodes()
        .filter(|&n| out.graph.input(n, 0) == Some(multi))
        .filter(|&n| matches!(out.graph.kind(n), NodeKind::MachProj(_)))
        .collect()
}

fn flavour(out: &MatchOutput, n: Node) -> ProjFlavour {
    match out.graph.kind(n) {
        NodeKind::MachProj(p) => p.flavour,
        _ => panic!("{n} is not a projection"),
    }
}

#[test]
fn save_on_entry_registers_reach_every_exit() {
    init();
    let sig = Signature::new(&[], &[BasicType::Int]);
    let mut b = GraphBuilder::new(sig);
    let (c, io, m) = (b.control(), b.i_o(), b.memory());
    let k = b.iconst(1);
    let zero = b.iconst(0);
    let cmp = b.binary(Opcode::CmpI, k, zero);
    let bol = b.test(cmp, BoolTest::Ne);
    let (_, if_true, if_false) = b.branch(c, bol);
    b.ret(if_true, io, m, Some(k));
    b.halt(if_false, io, m);
    let out = match_unit(env(), b.finish()).unwrap();

    // rbx and r12 are saved as longs, the low half of xmm15 as a double.
    assert_eq!(out.save_on_entry.len(), 3);
    let cons: Vec<u32> = out
        .save_on_entry
        .iter()
        .map(|&n| out.graph.payload(n).proj.unwrap())
        .collect();
    assert_eq!(cons, [5, 7, 9]);
    let ideals: Vec<_> = out
        .save_on_entry
        .iter()
        .map(|&n| out.graph.ideal_reg(n))
        .collect();
    assert_eq!(
        ideals,
        [Some(IdealReg::RegL), Some(IdealReg::RegL), Some(IdealReg::RegD)]
    );
    for &n in &out.save_on_entry {
        assert_eq!(out.graph.input(n, 0), Some(out.start));
    }

    let ret = find(&out, Opcode::Return);
    let halt = find(&out, Opcode::Halt);
    // The returned value comes first, then one slot per register half.
    assert_eq!(out.graph.req(ret), func::PARMS + 1 + 6);
    assert_eq!(out.graph.req(halt), func::PARMS + 6);
    assert_eq!(out.graph.input(ret, func::PARMS + 1), Some(out.save_on_entry[0]));
    assert_eq!(out.graph.input(ret, func::PARMS + 2), Some(out.top));

    assert_eq!(out.in_reg_mask(ret, func::PARMS), mask(&[0]));
    assert_eq!(out.in_reg_mask(ret, func::PARMS + 1), mask(&[6, 7]));
    assert!(out.in_reg_mask(ret, func::PARMS + 2).is_empty());
    assert_eq!(out.in_reg_mask(ret, func::PARMS + 3), mask(&[24, 25]));
    assert_eq!(out.in_reg_mask(ret, func::PARMS + 5), mask(&[92, 93]));
    assert_eq!(out.in_reg_mask(ret, func::RETURN_ADR), out.masks.return_addr);

    // A halting path may leave the saved value anywhere it can spill to.
    let mut expected = out.masks.spill_mask(IdealReg::RegI);
    expected.insert(OptoReg::new(7));
    assert_eq!(out.in_reg_mask(halt, func::PARMS), expected);
}

#[test]
fn calls_place_arguments_and_kill_the_outgoing_area() {
    init();
    let sig = Signature::new(&[BasicType::Int], &[BasicType::Int]);
    let mut b = GraphBuilder::new(sig);
    let x = b.parm(0);
    let (c, io, m) = (b.control(), b.i_o(), b.memory());
    let callee = Signature::new(&[BasicType::Int; 7], &[BasicType::Int]);
    let projs = b.call(Opcode::CallStaticJava, c, io, m, callee, &[x; 7], &[x]);
    let result = projs.result.unwrap();
    b.ret(projs.control, projs.i_o, projs.memory, Some(result));
    let out = match_unit(env(), b.finish()).unwrap();

    let call = find(&out, Opcode::CallStaticJava);
    assert_eq!(out.rule_name(call), Some("CallStaticJavaDirect"));
    let new_sp = out.frame.new_sp;
    // Six arguments travel in registers, the seventh in the first outgoing slot.
    assert_eq!(out.in_reg_mask(call, func::PARMS), mask(&[12]));
    assert_eq!(out.in_reg_mask(call, func::PARMS + 6), RegMask::from_reg(new_sp));
    assert_eq!(out.frame.out_arg_limit, new_sp.add(1));
    assert_eq!(out.in_reg_mask(call, func::RETURN_ADR), out.masks.return_addr);
    assert_eq!(out.in_reg_mask(call, func::FRAME_PTR), out.masks.frame_ptr);
    // Debug info after the arguments.
    assert_eq!(
        out.in_reg_mask(call, func::PARMS + 7),
        out.masks.debug_mask(IdealReg::RegI)
    );

    let projs = projs_of(&out, call);
    let fat: Vec<Node> = projs
        .iter()
        .copied()
        .filter(|&p| flavour(&out, p) == ProjFlavour::Fat)
        .collect();
    assert_eq!(fat.len(), 1);
    assert!(out.out_reg_mask(fat[0]).member(new_sp));

    let value = projs
        .iter()
        .copied()
        .find(|&p| out.graph.payload(p).proj == Some(func::PARMS as u32))
        .unwrap();
    assert_eq!(flavour(&out, value), ProjFlavour::Value);
    assert_eq!(out.out_reg_mask(value), mask(&[0]));
    let control = projs
        .iter()
        .copied()
        .find(|&p| out.graph.payload(p).proj == Some(func::CONTROL as u32))
        .unwrap();
    assert_eq!(flavour(&out, control), ProjFlavour::Unmatched);
}

#[test]
fn safepoint_polls_a_pointer_register() {
    init();
    let sig = Signature::new(&[BasicType::Object, BasicType::Int], &[]);
    let mut b = GraphBuilder::new(sig);
    let (poll, x) = (b.parm(0), b.parm(1));
    let (c, io, m) = (b.control(), b.i_o(), b.memory());
    let (_, c2) = b.safepoint(c, io, m, poll, &[x]);
    b.ret(c2, io, m, None);
    let out = match_unit(env(), b.finish()).unwrap();

    let sfpt = find(&out, Opcode::SafePoint);
    assert_eq!(out.rule_name(sfpt), Some("safePoint_poll"));
    let platform = X64Platform::new();
    assert_eq!(
        out.in_reg_mask(sfpt, func::PARMS),
        platform.ideal_reg_mask(IdealReg::RegP)
    );
    // A safepoint is not a call; its debug info may sit in any spill location.
    assert_eq!(
        out.in_reg_mask(sfpt, func::PARMS + 1),
        out.masks.spill_mask(IdealReg::RegI)
    );
    assert_eq!(out.in_reg_mask(sfpt, func::RETURN_ADR), out.masks.return_addr);
}

#[test]
fn tail_calls_and_rethrows_use_their_exit_masks() {
    init();
    let sig = Signature::new(&[BasicType::Object, BasicType::Object, BasicType::Int], &[]);
    let mut b = GraphBuilder::new(sig);
    let (target, method, x) = (b.parm(0), b.parm(1), b.parm(2));
    let zero = b.iconst(0);
    let cmp = b.binary(Opcode::CmpI, x, zero);
    let bol = b.test(cmp, BoolTest::Eq);
    let c = b.control();
    let (_, if_true, if_false) = b.branch(c, bol);
    let (io, m) = (b.i_o(), b.memory());
    b.tail_call(if_true, io, m, target, method);
    b.rethrow(if_false, io, m, method);
    let out = match_unit(env(), b.finish()).unwrap();

    let tail = find(&out, Opcode::TailCall);
    assert_eq!(out.rule_name(tail), Some("TailCalljmpInd"));
    let pointers = X64Platform::new().ideal_reg_mask(IdealReg::RegP);
    assert_eq!(out.in_reg_mask(tail, func::PARMS), pointers);
    assert_eq!(out.in_reg_mask(tail, func::PARMS + 1), pointers);
    assert_eq!(out.in_reg_mask(tail, func::PARMS + 2), mask(&[6, 7]));

    let rethrow = find(&out, Opcode::Rethrow);
    assert_eq!(out.rule_name(rethrow), Some("RethrowException"));
    // The exception travels in the receiver register.
    assert_eq!(out.in_reg_mask(rethrow, func::PARMS), mask(&[12, 13]));
    assert_eq!(out.in_reg_mask(rethrow, func::PARMS + 1), mask(&[6, 7]));
}
