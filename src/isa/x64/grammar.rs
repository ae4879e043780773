//! A sample x86-64 instruction grammar.
//!
//! The grammar covers the integer, pointer and scalar floating-point subset of the ideal opcodes
//! with a handful of addressing modes, compare-and-branch, conditional moves, atomics, calls and
//! method exits. Costs follow the usual convention: a plain instruction costs 100, a branch 200
//! and a call 300.

use crate::grammar::{Grammar, GrammarBuilder, Pattern};
use crate::ir::{Graph, IdealReg, Node, Opcode};
use crate::isa::Platform;
use crate::isa::x64::{X64Platform, regs};

const INSN_COST: u32 = 100;
const MEM_COST: u32 = 125;
const BRANCH_COST: u32 = 200;
const CALL_COST: u32 = 300;

fn is_null_con(graph: &Graph, n: Node) -> bool {
    graph.payload(n).con.is_some_and(|c| c.is_null())
}

/// Build the grammar for `platform`.
pub fn build(platform: &X64Platform) -> Grammar {
    let mut b = GrammarBuilder::new();
    let mask = |ideal| platform.ideal_reg_mask(ideal);

    // Register operands.
    let r_i = b.register("rRegI", IdealReg::RegI, mask(IdealReg::RegI));
    let r_l = b.register("rRegL", IdealReg::RegL, mask(IdealReg::RegL));
    let r_p = b.register("rRegP", IdealReg::RegP, mask(IdealReg::RegP));
    let r_n = b.register("rRegN", IdealReg::RegN, mask(IdealReg::RegN));
    let r_f = b.register("regF", IdealReg::RegF, mask(IdealReg::RegF));
    let r_d = b.register("regD", IdealReg::RegD, mask(IdealReg::RegD));
    let v_x = b.register("vecX", IdealReg::VecX, mask(IdealReg::VecX));
    let flags = b.register("rFlagsReg", IdealReg::RegFlags, mask(IdealReg::RegFlags));
    let any_p = b.register("any_RegP", IdealReg::RegP, regs::any_reg_p_mask());
    b.reg_operand("rRegI", r_i, IdealReg::RegI);
    b.reg_operand("rRegL", r_l, IdealReg::RegL);
    b.reg_operand("rRegP", r_p, IdealReg::RegP);
    b.reg_operand("rRegN", r_n, IdealReg::RegN);
    b.reg_operand("regF", r_f, IdealReg::RegF);
    b.reg_operand("regD", r_d, IdealReg::RegD);
    b.reg_operand("vecX", v_x, IdealReg::VecX);
    b.reg_operand("rFlagsReg", flags, IdealReg::RegFlags);
    b.reg_operand("any_RegP", any_p, IdealReg::RegP);
    b.chain("any_RegP_rRegP", any_p, r_p, 0);

    // Immediates and condition codes.
    let imm_i = b.immediate("immI");
    let imm_l = b.immediate("immL");
    let imm_p0 = b.immediate("immP0");
    let imm_p = b.immediate("immP");
    let imm_n = b.immediate("immN");
    let imm_f = b.immediate("immF");
    let imm_d = b.immediate("immD");
    let cmp_op = b.immediate("cmpOp");
    b.swallowed("immI", imm_i, Pattern::leaf(Opcode::ConI));
    b.swallowed("immL", imm_l, Pattern::leaf(Opcode::ConL));
    b.swallowed("immP0", imm_p0, Pattern::leaf(Opcode::ConP).when(is_null_con));
    b.swallowed("immP", imm_p, Pattern::leaf(Opcode::ConP));
    b.swallowed("immN", imm_n, Pattern::leaf(Opcode::ConN));
    b.swallowed("immF", imm_f, Pattern::leaf(Opcode::ConF));
    b.swallowed("immD", imm_d, Pattern::leaf(Opcode::ConD));
    b.swallowed("cmpOp", cmp_op, Pattern::leaf(Opcode::Bool));

    // Addressing modes.
    let any_mask = regs::any_reg_p_mask();
    let indirect = b.composite("indirect", any_mask);
    let ind_offset = b.composite("indOffset", any_mask);
    b.chain("indirect", indirect, any_p, 0);
    b.operand(
        "indOffset",
        ind_offset,
        Pattern::binary(Opcode::AddP, any_p, imm_l),
        0,
    );
    let memory = b.union("memory", &[indirect, ind_offset]);

    // Anything at all, for instructions without a register result.
    let universe = b.universe("universe");
    for (name, class) in [
        ("universe_rRegI", r_i),
        ("universe_rRegL", r_l),
        ("universe_rRegP", r_p),
        ("universe_rRegN", r_n),
        ("universe_regF", r_f),
        ("universe_regD", r_d),
        ("universe_vecX", v_x),
    ] {
        b.chain(name, universe, class, 0);
    }

    // Interior pieces.
    let load_i_mem = b.internal("loadI_mem");
    b.internal_rule("loadI_mem", load_i_mem, Pattern::unary(Opcode::LoadI, memory), 0);
    let bin_cmp = b.internal("binCmp");
    let bin_ii = b.internal("binII");
    let bin_ll = b.internal("binLL");
    let bin_pp = b.internal("binPP");
    let bin_nn = b.internal("binNN");
    b.internal_rule("binCmp", bin_cmp, Pattern::binary(Opcode::Binary, cmp_op, flags), 0);
    b.internal_rule("binII", bin_ii, Pattern::binary(Opcode::Binary, r_i, r_i), 0);
    b.internal_rule("binLL", bin_ll, Pattern::binary(Opcode::Binary, r_l, r_l), 0);
    b.internal_rule("binPP", bin_pp, Pattern::binary(Opcode::Binary, r_p, r_p), 0);
    b.internal_rule("binNN", bin_nn, Pattern::binary(Opcode::Binary, r_n, r_n), 0);

    // Constants.
    b.chain_instruction("loadConI", r_i, imm_i, INSN_COST);
    b.chain_instruction("loadConL", r_l, imm_l, INSN_COST);
    b.chain_instruction("loadConP0", r_p, imm_p0, INSN_COST / 2);
    b.chain_instruction("loadConP", r_p, imm_p, INSN_COST);
    b.chain_instruction("loadConN", r_n, imm_n, INSN_COST);
    b.chain_instruction("loadConF", r_f, imm_f, INSN_COST);
    b.chain_instruction("loadConD", r_d, imm_d, INSN_COST);

    // Integer arithmetic.
    for (name, op, rhs, cost) in [
        ("addI_rReg", Opcode::AddI, r_i, INSN_COST),
        ("addI_rReg_imm", Opcode::AddI, imm_i, INSN_COST),
        ("addI_rReg_mem", Opcode::AddI, load_i_mem, MEM_COST + INSN_COST / 4),
        ("subI_rReg", Opcode::SubI, r_i, INSN_COST),
        ("subI_rReg_imm", Opcode::SubI, imm_i, INSN_COST),
        ("mulI_rReg", Opcode::MulI, r_i, 3 * INSN_COST),
        ("mulI_rReg_imm", Opcode::MulI, imm_i, 3 * INSN_COST),
        ("andI_rReg", Opcode::AndI, r_i, INSN_COST),
        ("andI_rReg_imm", Opcode::AndI, imm_i, INSN_COST),
        ("orI_rReg", Opcode::OrI, r_i, INSN_COST),
        ("xorI_rReg", Opcode::XorI, r_i, INSN_COST),
        ("salI_rReg_imm", Opcode::LShiftI, imm_i, INSN_COST),
    ] {
        b.instruction(name, r_i, Pattern::binary(op, r_i, rhs), cost);
    }
    for (name, op, rhs, cost) in [
        ("addL_rReg", Opcode::AddL, r_l, INSN_COST),
        ("addL_rReg_imm", Opcode::AddL, imm_l, INSN_COST),
        ("subL_rReg", Opcode::SubL, r_l, INSN_COST),
        ("mulL_rReg", Opcode::MulL, r_l, 3 * INSN_COST),
        ("andL_rReg", Opcode::AndL, r_l, INSN_COST),
    ] {
        b.instruction(name, r_l, Pattern::binary(op, r_l, rhs), cost);
    }
    b.instruction("addP_rReg_imm", r_p, Pattern::binary(Opcode::AddP, any_p, imm_l), INSN_COST);
    b.instruction("addP_rReg", r_p, Pattern::binary(Opcode::AddP, any_p, r_l), INSN_COST);
    b.instruction("addF_reg", r_f, Pattern::binary(Opcode::AddF, r_f, r_f), INSN_COST);
    b.instruction("addD_reg", r_d, Pattern::binary(Opcode::AddD, r_d, r_d), INSN_COST);

    // Conversions.
    b.instruction("convI2L_reg_reg", r_l, Pattern::unary(Opcode::ConvI2L, r_i), INSN_COST);
    b.instruction("convL2I_reg_reg", r_i, Pattern::unary(Opcode::ConvL2I, r_l), INSN_COST);
    b.instruction("convI2D_reg_reg", r_d, Pattern::unary(Opcode::ConvI2D, r_i), INSN_COST);
    b.instruction("convI2F_reg_reg", r_f, Pattern::unary(Opcode::ConvI2F, r_i), INSN_COST);
    b.instruction("bytes_reverse_int", r_i, Pattern::unary(Opcode::ReverseBytesI, r_i), INSN_COST);
    b.instruction("bytes_reverse_long", r_l, Pattern::unary(Opcode::ReverseBytesL, r_l), INSN_COST);
    b.instruction("encodeHeapOop", r_n, Pattern::unary(Opcode::EncodeP, r_p), INSN_COST);
    b.instruction("decodeHeapOop", r_p, Pattern::unary(Opcode::DecodeN, r_n), INSN_COST);

    // Loads and stores.
    for (name, op, dst) in [
        ("loadB", Opcode::LoadB, r_i),
        ("loadI", Opcode::LoadI, r_i),
        ("loadL", Opcode::LoadL, r_l),
        ("loadF", Opcode::LoadF, r_f),
        ("loadD", Opcode::LoadD, r_d),
        ("loadP", Opcode::LoadP, r_p),
        ("loadN", Opcode::LoadN, r_n),
    ] {
        b.instruction(name, dst, Pattern::unary(op, memory), MEM_COST);
    }
    for (name, op, src) in [
        ("storeB", Opcode::StoreB, r_i),
        ("storeI", Opcode::StoreI, r_i),
        ("storeImmI", Opcode::StoreI, imm_i),
        ("storeL", Opcode::StoreL, r_l),
        ("storeF", Opcode::StoreF, r_f),
        ("storeD", Opcode::StoreD, r_d),
        ("storeP", Opcode::StoreP, r_p),
        ("storeImmP0", Opcode::StoreP, imm_p0),
        ("storeN", Opcode::StoreN, r_n),
    ] {
        b.instruction(name, universe, Pattern::binary(op, memory, src), MEM_COST);
    }

    // Atomics, after the collector reshaped the expected and new values into a pair.
    for (name, op, pair) in [
        ("compareAndSwapI", Opcode::CompareAndSwapI, bin_ii),
        ("compareAndSwapL", Opcode::CompareAndSwapL, bin_ll),
        ("compareAndSwapP", Opcode::CompareAndSwapP, bin_pp),
        ("compareAndSwapN", Opcode::CompareAndSwapN, bin_nn),
    ] {
        b.instruction(name, r_i, Pattern::binary(op, memory, pair), 3 * INSN_COST);
    }

    // Compares.
    for (name, op, lhs, rhs) in [
        ("compI_rReg", Opcode::CmpI, r_i, r_i),
        ("compI_rReg_imm", Opcode::CmpI, r_i, imm_i),
        ("compU_rReg", Opcode::CmpU, r_i, r_i),
        ("compL_rReg", Opcode::CmpL, r_l, r_l),
        ("compL_rReg_imm", Opcode::CmpL, r_l, imm_l),
        ("compP_rReg", Opcode::CmpP, r_p, r_p),
        ("testP_reg", Opcode::CmpP, r_p, imm_p0),
        ("compN_rReg", Opcode::CmpN, r_n, r_n),
        ("compN_rReg_imm", Opcode::CmpN, r_n, imm_n),
        ("cmpF_reg", Opcode::CmpF, r_f, r_f),
        ("cmpD_reg", Opcode::CmpD, r_d, r_d),
    ] {
        b.instruction(name, flags, Pattern::binary(op, lhs, rhs), INSN_COST);
    }

    // Conditional moves.
    for (name, op, dst, pair) in [
        ("cmovI_reg", Opcode::CMoveI, r_i, bin_ii),
        ("cmovL_reg", Opcode::CMoveL, r_l, bin_ll),
        ("cmovP_reg", Opcode::CMoveP, r_p, bin_pp),
    ] {
        b.instruction(name, dst, Pattern::binary(op, bin_cmp, pair), BRANCH_COST);
    }

    // Control flow.
    b.instruction(
        "jmpCon",
        universe,
        Pattern::binary(Opcode::If, cmp_op, flags),
        BRANCH_COST,
    );
    b.instruction("Ret", universe, Pattern::leaf(Opcode::Return), INSN_COST);
    b.instruction("RetValue", universe, Pattern::unary(Opcode::Return, universe), INSN_COST);
    b.instruction("RetImmI", universe, Pattern::unary(Opcode::Return, imm_i), MEM_COST);
    b.instruction("RethrowException", universe, Pattern::leaf(Opcode::Rethrow), CALL_COST);
    b.instruction("ShouldNotReachHere", universe, Pattern::leaf(Opcode::Halt), CALL_COST);
    b.instruction(
        "TailCalljmpInd",
        universe,
        Pattern::binary(Opcode::TailCall, r_p, r_p),
        CALL_COST,
    );
    b.instruction(
        "tailjmpInd",
        universe,
        Pattern::binary(Opcode::TailJump, r_p, r_p),
        CALL_COST,
    );
    b.instruction(
        "safePoint_poll",
        universe,
        Pattern::unary(Opcode::SafePoint, r_p),
        MEM_COST,
    );
    for (name, op) in [
        ("CallStaticJavaDirect", Opcode::CallStaticJava),
        ("CallDynamicJavaDirect", Opcode::CallDynamicJava),
        ("CallRuntimeDirect", Opcode::CallRuntime),
        ("CallLeafDirect", Opcode::CallLeaf),
    ] {
        b.instruction(name, universe, Pattern::leaf(op), CALL_COST);
    }
    b.instruction("membar_acquire", universe, Pattern::leaf(Opcode::MemBarAcquire), 0);
    b.instruction("membar_release", universe, Pattern::leaf(Opcode::MemBarRelease), 0);

    b.build()
}
