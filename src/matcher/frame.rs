//! Frame layout and register masks.
//!
//! Before any tree is matched, the incoming arguments are placed: the calling convention reports
//! stack arguments relative to the argument area, and they are biased here into allocator
//! locations above the caller's stack pointer. Safepoints and calls get per-input masks for
//! their outgoing arguments the same way, relative to the new stack pointer, and every call
//! kills its outgoing area through a fat projection.
//!
//! Once the whole graph is matched the highest outgoing argument is known, which fixes the
//! first free stack location and with it the spill and debug masks. The exits then get their
//! shared input-mask templates, and every save-on-entry register becomes a projection of the
//! start node that each exit uses.

use super::Matcher;
use crate::grammar::Grammar;
use crate::ir::graph::{NodeData, NodeKind, Payload};
use crate::ir::slots::{addp, func};
use crate::ir::{
    BasicType, ExitKind, Graph, IdealReg, MachProj, Node, Opcode, ProjFlavour, Signature,
};
use crate::isa::Platform;
use crate::isa::registers::{OptoReg, OptoRegPair, VMReg};
use crate::regmask::{BITS, RegMask};
use crate::result::{CodegenError, CodegenResult};
use std::sync::Arc;

/// Fat projections are numbered this far past the call's results.
const FAT_PROJ_OFFSET: u32 = 10_000;

/// The argument areas of a frame, as allocator locations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    /// The caller's stack pointer, above the fixed slots and the preserved area.
    pub old_sp: OptoReg,
    /// One past the highest incoming stack argument.
    pub in_arg_limit: OptoReg,
    /// The stack pointer inside the frame.
    pub new_sp: OptoReg,
    /// One past the highest outgoing stack argument of any call.
    pub out_arg_limit: OptoReg,
}

impl Default for FrameLayout {
    fn default() -> Self {
        let zero = OptoReg::new(0);
        Self {
            old_sp: zero,
            in_arg_limit: zero,
            new_sp: zero,
            out_arg_limit: zero,
        }
    }
}

/// Register masks derived from the platform, the signature and the frame layout.
#[derive(Clone, Debug, Default)]
pub struct MaskTables {
    /// The two locations of the return address.
    pub return_addr: RegMask,
    /// The two locations of the C frame pointer.
    pub frame_ptr: RegMask,
    /// Where the method's result is returned.
    pub return_value: RegMask,
    /// Location of each incoming parameter, empty for `Void` halves.
    pub calling_convention: Vec<RegMask>,
    /// Location pair of each incoming parameter.
    pub parm_regs: Vec<OptoRegPair>,
    /// Registers each ideal register kind may be allocated to.
    pub ideal_reg_masks: [RegMask; IdealReg::COUNT],
    /// Registers and stack slots each ideal register kind may be spilled to.
    pub spill_masks: [RegMask; IdealReg::COUNT],
    /// Locations a value of each kind may be recorded in for deoptimization.
    pub debug_masks: [RegMask; IdealReg::COUNT],
    /// A single-location mask per machine register, in location order.
    pub mreg: Vec<RegMask>,
    /// Registers clobbered by calls.
    pub caller_save: RegMask,
    /// Registers clobbered by calls, plus the save-on-entry registers.
    pub caller_save_exclude_soe: RegMask,
    /// Every stack slot.
    pub stack_only: RegMask,
    /// The stack slots free for spilling.
    pub first_stack: RegMask,
    /// Input masks shared by all exits of one kind, save-on-entry uses included.
    pub exit_masks: [Vec<RegMask>; ExitKind::COUNT],
}

impl MaskTables {
    /// Where a value of kind `ideal` may be spilled.
    pub fn spill_mask(&self, ideal: IdealReg) -> RegMask {
        self.spill_masks[ideal.index()]
    }

    /// Where a value of kind `ideal` may be recorded as debug info.
    pub fn debug_mask(&self, ideal: IdealReg) -> RegMask {
        self.debug_masks[ideal.index()]
    }

    /// The mask of input `idx` of every exit of kind `kind`.
    pub fn exit_mask(&self, kind: ExitKind, idx: usize) -> RegMask {
        self.exit_masks[kind.index()]
            .get(idx)
            .copied()
            .unwrap_or_default()
    }
}

fn pair_mask(pair: OptoRegPair) -> RegMask {
    let mut mask = RegMask::new();
    for r in [pair.first, pair.second].into_iter().flatten() {
        mask.insert(r);
    }
    mask
}

// A register pair covering both locations starting at `r`.
fn wide_mask(r: OptoReg) -> RegMask {
    let mut mask = RegMask::from_reg(r);
    mask.insert(r.add(1));
    mask
}

/// Bias an incoming stack argument into the caller's frame.
fn warp_incoming(
    reg: Option<VMReg>,
    old_sp: OptoReg,
    out_preserve: u32,
    in_arg_limit: &mut OptoReg,
) -> CodegenResult<Option<OptoReg>> {
    match reg {
        None => Ok(None),
        Some(VMReg::Reg(r)) => Ok(Some(r)),
        Some(VMReg::Stack(slot)) => {
            let warped = old_sp.add(slot + out_preserve);
            if warped >= *in_arg_limit {
                *in_arg_limit = warped.add(1);
            }
            if !RegMask::can_represent_arg(warped) {
                return Err(CodegenError::Unrepresentable(
                    "unsupported incoming calling sequence",
                ));
            }
            Ok(Some(warped))
        }
    }
}

/// Bias an outgoing stack argument into the outgoing area starting at `begin`.
fn warp_outgoing(
    reg: Option<VMReg>,
    begin: OptoReg,
    limit: &mut OptoReg,
) -> CodegenResult<Option<OptoReg>> {
    match reg {
        None => Ok(None),
        Some(VMReg::Reg(r)) => Ok(Some(r)),
        Some(VMReg::Stack(slot)) => {
            let warped = begin.add(slot);
            if warped >= *limit {
                *limit = warped.add(1);
            }
            if !RegMask::can_represent_arg(warped) {
                return Err(CodegenError::Unrepresentable("unsupported calling sequence"));
            }
            Ok(Some(warped))
        }
    }
}

fn fits_below(limit: OptoReg) -> bool {
    limit
        .index()
        .checked_sub(1)
        .is_some_and(|last| RegMask::can_represent_arg(OptoReg::new(last)))
}

/// Compute the fixed masks and place the incoming arguments.
fn incoming_layout(
    platform: &dyn Platform,
    signature: &Signature,
    fixed_slots: u32,
) -> CodegenResult<(FrameLayout, MaskTables)> {
    let mut masks = MaskTables {
        return_addr: wide_mask(platform.return_addr(fixed_slots)),
        frame_ptr: wide_mask(platform.c_frame_pointer()),
        ..MaskTables::default()
    };
    if let Some(ideal) = signature.return_reg() {
        masks.return_value = pair_mask(platform.return_value(ideal, false));
    }
    for ideal in IdealReg::ALL {
        masks.ideal_reg_masks[ideal.index()] = platform.ideal_reg_mask(ideal);
    }
    for info in platform.registers() {
        masks.mreg.push(RegMask::from_reg(info.reg));
        let policy = info.save_policy;
        if policy.is_caller_save() {
            masks.caller_save.insert(info.reg);
        }
        if policy.is_caller_save() || policy.is_save_on_entry() {
            masks.caller_save_exclude_soe.insert(info.reg);
        }
    }
    masks
        .stack_only
        .insert_range(platform.stack0(), OptoReg::new(BITS));
    masks.stack_only.set_all_stack();

    let align = platform.stack_alignment_in_slots().max(1);
    let above = (fixed_slots + platform.in_preserve_stack_slots()).next_multiple_of(align);
    let old_sp = platform.stack0().add(above);
    let out_preserve = platform.out_preserve_stack_slots();
    let mut in_arg_limit = old_sp.add(out_preserve);

    let regs = platform.java_calling_convention().assign(&signature.params);
    for (pair, &ty) in regs.iter().zip(&signature.params) {
        let mut mask = RegMask::new();
        let mut locs = OptoRegPair::default();
        if !pair.is_bad() {
            if let (BasicType::Vector(_), Some(VMReg::Reg(lo)), Some(VMReg::Reg(hi))) =
                (ty, pair.first, pair.second)
            {
                mask.insert_range(lo, hi.add(1));
            }
            locs.first = warp_incoming(pair.first, old_sp, out_preserve, &mut in_arg_limit)?;
            locs.second = warp_incoming(pair.second, old_sp, out_preserve, &mut in_arg_limit)?;
            mask.union(&pair_mask(locs));
        }
        masks.calling_convention.push(mask);
        masks.parm_regs.push(locs);
    }

    // Doubleword arguments and locals need an even boundary.
    let in_arg_limit = OptoReg::new(in_arg_limit.index().next_multiple_of(2));
    let new_sp = in_arg_limit;
    let out_arg_limit = new_sp.add(out_preserve);
    if !fits_below(out_arg_limit) {
        return Err(CodegenError::Unrepresentable(
            "must be able to represent all call arguments in reg mask",
        ));
    }
    let frame = FrameLayout {
        old_sp,
        in_arg_limit,
        new_sp,
        out_arg_limit,
    };
    Ok((frame, masks))
}

/// Fill `rms`, the masks of the parameters of a call with signature `sig`.
fn outgoing_masks(
    platform: &dyn Platform,
    op: Opcode,
    sig: &Signature,
    begin: OptoReg,
    limit: &mut OptoReg,
    rms: &mut [RegMask],
) -> CodegenResult<()> {
    let cc = if op.is_call_runtime() {
        platform.c_calling_convention()
    } else {
        platform.java_calling_convention()
    };
    let regs = cc.assign(&sig.params);
    for ((pair, &ty), rm) in regs.iter().zip(&sig.params).zip(rms.iter_mut()) {
        if pair.is_bad() {
            continue;
        }
        if let (BasicType::Vector(_), Some(VMReg::Reg(lo)), Some(VMReg::Reg(hi))) =
            (ty, pair.first, pair.second)
        {
            rm.insert_range(lo, hi.add(1));
        }
        for half in [pair.first, pair.second] {
            if let Some(r) = warp_outgoing(half, begin, limit)? {
                rm.insert(r);
            }
        }
    }
    Ok(())
}

fn mach_proj_node(opcode: Opcode, multi: Node, proj: MachProj) -> NodeData {
    NodeData::new(opcode)
        .with_inputs(&[Some(multi)])
        .with_ideal(proj.ideal)
        .with_payload(Payload {
            proj: Some(proj.con),
            ..Payload::default()
        })
        .with_kind(NodeKind::MachProj(Box::new(proj)))
}

fn unmatched_proj(con: u32) -> MachProj {
    MachProj {
        con,
        mask: RegMask::EMPTY,
        ideal: None,
        flavour: ProjFlavour::Unmatched,
    }
}

fn value_proj(con: u32, mask: RegMask, ideal: Option<IdealReg>) -> MachProj {
    MachProj {
        con,
        mask,
        ideal,
        flavour: ProjFlavour::Value,
    }
}

/// The mask of the operand class that caught input `idx` of machine node `n`.
fn class_input_mask(grammar: &Grammar, graph: &Graph, n: Node, idx: usize) -> RegMask {
    graph
        .mach(n)
        .and_then(|m| m.in_class(idx))
        .map_or(RegMask::EMPTY, |c| grammar.class_mask(c))
}

/// Locations input `idx` of machine node `n` may be read from.
pub(super) fn input_mask(
    grammar: &Grammar,
    masks: &MaskTables,
    graph: &Graph,
    n: Node,
    idx: usize,
) -> RegMask {
    let Some(mach) = graph.mach(n) else {
        return RegMask::EMPTY;
    };
    if let Some(kind) = mach.exit {
        return masks.exit_mask(kind, idx);
    }
    let op = graph.opcode(n);
    if let Some(rms) = &mach.in_rms {
        if let Some(rm) = rms.get(idx) {
            return *rm;
        }
        // Past the domain everything is debug info, except the poll of a plain safepoint.
        if !(op == Opcode::SafePoint && idx == func::PARMS) {
            return match graph.input(n, idx).and_then(|i| graph.ideal_reg(i)) {
                Some(ideal) if op.is_call() => masks.debug_mask(ideal),
                Some(ideal) => masks.spill_mask(ideal),
                None => RegMask::EMPTY,
            };
        }
    }
    if op == Opcode::AddP && idx == addp::BASE && mach.in_class(idx).is_none() {
        return masks.spill_mask(IdealReg::RegP);
    }
    class_input_mask(grammar, graph, n, idx)
}

/// Locations machine node `n` may produce its value in.
pub(super) fn output_mask(grammar: &Grammar, graph: &Graph, n: Node) -> RegMask {
    match graph.kind(n) {
        NodeKind::Mach(m) => m
            .operands
            .first()
            .map_or(RegMask::EMPTY, |o| grammar.class_mask(o.class)),
        NodeKind::MachProj(p) => p.mask,
        NodeKind::Ideal => RegMask::EMPTY,
    }
}

impl Matcher {
    /// Place the incoming arguments and compute the masks that do not depend on the matched
    /// graph.
    pub(super) fn layout_frame(&mut self) -> CodegenResult<()> {
        let env = Arc::clone(&self.env);
        let res = incoming_layout(env.platform(), &self.signature, self.fixed_slots);
        let (frame, masks) = res.map_err(|e| self.fail(e))?;
        log::debug!(
            "frame: old sp {}, incoming args below {}, new sp {}",
            frame.old_sp,
            frame.in_arg_limit,
            frame.new_sp
        );
        self.frame = frame;
        self.masks = masks;
        Ok(())
    }

    /// Match safepoint or call `sfpt` on its own and give it its argument masks.
    pub(super) fn match_sfpt(&mut self, sfpt: Node) -> CodegenResult<Node> {
        let op = self.graph.opcode(sfpt);
        let m = self.match_tree(sfpt)?;

        let env = Arc::clone(&self.env);
        let platform = env.platform();
        let sig = if op.is_call() {
            self.graph.payload(sfpt).sig.clone()
        } else {
            None
        };
        let domain_cnt = sig.as_ref().map_or(func::PARMS, Signature::domain_cnt);
        let mut rms = vec![RegMask::EMPTY; domain_cnt];
        rms[func::RETURN_ADR] = self.masks.return_addr;
        rms[func::FRAME_PTR] = self.masks.frame_ptr;

        let begin = self.frame.new_sp.add(platform.out_preserve_stack_slots());
        let mut limit = begin;
        if op.is_call_runtime() {
            // Backing store for register arguments of varargs C functions.
            limit = limit.add(platform.varargs_c_out_slots_killed());
        }
        if let Some(sig) = &sig {
            let res = outgoing_masks(
                platform,
                op,
                sig,
                begin,
                &mut limit,
                &mut rms[func::PARMS..],
            );
            res.map_err(|e| self.fail(e))?;
        }
        if self.frame.out_arg_limit < limit {
            self.frame.out_arg_limit = limit;
        }

        if let Some(sig) = &sig {
            if !fits_below(limit) {
                return Err(self.fail(CodegenError::Unrepresentable(
                    "unsupported outgoing calling sequence",
                )));
            }
            let mut kill = RegMask::new();
            kill.insert_range(begin, limit);
            if !kill.is_empty() {
                let con = sig.range_cnt() as u32 + FAT_PROJ_OFFSET;
                let fat = MachProj {
                    con,
                    mask: kill,
                    ideal: None,
                    flavour: ProjFlavour::Fat,
                };
                self.graph.add_node(mach_proj_node(Opcode::Proj, m, fat));
            }
        }
        if let Some(mach) = self.graph.mach_mut(m) {
            mach.in_rms = Some(rms);
        }
        Ok(m)
    }

    /// The machine replacement of projection `proj` of multi-valued node `multi`.
    ///
    /// The result may still refer to `multi` itself; the transform walk retargets it.
    pub(super) fn match_projection(&mut self, proj: Node, multi: Node) -> CodegenResult<Node> {
        let con = self.graph.payload(proj).proj.unwrap_or(0);
        let idx = con as usize;
        let mop = self.graph.opcode(multi);
        let mp = match mop {
            Opcode::Start => match idx {
                func::CONTROL | func::I_O | func::MEMORY => unmatched_proj(con),
                func::FRAME_PTR => value_proj(con, self.masks.frame_ptr, Some(IdealReg::RegP)),
                func::RETURN_ADR => {
                    value_proj(con, self.masks.return_addr, Some(IdealReg::RegP))
                }
                _ => {
                    let parm = idx.checked_sub(func::PARMS);
                    let ty = parm.and_then(|p| self.signature.params.get(p)).copied();
                    match (parm, ty.and_then(BasicType::ideal_reg)) {
                        (Some(p), Some(ideal)) => {
                            value_proj(con, self.masks.calling_convention[p], Some(ideal))
                        }
                        // The upper half of a long or double has no value of its own.
                        _ => {
                            return self
                                .new_node(self.top)
                                .ok_or_else(|| self.fail(CodegenError::GraphLost));
                        }
                    }
                }
            },
            _ if mop.is_call() => {
                let result = self
                    .graph
                    .payload(multi)
                    .sig
                    .as_ref()
                    .and_then(Signature::return_reg);
                match (idx, result) {
                    (func::PARMS, Some(ideal)) => {
                        let pair = self
                            .env
                            .platform()
                            .return_value(ideal, mop.is_call_runtime());
                        value_proj(con, pair_mask(pair), Some(ideal))
                    }
                    _ => unmatched_proj(con),
                }
            }
            Opcode::SafePoint | Opcode::MemBarAcquire | Opcode::MemBarRelease => {
                unmatched_proj(con)
            }
            _ => return Ok(self.graph.clone_node(proj)),
        };
        let opcode = self.graph.opcode(proj);
        Ok(self.graph.add_node(mach_proj_node(opcode, multi, mp)))
    }

    /// Compute the stack slots free for spilling: the incoming argument area and everything
    /// past the outgoing one.
    fn init_first_stack_mask(&mut self, platform: &dyn Platform) {
        let frame = self.frame;
        let mut first = RegMask::new();
        let init_in = frame.old_sp.add(platform.out_preserve_stack_slots());
        first.insert_range(init_in, frame.in_arg_limit);
        first.insert_range(frame.out_arg_limit, OptoReg::new(BITS));
        first.set_all_stack();
        self.masks.first_stack = first;
    }

    fn init_spill_masks(&mut self, platform: &dyn Platform, use_fpu_for_spilling: bool) {
        use IdealReg::*;
        let t = &mut self.masks;
        let regs = t.ideal_reg_masks;
        let first = t.first_stack;
        let mut aligned = first;
        aligned.clear_to_pairs();
        debug_assert!(aligned.is_all_stack());

        let with = |ideal: IdealReg, stack: &RegMask| {
            let mut m = regs[ideal.index()];
            if m.is_empty() {
                return RegMask::EMPTY;
            }
            m.union(stack);
            m
        };
        let mut spill = [RegMask::EMPTY; IdealReg::COUNT];
        spill[RegN.index()] = with(RegN, &first);
        spill[RegI.index()] = with(RegI, &first);
        spill[RegF.index()] = with(RegF, &first);
        spill[VecS.index()] = with(VecS, &first);
        spill[RegP.index()] = with(RegP, &aligned);
        spill[RegL.index()] = with(RegL, &aligned);
        spill[RegD.index()] = with(RegD, &aligned);
        spill[VecD.index()] = with(VecD, &aligned);
        spill[RegFlags.index()] = regs[RegFlags.index()];

        // Wide vectors spill to aligned sets, never into the top of the incoming arguments where
        // they could run over into the caller's frame.
        let init_in = self.frame.old_sp.add(platform.out_preserve_stack_slots());
        for ideal in [VecX, VecY, VecZ] {
            if regs[ideal.index()].is_empty() {
                continue;
            }
            let slots = ideal.slots();
            let mut r = self.frame.in_arg_limit.index();
            for _ in 1..slots {
                if r <= init_in.index() {
                    break;
                }
                r -= 1;
                aligned.remove(OptoReg::new(r));
            }
            aligned.clear_to_sets(slots);
            debug_assert!(aligned.is_all_stack());
            spill[ideal.index()] = with(ideal, &aligned);
        }

        if use_fpu_for_spilling {
            for (to, from) in [
                (RegI, RegF),
                (RegF, RegI),
                (RegN, RegF),
                (RegL, RegD),
                (RegD, RegL),
                (RegP, RegD),
            ] {
                spill[to.index()].union(&regs[from.index()]);
            }
        }

        // Debug info survives in spill slots and save-on-entry registers. Stubs may not refer
        // to save-on-entry registers at all.
        let clobbered = if self.is_method {
            t.caller_save
        } else {
            t.caller_save_exclude_soe
        };
        let mut debug = spill;
        for m in &mut debug {
            m.subtract(&clobbered);
        }
        debug[RegFlags.index()] = RegMask::EMPTY;

        t.spill_masks = spill;
        t.debug_masks = debug;
    }

    /// Finish the masks and give every exit a use of each save-on-entry register.
    pub(super) fn fixup_save_on_entry(&mut self) -> CodegenResult<()> {
        let env = Arc::clone(&self.env);
        let platform = env.platform();
        let grammar = env.grammar();
        self.init_first_stack_mask(platform);
        self.init_spill_masks(platform, env.flags().use_fpu_for_spilling());

        let (Some(new_root), Some(new_start), Some(new_top)) = (
            self.new_root,
            self.new_node(self.start),
            self.new_node(self.top),
        ) else {
            return Err(self.fail(CodegenError::GraphLost));
        };

        let template = |extra: usize| {
            let mut rms = vec![RegMask::EMPTY; func::PARMS + extra];
            rms[func::RETURN_ADR] = self.masks.return_addr;
            rms[func::FRAME_PTR] = self.masks.frame_ptr;
            rms
        };
        let returns_value = self.signature.range_cnt() > func::PARMS;
        let mut ret = template(usize::from(returns_value));
        if returns_value {
            ret[func::PARMS] = self.masks.return_value;
        }
        // The exception travels where the receiver would.
        let mut rethrow = template(1);
        if let Some(r) = platform.receiver() {
            rethrow[func::PARMS] = wide_mask(r);
        }
        let mut tail_call = template(2);
        let mut tail_jump = template(2);
        let halt = template(0);

        let exits: Vec<(Node, ExitKind)> = self
            .graph
            .inputs(new_root)
            .skip(1)
            .flatten()
            .filter_map(|n| ExitKind::of(self.graph.opcode(n)).map(|k| (n, k)))
            .collect();
        // Target and argument masks come from the first tail call or jump of each kind.
        for kind in [ExitKind::TailCall, ExitKind::TailJump] {
            let Some(&(sample, _)) = exits.iter().find(|&&(_, k)| k == kind) else {
                continue;
            };
            let rms = if kind == ExitKind::TailCall {
                &mut tail_call
            } else {
                &mut tail_jump
            };
            for idx in [func::PARMS, func::PARMS + 1] {
                rms[idx] = class_input_mask(grammar, &self.graph, sample, idx);
            }
        }

        let mut templates = [ret, rethrow, tail_call, tail_jump, halt];
        let base_cnt = templates.each_ref().map(Vec::len);
        for &(exit, kind) in &exits {
            if let Some(mach) = self.graph.mach_mut(exit) {
                mach.exit = Some(kind);
            }
            debug_assert!(self.graph.req(exit) <= base_cnt[kind.index()]);
            while self.graph.req(exit) < base_cnt[kind.index()] {
                self.graph.add_req(exit, None);
            }
        }

        let regs = platform.registers();
        let mut proj_cnt = self.signature.domain_cnt() as u32;
        let is_soe = |i: usize, ty: IdealReg| {
            regs.get(i)
                .is_some_and(|r| r.save_policy.is_save_on_entry() && r.save_type == ty)
        };
        for (i, info) in regs.iter().enumerate() {
            if !info.save_policy.is_save_on_entry() {
                continue;
            }
            let reg = info.reg;
            let ty = info.save_type;
            let even = reg.index() % 2 == 0;
            let pairs = matches!(ty, IdealReg::RegI | IdealReg::RegF);
            let mut mask = self.masks.mreg[i];
            let mut halt_mask = self.masks.spill_mask(ty);
            let proj = if pairs && even && is_soe(i + 1, ty) {
                // Two halves of a long or double are saved together.
                mask.insert(reg.add(1));
                halt_mask.insert(reg.add(1));
                let wide = if ty == IdealReg::RegF {
                    IdealReg::RegD
                } else {
                    IdealReg::RegL
                };
                let p = value_proj(proj_cnt, mask, Some(wide));
                proj_cnt += 2;
                Some(p)
            } else if pairs && !even && i > 0 && is_soe(i - 1, ty) {
                mask = RegMask::EMPTY;
                halt_mask = RegMask::EMPTY;
                None
            } else {
                let p = value_proj(proj_cnt, mask, Some(ty));
                proj_cnt += 1;
                Some(p)
            };
            let proj = match proj {
                Some(p) => {
                    let n = self
                        .graph
                        .add_node(mach_proj_node(Opcode::Proj, new_start, p));
                    self.save_on_entry.push(n);
                    n
                }
                None => new_top,
            };

            for (k, rms) in templates.iter_mut().enumerate() {
                rms.push(if k == ExitKind::Halt.index() {
                    halt_mask
                } else {
                    mask
                });
            }
            for &(exit, _) in &exits {
                self.graph.add_req(exit, Some(proj));
            }
        }
        crate::trace!(
            "{} save-on-entry projections on {} exits",
            self.save_on_entry.len(),
            exits.len()
        );
        self.masks.exit_masks = templates;
        Ok(())
    }
}
