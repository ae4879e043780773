//! Construction of canonical input graphs.
//!
//! The upstream optimizer normally hands the matcher a finished graph. [`GraphBuilder`] builds the
//! same shapes directly, for clients without an optimizer and for tests: the root, top and start
//! nodes with their fixed projections, then values, memory operations, control flow and exits.

use crate::compile::CompileUnit;
use crate::ir::entities::{AliasIdx, Node};
use crate::ir::graph::{Graph, MemAccess, NodeData, Payload};
use crate::ir::opcode::Opcode;
use crate::ir::slots::{func, mem};
use crate::ir::types::{BoolTest, ConstValue, IdealReg, Signature};

/// The nodes produced by a call.
#[derive(Copy, Clone, Debug)]
pub struct CallProjs {
    /// The call itself.
    pub call: Node,
    /// Control after the call.
    pub control: Node,
    /// I/O state after the call.
    pub i_o: Node,
    /// Memory after the call.
    pub memory: Node,
    /// The returned value, if the callee returns one.
    pub result: Option<Node>,
}

/// Builds the input graph of one compilation unit.
pub struct GraphBuilder {
    graph: Graph,
    root: Node,
    top: Node,
    start: Node,
    signature: Signature,
    is_method: bool,
    fixed_slots: u32,
    control: Node,
    i_o: Node,
    memory: Node,
    frame_ptr: Node,
    return_adr: Node,
    parms: Vec<Node>,
}

impl GraphBuilder {
    /// Start a method compilation with signature `signature`.
    pub fn new(signature: Signature) -> Self {
        let mut graph = Graph::new();
        let root = graph.add_node(NodeData::new(Opcode::Root).with_inputs(&[None]));
        let top = graph.add_node(NodeData::new(Opcode::Top).with_inputs(&[Some(root)]));
        let start = graph.add_node(
            NodeData::new(Opcode::Start)
                .with_inputs(&[None])
                .with_payload(Payload {
                    sig: Some(signature.clone()),
                    ..Payload::default()
                }),
        );
        let mut proj = |num: usize, ideal: Option<IdealReg>| {
            graph.add_node(
                NodeData::new(Opcode::Proj)
                    .with_inputs(&[Some(start)])
                    .with_ideal(ideal)
                    .with_payload(Payload {
                        proj: Some(num as u32),
                        ..Payload::default()
                    }),
            )
        };
        let control = proj(func::CONTROL, None);
        let i_o = proj(func::I_O, None);
        let memory = proj(func::MEMORY, None);
        let frame_ptr = proj(func::FRAME_PTR, Some(IdealReg::RegP));
        let return_adr = proj(func::RETURN_ADR, Some(IdealReg::RegP));
        let parms = signature
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                graph.add_node(
                    NodeData::new(Opcode::Parm)
                        .with_inputs(&[Some(start)])
                        .with_ideal(ty.ideal_reg())
                        .with_payload(Payload {
                            proj: Some((func::PARMS + i) as u32),
                            ..Payload::default()
                        }),
                )
            })
            .collect();
        Self {
            graph,
            root,
            top,
            start,
            signature,
            is_method: true,
            fixed_slots: 0,
            control,
            i_o,
            memory,
            frame_ptr,
            return_adr,
            parms,
        }
    }

    /// Start a runtime stub compilation with signature `signature`.
    pub fn stub(signature: Signature) -> Self {
        let mut b = Self::new(signature);
        b.is_method = false;
        b
    }

    /// Reserve `slots` stack slots for monitors and other fixed frame contents.
    pub fn set_fixed_slots(&mut self, slots: u32) {
        self.fixed_slots = slots;
    }

    /// The graph under construction.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable access to the graph under construction.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// The root node.
    pub fn root(&self) -> Node {
        self.root
    }

    /// The top node.
    pub fn top(&self) -> Node {
        self.top
    }

    /// The start node.
    pub fn start(&self) -> Node {
        self.start
    }

    /// Control on entry.
    pub fn control(&self) -> Node {
        self.control
    }

    /// I/O state on entry.
    pub fn i_o(&self) -> Node {
        self.i_o
    }

    /// Memory on entry.
    pub fn memory(&self) -> Node {
        self.memory
    }

    /// Incoming parameter `idx`, counting the `Void` halves of longs and doubles.
    pub fn parm(&self, idx: usize) -> Node {
        self.parms[idx]
    }

    /// Add an arbitrary node.
    pub fn node(&mut self, data: NodeData) -> Node {
        self.graph.add_node(data)
    }

    fn con(&mut self, opcode: Opcode, value: ConstValue) -> Node {
        let root = self.root;
        self.graph.add_node(
            NodeData::new(opcode)
                .with_inputs(&[Some(root)])
                .with_payload(Payload {
                    con: Some(value),
                    ..Payload::default()
                }),
        )
    }

    /// An int constant.
    pub fn iconst(&mut self, v: i32) -> Node {
        self.con(Opcode::ConI, ConstValue::Int(v))
    }

    /// A long constant.
    pub fn lconst(&mut self, v: i64) -> Node {
        self.con(Opcode::ConL, ConstValue::Long(v))
    }

    /// A float constant.
    pub fn fconst(&mut self, v: f32) -> Node {
        self.con(Opcode::ConF, ConstValue::Float(v.to_bits()))
    }

    /// A double constant.
    pub fn dconst(&mut self, v: f64) -> Node {
        self.con(Opcode::ConD, ConstValue::Double(v.to_bits()))
    }

    /// A pointer constant.
    pub fn pconst(&mut self, v: u64) -> Node {
        self.con(Opcode::ConP, ConstValue::Ptr(v))
    }

    /// The null pointer.
    pub fn null(&mut self) -> Node {
        self.pconst(0)
    }

    /// A compressed pointer constant.
    pub fn nconst(&mut self, v: u32) -> Node {
        self.con(Opcode::ConN, ConstValue::NarrowPtr(v))
    }

    /// A value computed from one input.
    pub fn unary(&mut self, opcode: Opcode, a: Node) -> Node {
        self.graph
            .add_node(NodeData::new(opcode).with_inputs(&[None, Some(a)]))
    }

    /// A value computed from two inputs.
    pub fn binary(&mut self, opcode: Opcode, a: Node, b: Node) -> Node {
        self.graph
            .add_node(NodeData::new(opcode).with_inputs(&[None, Some(a), Some(b)]))
    }

    /// The address `addr + offset` derived from object `base`.
    pub fn add_p(&mut self, base: Node, addr: Node, offset: Node) -> Node {
        self.graph.add_node(
            NodeData::new(Opcode::AddP).with_inputs(&[None, Some(base), Some(addr), Some(offset)]),
        )
    }

    /// A condition over compare `cmp`.
    pub fn test(&mut self, cmp: Node, test: BoolTest) -> Node {
        self.graph.add_node(
            NodeData::new(Opcode::Bool)
                .with_inputs(&[None, Some(cmp)])
                .with_payload(Payload {
                    test: Some(test),
                    ..Payload::default()
                }),
        )
    }

    /// A conditional move: `cond ? if_true : if_false`.
    pub fn cmove(&mut self, opcode: Opcode, cond: Node, if_false: Node, if_true: Node) -> Node {
        debug_assert!(opcode.is_cmove());
        self.graph.add_node(
            NodeData::new(opcode).with_inputs(&[None, Some(cond), Some(if_false), Some(if_true)]),
        )
    }

    fn mem_payload(alias: AliasIdx) -> Payload {
        Payload {
            mem: Some(MemAccess::new(alias)),
            ..Payload::default()
        }
    }

    /// A load from `addr` in memory state `memory`.
    pub fn load(
        &mut self,
        opcode: Opcode,
        ctrl: Option<Node>,
        memory: Node,
        addr: Node,
        alias: AliasIdx,
    ) -> Node {
        debug_assert!(opcode.is_load());
        self.graph.add_node(
            NodeData::new(opcode)
                .with_inputs(&[ctrl, Some(memory), Some(addr)])
                .with_payload(Self::mem_payload(alias)),
        )
    }

    /// A store of `value` to `addr`. Returns the new memory state.
    pub fn store(
        &mut self,
        opcode: Opcode,
        ctrl: Option<Node>,
        memory: Node,
        addr: Node,
        value: Node,
        alias: AliasIdx,
    ) -> Node {
        debug_assert!(opcode.is_store());
        self.graph.add_node(
            NodeData::new(opcode)
                .with_inputs(&[ctrl, Some(memory), Some(addr), Some(value)])
                .with_payload(Self::mem_payload(alias)),
        )
    }

    /// An atomic compare-and-swap of `expected` for `new` at `addr`.
    pub fn compare_and_swap(
        &mut self,
        opcode: Opcode,
        ctrl: Option<Node>,
        memory: Node,
        addr: Node,
        new: Node,
        expected: Node,
        alias: AliasIdx,
    ) -> Node {
        debug_assert!(opcode.is_cas());
        let mut inputs = [None; mem::EXPECTED_IN + 1];
        inputs[mem::CONTROL] = ctrl;
        inputs[mem::MEMORY] = Some(memory);
        inputs[mem::ADDRESS] = Some(addr);
        inputs[mem::VALUE_IN] = Some(new);
        inputs[mem::EXPECTED_IN] = Some(expected);
        self.graph.add_node(
            NodeData::new(opcode)
                .with_inputs(&inputs)
                .with_payload(Self::mem_payload(alias)),
        )
    }

    /// Merge the memory states `states` into one.
    pub fn merge_mem(&mut self, states: &[Node]) -> Node {
        let inputs: Vec<_> = core::iter::once(None)
            .chain(states.iter().map(|&s| Some(s)))
            .collect();
        self.graph
            .add_node(NodeData::new(Opcode::MergeMem).with_inputs(&inputs))
    }

    /// A projection `num` of the tuple produced by `multi`.
    pub fn proj(&mut self, multi: Node, num: u32, ideal: Option<IdealReg>) -> Node {
        let opcode = match self.graph.opcode(multi) {
            Opcode::If if num == 1 => Opcode::IfTrue,
            Opcode::If => Opcode::IfFalse,
            Opcode::Catch => Opcode::CatchProj,
            _ => Opcode::Proj,
        };
        self.graph.add_node(
            NodeData::new(opcode)
                .with_inputs(&[Some(multi)])
                .with_ideal(ideal)
                .with_payload(Payload {
                    proj: Some(num),
                    ..Payload::default()
                }),
        )
    }

    /// Branch on `cond`. Returns the `If` and its true and false projections.
    pub fn branch(&mut self, ctrl: Node, cond: Node) -> (Node, Node, Node) {
        let iff = self
            .graph
            .add_node(NodeData::new(Opcode::If).with_inputs(&[Some(ctrl), Some(cond)]));
        let if_true = self.proj(iff, 1, None);
        let if_false = self.proj(iff, 0, None);
        (iff, if_true, if_false)
    }

    /// Merge control paths.
    pub fn region(&mut self, preds: &[Node]) -> Node {
        let inputs: Vec<_> = core::iter::once(None)
            .chain(preds.iter().map(|&p| Some(p)))
            .collect();
        let region = self
            .graph
            .add_node(NodeData::new(Opcode::Region).with_inputs(&inputs));
        self.graph.set_req(region, 0, Some(region));
        region
    }

    /// Merge values at `region`, one per predecessor.
    pub fn phi(&mut self, region: Node, values: &[Node], ideal: Option<IdealReg>) -> Node {
        let inputs: Vec<_> = core::iter::once(Some(region))
            .chain(values.iter().map(|&v| Some(v)))
            .collect();
        self.graph.add_node(
            NodeData::new(Opcode::Phi)
                .with_inputs(&inputs)
                .with_ideal(ideal),
        )
    }

    fn exit(&mut self, opcode: Opcode, ctrl: Node, i_o: Node, memory: Node, values: &[Node]) -> Node {
        let mut inputs = vec![
            Some(ctrl),
            Some(i_o),
            Some(memory),
            Some(self.frame_ptr),
            Some(self.return_adr),
        ];
        inputs.extend(values.iter().map(|&v| Some(v)));
        let exit = self
            .graph
            .add_node(NodeData::new(opcode).with_inputs(&inputs));
        self.graph.add_req(self.root, Some(exit));
        exit
    }

    /// Return from the method, with `value` if the signature returns one.
    pub fn ret(&mut self, ctrl: Node, i_o: Node, memory: Node, value: Option<Node>) -> Node {
        let values: Vec<_> = value.into_iter().collect();
        self.exit(Opcode::Return, ctrl, i_o, memory, &values)
    }

    /// Unwind to the caller with `exception`.
    pub fn rethrow(&mut self, ctrl: Node, i_o: Node, memory: Node, exception: Node) -> Node {
        self.exit(Opcode::Rethrow, ctrl, i_o, memory, &[exception])
    }

    /// Stop execution.
    pub fn halt(&mut self, ctrl: Node, i_o: Node, memory: Node) -> Node {
        self.exit(Opcode::Halt, ctrl, i_o, memory, &[])
    }

    /// Tail call `target`, passing `method`.
    pub fn tail_call(
        &mut self,
        ctrl: Node,
        i_o: Node,
        memory: Node,
        target: Node,
        method: Node,
    ) -> Node {
        self.exit(Opcode::TailCall, ctrl, i_o, memory, &[target, method])
    }

    /// Jump to exception handler `target`, passing `exception`.
    pub fn tail_jump(
        &mut self,
        ctrl: Node,
        i_o: Node,
        memory: Node,
        target: Node,
        exception: Node,
    ) -> Node {
        self.exit(Opcode::TailJump, ctrl, i_o, memory, &[target, exception])
    }

    /// A safepoint polling `poll`, recording `debug` for deoptimization.
    ///
    /// Returns the safepoint and its control projection.
    pub fn safepoint(
        &mut self,
        ctrl: Node,
        i_o: Node,
        memory: Node,
        poll: Node,
        debug: &[Node],
    ) -> (Node, Node) {
        let mut inputs = vec![
            Some(ctrl),
            Some(i_o),
            Some(memory),
            Some(self.frame_ptr),
            Some(self.return_adr),
            Some(poll),
        ];
        inputs.extend(debug.iter().map(|&d| Some(d)));
        let sfpt = self.graph.add_node(
            NodeData::new(Opcode::SafePoint)
                .with_inputs(&inputs)
                .with_payload(Payload {
                    debug_start: Some(func::PARMS as u32 + 1),
                    ..Payload::default()
                }),
        );
        let control = self.proj(sfpt, func::CONTROL as u32, None);
        (sfpt, control)
    }

    /// A call with signature `signature`, passing `args` and recording `debug`.
    pub fn call(
        &mut self,
        opcode: Opcode,
        ctrl: Node,
        i_o: Node,
        memory: Node,
        signature: Signature,
        args: &[Node],
        debug: &[Node],
    ) -> CallProjs {
        debug_assert!(opcode.is_call());
        debug_assert_eq!(args.len(), signature.params.len());
        let mut inputs = vec![
            Some(ctrl),
            Some(i_o),
            Some(memory),
            Some(self.frame_ptr),
            Some(self.return_adr),
        ];
        inputs.extend(args.iter().map(|&a| Some(a)));
        inputs.extend(debug.iter().map(|&d| Some(d)));
        let debug_start = signature.domain_cnt() as u32;
        let result_ideal = signature.return_reg();
        let call = self.graph.add_node(
            NodeData::new(opcode)
                .with_inputs(&inputs)
                .with_payload(Payload {
                    sig: Some(signature),
                    debug_start: Some(debug_start),
                    ..Payload::default()
                }),
        );
        let control = self.proj(call, func::CONTROL as u32, None);
        let i_o = self.proj(call, func::I_O as u32, None);
        let memory = self.proj(call, func::MEMORY as u32, None);
        let result = result_ideal.map(|ideal| self.proj(call, func::PARMS as u32, Some(ideal)));
        CallProjs {
            call,
            control,
            i_o,
            memory,
            result,
        }
    }

    /// Finish the graph.
    pub fn finish(self) -> CompileUnit {
        CompileUnit {
            graph: self.graph,
            root: self.root,
            top: self.top,
            start: self.start,
            signature: self.signature,
            is_method: self.is_method,
            fixed_slots: self.fixed_slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::BasicType;
    use crate::verifier::verify_def_use;

    #[test]
    fn start_projections() {
        let sig = Signature::new(&[BasicType::Long, BasicType::Int], &[BasicType::Int]);
        let b = GraphBuilder::new(sig);
        let g = b.graph();
        assert_eq!(g.opcode(b.start()), Opcode::Start);
        assert_eq!(g.payload(b.parm(0)).proj, Some(func::PARMS as u32));
        assert_eq!(g.ideal_reg(b.parm(1)), None);
        assert_eq!(g.ideal_reg(b.parm(2)), Some(IdealReg::RegI));
        assert_eq!(g.input(b.top(), 0), Some(b.root()));
        assert_eq!(g.ideal_reg(b.memory()), None);
    }

    #[test]
    fn exits_hang_off_root() {
        let mut b = GraphBuilder::new(Signature::new(&[], &[BasicType::Int]));
        let v = b.iconst(42);
        let (c, io, m) = (b.control(), b.i_o(), b.memory());
        let ret = b.ret(c, io, m, Some(v));
        let unit = b.finish();
        assert_eq!(unit.graph.input(unit.root, 1), Some(ret));
        assert_eq!(unit.graph.input(ret, func::PARMS), Some(v));
        assert!(verify_def_use(&unit.graph).is_ok());
    }

    #[test]
    fn calls_get_projections() {
        let mut b = GraphBuilder::new(Signature::new(&[BasicType::Object], &[]));
        let (c, io, m) = (b.control(), b.i_o(), b.memory());
        let recv = b.parm(0);
        let callee = Signature::new(&[BasicType::Object], &[BasicType::Long]);
        let call = b.call(Opcode::CallStaticJava, c, io, m, callee, &[recv], &[recv]);
        let g = b.graph();
        assert_eq!(g.payload(call.call).debug_start, Some(func::PARMS as u32 + 1));
        assert_eq!(g.ideal_reg(call.result.unwrap()), Some(IdealReg::RegL));
        assert_eq!(g.input(call.memory, 0), Some(call.call));
    }
}
