//! The node graph and its edge operations.
//!
//! A [`Graph`] is a table of nodes. Every node has an ordered list of required inputs, where
//! position 0 is the control antecedent and may be absent, an unordered duplicate-free list of
//! precedence inputs that only constrain ordering, and a multiset of outputs that mirrors every
//! input reference pointing at the node. Edge operations keep the two directions in sync.
//!
//! While matching, the graph is split in two spaces at a watermark: the frozen input nodes below
//! it and the machine nodes built from them above it. Edges from a new node to an old node are
//! pending until the matcher retargets them, so they are not mirrored in the old node's outputs.
//! This keeps the input graph untouched while the new graph is wired up, and lets the old space
//! be dropped in bulk by [`Graph::compact_new_space`].

use crate::entity::packed_option::PackedOption;
use crate::entity::{PrimaryMap, SecondaryMap};
use crate::ir::entities::{AliasIdx, Node};
use crate::ir::mach::{MachInst, MachProj};
use crate::ir::opcode::Opcode;
use crate::ir::types::{BoolTest, ConstValue, IdealReg, Signature};
use crate::result::{CodegenError, CodegenResult};
use core::fmt;
use smallvec::SmallVec;

/// Ordering constraints of a memory access.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MemOrder {
    /// Plain access.
    #[default]
    Unordered,
    /// Load with acquire semantics.
    Acquire,
    /// Store with release semantics.
    Release,
}

/// What a memory access touches and how.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemAccess {
    /// Alias class of the accessed location.
    pub alias: AliasIdx,
    /// Collector-specific barrier data.
    pub barrier: u8,
    /// Ordering constraints.
    pub order: MemOrder,
}

impl MemAccess {
    /// A plain access to alias class `alias`.
    pub fn new(alias: AliasIdx) -> Self {
        Self {
            alias,
            barrier: 0,
            order: MemOrder::Unordered,
        }
    }
}

/// Opcode-specific fields of a node. Each opcode uses the fields that apply to it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Payload {
    /// Value of a constant.
    pub con: Option<ConstValue>,
    /// Condition of a `Bool`.
    pub test: Option<BoolTest>,
    /// Projection number.
    pub proj: Option<u32>,
    /// Memory access record of loads, stores and atomics.
    pub mem: Option<MemAccess>,
    /// Signature of `Start` and of calls.
    pub sig: Option<Signature>,
    /// First debug-info input of a safepoint or call.
    pub debug_start: Option<u32>,
}

/// What a node is.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// An ideal node, or a clone of one.
    Ideal,
    /// A machine instruction.
    Mach(Box<MachInst>),
    /// A projection of a machine node.
    MachProj(Box<MachProj>),
}

/// One node of the graph.
#[derive(Clone, Debug)]
pub struct NodeData {
    opcode: Opcode,
    kind: NodeKind,
    inputs: SmallVec<[PackedOption<Node>; 4]>,
    prec: SmallVec<[Node; 2]>,
    outs: Vec<Node>,
    ideal: Option<IdealReg>,
    payload: Payload,
}

impl NodeData {
    /// An ideal node with no edges and the opcode's register kind.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            kind: NodeKind::Ideal,
            inputs: SmallVec::new(),
            prec: SmallVec::new(),
            outs: Vec::new(),
            ideal: opcode.ideal_reg(),
            payload: Payload::default(),
        }
    }

    /// Set the required inputs.
    pub fn with_inputs(mut self, inputs: &[Option<Node>]) -> Self {
        self.inputs = inputs.iter().map(|&n| n.into()).collect();
        self
    }

    /// Set the register kind.
    pub fn with_ideal(mut self, ideal: Option<IdealReg>) -> Self {
        self.ideal = ideal;
        self
    }

    /// Set the opcode-specific fields.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Set what kind of node this is.
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// The opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// What kind of node this is.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The register kind of the value this node produces.
    pub fn ideal_reg(&self) -> Option<IdealReg> {
        self.ideal
    }

    /// Opcode-specific fields.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// A sea-of-nodes graph.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: PrimaryMap<Node, NodeData>,
    watermark: Option<u32>,
}

/// Maps nodes of one graph to the nodes that replaced them in another.
pub type NodeMap = SecondaryMap<Node, PackedOption<Node>>;

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, registering it as an output of its inputs.
    pub fn add_node(&mut self, mut data: NodeData) -> Node {
        data.outs.clear();
        if let NodeKind::Mach(m) = &mut data.kind {
            m.in_classes.resize(data.inputs.len(), None);
        }
        let n = self.nodes.push(data);
        let defs: SmallVec<[Node; 8]> = self.nodes[n]
            .inputs
            .iter()
            .filter_map(|i| i.expand())
            .chain(self.nodes[n].prec.iter().copied())
            .collect();
        for d in defs {
            self.add_out(d, n);
        }
        n
    }

    /// Copy node `n`, edges included. The copy has no outputs.
    pub fn clone_node(&mut self, n: Node) -> Node {
        let data = self.nodes[n].clone();
        self.add_node(data)
    }

    /// Number of nodes in both spaces.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.nodes.keys()
    }

    /// Is `n` a node of this graph?
    pub fn contains(&self, n: Node) -> bool {
        self.nodes.is_valid(n)
    }

    /// All fields of node `n`.
    pub fn data(&self, n: Node) -> &NodeData {
        &self.nodes[n]
    }

    /// The opcode of `n`.
    pub fn opcode(&self, n: Node) -> Opcode {
        self.nodes[n].opcode
    }

    /// What kind of node `n` is.
    pub fn kind(&self, n: Node) -> &NodeKind {
        &self.nodes[n].kind
    }

    /// The register kind of the value `n` produces.
    pub fn ideal_reg(&self, n: Node) -> Option<IdealReg> {
        self.nodes[n].ideal
    }

    /// The opcode-specific fields of `n`.
    pub fn payload(&self, n: Node) -> &Payload {
        &self.nodes[n].payload
    }

    /// Mutable access to the opcode-specific fields of `n`.
    pub fn payload_mut(&mut self, n: Node) -> &mut Payload {
        &mut self.nodes[n].payload
    }

    /// The machine instruction payload of `n`, if it is one.
    pub fn mach(&self, n: Node) -> Option<&MachInst> {
        match &self.nodes[n].kind {
            NodeKind::Mach(m) => Some(m),
            _ => None,
        }
    }

    /// Mutable access to the machine instruction payload of `n`.
    pub fn mach_mut(&mut self, n: Node) -> Option<&mut MachInst> {
        match &mut self.nodes[n].kind {
            NodeKind::Mach(m) => Some(m),
            _ => None,
        }
    }

    /// The machine projection payload of `n`, if it is one.
    pub fn mach_proj(&self, n: Node) -> Option<&MachProj> {
        match &self.nodes[n].kind {
            NodeKind::MachProj(p) => Some(p),
            _ => None,
        }
    }

    /// Mutable access to the machine projection payload of `n`.
    pub fn mach_proj_mut(&mut self, n: Node) -> Option<&mut MachProj> {
        match &mut self.nodes[n].kind {
            NodeKind::MachProj(p) => Some(p),
            _ => None,
        }
    }

    /// Number of required inputs of `n`, absent ones included.
    pub fn req(&self, n: Node) -> usize {
        self.nodes[n].inputs.len()
    }

    /// Required input `idx` of `n`. Out-of-range positions read as absent.
    pub fn input(&self, n: Node, idx: usize) -> Option<Node> {
        self.nodes[n].inputs.get(idx).and_then(|i| i.expand())
    }

    /// The required inputs of `n`.
    pub fn inputs(&self, n: Node) -> impl Iterator<Item = Option<Node>> + '_ {
        self.nodes[n].inputs.iter().map(|i| i.expand())
    }

    /// The precedence inputs of `n`.
    pub fn prec(&self, n: Node) -> &[Node] {
        &self.nodes[n].prec
    }

    /// The outputs of `n`, one entry per referencing slot.
    pub fn outs(&self, n: Node) -> &[Node] {
        &self.nodes[n].outs
    }

    /// Number of output edges of `n`.
    pub fn outcnt(&self, n: Node) -> usize {
        self.nodes[n].outs.len()
    }

    /// The only output of `n`, if it has exactly one output edge.
    pub fn unique_out(&self, n: Node) -> Option<Node> {
        match self.nodes[n].outs.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// The first slot of `n` that refers to `input`.
    pub fn find_edge(&self, n: Node, input: Node) -> Option<usize> {
        self.nodes[n]
            .inputs
            .iter()
            .position(|i| i.expand() == Some(input))
    }

    /// Append a required input.
    pub fn add_req(&mut self, n: Node, input: Option<Node>) {
        let data = &mut self.nodes[n];
        data.inputs.push(input.into());
        if let NodeKind::Mach(m) = &mut data.kind {
            m.in_classes.push(None);
        }
        if let Some(d) = input {
            self.add_out(d, n);
        }
    }

    /// Insert a required input at `idx`, shifting later inputs up.
    pub fn ins_req(&mut self, n: Node, idx: usize, input: Option<Node>) {
        let data = &mut self.nodes[n];
        data.inputs.insert(idx, input.into());
        if let NodeKind::Mach(m) = &mut data.kind {
            m.in_classes.insert(idx, None);
        }
        if let Some(d) = input {
            self.add_out(d, n);
        }
    }

    /// Replace required input `idx`.
    pub fn set_req(&mut self, n: Node, idx: usize, input: Option<Node>) {
        let old = self.nodes[n].inputs[idx].expand();
        if old == input {
            return;
        }
        self.nodes[n].inputs[idx] = input.into();
        if let Some(d) = old {
            self.del_out(d, n);
        }
        if let Some(d) = input {
            self.add_out(d, n);
        }
    }

    /// Remove required input `idx`, moving the last input into its place.
    pub fn del_req(&mut self, n: Node, idx: usize) {
        let data = &mut self.nodes[n];
        let old = data.inputs.swap_remove(idx).expand();
        if let NodeKind::Mach(m) = &mut data.kind {
            m.in_classes.swap_remove(idx);
        }
        if let Some(d) = old {
            self.del_out(d, n);
        }
    }

    /// Remove required input `idx`, shifting later inputs down.
    pub fn del_req_ordered(&mut self, n: Node, idx: usize) {
        let data = &mut self.nodes[n];
        let old = data.inputs.remove(idx).expand();
        if let NodeKind::Mach(m) = &mut data.kind {
            m.in_classes.remove(idx);
        }
        if let Some(d) = old {
            self.del_out(d, n);
        }
    }

    /// Add a precedence input, unless it is already present.
    pub fn add_prec(&mut self, n: Node, input: Node) {
        if self.nodes[n].prec.contains(&input) {
            return;
        }
        self.nodes[n].prec.push(input);
        self.add_out(input, n);
    }

    /// Remove a precedence input.
    pub fn rm_prec(&mut self, n: Node, input: Node) {
        let prec = &mut self.nodes[n].prec;
        if let Some(pos) = prec.iter().position(|&p| p == input) {
            prec.remove(pos);
            self.del_out(input, n);
        }
    }

    /// Retarget every input of `n` referring to `old` so it refers to `new`.
    ///
    /// Returns the number of edges changed.
    pub fn replace_edge(&mut self, n: Node, old: Node, new: Node) -> usize {
        if old == new {
            return 0;
        }
        let mut count = 0;
        for idx in 0..self.req(n) {
            if self.input(n, idx) == Some(old) {
                self.set_req(n, idx, Some(new));
                count += 1;
            }
        }
        if self.nodes[n].prec.contains(&old) {
            self.rm_prec(n, old);
            self.add_prec(n, new);
            count += 1;
        }
        count
    }

    /// Make every user of `old` in the same space use `new` instead.
    pub fn replace_all_uses(&mut self, old: Node, new: Node) {
        let mut users = OutsCursor::new(self, old);
        while let Some(user) = users.next(self) {
            self.replace_edge(user, old, new);
        }
    }

    /// Store the operand class catching input `idx` of machine node `n`.
    pub(crate) fn set_in_class(
        &mut self,
        n: Node,
        idx: usize,
        class: Option<crate::grammar::OperandClass>,
    ) {
        if let NodeKind::Mach(m) = &mut self.nodes[n].kind {
            m.in_classes[idx] = class;
        }
    }

    fn add_out(&mut self, def: Node, user: Node) {
        if self.is_new(def) == self.is_new(user) {
            self.nodes[def].outs.push(user);
        }
    }

    fn del_out(&mut self, def: Node, user: Node) {
        if self.is_new(def) != self.is_new(user) {
            return;
        }
        let outs = &mut self.nodes[def].outs;
        match outs.iter().position(|&u| u == user) {
            Some(pos) => {
                outs.remove(pos);
            }
            None => debug_assert!(false, "{user} missing from the outputs of {def}"),
        }
    }

    /// Start allocating new-space nodes. Every node added from now on is new.
    pub fn begin_new_space(&mut self) {
        self.watermark = Some(self.nodes.len() as u32);
    }

    /// Number of nodes added since [`Graph::begin_new_space`].
    pub fn num_new_nodes(&self) -> usize {
        self.watermark
            .map_or(0, |w| self.nodes.len().saturating_sub(w as usize))
    }

    /// Was `n` added after [`Graph::begin_new_space`]?
    pub fn is_new(&self, n: Node) -> bool {
        use crate::entity::EntityRef;
        self.watermark.is_some_and(|w| n.index() as u32 >= w)
    }

    /// Move the new space into a fresh graph, dropping the old space.
    ///
    /// Returns the new graph and the map from new-space nodes to their compacted numbers. Fails
    /// with [`CodegenError::GraphLost`] if a new node still refers to an old one.
    pub fn compact_new_space(&self) -> CodegenResult<(Self, NodeMap)> {
        use crate::entity::EntityRef;
        let Some(watermark) = self.watermark else {
            return Err(CodegenError::GraphLost);
        };
        let mut map = NodeMap::with_capacity(self.nodes.len());
        let mut next = 0;
        for n in self.nodes.keys().skip(watermark as usize) {
            map[n] = Node::new(next).into();
            next += 1;
        }
        let remap = |n: Node| -> CodegenResult<Node> {
            map[n].expand().ok_or(CodegenError::GraphLost)
        };

        let mut out = Self::new();
        for n in self.nodes.keys().skip(watermark as usize) {
            let data = &self.nodes[n];
            let inputs = data
                .inputs
                .iter()
                .map(|i| match i.expand() {
                    Some(d) => remap(d).map(PackedOption::from),
                    None => Ok(PackedOption::default()),
                })
                .collect::<CodegenResult<_>>()?;
            let prec = data
                .prec
                .iter()
                .map(|&p| remap(p))
                .collect::<CodegenResult<_>>()?;
            let outs = data
                .outs
                .iter()
                .map(|&u| remap(u))
                .collect::<CodegenResult<_>>()?;
            out.nodes.push(NodeData {
                opcode: data.opcode,
                kind: data.kind.clone(),
                inputs,
                prec,
                outs,
                ideal: data.ideal,
                payload: data.payload.clone(),
            });
        }
        Ok((out, map))
    }

    /// Write a one-line description of node `n`.
    pub fn display_node(&self, n: Node) -> DisplayNode<'_> {
        DisplayNode { graph: self, node: n }
    }
}

/// Displays one node of a graph.
pub struct DisplayNode<'a> {
    graph: &'a Graph,
    node: Node,
}

impl fmt::Display for DisplayNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let g = self.graph;
        let n = self.node;
        write!(f, "{n} = {}", g.opcode(n))?;
        match g.kind(n) {
            NodeKind::Ideal => {}
            NodeKind::Mach(m) => write!(f, "[{}]", m.rule)?,
            NodeKind::MachProj(p) => write!(f, "[#{} {}]", p.con, p.mask)?,
        }
        let payload = g.payload(n);
        if let Some(con) = payload.con {
            write!(f, " {con}")?;
        }
        if let Some(test) = payload.test {
            write!(f, " [{test}]")?;
        }
        if let Some(proj) = payload.proj {
            write!(f, " #{proj}")?;
        }
        let mut sep = " ";
        for input in g.inputs(n) {
            match input {
                Some(i) => write!(f, "{sep}{i}")?,
                None => write!(f, "{sep}_")?,
            }
            sep = ", ";
        }
        if !g.prec(n).is_empty() {
            f.write_str(" |")?;
            for p in g.prec(n) {
                write!(f, " {p}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for n in self.nodes() {
            writeln!(f, "{}", self.display_node(n))?;
        }
        Ok(())
    }
}

/// Iterates over the outputs of a node while they are being removed.
///
/// The cursor re-samples the output count at every step and steps back over entries deleted
/// since the last one, so no remaining output is skipped.
pub struct OutsCursor {
    node: Node,
    pos: usize,
    sampled: usize,
}

impl OutsCursor {
    /// Start iterating over the outputs of `node`.
    pub fn new(graph: &Graph, node: Node) -> Self {
        Self {
            node,
            pos: 0,
            sampled: graph.outcnt(node),
        }
    }

    /// The next output, after accounting for deletions.
    pub fn next(&mut self, graph: &Graph) -> Option<Node> {
        let cnt = graph.outcnt(self.node);
        if cnt < self.sampled {
            self.pos = self.pos.saturating_sub(self.sampled - cnt);
        }
        self.sampled = cnt;
        let user = graph.outs(self.node).get(self.pos).copied()?;
        self.pos += 1;
        Some(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::verify_def_use;
    use proptest::prelude::*;

    fn con(g: &mut Graph, v: i32) -> Node {
        g.add_node(NodeData::new(Opcode::ConI).with_payload(Payload {
            con: Some(ConstValue::Int(v)),
            ..Payload::default()
        }))
    }

    fn add(g: &mut Graph, a: Node, b: Node) -> Node {
        g.add_node(NodeData::new(Opcode::AddI).with_inputs(&[None, Some(a), Some(b)]))
    }

    #[test]
    fn edges_stay_symmetric() {
        let mut g = Graph::new();
        let a = con(&mut g, 1);
        let b = con(&mut g, 2);
        let s = add(&mut g, a, a);
        assert_eq!(g.outs(a), [s, s]);
        assert_eq!(g.unique_out(b), None);

        g.set_req(s, 2, Some(b));
        assert_eq!(g.outs(a), [s]);
        assert_eq!(g.unique_out(b), Some(s));

        g.add_req(s, Some(a));
        g.add_prec(s, b);
        g.add_prec(s, b);
        assert_eq!(g.prec(s), [b]);
        assert_eq!(g.outcnt(b), 2);

        g.del_req(s, 1);
        assert_eq!(g.input(s, 1), Some(a));
        assert_eq!(g.req(s), 3);
        g.del_req_ordered(s, 1);
        assert_eq!(g.input(s, 1), Some(b));
        g.ins_req(s, 1, Some(a));
        assert_eq!(g.find_edge(s, b), Some(2));
        g.rm_prec(s, b);
        assert!(verify_def_use(&g).is_ok());
    }

    #[test]
    fn verifier_reports_corruption() {
        let mut g = Graph::new();
        let a = con(&mut g, 1);
        let b = con(&mut g, 2);
        let s = add(&mut g, a, b);
        g.nodes[a].outs.push(s);
        g.nodes[b].outs.clear();
        let errors = verify_def_use(&g).unwrap_err();
        assert_eq!(errors.0.len(), 2);
        assert_eq!(errors.0[0].location, a);
        assert_eq!(errors.0[1].location, b);
    }

    #[test]
    fn replace_edge_counts_slots() {
        let mut g = Graph::new();
        let a = con(&mut g, 1);
        let b = con(&mut g, 2);
        let s = add(&mut g, a, a);
        g.add_prec(s, a);
        assert_eq!(g.replace_edge(s, a, b), 3);
        assert_eq!(g.outcnt(a), 0);
        assert_eq!(g.outcnt(b), 3);
        assert!(verify_def_use(&g).is_ok());
    }

    #[test]
    fn replace_all_uses_while_iterating() {
        let mut g = Graph::new();
        let a = con(&mut g, 1);
        let b = con(&mut g, 2);
        let users: Vec<_> = (0..5).map(|_| add(&mut g, a, b)).collect();
        let twice = add(&mut g, a, a);
        g.replace_all_uses(a, b);
        assert_eq!(g.outcnt(a), 0);
        for u in users {
            assert_eq!(g.input(u, 1), Some(b));
        }
        assert_eq!(g.input(twice, 2), Some(b));
        assert_eq!(g.outcnt(b), 12);
        assert!(verify_def_use(&g).is_ok());
    }

    #[test]
    fn cursor_steps_back_over_deletions() {
        let mut g = Graph::new();
        let a = con(&mut g, 1);
        let b = con(&mut g, 2);
        let users: Vec<_> = (0..4).map(|_| add(&mut g, a, b)).collect();
        let mut seen = Vec::new();
        let mut cursor = OutsCursor::new(&g, a);
        while let Some(u) = cursor.next(&g) {
            seen.push(u);
            if u == users[1] {
                g.set_req(u, 1, Some(b));
            }
        }
        assert_eq!(seen, users);
    }

    #[test]
    fn new_space_edges_are_pending() {
        let mut g = Graph::new();
        let a = con(&mut g, 1);
        let b = con(&mut g, 2);
        let old = add(&mut g, a, b);
        g.begin_new_space();
        let c = con(&mut g, 3);
        let new = add(&mut g, a, c);
        assert!(g.is_new(new) && !g.is_new(old));
        assert_eq!(g.outs(a), [old]);
        assert_eq!(g.outs(c), [new]);
        assert!(matches!(
            g.compact_new_space(),
            Err(CodegenError::GraphLost)
        ));

        g.set_req(new, 1, Some(c));
        assert_eq!(g.outs(a), [old]);
        let (out, map) = g.compact_new_space().unwrap();
        assert_eq!(out.num_nodes(), 2);
        let nc = map[c].unwrap();
        let nn = map[new].unwrap();
        assert_eq!(out.inputs(nn).collect::<Vec<_>>(), [None, Some(nc), Some(nc)]);
        assert_eq!(out.outs(nc), [nn, nn]);
        assert!(verify_def_use(&out).is_ok());
    }

    proptest! {
        #[test]
        fn random_edits_keep_def_use_symmetric(
            edits in proptest::collection::vec((0u8..6, 0usize..4, 0usize..6, 0usize..4), 0..60),
        ) {
            let mut g = Graph::new();
            let pool: Vec<Node> = (0..6).map(|v| con(&mut g, v)).collect();
            let users: Vec<Node> = (0..4).map(|i| add(&mut g, pool[i], pool[i + 1])).collect();
            for (kind, u, d, idx) in edits {
                let user = users[u];
                let def = pool[d];
                let req = g.req(user);
                match kind {
                    0 if req > 0 => g.set_req(user, idx % req, Some(def)),
                    1 => g.add_req(user, Some(def)),
                    2 if req > 0 => g.del_req(user, idx % req),
                    3 => g.add_prec(user, def),
                    4 => g.rm_prec(user, def),
                    5 => {
                        g.replace_edge(user, def, pool[(d + 1) % pool.len()]);
                    }
                    _ => {}
                }
            }
            prop_assert!(verify_def_use(&g).is_ok());
        }
    }
}
