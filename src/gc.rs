//! Collector-specific matcher hooks.
//!
//! Garbage collectors that emit barriers inside machine instructions need a say in how trees are
//! partitioned and what barrier data an instruction carries. The collector is picked once per
//! environment through [`CollectorKind`]; the matcher only ever talks to the resulting
//! [`GcMatcherHooks`] trait object.

use crate::ir::slots::mem;
use crate::ir::{Graph, Node, NodeData, Opcode};
use crate::settings::SetError;
use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

/// The garbage collector generated code runs under.
#[derive(serde_derive::Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CollectorKind {
    /// Single-threaded generational collector.
    #[default]
    Serial,
    /// Throughput collector.
    Parallel,
    /// Region-based collector with card-marking store barriers.
    G1,
    /// No-op collector.
    Epsilon,
    /// Concurrent collector with colored-pointer load barriers.
    Z,
    /// Concurrent collector with forwarding load barriers.
    Shenandoah,
}

impl CollectorKind {
    /// The matcher hooks of this collector.
    pub fn hooks(self) -> Arc<dyn GcMatcherHooks> {
        match self {
            Self::Serial | Self::Parallel | Self::Epsilon => Arc::new(NoBarrierHooks),
            Self::G1 => Arc::new(StoreBarrierHooks),
            Self::Z | Self::Shenandoah => Arc::new(LoadBarrierHooks),
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Serial => "serial",
            Self::Parallel => "parallel",
            Self::G1 => "g1",
            Self::Epsilon => "epsilon",
            Self::Z => "z",
            Self::Shenandoah => "shenandoah",
        })
    }
}

impl FromStr for CollectorKind {
    type Err = SetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Self::Serial),
            "parallel" => Ok(Self::Parallel),
            "g1" => Ok(Self::G1),
            "epsilon" => Ok(Self::Epsilon),
            "z" => Ok(Self::Z),
            "shenandoah" => Ok(Self::Shenandoah),
            _ => Err(SetError::BadValue(
                "one of serial, parallel, g1, epsilon, z, shenandoah".to_string(),
            )),
        }
    }
}

/// Hooks a collector can install into tree partitioning and instruction building.
pub trait GcMatcherHooks: Send + Sync + fmt::Debug {
    /// Must `n` be the root of its own match tree?
    fn must_be_root(&self, _graph: &Graph, _n: Node) -> bool {
        false
    }

    /// Reshape `n` after its inputs were partitioned.
    ///
    /// Returns true if the collector handled the node, which skips the generic reshaping.
    fn find_shared_post_visit(&self, _graph: &mut Graph, _n: Node) -> bool {
        false
    }

    /// Barrier data for the machine node built from memory access `leaf`.
    fn barrier_data(&self, graph: &Graph, leaf: Node) -> u8 {
        graph.payload(leaf).mem.map_or(0, |m| m.barrier)
    }
}

/// Collectors without barriers in machine code.
#[derive(Debug, Default)]
pub struct NoBarrierHooks;

impl GcMatcherHooks for NoBarrierHooks {
    fn barrier_data(&self, _graph: &Graph, _leaf: Node) -> u8 {
        0
    }
}

/// Collectors whose barriers follow stores and leave matching alone.
#[derive(Debug, Default)]
pub struct StoreBarrierHooks;

impl GcMatcherHooks for StoreBarrierHooks {}

/// Collectors that barrier pointer loads and atomics inside the instruction.
#[derive(Debug, Default)]
pub struct LoadBarrierHooks;

fn has_barrier(graph: &Graph, n: Node) -> bool {
    graph.payload(n).mem.is_some_and(|m| m.barrier != 0)
}

impl GcMatcherHooks for LoadBarrierHooks {
    fn must_be_root(&self, graph: &Graph, n: Node) -> bool {
        matches!(graph.opcode(n), Opcode::LoadP | Opcode::LoadN) && has_barrier(graph, n)
    }

    fn find_shared_post_visit(&self, graph: &mut Graph, n: Node) -> bool {
        if !graph.opcode(n).is_cas() || !has_barrier(graph, n) {
            return false;
        }
        let new_val = graph.input(n, mem::VALUE_IN);
        let expected = graph.input(n, mem::EXPECTED_IN);
        let pair = graph.add_node(NodeData::new(Opcode::Binary).with_inputs(&[
            None,
            expected,
            new_val,
        ]));
        graph.set_req(n, mem::VALUE_IN, Some(pair));
        graph.del_req(n, mem::EXPECTED_IN);
        true
    }
}
