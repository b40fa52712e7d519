//! Entity and reference types for the relational IR.
//!
//! Entities live in a single arena (see [`super::context::RhirContext`]) and are
//! addressed by opaque, dense integer references. Each reference is tagged with
//! the entity kind it is expected to point at; the arena validates the tag at
//! lookup time rather than trusting callers.

use std::fmt;

macro_rules! ref_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "%{}", self.0)
            }
        }
    };
}

ref_type!(SymbolRef);
ref_type!(DomainRef);
ref_type!(ProtocolRef);
ref_type!(InstanceRef);
ref_type!(BlockRef);
ref_type!(PredicateRef);
ref_type!(SetRef);
ref_type!(ControlFlowRef);
ref_type!(ProcessRef);
ref_type!(ModuleRef);

/// A domain element: either a plain symbol or an instance occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementRef {
    Symbol(SymbolRef),
    Instance(InstanceRef),
}

/// The destination of a transmission: a single instance or an entire domain (broadcast).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationRef {
    Instance(InstanceRef),
    Domain(DomainRef),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Domain {
    pub label: String,
    pub items: Vec<ElementRef>,
}

impl Domain {
    pub fn has_item(&self, item: ElementRef) -> bool {
        self.items.contains(&item)
    }
}

#[derive(Debug, Clone)]
pub struct Protocol {
    pub label: String,
    pub in_domain: Option<DomainRef>,
    pub out_domain: Option<DomainRef>,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub label: String,
    pub protocol: ProtocolRef,
    pub parameters: Vec<ElementRef>,
}

/// A single effect-block operation.
#[derive(Debug, Clone)]
pub enum Operation {
    ExternalAction(String),
    Transmission {
        destinations: Vec<DestinationRef>,
        message: SymbolRef,
    },
    SetAdd {
        target: SetRef,
        value: ElementRef,
    },
    SetDel {
        target: SetRef,
        value: ElementRef,
    },
}

/// An ordered sequence of operations. Carries no outgoing-edge information —
/// edges belong to the owning [`ControlFlow`] entity, not the block, so a
/// cyclic control-flow graph never needs a block to reference another block.
#[derive(Debug, Clone, Default)]
pub struct EffectBlock {
    pub operations: Vec<Operation>,
}

impl EffectBlock {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    Nondet,
    SetEmpty(SetRef),
    SetHas(SetRef, ElementRef),
    Receival(Vec<SymbolRef>),
    Conjunction(Vec<PredicateRef>),
}

#[derive(Debug, Clone)]
pub struct Set {
    pub label: String,
    pub domain: DomainRef,
}

/// A single outgoing control-flow edge.
#[derive(Debug, Clone)]
pub enum Edge {
    Unconditional(BlockRef),
    Conditional {
        target: BlockRef,
        alternative: BlockRef,
        condition: PredicateRef,
    },
}

impl Edge {
    /// Every block reachable directly from this edge's source.
    pub fn successors(&self) -> Vec<BlockRef> {
        match self {
            Edge::Unconditional(t) => vec![*t],
            Edge::Conditional {
                target,
                alternative,
                ..
            } => vec![*target, *alternative],
        }
    }
}

/// Per-process control-flow graph: a map from block to its single outgoing
/// edge, plus the reverse adjacency needed for the CF optimizer.
#[derive(Debug, Clone, Default)]
pub struct ControlFlow {
    edges: std::collections::HashMap<BlockRef, Edge>,
    reverse: std::collections::HashMap<BlockRef, Vec<BlockRef>>,
}

impl ControlFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge_from(&self, source: BlockRef) -> Option<&Edge> {
        self.edges.get(&source)
    }

    pub fn edges_to(&self, target: BlockRef) -> &[BlockRef] {
        self.reverse.get(&target).map_or(&[], |v| v.as_slice())
    }

    pub fn edges(&self) -> impl Iterator<Item = (&BlockRef, &Edge)> {
        self.edges.iter()
    }

    /// Installs `edge` as the outgoing edge of `source`, replacing any edge
    /// that previously existed there (callers are responsible for enforcing
    /// the "at most one outgoing edge" invariant before construction).
    pub fn set_edge(&mut self, source: BlockRef, edge: Edge) {
        if let Some(old) = self.edges.remove(&source) {
            for s in old.successors() {
                if let Some(preds) = self.reverse.get_mut(&s) {
                    preds.retain(|p| *p != source);
                }
            }
        }
        for s in edge.successors() {
            self.reverse.entry(s).or_default().push(source);
        }
        self.edges.insert(source, edge);
    }

    pub fn drop_edge(&mut self, source: BlockRef) {
        if let Some(old) = self.edges.remove(&source) {
            for s in old.successors() {
                if let Some(preds) = self.reverse.get_mut(&s) {
                    preds.retain(|p| *p != source);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Process {
    pub label: String,
    pub protocol: ProtocolRef,
    pub entry_block: BlockRef,
    pub control_flow: ControlFlowRef,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub processes: Vec<ProcessRef>,
    pub instances: Vec<InstanceRef>,
}

impl Module {
    pub fn find_process_for<'a>(
        &self,
        protocol: ProtocolRef,
        processes: impl Fn(ProcessRef) -> &'a Process,
    ) -> Option<ProcessRef> {
        self.processes
            .iter()
            .copied()
            .find(|&p| processes(p).protocol == protocol)
    }
}

/// Tagged union of every entity kind, as stored in the arena.
#[derive(Debug, Clone)]
pub enum Entity {
    Symbol(Symbol),
    Domain(Domain),
    Protocol(Protocol),
    Instance(Instance),
    EffectBlock(EffectBlock),
    Predicate(Predicate),
    Set(Set),
    ControlFlow(ControlFlow),
    Process(Process),
    Module(Module),
}

impl Entity {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Entity::Symbol(_) => "Symbol",
            Entity::Domain(_) => "Domain",
            Entity::Protocol(_) => "Protocol",
            Entity::Instance(_) => "Instance",
            Entity::EffectBlock(_) => "EffectBlock",
            Entity::Predicate(_) => "Predicate",
            Entity::Set(_) => "Set",
            Entity::ControlFlow(_) => "ControlFlow",
            Entity::Process(_) => "Process",
            Entity::Module(_) => "Module",
        }
    }
}
