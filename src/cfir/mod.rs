//! Locked control-flow IR: a structured tree per procedure, annotated with the
//! mutex acquire/release sites synthesized from mutual exclusion.

pub mod constructor;

use std::collections::HashMap;
use std::fmt;

pub use constructor::CfirConstructor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutexId(pub u32);

impl fmt::Display for MutexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mtx{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum CfNode {
    Statement(String),
    Sequence(Vec<CfNode>),
    Branch(Vec<CfNode>),
    Synchronization {
        lock: Vec<MutexId>,
        unlock: Vec<MutexId>,
        rollback: Option<LabelId>,
    },
    Labelled(LabelId, Box<CfNode>),
    Goto(LabelId),
    Return,
    InitBarrier,
}

/// A module's procedure table plus its declared interface (instance and
/// external-action names), mirroring the structured-interface pattern used by
/// the rest of the pipeline's C backends.
#[derive(Debug, Clone, Default)]
pub struct CfirModule {
    procedures: HashMap<String, CfNode>,
    procedure_order: Vec<String>,
    instances: Vec<String>,
    external_actions: Vec<String>,
    next_mutex: u32,
    next_label: u32,
}

impl CfirModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_mutex(&mut self) -> MutexId {
        let id = MutexId(self.next_mutex);
        self.next_mutex += 1;
        id
    }

    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        id
    }

    pub fn mutexes(&self) -> impl Iterator<Item = MutexId> {
        (0..self.next_mutex).map(MutexId)
    }

    pub fn declare_instance(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.instances.contains(&name) {
            self.instances.push(name);
        }
    }

    pub fn declare_external_action(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.external_actions.contains(&name) {
            self.external_actions.push(name);
        }
    }

    pub fn add_procedure(&mut self, name: impl Into<String>, body: CfNode) {
        let name = name.into();
        if !self.procedures.contains_key(&name) {
            self.procedure_order.push(name.clone());
        }
        self.procedures.insert(name, body);
    }

    pub fn procedures(&self) -> impl Iterator<Item = (&str, &CfNode)> {
        self.procedure_order
            .iter()
            .map(move |name| (name.as_str(), &self.procedures[name]))
    }

    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    pub fn external_actions(&self) -> &[String] {
        &self.external_actions
    }
}
