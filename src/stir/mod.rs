//! Symbolic state-transition IR: the product state machine consumed by the
//! external model checker.

pub mod serialize;
pub mod translator;

use std::fmt;

/// Opaque state-transition node. Distinct from RHIR block references — a node
/// is minted once per (instance, block) pair observed during translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StNodeId(pub u32);

impl fmt::Display for StNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}", self.0)
    }
}

/// Opaque state slot. Two flavors: integer-valued and node-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StSlotId(pub u32);

impl fmt::Display for StSlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StSlot {
    Int { initial: i64 },
    Node { initial: StNodeId },
}

/// Ordered table of slots; slot IDs are assigned densely in allocation order.
#[derive(Debug, Clone, Default)]
pub struct StState {
    slots: Vec<StSlot>,
}

impl StState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_int_slot(&mut self, initial: i64) -> StSlotId {
        let id = StSlotId(self.slots.len() as u32);
        self.slots.push(StSlot::Int { initial });
        id
    }

    pub fn new_node_slot(&mut self, initial: StNodeId) -> StSlotId {
        let id = StSlotId(self.slots.len() as u32);
        self.slots.push(StSlot::Node { initial });
        id
    }

    pub fn get(&self, id: StSlotId) -> Option<&StSlot> {
        self.slots.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StSlotId, &StSlot)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (StSlotId(i as u32), s))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StGuard {
    Int { slot: StSlotId, value: i64 },
}

#[derive(Debug, Clone)]
pub enum StInstruction {
    Do { action: String },
    SetInt { slot: StSlotId, value: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StTransitionId(pub u32);

#[derive(Debug, Clone)]
pub struct StTransition {
    pub node_slot: StSlotId,
    pub source: StNodeId,
    pub target: StNodeId,
    pub invert_guard: bool,
    pub guards: Vec<StGuard>,
    pub instructions: Vec<StInstruction>,
}

impl StTransition {
    pub fn new(node_slot: StSlotId, source: StNodeId, target: StNodeId, invert_guard: bool) -> Self {
        StTransition {
            node_slot,
            source,
            target,
            invert_guard,
            guards: Vec::new(),
            instructions: Vec::new(),
        }
    }

    pub fn add_guard(&mut self, guard: StGuard) {
        self.guards.push(guard);
    }

    pub fn add_instruction(&mut self, instruction: StInstruction) {
        self.instructions.push(instruction);
    }

    pub fn set_int_instructions(&self) -> impl Iterator<Item = (StSlotId, i64)> + '_ {
        self.instructions.iter().filter_map(|i| match i {
            StInstruction::SetInt { slot, value } => Some((*slot, *value)),
            StInstruction::Do { .. } => None,
        })
    }
}

/// The full state-transition module: the node set (implicit in `state`'s node
/// slots plus every node referenced by a transition), the transition list,
/// and the product state.
#[derive(Debug, Clone, Default)]
pub struct StModule {
    pub state: StState,
    pub transitions: Vec<StTransition>,
    next_node: u32,
}

impl StModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_node(&mut self) -> StNodeId {
        let id = StNodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn new_transition(&mut self, transition: StTransition) -> StTransitionId {
        let id = StTransitionId(self.transitions.len() as u32);
        self.transitions.push(transition);
        id
    }

    pub fn get_transition(&self, id: StTransitionId) -> Option<&StTransition> {
        self.transitions.get(id.0 as usize)
    }
}
