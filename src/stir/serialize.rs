//! Plain-text STIR serializer consumed by the external model checker.
//!
//! Field order and the instruction count follow the real reference
//! serializer: only `set_int` instructions are counted and emitted per
//! transition. External-action (`do`) instructions are carried in memory for
//! debugging and codegen, but are not part of the state-space encoding the
//! checker reasons about — an external action is an observable effect, not a
//! state transition, so it would be meaningless to the checker either way.

use std::fmt::Write as _;

use crate::stir::{StGuard, StModule, StSlot};

pub fn serialize_module(module: &StModule) -> String {
    let mut out = String::new();
    serialize_state(&mut out, module);
    serialize_transitions(&mut out, module);
    out
}

fn serialize_state(out: &mut String, module: &StModule) {
    writeln!(out, "state {}", module.state.len()).unwrap();
    for (id, slot) in module.state.iter() {
        match slot {
            StSlot::Int { initial } => writeln!(out, "slot {} int {initial}", id.0).unwrap(),
            StSlot::Node { initial } => writeln!(out, "slot {} node {}", id.0, initial.0).unwrap(),
        }
    }
}

fn serialize_transitions(out: &mut String, module: &StModule) {
    writeln!(out, "transitions {}", module.transitions.len()).unwrap();
    for (idx, t) in module.transitions.iter().enumerate() {
        let num_instructions = t.set_int_instructions().count();
        writeln!(
            out,
            "transition {idx} component {} src {} dst {} guards {} {} instructions {num_instructions}",
            t.node_slot.0,
            t.source.0,
            t.target.0,
            t.guards.len(),
            u8::from(t.invert_guard),
        )
        .unwrap();
        for guard in &t.guards {
            let StGuard::Int { slot, value } = guard;
            writeln!(out, "int_guard {} {value}", slot.0).unwrap();
        }
        for (slot, value) in t.set_int_instructions() {
            writeln!(out, "set_int_instr {} {value}", slot.0).unwrap();
        }
    }
}
