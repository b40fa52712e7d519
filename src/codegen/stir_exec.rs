//! Direct STIR -> C backend: skips CFIR and mutex synthesis entirely. Spawns
//! one OS thread per transition; each thread loops trying a single atomic
//! compare-and-swap of a packed state struct. Exists so the checker's own
//! reachability relation can be exercised directly against the unlocked state
//! machine, e.g. for differential testing against the locked backends.
//!
//! Open design decision (the reference implementation fires `do` actions
//! unconditionally after the CAS attempt, even when it fails): here actions
//! only fire once the CAS has actually committed the transition, since firing
//! an observable effect for a transition that never took effect would be
//! incorrect.

use crate::stir::{StGuard, StInstruction, StModule, StSlot};

pub fn generate(module: &StModule) -> String {
    let mut out = String::new();
    out.push_str("#include <stdatomic.h>\n#include <pthread.h>\n#include <stdio.h>\n\n");

    out.push_str(&format!(
        "struct State {{\n  int slots[{}];\n}};\n\n",
        module.state.len().max(1)
    ));

    let initials: Vec<String> = module
        .state
        .iter()
        .map(|(_, slot)| match slot {
            StSlot::Int { initial } => initial.to_string(),
            StSlot::Node { initial } => initial.0.to_string(),
        })
        .collect();
    out.push_str(&format!(
        "static _Atomic struct State state = {{ .slots = {{{}}} }};\n\n",
        initials.join(", ")
    ));

    for (idx, t) in module.transitions.iter().enumerate() {
        out.push_str(&format!("static void *transition{idx}(void *arg) {{\n"));
        out.push_str("  (void)arg;\n");
        out.push_str("  for (;;) {\n");
        out.push_str("    struct State current_state = atomic_load(&state);\n");
        out.push_str("    struct State next_state = current_state;\n");
        out.push_str(&format!(
            "    int source_ok = current_state.slots[{}] == {};\n",
            t.node_slot, t.source.0
        ));
        out.push_str("    int guard_ok = 1;\n");
        for guard in &t.guards {
            let StGuard::Int { slot, value } = guard;
            out.push_str(&format!(
                "    guard_ok = guard_ok && (current_state.slots[{slot}] == {value});\n"
            ));
        }
        let cond = if t.invert_guard { "!guard_ok" } else { "guard_ok" };
        out.push_str(&format!("    if (!(source_ok && {cond})) continue;\n"));
        out.push_str(&format!(
            "    next_state.slots[{}] = {};\n",
            t.node_slot, t.target.0
        ));
        for instr in &t.instructions {
            if let StInstruction::SetInt { slot, value } = instr {
                out.push_str(&format!("    next_state.slots[{slot}] = {value};\n"));
            }
        }
        out.push_str(
            "    if (atomic_compare_exchange_strong(&state, &current_state, next_state)) {\n",
        );
        for instr in &t.instructions {
            if let StInstruction::Do { action } = instr {
                out.push_str(&format!("      printf(\"{action}\\n\");\n"));
            }
        }
        out.push_str("    }\n");
        out.push_str("  }\n");
        out.push_str("  return NULL;\n}\n\n");
    }

    out.push_str("int main(void) {\n");
    for idx in 0..module.transitions.len() {
        out.push_str(&format!("  pthread_t t{idx};\n"));
        out.push_str(&format!(
            "  pthread_create(&t{idx}, NULL, transition{idx}, NULL);\n"
        ));
    }
    for idx in 0..module.transitions.len() {
        out.push_str(&format!("  pthread_join(t{idx}, NULL);\n"));
    }
    out.push_str("  return 0;\n}\n");
    out
}
