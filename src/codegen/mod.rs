//! C code generation shared across every CFIR-consuming backend.
//!
//! The original emitter is a generator that yields indent deltas, inline
//! markers, and text chunks; this is re-expressed as an [`Emitter`] with
//! explicit `write_line`/`inline`/`indent`/`dedent` operations.

pub mod analyzer;
pub mod executable;
pub mod header;
pub mod stir_exec;

use crate::cfir::{CfNode, CfirModule, LabelId, MutexId};

/// A minimal structured text emitter: two-space indentation, explicit
/// indent/dedent, and an `inline` escape hatch for continuing the current
/// line (used for `label: ` prefixes).
#[derive(Default)]
pub struct Emitter {
    buf: String,
    indent: usize,
    at_line_start: bool,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            buf: String::new(),
            indent: 0,
            at_line_start: true,
        }
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Writes `text` at the current indent and terminates with a newline.
    pub fn write_line(&mut self, text: impl AsRef<str>) {
        self.pad();
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
        self.at_line_start = true;
    }

    /// Writes `text` with no trailing newline and no leading indent, so a
    /// following `write_line`/`inline` continues the same physical line.
    pub fn inline(&mut self, text: impl AsRef<str>) {
        self.pad();
        self.buf.push_str(text.as_ref());
        self.at_line_start = false;
    }

    fn pad(&mut self) {
        if self.at_line_start {
            for _ in 0..self.indent {
                self.buf.push_str("  ");
            }
        }
    }

    /// Terminates the current line without padding — used after `inline`
    /// calls that already wrote an opening brace.
    pub fn end_line(&mut self) {
        self.buf.push('\n');
        self.at_line_start = true;
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Per-backend C lowering hooks. The structural walk (sequence/branch/label/
/// goto/return) is shared; only statement text, lock primitives, and the
/// procedure/file preamble vary per backend.
pub trait CBackend {
    /// `procedure` is the name of the owning instance/procedure, passed as
    /// the `RH_PROC_*` enum value an action call reports itself under.
    fn action_call(&self, action: &str, procedure: &str) -> String;
    fn return_stmt(&self) -> String;
    fn barrier_wait(&self) -> String;
    fn random_call(&self, modulus: usize) -> String;

    /// Emits a synchronization node. Backends differ enough here (trylock
    /// chains with rollback vs. plain lock/unlock) that this is not shared.
    fn emit_synchronization(
        &self,
        e: &mut Emitter,
        lock: &[MutexId],
        unlock: &[MutexId],
        rollback: Option<LabelId>,
    );

    fn preamble(&self, module: &CfirModule) -> String;
    fn declare_mutex(&self, id: MutexId) -> String;
    fn declare_barrier(&self, num_procedures: usize) -> String;
    fn thread_fn_signature(&self, name: &str) -> String;
    /// Declares the payload local every `action_call` dereferences.
    fn payload_decl(&self) -> String;
    fn main_fn(&self, module: &CfirModule) -> String;
}

pub fn lower_node(e: &mut Emitter, node: &CfNode, backend: &dyn CBackend, procedure: &str) {
    match node {
        CfNode::Statement(action) => e.write_line(backend.action_call(action, procedure)),
        CfNode::Sequence(children) => {
            for child in children {
                lower_node(e, child, backend, procedure);
            }
        }
        CfNode::Branch(branches) => {
            let n = branches.len();
            for (i, branch) in branches.iter().enumerate() {
                let remaining = n - i;
                let header = if i == 0 {
                    format!("if ({}) {{", backend.random_call(remaining))
                } else if i + 1 < n {
                    format!("}} else if ({}) {{", backend.random_call(remaining))
                } else {
                    "} else {".to_string()
                };
                e.inline(header);
                e.end_line();
                e.indent();
                lower_node(e, branch, backend, procedure);
                e.dedent();
            }
            e.write_line("}");
        }
        CfNode::Synchronization {
            lock,
            unlock,
            rollback,
        } => backend.emit_synchronization(e, lock, unlock, *rollback),
        CfNode::Labelled(label, inner) => {
            e.inline(format!("{label}: "));
            lower_node(e, inner, backend, procedure);
        }
        CfNode::Goto(label) => e.write_line(format!("goto {label};")),
        CfNode::Return => e.write_line(backend.return_stmt()),
        CfNode::InitBarrier => e.write_line(backend.barrier_wait()),
    }
}

pub fn codegen_module(module: &CfirModule, backend: &dyn CBackend) -> String {
    let mut e = Emitter::new();
    e.write_line(backend.preamble(module));
    for mutex in module.mutexes() {
        e.write_line(backend.declare_mutex(mutex));
    }
    e.write_line(backend.declare_barrier(module.procedures().count()));
    e.write_line("");

    for (name, body) in module.procedures() {
        e.write_line(backend.thread_fn_signature(name));
        e.write_line("{");
        e.indent();
        e.write_line("(void)arg;");
        e.write_line(backend.payload_decl());
        lower_node(&mut e, body, backend, name);
        e.dedent();
        e.write_line("}");
        e.write_line("");
    }

    e.write_line(backend.main_fn(module));
    e.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_inline_continues_the_same_line() {
        let mut e = Emitter::new();
        e.inline("label0: ");
        e.write_line("goto label1;");
        assert_eq!(e.into_string(), "label0: goto label1;\n");
    }

    #[test]
    fn emitter_indent_applies_to_new_lines_only() {
        let mut e = Emitter::new();
        e.write_line("{");
        e.indent();
        e.write_line("x();");
        e.dedent();
        e.write_line("}");
        assert_eq!(e.into_string(), "{\n  x();\n}\n");
    }
}
