//! Executable backend: trylock + rollback synchronization, suitable for
//! actually running the race harness as a standalone program.

use crate::cfir::{CfirModule, LabelId, MutexId};
use crate::codegen::{CBackend, Emitter};

pub struct ExecutableBackend;

impl CBackend for ExecutableBackend {
    fn action_call(&self, action: &str, procedure: &str) -> String {
        format!("{action}(RH_PROC_{}, &payload);", procedure.to_uppercase())
    }

    fn return_stmt(&self) -> String {
        "return NULL;".to_string()
    }

    fn barrier_wait(&self) -> String {
        "pthread_barrier_wait(&init_barrier);".to_string()
    }

    fn random_call(&self, modulus: usize) -> String {
        format!("rand() % {modulus} == 0")
    }

    fn emit_synchronization(
        &self,
        e: &mut Emitter,
        lock: &[MutexId],
        unlock: &[MutexId],
        rollback: Option<LabelId>,
    ) {
        let mut ascending_locks = lock.to_vec();
        ascending_locks.sort();
        let mut descending_unlocks = unlock.to_vec();
        descending_unlocks.sort();
        descending_unlocks.reverse();

        match rollback {
            Some(label) => {
                for (i, mtx) in ascending_locks.iter().enumerate() {
                    e.write_line(format!("if (pthread_mutex_trylock(&{mtx})) {{"));
                    e.indent();
                    for prior in ascending_locks[..i].iter().rev() {
                        e.write_line(format!("pthread_mutex_unlock(&{prior});"));
                    }
                    e.write_line(format!("goto {label};"));
                    e.dedent();
                    e.write_line("}");
                }
            }
            None => {
                e.write_line("for (;;) {");
                e.indent();
                for (i, mtx) in ascending_locks.iter().enumerate() {
                    e.write_line(format!("if (pthread_mutex_trylock(&{mtx})) {{"));
                    e.indent();
                    for prior in ascending_locks[..i].iter().rev() {
                        e.write_line(format!("pthread_mutex_unlock(&{prior});"));
                    }
                    e.write_line("continue;");
                    e.dedent();
                    e.write_line("}");
                }
                e.write_line("break;");
                e.dedent();
                e.write_line("}");
            }
        }

        for mtx in &descending_unlocks {
            e.write_line(format!("pthread_mutex_unlock(&{mtx});"));
        }
    }

    fn preamble(&self, _module: &CfirModule) -> String {
        "#include <stdlib.h>\n#include <stdio.h>\n#include <pthread.h>\n".to_string()
    }

    fn declare_mutex(&self, id: MutexId) -> String {
        format!("static pthread_mutex_t {id} = PTHREAD_MUTEX_INITIALIZER;")
    }

    fn declare_barrier(&self, _num_procedures: usize) -> String {
        "static pthread_barrier_t init_barrier;".to_string()
    }

    fn thread_fn_signature(&self, name: &str) -> String {
        format!("static void *{name}(void *arg)")
    }

    fn payload_decl(&self) -> String {
        "void *payload = NULL;".to_string()
    }

    fn main_fn(&self, module: &CfirModule) -> String {
        let mut e = Emitter::new();
        e.write_line("int main(void) {");
        e.indent();
        e.write_line(format!(
            "pthread_barrier_init(&init_barrier, NULL, {});",
            module.procedures().count()
        ));
        let names: Vec<&str> = module.procedures().map(|(n, _)| n).collect();
        for name in &names {
            e.write_line(format!("pthread_t t_{name};"));
            e.write_line(format!("pthread_create(&t_{name}, NULL, {name}, NULL);"));
        }
        for name in &names {
            e.write_line(format!("pthread_join(t_{name}, NULL);"));
        }
        e.write_line("return 0;");
        e.dedent();
        e.write_line("}");
        e.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfir::CfNode;
    use crate::codegen::codegen_module;

    #[test]
    fn generates_trylock_chain_with_rollback() {
        let mut module = CfirModule::new();
        let m0 = module.new_mutex();
        let label = module.new_label();
        module.add_procedure(
            "p",
            CfNode::Sequence(vec![
                CfNode::Synchronization {
                    lock: vec![m0],
                    unlock: vec![],
                    rollback: Some(label),
                },
                CfNode::Return,
            ]),
        );
        let text = codegen_module(&module, &ExecutableBackend);
        assert!(text.contains("pthread_mutex_trylock"));
        assert!(text.contains("goto label"));
    }

    #[test]
    fn retry_loop_used_when_rollback_absent() {
        let mut module = CfirModule::new();
        let m0 = module.new_mutex();
        module.add_procedure(
            "p",
            CfNode::Sequence(vec![
                CfNode::Synchronization {
                    lock: vec![m0],
                    unlock: vec![],
                    rollback: None,
                },
                CfNode::Return,
            ]),
        );
        let text = codegen_module(&module, &ExecutableBackend);
        assert!(text.contains("for (;;)"));
        assert!(text.contains("continue;"));
    }

    #[test]
    fn action_call_is_tagged_with_the_owning_procedure_not_the_action() {
        let mut module = CfirModule::new();
        module.add_procedure("sender", CfNode::Statement("recv_ping".to_string()));
        let text = codegen_module(&module, &ExecutableBackend);
        assert!(text.contains("recv_ping(RH_PROC_SENDER, &payload);"));
        assert!(!text.contains("RH_PROC_RECV_PING"));
    }

    #[test]
    fn procedure_body_declares_the_payload_local() {
        let mut module = CfirModule::new();
        module.add_procedure("p", CfNode::Return);
        let text = codegen_module(&module, &ExecutableBackend);
        assert!(text.contains("void *payload = NULL;"));
    }
}
