//! Analyzer backend: plain lock/unlock synchronization (no trylock/rollback),
//! for consumption by static analyzers that over-approximate scheduling.
//! Two flavors share this lowering: userspace (pthread-backed macros) and
//! kernel (opaque harness-provided primitives).

use crate::cfir::{CfirModule, LabelId, MutexId};
use crate::codegen::{CBackend, Emitter};

pub struct AnalyzerBackend {
    pub userspace: bool,
}

impl CBackend for AnalyzerBackend {
    fn action_call(&self, action: &str, procedure: &str) -> String {
        format!("{action}(RH_PROC_{}, &payload);", procedure.to_uppercase())
    }

    fn return_stmt(&self) -> String {
        if self.userspace {
            "return NULL;".to_string()
        } else {
            "return __harness_NULL;".to_string()
        }
    }

    fn barrier_wait(&self) -> String {
        "init_barrier++; while (init_barrier < INIT_BARRIER_CAPACITY) {}".to_string()
    }

    fn random_call(&self, modulus: usize) -> String {
        format!("__harness_rand() % {modulus} == 0")
    }

    fn emit_synchronization(
        &self,
        e: &mut Emitter,
        lock: &[MutexId],
        unlock: &[MutexId],
        _rollback: Option<LabelId>,
    ) {
        let mut ascending = lock.to_vec();
        ascending.sort();
        for mtx in &ascending {
            e.write_line(format!("__harness_mutex_lock(&{mtx});"));
        }
        let mut descending = unlock.to_vec();
        descending.sort();
        descending.reverse();
        for mtx in &descending {
            e.write_line(format!("__harness_mutex_unlock(&{mtx});"));
        }
    }

    fn preamble(&self, _module: &CfirModule) -> String {
        if self.userspace {
            [
                "#include <pthread.h>",
                "#include <stdlib.h>",
                "#define __harness_NULL NULL",
                "typedef pthread_t __harness_thread_t;",
                "typedef pthread_mutex_t __harness_mutex_t;",
                "#define __harness_mutex_init(m) pthread_mutex_init(m, NULL)",
                "#define __harness_mutex_lock(m) pthread_mutex_lock(m)",
                "#define __harness_mutex_unlock(m) pthread_mutex_unlock(m)",
                "#define __harness_thread_create(t, f) pthread_create(t, NULL, f, NULL)",
                "#define __harness_thread_join(t) pthread_join(t, NULL)",
                "#define __harness_rand() random()",
                "",
            ]
            .join("\n")
        } else {
            [
                "#define __harness_NULL ((void*)0)",
                "typedef unsigned int __harness_thread_t;",
                "typedef unsigned int __harness_mutex_t;",
                "extern void __harness_mutex_init(__harness_mutex_t *);",
                "extern void __harness_mutex_lock(__harness_mutex_t *);",
                "extern void __harness_mutex_unlock(__harness_mutex_t *);",
                "extern void __harness_thread_create(__harness_thread_t *, void *(*)(void *));",
                "extern void __harness_thread_join(__harness_thread_t);",
                "extern unsigned int __harness_rand(void);",
                "",
            ]
            .join("\n")
        }
    }

    fn declare_mutex(&self, id: MutexId) -> String {
        format!("static __harness_mutex_t {id};")
    }

    fn declare_barrier(&self, num_procedures: usize) -> String {
        format!(
            "static _Atomic unsigned int init_barrier = 0;\n#define INIT_BARRIER_CAPACITY {num_procedures}"
        )
    }

    fn thread_fn_signature(&self, name: &str) -> String {
        format!("static void *{name}(void *arg)")
    }

    fn payload_decl(&self) -> String {
        if self.userspace {
            "void *payload = NULL;".to_string()
        } else {
            "void *payload = __harness_NULL;".to_string()
        }
    }

    fn main_fn(&self, module: &CfirModule) -> String {
        let mut e = Emitter::new();
        e.write_line("int main(void) {");
        e.indent();
        for mutex in module.mutexes() {
            e.write_line(format!("__harness_mutex_init(&{mutex});"));
        }
        let names: Vec<&str> = module.procedures().map(|(n, _)| n).collect();
        for name in &names {
            e.write_line(format!("__harness_thread_t t_{name};"));
            e.write_line(format!("__harness_thread_create(&t_{name}, {name});"));
        }
        for name in &names {
            e.write_line(format!("__harness_thread_join(t_{name});"));
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
    fn userspace_and_kernel_lower_plain_lock_unlock() {
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
        for userspace in [true, false] {
            let text = codegen_module(&module, &AnalyzerBackend { userspace });
            assert!(text.contains("__harness_mutex_lock"));
            assert!(!text.contains("trylock"));
        }
    }

    #[test]
    fn kernel_variant_uses_opaque_null() {
        let mut module = CfirModule::new();
        module.add_procedure("p", CfNode::Return);
        let text = codegen_module(&module, &AnalyzerBackend { userspace: false });
        assert!(text.contains("__harness_NULL"));
        assert!(text.contains("void *payload = __harness_NULL;"));
    }

    #[test]
    fn action_call_is_tagged_with_the_owning_procedure_not_the_action() {
        let mut module = CfirModule::new();
        module.add_procedure("receiver", CfNode::Statement("recv_ping".to_string()));
        let text = codegen_module(&module, &AnalyzerBackend { userspace: true });
        assert!(text.contains("recv_ping(RH_PROC_RECEIVER, &payload);"));
        assert!(!text.contains("RH_PROC_RECV_PING"));
    }
}
