//! Builds a [`CfirModule`] from an RHIR module plus its mutual-exclusion
//! relation: allocates one mutex per mutually-exclusive (instance,block) pair
//! and lowers every instance's control-flow graph to a structured tree.

use std::collections::HashMap;

use crate::cfir::{CfNode, CfirModule, LabelId, MutexId};
use crate::error::CompileResult;
use crate::mutex::{MutualExclusion, StatePoint};
use crate::rhir::{BlockRef, Edge, InstanceRef, ModuleRef, RhirContext};

pub struct CfirConstructor<'a> {
    ctx: &'a RhirContext,
    module_ref: ModuleRef,
    exclusion: MutualExclusion<'a>,
    mutexes: HashMap<(StatePoint, StatePoint), MutexId>,
}

impl<'a> CfirConstructor<'a> {
    pub fn new(ctx: &'a RhirContext, module_ref: ModuleRef, exclusion: MutualExclusion<'a>) -> Self {
        CfirConstructor {
            ctx,
            module_ref,
            exclusion,
            mutexes: HashMap::new(),
        }
    }

    pub fn construct(mut self) -> CompileResult<CfirModule> {
        let mut out = CfirModule::new();
        let module = self.ctx.get_module(self.module_ref)?.clone();
        for &instance in &module.instances {
            self.construct_instance(&mut out, instance)?;
        }
        Ok(out)
    }

    fn construct_instance(&mut self, out: &mut CfirModule, instance: InstanceRef) -> CompileResult<()> {
        let inst = self.ctx.get_instance(instance)?.clone();
        let process_ref = self
            .ctx
            .find_process_for(self.module_ref, inst.protocol)?
            .ok_or_else(|| {
                crate::error::CompileError::Structural(format!(
                    "no process implements the protocol of instance {instance}"
                ))
            })?;
        let process = self.ctx.get_process(process_ref)?.clone();

        out.declare_instance(inst.label.clone());

        let mut memo: HashMap<BlockRef, LabelId> = HashMap::new();
        let mut top_level = Vec::new();
        let entry_label = self.construct_block(
            out,
            instance,
            process.control_flow,
            process.entry_block,
            &mut memo,
            &mut top_level,
        )?;

        let prologue_sync = self.synchronization(&[], instance, process.entry_block, None, out)?;

        let mut body = vec![prologue_sync, CfNode::InitBarrier, CfNode::Goto(entry_label)];
        body.extend(top_level);

        out.add_procedure(inst.label, CfNode::Sequence(body));
        Ok(())
    }

    fn required_locks(
        &mut self,
        out: &mut CfirModule,
        instance: InstanceRef,
        block: BlockRef,
    ) -> CompileResult<Vec<MutexId>> {
        let point: StatePoint = (instance, block);
        let exclusive = self.exclusion.all_exclusive(point)?;
        let mut locks = Vec::new();
        for other in exclusive {
            let (a, b) = if point <= other {
                (point, other)
            } else {
                (other, point)
            };
            let id = *self.mutexes.entry((a, b)).or_insert_with(|| out.new_mutex());
            if !locks.contains(&id) {
                locks.push(id);
            }
        }
        locks.sort();
        Ok(locks)
    }

    fn synchronization(
        &mut self,
        current: &[MutexId],
        instance: InstanceRef,
        target_block: BlockRef,
        rollback: Option<LabelId>,
        out: &mut CfirModule,
    ) -> CompileResult<CfNode> {
        let required = self.required_locks(out, instance, target_block)?;
        let lock: Vec<MutexId> = required.iter().copied().filter(|m| !current.contains(m)).collect();
        let unlock: Vec<MutexId> = current.iter().copied().filter(|m| !required.contains(m)).collect();
        Ok(CfNode::Synchronization {
            lock,
            unlock,
            rollback,
        })
    }

    fn construct_block(
        &mut self,
        out: &mut CfirModule,
        instance: InstanceRef,
        control_flow: crate::rhir::ControlFlowRef,
        block: BlockRef,
        memo: &mut HashMap<BlockRef, LabelId>,
        top_level: &mut Vec<CfNode>,
    ) -> CompileResult<LabelId> {
        if let Some(&label) = memo.get(&block) {
            return Ok(label);
        }
        let label = out.new_label();
        memo.insert(block, label);

        let mut statements = Vec::new();
        for op in &self.ctx.get_effect_block(block)?.operations {
            if let crate::rhir::Operation::ExternalAction(name) = op {
                out.declare_external_action(name.clone());
                statements.push(CfNode::Statement(name.clone()));
            }
        }

        let current = self.required_locks(out, instance, block)?;
        let edge = self.ctx.get_control_flow(control_flow)?.edge_from(block).cloned();

        let tail = match edge {
            None => CfNode::Return,
            Some(Edge::Unconditional(target)) => {
                let target_label =
                    self.construct_block(out, instance, control_flow, target, memo, top_level)?;
                let sync = self.synchronization(&current, instance, target, None, out)?;
                CfNode::Sequence(vec![sync, CfNode::Goto(target_label)])
            }
            Some(Edge::Conditional {
                target,
                alternative,
                ..
            }) => {
                let branches_label = out.new_label();
                let mut branches = Vec::new();
                for succ in [target, alternative] {
                    let succ_label =
                        self.construct_block(out, instance, control_flow, succ, memo, top_level)?;
                    let sync =
                        self.synchronization(&current, instance, succ, Some(branches_label), out)?;
                    branches.push(CfNode::Sequence(vec![sync, CfNode::Goto(succ_label)]));
                }
                CfNode::Labelled(branches_label, Box::new(CfNode::Branch(branches)))
            }
        };

        statements.push(tail);
        top_level.push(CfNode::Labelled(label, Box::new(CfNode::Sequence(statements))));
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::MutualInclusion;
    use crate::rhir::builder::{ModelFile, RhirBuilder};
    use crate::stir::translator::RhirToStirTranslator;

    fn built_module() -> (RhirContext, ModuleRef) {
        let mut ctx = RhirContext::new();
        let model: ModelFile = serde_json::from_str(
            r#"{
                "symbols": ["ping"],
                "domains": { "pings": {"symbols": ["ping"]} },
                "protocols": {
                    "Sender": {"in": null, "out": "pings"},
                    "Receiver": {"in": "pings", "out": null}
                },
                "instances": {
                    "s": {"protocol": "Sender"},
                    "r": {"protocol": "Receiver"}
                },
                "processes": {
                    "Sender": {
                        "protocol": "Sender",
                        "entry_block": "b0",
                        "blocks": {
                            "b0": {
                                "operations": [
                                    {"kind": "transmission", "destinations": ["r"], "message": "ping"}
                                ],
                                "edge": {"kind": "unconditional", "target": "b0"}
                            }
                        }
                    },
                    "Receiver": {
                        "protocol": "Receiver",
                        "entry_block": "b0",
                        "blocks": {
                            "b0": {
                                "operations": [],
                                "edge": {
                                    "kind": "conditional",
                                    "target": "b1",
                                    "alternative": "b0",
                                    "condition": {"kind": "receival", "messages": ["ping"]}
                                }
                            },
                            "b1": {
                                "operations": [
                                    {"kind": "external_action", "action": "recv_ping"}
                                ],
                                "edge": {"kind": "unconditional", "target": "b0"}
                            }
                        }
                    }
                },
                "module": {"processes": ["Sender", "Receiver"], "instances": ["s", "r"]}
            }"#,
        )
        .unwrap();
        let module = RhirBuilder::build(&mut ctx, &model).unwrap();
        (ctx, module)
    }

    #[test]
    fn construct_emits_one_procedure_per_instance() {
        let (ctx, module) = built_module();
        let (_st_module, _mapping) = RhirToStirTranslator::new(&ctx).translate(module).unwrap();
        let inclusion = MutualInclusion::new();
        let exclusion = MutualExclusion::new(&ctx, module, &inclusion);
        let cfir = CfirConstructor::new(&ctx, module, exclusion).construct().unwrap();
        assert_eq!(cfir.procedures().count(), 2);
        assert!(cfir.external_actions().contains(&"recv_ping".to_string()));
    }
}
