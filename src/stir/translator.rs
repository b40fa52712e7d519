//! RHIR -> STIR translation: walks each instance's control-flow graph,
//! enumerating condition bindings and emitting one transition per binding.

use std::collections::{HashMap, HashSet};

use crate::error::{CompileError, CompileResult};
use crate::rhir::{
    BlockRef, DomainRef, Edge, ElementRef, InstanceRef, ModuleRef, Predicate, PredicateRef,
    RhirContext, SetRef, SymbolRef,
};
use crate::stir::{StGuard, StInstruction, StModule, StNodeId, StSlotId, StTransition};

/// A single resolved binding of a condition's free variables: which
/// (message, sender) pair each receival predicate in the condition tree is
/// bound to, keyed by that receival's position in a depth-first walk of the
/// (possibly nested) conjunction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Binding {
    receivals: Vec<(usize, SymbolRef, InstanceRef)>,
}

impl Binding {
    fn merged(&self, other: &Binding) -> Binding {
        let mut receivals = self.receivals.clone();
        receivals.extend(other.receivals.iter().copied());
        Binding { receivals }
    }

    fn at(&self, position: usize) -> Option<(SymbolRef, InstanceRef)> {
        self.receivals
            .iter()
            .find(|(p, _, _)| *p == position)
            .map(|(_, m, i)| (*m, *i))
    }
}

/// STIR node <-> (instance, block) back-mapping, needed to project the
/// checker's reachability relation back onto RHIR blocks.
#[derive(Debug, Clone, Default)]
pub struct StirRhirMapping {
    forward: HashMap<StNodeId, (InstanceRef, BlockRef)>,
}

impl StirRhirMapping {
    pub fn map_to(&mut self, node: StNodeId, instance: InstanceRef, block: BlockRef) {
        self.forward.insert(node, (instance, block));
    }

    pub fn get(&self, node: StNodeId) -> CompileResult<(InstanceRef, BlockRef)> {
        self.forward.get(&node).copied().ok_or_else(|| {
            CompileError::Structural(format!("STIR node {node} has no RHIR mapping"))
        })
    }

    pub fn try_get(&self, node: StNodeId) -> Option<(InstanceRef, BlockRef)> {
        self.forward.get(&node).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StNodeId, InstanceRef, BlockRef)> + '_ {
        self.forward.iter().map(|(n, (i, b))| (*n, *i, *b))
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }
}

#[derive(Default)]
struct SlotAllocator {
    message_slots: HashMap<(InstanceRef, InstanceRef, DomainRef), StSlotId>,
    set_element_slots: HashMap<(InstanceRef, SetRef, ElementRef), StSlotId>,
}

impl SlotAllocator {
    fn message_slot(
        &mut self,
        module: &mut StModule,
        sender: InstanceRef,
        receiver: InstanceRef,
        domain: DomainRef,
    ) -> StSlotId {
        *self
            .message_slots
            .entry((sender, receiver, domain))
            .or_insert_with(|| module.state.new_int_slot(-1))
    }

    fn set_element_slot(
        &mut self,
        module: &mut StModule,
        instance: InstanceRef,
        set: SetRef,
        element: ElementRef,
    ) -> StSlotId {
        *self
            .set_element_slots
            .entry((instance, set, element))
            .or_insert_with(|| module.state.new_int_slot(0))
    }
}

/// Translates an entire RHIR module into a single STIR module.
pub struct RhirToStirTranslator<'ctx> {
    ctx: &'ctx RhirContext,
    all_instances: Vec<InstanceRef>,
    slots: SlotAllocator,
    mapping: StirRhirMapping,
}

impl<'ctx> RhirToStirTranslator<'ctx> {
    pub fn new(ctx: &'ctx RhirContext) -> Self {
        RhirToStirTranslator {
            ctx,
            all_instances: Vec::new(),
            slots: SlotAllocator::default(),
            mapping: StirRhirMapping::default(),
        }
    }

    pub fn translate(mut self, module_ref: ModuleRef) -> CompileResult<(StModule, StirRhirMapping)> {
        let mut out = StModule::new();
        let module = self.ctx.get_module(module_ref)?;
        self.all_instances = module.instances.clone();
        for &instance in &module.instances.clone() {
            self.translate_instance(&mut out, module_ref, instance)?;
        }
        Ok((out, self.mapping))
    }

    fn translate_instance(
        &mut self,
        out: &mut StModule,
        module_ref: ModuleRef,
        instance: InstanceRef,
    ) -> CompileResult<()> {
        let inst = self.ctx.get_instance(instance)?.clone();
        let process_ref = self
            .ctx
            .find_process_for(module_ref, inst.protocol)?
            .ok_or_else(|| {
                CompileError::Structural(format!(
                    "no process implements the protocol of instance {instance}"
                ))
            })?;
        let process = self.ctx.get_process(process_ref)?.clone();

        let entry_node = out.new_node();
        let node_slot = out.state.new_node_slot(entry_node);

        let mut node_cache: HashMap<BlockRef, StNodeId> = HashMap::new();
        node_cache.insert(process.entry_block, entry_node);

        let mut worklist: Vec<(StNodeId, bool, Option<PredicateRef>, BlockRef)> =
            vec![(entry_node, false, None, process.entry_block)];
        let mut visited: HashSet<(StNodeId, BlockRef)> = HashSet::new();

        while let Some((pred_node, invert, condition, block)) = worklist.pop() {
            if !visited.insert((pred_node, block)) {
                continue;
            }
            let block_node = *node_cache.entry(block).or_insert_with(|| out.new_node());
            self.mapping.map_to(block_node, instance, block);

            self.translate_block(
                out, instance, node_slot, pred_node, invert, condition, block, block_node,
            )?;

            let control_flow = self.ctx.get_control_flow(process.control_flow)?;
            match control_flow.edge_from(block) {
                None => {}
                Some(Edge::Unconditional(target)) => {
                    worklist.push((block_node, false, None, *target));
                }
                Some(Edge::Conditional {
                    target,
                    alternative,
                    condition,
                }) => {
                    worklist.push((block_node, false, Some(*condition), *target));
                    worklist.push((block_node, true, Some(*condition), *alternative));
                }
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn translate_block(
        &mut self,
        out: &mut StModule,
        instance: InstanceRef,
        node_slot: StSlotId,
        pred_node: StNodeId,
        invert_pred_guard: bool,
        condition: Option<PredicateRef>,
        block: BlockRef,
        block_node: StNodeId,
    ) -> CompileResult<()> {
        let bindings = match condition {
            None => vec![Binding::default()],
            Some(cond) => {
                let mut enumerated = self.enumerate_condition_bindings(cond, 0)?;
                if enumerated.is_empty() {
                    enumerated.push(Binding::default());
                }
                let mut seen = HashSet::new();
                enumerated.retain(|b| seen.insert(b.clone()));
                enumerated
            }
        };

        let effect_block = self.ctx.get_effect_block(block)?.clone();

        for binding in &bindings {
            let mut transition =
                StTransition::new(node_slot, pred_node, block_node, invert_pred_guard);

            if let Some(cond) = condition {
                self.translate_guard_at(
                    out,
                    cond,
                    instance,
                    binding,
                    0,
                    invert_pred_guard,
                    &mut transition,
                )?;
            }

            for op in &effect_block.operations {
                self.translate_operation(out, instance, op, &mut transition)?;
            }

            out.new_transition(transition);
        }

        Ok(())
    }

    fn translate_operation(
        &mut self,
        out: &mut StModule,
        instance: InstanceRef,
        op: &crate::rhir::Operation,
        transition: &mut StTransition,
    ) -> CompileResult<()> {
        use crate::rhir::Operation;
        match op {
            Operation::ExternalAction(name) => {
                transition.add_instruction(StInstruction::Do {
                    action: name.clone(),
                });
            }
            Operation::Transmission {
                destinations,
                message,
            } => {
                let domain = self.out_domain_of(instance)?;
                for dest in destinations {
                    match dest {
                        crate::rhir::DestinationRef::Instance(recv) => {
                            let slot = self.slots.message_slot(out, instance, *recv, domain);
                            transition.add_instruction(StInstruction::SetInt {
                                slot,
                                value: message.0 as i64,
                            });
                        }
                        crate::rhir::DestinationRef::Domain(dom) => {
                            for item in self.ctx.domain_element_refs(*dom)?.to_vec() {
                                if let ElementRef::Instance(recv) = item {
                                    let slot =
                                        self.slots.message_slot(out, instance, recv, domain);
                                    transition.add_instruction(StInstruction::SetInt {
                                        slot,
                                        value: message.0 as i64,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            Operation::SetAdd { target, value } => {
                let slot = self.slots.set_element_slot(out, instance, *target, *value);
                transition.add_instruction(StInstruction::SetInt { slot, value: 1 });
            }
            Operation::SetDel { target, value } => {
                let slot = self.slots.set_element_slot(out, instance, *target, *value);
                transition.add_instruction(StInstruction::SetInt { slot, value: 0 });
            }
        }
        Ok(())
    }

    fn out_domain_of(&self, instance: InstanceRef) -> CompileResult<DomainRef> {
        let inst = self.ctx.get_instance(instance)?;
        let protocol = self.ctx.get_protocol(inst.protocol)?;
        protocol.out_domain.ok_or_else(|| {
            CompileError::Structural("transmission from a protocol with no out domain".into())
        })
    }

    fn in_domain_of(&self, instance: InstanceRef) -> CompileResult<DomainRef> {
        let inst = self.ctx.get_instance(instance)?;
        let protocol = self.ctx.get_protocol(inst.protocol)?;
        protocol.in_domain.ok_or_else(|| {
            CompileError::Structural("receival on a protocol with no in domain".into())
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn translate_guard_at(
        &mut self,
        out: &mut StModule,
        condition: PredicateRef,
        instance: InstanceRef,
        binding: &Binding,
        position: usize,
        invert: bool,
        transition: &mut StTransition,
    ) -> CompileResult<()> {
        let predicate = self.ctx.get_predicate(condition)?.clone();
        match predicate {
            Predicate::Nondet => {}
            Predicate::SetEmpty(set) => {
                let set_entity = self.ctx.get_set(set)?;
                for item in self.ctx.domain_element_refs(set_entity.domain)?.to_vec() {
                    let slot = self.slots.set_element_slot(out, instance, set, item);
                    transition.add_guard(StGuard::Int { slot, value: 0 });
                }
            }
            Predicate::SetHas(set, value) => {
                let slot = self.slots.set_element_slot(out, instance, set, value);
                transition.add_guard(StGuard::Int { slot, value: 1 });
            }
            Predicate::Receival(_messages) => {
                let (message, sender) = binding.at(position).ok_or_else(|| {
                    CompileError::Structural("receival predicate has no bound sender".into())
                })?;
                let receiver_in_domain = self.in_domain_of(instance)?;
                let slot = self.slots.message_slot(out, sender, instance, receiver_in_domain);
                transition.add_guard(StGuard::Int {
                    slot,
                    value: message.0 as i64,
                });
                if !invert {
                    transition.add_instruction(StInstruction::SetInt { slot, value: -1 });
                }
            }
            Predicate::Conjunction(conjuncts) => {
                for (i, conjunct) in conjuncts.iter().enumerate() {
                    self.translate_guard_at(
                        out, *conjunct, instance, binding, i, invert, transition,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Enumerates every distinct binding of free variables in `condition`.
    /// Conjunctions enumerate the full cartesian product across all
    /// conjuncts: the head's bindings crossed with the recursively
    /// enumerated bindings of the *entire* remaining tail, not a shortened
    /// tail.
    fn enumerate_condition_bindings(
        &self,
        condition: PredicateRef,
        position: usize,
    ) -> CompileResult<Vec<Binding>> {
        let predicate = self.ctx.get_predicate(condition)?.clone();
        match predicate {
            Predicate::Receival(messages) => {
                let mut out = Vec::new();
                for message in messages {
                    for sender in self.enumerate_senders(message)? {
                        out.push(Binding {
                            receivals: vec![(position, message, sender)],
                        });
                    }
                }
                Ok(out)
            }
            Predicate::Conjunction(conjuncts) => self.enum_conjunction_bindings(&conjuncts, position),
            Predicate::Nondet | Predicate::SetEmpty(_) | Predicate::SetHas(_, _) => Ok(Vec::new()),
        }
    }

    fn enum_conjunction_bindings(
        &self,
        conjuncts: &[PredicateRef],
        start_position: usize,
    ) -> CompileResult<Vec<Binding>> {
        let Some((&head, tail)) = conjuncts.split_first() else {
            return Ok(Vec::new());
        };
        let head_bindings = self.enumerate_condition_bindings(head, start_position)?;
        if tail.is_empty() {
            return Ok(head_bindings);
        }
        let tail_bindings = self.enum_conjunction_bindings(tail, start_position + 1)?;
        if head_bindings.is_empty() {
            return Ok(tail_bindings);
        }
        if tail_bindings.is_empty() {
            return Ok(head_bindings);
        }
        let mut out = Vec::with_capacity(head_bindings.len() * tail_bindings.len());
        for h in &head_bindings {
            for t in &tail_bindings {
                out.push(h.merged(t));
            }
        }
        Ok(out)
    }

    /// Every instance (within the module being translated) whose protocol can
    /// emit `message` on its `out` domain.
    fn enumerate_senders(&self, message: SymbolRef) -> CompileResult<Vec<InstanceRef>> {
        let mut senders = Vec::new();
        for &candidate in &self.all_instances {
            let inst = self.ctx.get_instance(candidate)?;
            let protocol = self.ctx.get_protocol(inst.protocol)?;
            if let Some(out_domain) = protocol.out_domain {
                if self
                    .ctx
                    .domain_element_refs(out_domain)?
                    .contains(&ElementRef::Symbol(message))
                {
                    senders.push(candidate);
                }
            }
        }
        Ok(senders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhir::builder::{ModelFile, RhirBuilder};
    use crate::rhir::RhirContext;

    fn ping_pong() -> (RhirContext, ModuleRef) {
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
    fn translation_produces_a_transition_per_instance_entry() {
        let (ctx, module) = ping_pong();
        let (st_module, mapping) = RhirToStirTranslator::new(&ctx).translate(module).unwrap();
        assert!(!st_module.transitions.is_empty());
        assert!(mapping.len() >= 2);
    }

    #[test]
    fn receival_guard_consumes_the_message() {
        let (ctx, module) = ping_pong();
        let (st_module, _mapping) = RhirToStirTranslator::new(&ctx).translate(module).unwrap();
        let receival_transition = st_module
            .transitions
            .iter()
            .find(|t| !t.guards.is_empty())
            .expect("at least one guarded transition");
        let consumes = receival_transition
            .set_int_instructions()
            .any(|(_, v)| v == -1);
        assert!(consumes);
    }

    fn ping_pong_with_receiver_warmup() -> (RhirContext, ModuleRef) {
        // Like `ping_pong`, but the receiver's conditional block is reached
        // via a separate entry block rather than being the entry block
        // itself, so the poll-self-loop (alternative edge back to the same
        // block) isn't coincidentally deduplicated against the very first
        // worklist entry.
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
                        "entry_block": "start",
                        "blocks": {
                            "start": {
                                "operations": [],
                                "edge": {"kind": "unconditional", "target": "poll"}
                            },
                            "poll": {
                                "operations": [],
                                "edge": {
                                    "kind": "conditional",
                                    "target": "b1",
                                    "alternative": "poll",
                                    "condition": {"kind": "receival", "messages": ["ping"]}
                                }
                            },
                            "b1": {
                                "operations": [
                                    {"kind": "external_action", "action": "recv_ping"}
                                ],
                                "edge": {"kind": "unconditional", "target": "poll"}
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
    fn negated_receival_guard_does_not_consume_the_message() {
        let (ctx, module) = ping_pong_with_receiver_warmup();
        let (st_module, _mapping) = RhirToStirTranslator::new(&ctx).translate(module).unwrap();
        let negated_transition = st_module
            .transitions
            .iter()
            .find(|t| t.invert_guard && !t.guards.is_empty())
            .expect("at least one negated guarded transition");
        assert!(negated_transition.set_int_instructions().all(|(_, v)| v != -1));
        let non_negated_transition = st_module
            .transitions
            .iter()
            .find(|t| !t.invert_guard && !t.guards.is_empty())
            .expect("at least one non-negated guarded transition");
        assert!(non_negated_transition
            .set_int_instructions()
            .any(|(_, v)| v == -1));
    }
}
