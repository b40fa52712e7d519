//! The RHIR arena: mints references and owns every entity they point to.

use std::collections::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::rhir::entities::*;

macro_rules! accessor {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $ref_ty:ty) => {
        pub fn $get(&self, r: $ref_ty) -> CompileResult<&$ty> {
            match self.entities.get(&r.0) {
                Some(Entity::$variant(e)) => Ok(e),
                Some(other) => Err(CompileError::EntityKindMismatch {
                    expected: stringify!($variant),
                    found: other.kind_name(),
                }),
                None => Err(CompileError::Reference(r.0)),
            }
        }

        pub fn $get_mut(&mut self, r: $ref_ty) -> CompileResult<&mut $ty> {
            match self.entities.get_mut(&r.0) {
                Some(Entity::$variant(e)) => Ok(e),
                Some(other) => Err(CompileError::EntityKindMismatch {
                    expected: stringify!($variant),
                    found: other.kind_name(),
                }),
                None => Err(CompileError::Reference(r.0)),
            }
        }
    };
}

/// Owning arena for every RHIR entity. References are validated against
/// `entities` on every lookup; nothing is ever moved once inserted.
#[derive(Debug, Default)]
pub struct RhirContext {
    next_id: u32,
    entities: HashMap<u32, Entity>,
}

impl RhirContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_ref(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Removes an entity from the arena entirely. Used only by the control-flow
    /// optimizer to delete effect blocks it has proven unreachable.
    pub fn drop_entity(&mut self, id: u32) {
        self.entities.remove(&id);
    }

    pub fn new_symbol(&mut self, label: impl Into<String>) -> SymbolRef {
        let id = self.new_ref();
        self.entities
            .insert(id, Entity::Symbol(Symbol { label: label.into() }));
        SymbolRef(id)
    }

    pub fn new_domain(&mut self, label: impl Into<String>, items: Vec<ElementRef>) -> DomainRef {
        let id = self.new_ref();
        self.entities.insert(
            id,
            Entity::Domain(Domain {
                label: label.into(),
                items,
            }),
        );
        DomainRef(id)
    }

    pub fn new_protocol(
        &mut self,
        label: impl Into<String>,
        in_domain: Option<DomainRef>,
        out_domain: Option<DomainRef>,
    ) -> ProtocolRef {
        let id = self.new_ref();
        self.entities.insert(
            id,
            Entity::Protocol(Protocol {
                label: label.into(),
                in_domain,
                out_domain,
            }),
        );
        ProtocolRef(id)
    }

    pub fn new_instance(
        &mut self,
        label: impl Into<String>,
        protocol: ProtocolRef,
        parameters: Vec<ElementRef>,
    ) -> CompileResult<InstanceRef> {
        self.get_protocol(protocol)?;
        let id = self.new_ref();
        self.entities.insert(
            id,
            Entity::Instance(Instance {
                label: label.into(),
                protocol,
                parameters,
            }),
        );
        Ok(InstanceRef(id))
    }

    pub fn new_effect_block(&mut self) -> BlockRef {
        let id = self.new_ref();
        self.entities
            .insert(id, Entity::EffectBlock(EffectBlock::default()));
        BlockRef(id)
    }

    pub fn new_predicate(&mut self, predicate: Predicate) -> PredicateRef {
        let id = self.new_ref();
        self.entities.insert(id, Entity::Predicate(predicate));
        PredicateRef(id)
    }

    pub fn new_set(&mut self, label: impl Into<String>, domain: DomainRef) -> CompileResult<SetRef> {
        self.get_domain(domain)?;
        let id = self.new_ref();
        self.entities.insert(
            id,
            Entity::Set(Set {
                label: label.into(),
                domain,
            }),
        );
        Ok(SetRef(id))
    }

    pub fn new_control_flow(&mut self) -> ControlFlowRef {
        let id = self.new_ref();
        self.entities
            .insert(id, Entity::ControlFlow(ControlFlow::new()));
        ControlFlowRef(id)
    }

    pub fn new_process(
        &mut self,
        label: impl Into<String>,
        protocol: ProtocolRef,
        entry_block: BlockRef,
        control_flow: ControlFlowRef,
    ) -> CompileResult<ProcessRef> {
        self.get_protocol(protocol)?;
        self.get_effect_block(entry_block)?;
        self.get_control_flow(control_flow)?;
        let id = self.new_ref();
        self.entities.insert(
            id,
            Entity::Process(Process {
                label: label.into(),
                protocol,
                entry_block,
                control_flow,
            }),
        );
        Ok(ProcessRef(id))
    }

    pub fn new_module(&mut self) -> ModuleRef {
        let id = self.new_ref();
        self.entities.insert(id, Entity::Module(Module::default()));
        ModuleRef(id)
    }

    accessor!(get_symbol, get_symbol_mut, Symbol, Symbol, SymbolRef);
    accessor!(get_domain, get_domain_mut, Domain, Domain, DomainRef);
    accessor!(get_protocol, get_protocol_mut, Protocol, Protocol, ProtocolRef);
    accessor!(get_instance, get_instance_mut, Instance, Instance, InstanceRef);
    accessor!(
        get_effect_block,
        get_effect_block_mut,
        EffectBlock,
        EffectBlock,
        BlockRef
    );
    accessor!(get_predicate, get_predicate_mut, Predicate, Predicate, PredicateRef);
    accessor!(get_set, get_set_mut, Set, Set, SetRef);
    accessor!(
        get_control_flow,
        get_control_flow_mut,
        ControlFlow,
        ControlFlow,
        ControlFlowRef
    );
    accessor!(get_process, get_process_mut, Process, Process, ProcessRef);
    accessor!(get_module, get_module_mut, Module, Module, ModuleRef);

    /// Resolves the process whose protocol matches `protocol`, if any.
    pub fn find_process_for(
        &self,
        module: ModuleRef,
        protocol: ProtocolRef,
    ) -> CompileResult<Option<ProcessRef>> {
        let module = self.get_module(module)?;
        for &p in &module.processes {
            if self.get_process(p)?.protocol == protocol {
                return Ok(Some(p));
            }
        }
        Ok(None)
    }

    pub fn domain_element_refs(&self, domain: DomainRef) -> CompileResult<&[ElementRef]> {
        Ok(&self.get_domain(domain)?.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_reference_is_an_error() {
        let ctx = RhirContext::new();
        let err = ctx.get_symbol(SymbolRef(0)).unwrap_err();
        assert!(matches!(err, CompileError::Reference(0)));
    }

    #[test]
    fn kind_mismatch_on_coercion() {
        let mut ctx = RhirContext::new();
        let sym = ctx.new_symbol("a");
        let err = ctx.get_domain(DomainRef(sym.0)).unwrap_err();
        assert!(matches!(err, CompileError::EntityKindMismatch { .. }));
    }

    #[test]
    fn instance_validates_protocol_reference() {
        let mut ctx = RhirContext::new();
        let bogus = ProtocolRef(999);
        let err = ctx.new_instance("i", bogus, vec![]).unwrap_err();
        assert!(matches!(err, CompileError::Reference(999)));
    }

    #[test]
    fn drop_entity_then_lookup_fails() {
        let mut ctx = RhirContext::new();
        let block = ctx.new_effect_block();
        ctx.drop_entity(block.0);
        assert!(ctx.get_effect_block(block).is_err());
    }
}
