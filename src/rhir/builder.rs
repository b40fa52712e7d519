//! Declarative JSON front end.
//!
//! No surface grammar is implemented; this loader is the minimal stand-in
//! front end that exercises the RHIR builder API end to end. It resolves
//! names to references the same way a grammar-driven parser's symbol table
//! would, then calls straight into [`RhirContext`]'s constructors.
//!
//! Limitation (a deliberate front-end simplification, not an RHIR
//! limitation): domain items may only name symbols, never instances.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{CompileError, CompileResult};
use crate::rhir::context::RhirContext;
use crate::rhir::entities::*;

#[derive(Debug, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub domains: HashMap<String, DomainSpec>,
    #[serde(default)]
    pub protocols: HashMap<String, ProtocolSpec>,
    #[serde(default)]
    pub sets: HashMap<String, SetSpec>,
    #[serde(default)]
    pub instances: HashMap<String, InstanceSpec>,
    #[serde(default)]
    pub processes: HashMap<String, ProcessSpec>,
    pub module: ModuleSpec,
}

#[derive(Debug, Deserialize)]
pub struct DomainSpec {
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProtocolSpec {
    #[serde(rename = "in")]
    pub in_domain: Option<String>,
    pub out: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetSpec {
    pub domain: String,
}

#[derive(Debug, Deserialize)]
pub struct InstanceSpec {
    pub protocol: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessSpec {
    pub protocol: String,
    pub entry_block: String,
    pub blocks: HashMap<String, BlockSpec>,
}

#[derive(Debug, Deserialize)]
pub struct BlockSpec {
    #[serde(default)]
    pub operations: Vec<OperationSpec>,
    pub edge: Option<EdgeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationSpec {
    ExternalAction { action: String },
    Transmission { destinations: Vec<String>, message: String },
    SetAdd { target: String, value: String },
    SetDel { target: String, value: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeSpec {
    Unconditional {
        target: String,
    },
    Conditional {
        target: String,
        alternative: String,
        condition: PredicateSpec,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateSpec {
    Nondet,
    SetEmpty { target: String },
    SetHas { target: String, value: String },
    Receival { messages: Vec<String> },
    Conjunction { conjuncts: Vec<PredicateSpec> },
}

#[derive(Debug, Deserialize)]
pub struct ModuleSpec {
    pub processes: Vec<String>,
    pub instances: Vec<String>,
}

/// Resolved name tables, built incrementally as each section is processed.
#[derive(Default)]
struct Scope {
    symbols: HashMap<String, SymbolRef>,
    domains: HashMap<String, DomainRef>,
    protocols: HashMap<String, ProtocolRef>,
    sets: HashMap<String, SetRef>,
    instances: HashMap<String, InstanceRef>,
    processes: HashMap<String, ProcessRef>,
}

impl Scope {
    fn element(&self, name: &str) -> CompileResult<ElementRef> {
        if let Some(&s) = self.symbols.get(name) {
            return Ok(ElementRef::Symbol(s));
        }
        if let Some(&i) = self.instances.get(name) {
            return Ok(ElementRef::Instance(i));
        }
        Err(CompileError::Resolution(name.to_string()))
    }

    fn destination(&self, name: &str) -> CompileResult<DestinationRef> {
        if let Some(&i) = self.instances.get(name) {
            return Ok(DestinationRef::Instance(i));
        }
        if let Some(&d) = self.domains.get(name) {
            return Ok(DestinationRef::Domain(d));
        }
        Err(CompileError::Resolution(name.to_string()))
    }

    fn symbol(&self, name: &str) -> CompileResult<SymbolRef> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::Resolution(name.to_string()))
    }

    fn set(&self, name: &str) -> CompileResult<SetRef> {
        self.sets
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::Resolution(name.to_string()))
    }

    fn protocol(&self, name: &str) -> CompileResult<ProtocolRef> {
        self.protocols
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::Resolution(name.to_string()))
    }
}

/// Builds an RHIR module from a parsed [`ModelFile`], driving `ctx` exactly
/// the way a grammar-based front end would.
pub struct RhirBuilder;

impl RhirBuilder {
    pub fn build(ctx: &mut RhirContext, model: &ModelFile) -> CompileResult<ModuleRef> {
        let mut scope = Scope::default();

        for name in &model.symbols {
            let r = ctx.new_symbol(name.clone());
            scope.symbols.insert(name.clone(), r);
        }

        for (name, spec) in &model.domains {
            let items = spec
                .symbols
                .iter()
                .map(|s| scope.symbol(s).map(ElementRef::Symbol))
                .collect::<CompileResult<Vec<_>>>()?;
            let r = ctx.new_domain(name.clone(), items);
            scope.domains.insert(name.clone(), r);
        }

        for (name, spec) in &model.protocols {
            let in_domain = spec
                .in_domain
                .as_ref()
                .map(|d| {
                    scope
                        .domains
                        .get(d)
                        .copied()
                        .ok_or_else(|| CompileError::Resolution(d.clone()))
                })
                .transpose()?;
            let out_domain = spec
                .out
                .as_ref()
                .map(|d| {
                    scope
                        .domains
                        .get(d)
                        .copied()
                        .ok_or_else(|| CompileError::Resolution(d.clone()))
                })
                .transpose()?;
            let r = ctx.new_protocol(name.clone(), in_domain, out_domain);
            scope.protocols.insert(name.clone(), r);
        }

        for (name, spec) in &model.instances {
            let protocol = scope.protocol(&spec.protocol)?;
            let params = spec
                .parameters
                .iter()
                .map(|p| scope.element(p))
                .collect::<CompileResult<Vec<_>>>()?;
            let r = ctx.new_instance(name.clone(), protocol, params)?;
            scope.instances.insert(name.clone(), r);
        }

        for (name, spec) in &model.sets {
            let domain = scope
                .domains
                .get(&spec.domain)
                .copied()
                .ok_or_else(|| CompileError::Resolution(spec.domain.clone()))?;
            let r = ctx.new_set(name.clone(), domain)?;
            scope.sets.insert(name.clone(), r);
        }

        for (pname, pspec) in &model.processes {
            let protocol = scope.protocol(&pspec.protocol)?;

            let mut block_refs: HashMap<String, BlockRef> = HashMap::new();
            for bname in pspec.blocks.keys() {
                block_refs.insert(bname.clone(), ctx.new_effect_block());
            }

            let control_flow = ctx.new_control_flow();

            for (bname, bspec) in &pspec.blocks {
                let block = block_refs[bname];
                for op in &bspec.operations {
                    let op = Self::build_operation(&scope, op)?;
                    ctx.get_effect_block_mut(block)?.operations.push(op);
                }
                if let Some(edge_spec) = &bspec.edge {
                    let edge = Self::build_edge(&scope, &block_refs, edge_spec, ctx)?;
                    ctx.get_control_flow_mut(control_flow)?.set_edge(block, edge);
                }
            }

            let entry_block = *block_refs
                .get(&pspec.entry_block)
                .ok_or_else(|| CompileError::Resolution(pspec.entry_block.clone()))?;

            let r = ctx.new_process(pname.clone(), protocol, entry_block, control_flow)?;
            scope.processes.insert(pname.clone(), r);
        }

        let module = ctx.new_module();
        for pname in &model.module.processes {
            let p = scope
                .processes
                .get(pname)
                .copied()
                .ok_or_else(|| CompileError::Resolution(pname.clone()))?;
            ctx.get_module_mut(module)?.processes.push(p);
        }
        for iname in &model.module.instances {
            let i = scope
                .instances
                .get(iname)
                .copied()
                .ok_or_else(|| CompileError::Resolution(iname.clone()))?;
            ctx.get_module_mut(module)?.instances.push(i);
        }

        Ok(module)
    }

    fn build_operation(scope: &Scope, op: &OperationSpec) -> CompileResult<Operation> {
        Ok(match op {
            OperationSpec::ExternalAction { action } => Operation::ExternalAction(action.clone()),
            OperationSpec::Transmission { destinations, message } => Operation::Transmission {
                destinations: destinations
                    .iter()
                    .map(|d| scope.destination(d))
                    .collect::<CompileResult<Vec<_>>>()?,
                message: scope.symbol(message)?,
            },
            OperationSpec::SetAdd { target, value } => Operation::SetAdd {
                target: scope.set(target)?,
                value: scope.element(value)?,
            },
            OperationSpec::SetDel { target, value } => Operation::SetDel {
                target: scope.set(target)?,
                value: scope.element(value)?,
            },
        })
    }

    fn build_predicate(
        scope: &Scope,
        ctx: &mut RhirContext,
        spec: &PredicateSpec,
    ) -> CompileResult<PredicateRef> {
        let predicate = match spec {
            PredicateSpec::Nondet => Predicate::Nondet,
            PredicateSpec::SetEmpty { target } => Predicate::SetEmpty(scope.set(target)?),
            PredicateSpec::SetHas { target, value } => {
                Predicate::SetHas(scope.set(target)?, scope.element(value)?)
            }
            PredicateSpec::Receival { messages } => Predicate::Receival(
                messages
                    .iter()
                    .map(|m| scope.symbol(m))
                    .collect::<CompileResult<Vec<_>>>()?,
            ),
            PredicateSpec::Conjunction { conjuncts } => {
                let refs = conjuncts
                    .iter()
                    .map(|c| Self::build_predicate(scope, ctx, c))
                    .collect::<CompileResult<Vec<_>>>()?;
                Predicate::Conjunction(refs)
            }
        };
        Ok(ctx.new_predicate(predicate))
    }

    fn build_edge(
        scope: &Scope,
        blocks: &HashMap<String, BlockRef>,
        spec: &EdgeSpec,
        ctx: &mut RhirContext,
    ) -> CompileResult<Edge> {
        let resolve = |name: &str| -> CompileResult<BlockRef> {
            blocks
                .get(name)
                .copied()
                .ok_or_else(|| CompileError::Resolution(name.to_string()))
        };
        Ok(match spec {
            EdgeSpec::Unconditional { target } => Edge::Unconditional(resolve(target)?),
            EdgeSpec::Conditional {
                target,
                alternative,
                condition,
            } => {
                let condition = Self::build_predicate(scope, ctx, condition)?;
                Edge::Conditional {
                    target: resolve(target)?,
                    alternative: resolve(alternative)?,
                    condition,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_pong_model() -> ModelFile {
        serde_json::from_str(
            r#"{
                "symbols": ["ping", "pong"],
                "domains": {
                    "pings": {"symbols": ["ping"]},
                    "pongs": {"symbols": ["pong"]}
                },
                "protocols": {
                    "Sender": {"in": "pongs", "out": "pings"},
                    "Receiver": {"in": "pings", "out": "pongs"}
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
                                    {"kind": "external_action", "action": "send_ping"}
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
        .unwrap()
    }

    #[test]
    fn builds_a_two_process_module() {
        let mut ctx = RhirContext::new();
        let model = ping_pong_model();
        let module = RhirBuilder::build(&mut ctx, &model).unwrap();
        let m = ctx.get_module(module).unwrap();
        assert_eq!(m.processes.len(), 2);
        assert_eq!(m.instances.len(), 2);
    }

    #[test]
    fn unresolved_name_is_a_resolution_error() {
        let mut ctx = RhirContext::new();
        let mut model = ping_pong_model();
        model.instances.get_mut("s").unwrap().protocol = "Nope".into();
        let err = RhirBuilder::build(&mut ctx, &model).unwrap_err();
        assert!(matches!(err, CompileError::Resolution(_)));
    }
}
