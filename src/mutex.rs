//! Mutual inclusion (observed co-occurrence) and its complement, mutual
//! exclusion (the locking obligation), derived from the checker's reachability
//! relation.

use std::collections::{HashMap, HashSet};

use crate::error::CompileResult;
use crate::rhir::{BlockRef, InstanceRef, ModuleRef, RhirContext};

/// An (instance, block) pair — a single global-state component.
pub type StatePoint = (InstanceRef, BlockRef);

fn canonical_pair(a: StatePoint, b: StatePoint) -> (StatePoint, StatePoint) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The set of state-point pairs observed to co-occur in at least one reachable
/// global state.
#[derive(Debug, Clone, Default)]
pub struct MutualInclusion {
    pairs: HashSet<(StatePoint, StatePoint)>,
}

impl MutualInclusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cooccurring(&mut self, a: StatePoint, b: StatePoint) {
        self.pairs.insert(canonical_pair(a, b));
    }

    pub fn is_cooccurring(&self, a: StatePoint, b: StatePoint) -> bool {
        self.pairs.contains(&canonical_pair(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Forward reachability of blocks within a single process's control-flow
/// graph, starting from its entry block.
pub fn reachable_blocks(ctx: &RhirContext, control_flow: crate::rhir::ControlFlowRef, entry: BlockRef) -> CompileResult<Vec<BlockRef>> {
    let mut visited = HashSet::new();
    let mut stack = vec![entry];
    let mut order = Vec::new();
    while let Some(block) = stack.pop() {
        if !visited.insert(block) {
            continue;
        }
        order.push(block);
        if let Some(edge) = ctx.get_control_flow(control_flow)?.edge_from(block) {
            for succ in edge.successors() {
                stack.push(succ);
            }
        }
    }
    Ok(order)
}

/// Complement of [`MutualInclusion`]: which (instance,block) pairs must be
/// serialized against a given state point.
pub struct MutualExclusion<'a> {
    ctx: &'a RhirContext,
    module: ModuleRef,
    inclusion: &'a MutualInclusion,
    reachable_cache: HashMap<InstanceRef, Vec<BlockRef>>,
}

impl<'a> MutualExclusion<'a> {
    pub fn new(ctx: &'a RhirContext, module: ModuleRef, inclusion: &'a MutualInclusion) -> Self {
        MutualExclusion {
            ctx,
            module,
            inclusion,
            reachable_cache: HashMap::new(),
        }
    }

    fn reachable_for(&mut self, instance: InstanceRef) -> CompileResult<Vec<BlockRef>> {
        if let Some(cached) = self.reachable_cache.get(&instance) {
            return Ok(cached.clone());
        }
        let inst = self.ctx.get_instance(instance)?;
        let process = self
            .ctx
            .find_process_for(self.module, inst.protocol)?
            .ok_or_else(|| {
                crate::error::CompileError::Structural(format!(
                    "no process implements the protocol of instance {instance}"
                ))
            })?;
        let process = self.ctx.get_process(process)?;
        let blocks = reachable_blocks(self.ctx, process.control_flow, process.entry_block)?;
        self.reachable_cache.insert(instance, blocks.clone());
        Ok(blocks)
    }

    /// Every (instance2,block2) pair with `instance2 != instance1` that never
    /// co-occurs with `(instance1, block1)`.
    pub fn exclusive_against(
        &mut self,
        point: StatePoint,
        other_instance: InstanceRef,
    ) -> CompileResult<Vec<StatePoint>> {
        let mut out = Vec::new();
        for block2 in self.reachable_for(other_instance)? {
            let candidate = (other_instance, block2);
            if !self.inclusion.is_cooccurring(point, candidate) {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    /// All other-instance state points mutually exclusive with `point`.
    pub fn all_exclusive(&mut self, point: StatePoint) -> CompileResult<Vec<StatePoint>> {
        let module = self.ctx.get_module(self.module)?;
        let others: Vec<InstanceRef> = module
            .instances
            .iter()
            .copied()
            .filter(|&i| i != point.0)
            .collect();
        let mut out = Vec::new();
        for other in others {
            out.extend(self.exclusive_against(point, other)?);
        }
        Ok(out)
    }
}

/// Ingests the checker's co-occurrence CSV: `(_, stir_node_a, _, stir_node_b)`
/// per row, projected through `mapping`. Rows referencing a STIR node outside
/// `mapping` are silently dropped (the mapping is known to be incomplete by
/// design — unreachable nodes are never recorded).
pub fn ingest_csv(
    csv: &str,
    mapping: &crate::stir::translator::StirRhirMapping,
) -> MutualInclusion {
    let mut inclusion = MutualInclusion::new();
    for line in csv.lines() {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 4 {
            tracing::warn!(row = line, "skipping malformed state-space row");
            continue;
        }
        let (Ok(a), Ok(b)) = (fields[1].parse::<u32>(), fields[3].parse::<u32>()) else {
            tracing::warn!(row = line, "skipping non-integer state-space row");
            continue;
        };
        let (Some(pa), Some(pb)) = (
            mapping.try_get(crate::stir::StNodeId(a)),
            mapping.try_get(crate::stir::StNodeId(b)),
        ) else {
            continue;
        };
        inclusion.add_cooccurring(pa, pb);
    }
    inclusion
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalization_is_symmetric() {
        let a = (InstanceRef(1), BlockRef(1));
        let b = (InstanceRef(0), BlockRef(5));
        assert_eq!(canonical_pair(a, b), canonical_pair(b, a));
    }

    #[test]
    fn malformed_rows_are_dropped_not_fatal() {
        let mapping = crate::stir::translator::StirRhirMapping::default();
        let inclusion = ingest_csv("not,a,valid\nrow,1,2,x\n", &mapping);
        assert!(inclusion.is_empty());
    }

    #[test]
    fn rows_referencing_unmapped_nodes_are_dropped() {
        let mapping = crate::stir::translator::StirRhirMapping::default();
        let inclusion = ingest_csv("0,1,0,2\n", &mapping);
        assert!(inclusion.is_empty());
    }
}
