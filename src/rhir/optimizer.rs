//! Control-flow optimizer: fixpoint elimination of empty effect blocks.
//!
//! ```text
//! RHIR (from the builder) -> [CfOptimizer] -> RHIR with dead blocks dropped
//! ```

use std::collections::VecDeque;

use crate::error::CompileResult;
use crate::rhir::context::RhirContext;
use crate::rhir::entities::{BlockRef, ControlFlowRef, Edge};

/// Eliminates empty effect blocks to a fixpoint, one process's control-flow
/// graph at a time.
pub struct CfOptimizer;

impl CfOptimizer {
    pub fn new() -> Self {
        CfOptimizer
    }

    /// Runs the optimizer over a single process's control-flow graph until no
    /// further block can be dropped.
    pub fn optimize(
        &self,
        ctx: &mut RhirContext,
        control_flow: ControlFlowRef,
        entry: BlockRef,
    ) -> CompileResult<()> {
        loop {
            let mut dropped_any = false;
            let mut visited = std::collections::HashSet::new();
            let mut queue = VecDeque::from([entry]);

            while let Some(block) = queue.pop_front() {
                if !visited.insert(block) {
                    continue;
                }
                if let Some(edge) = ctx.get_control_flow(control_flow)?.edge_from(block).cloned() {
                    for succ in edge.successors() {
                        queue.push_back(succ);
                    }
                }

                if block == entry {
                    continue;
                }
                if !ctx.get_effect_block(block)?.is_empty() {
                    continue;
                }

                let outgoing = ctx.get_control_flow(control_flow)?.edge_from(block).cloned();
                let incoming: Vec<BlockRef> =
                    ctx.get_control_flow(control_flow)?.edges_to(block).to_vec();

                let mut rewrote_all = true;
                for pred in &incoming {
                    let pred_edge = ctx
                        .get_control_flow(control_flow)?
                        .edge_from(*pred)
                        .cloned();
                    match (pred_edge, outgoing.clone()) {
                        (Some(Edge::Unconditional(_)), None) => {
                            ctx.get_control_flow_mut(control_flow)?.drop_edge(*pred);
                        }
                        (Some(Edge::Unconditional(_)), Some(Edge::Unconditional(target))) => {
                            ctx.get_control_flow_mut(control_flow)?
                                .set_edge(*pred, Edge::Unconditional(target));
                        }
                        (Some(Edge::Unconditional(_)), Some(out_edge @ Edge::Conditional { .. })) => {
                            ctx.get_control_flow_mut(control_flow)?.set_edge(*pred, out_edge);
                        }
                        (
                            Some(Edge::Conditional {
                                target,
                                alternative,
                                condition,
                            }),
                            Some(Edge::Unconditional(out_target)),
                        ) => {
                            let new_target = if target == block { out_target } else { target };
                            let new_alternative =
                                if alternative == block { out_target } else { alternative };
                            ctx.get_control_flow_mut(control_flow)?.set_edge(
                                *pred,
                                Edge::Conditional {
                                    target: new_target,
                                    alternative: new_alternative,
                                    condition,
                                },
                            );
                        }
                        (Some(Edge::Conditional { .. }), _) => {
                            rewrote_all = false;
                        }
                        (None, _) => {
                            rewrote_all = false;
                        }
                    }
                }

                if rewrote_all && !incoming.is_empty() {
                    ctx.get_control_flow_mut(control_flow)?.drop_edge(block);
                    ctx.drop_entity(block.0);
                    dropped_any = true;
                }
            }

            if !dropped_any {
                break;
            }
        }
        Ok(())
    }
}

impl Default for CfOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhir::entities::Predicate;

    fn linear_chain(ctx: &mut RhirContext) -> (ControlFlowRef, BlockRef, BlockRef, BlockRef) {
        let cf = ctx.new_control_flow();
        let entry = ctx.new_effect_block();
        let empty = ctx.new_effect_block();
        let exit = ctx.new_effect_block();
        ctx.get_effect_block_mut(exit).unwrap().operations.push(
            crate::rhir::entities::Operation::ExternalAction("done".into()),
        );
        ctx.get_control_flow_mut(cf)
            .unwrap()
            .set_edge(entry, Edge::Unconditional(empty));
        ctx.get_control_flow_mut(cf)
            .unwrap()
            .set_edge(empty, Edge::Unconditional(exit));
        (cf, entry, empty, exit)
    }

    #[test]
    fn drops_unconditional_unconditional_chain() {
        let mut ctx = RhirContext::new();
        let (cf, entry, empty, exit) = linear_chain(&mut ctx);
        CfOptimizer::new().optimize(&mut ctx, cf, entry).unwrap();
        let edge = ctx.get_control_flow(cf).unwrap().edge_from(entry).cloned();
        assert!(matches!(edge, Some(Edge::Unconditional(t)) if t == exit));
        assert!(ctx.get_effect_block(empty).is_err());
    }

    #[test]
    fn entry_block_is_never_dropped() {
        let mut ctx = RhirContext::new();
        let cf = ctx.new_control_flow();
        let entry = ctx.new_effect_block();
        CfOptimizer::new().optimize(&mut ctx, cf, entry).unwrap();
        assert!(ctx.get_effect_block(entry).is_ok());
    }

    #[test]
    fn unconditional_into_conditional_is_replaced_wholesale() {
        let mut ctx = RhirContext::new();
        let cf = ctx.new_control_flow();
        let entry = ctx.new_effect_block();
        let empty = ctx.new_effect_block();
        let t1 = ctx.new_effect_block();
        let t2 = ctx.new_effect_block();
        let cond = ctx.new_predicate(Predicate::Nondet);
        ctx.get_control_flow_mut(cf)
            .unwrap()
            .set_edge(entry, Edge::Unconditional(empty));
        ctx.get_control_flow_mut(cf).unwrap().set_edge(
            empty,
            Edge::Conditional {
                target: t1,
                alternative: t2,
                condition: cond,
            },
        );
        CfOptimizer::new().optimize(&mut ctx, cf, entry).unwrap();
        let edge = ctx.get_control_flow(cf).unwrap().edge_from(entry).cloned();
        assert!(matches!(
            edge,
            Some(Edge::Conditional { target, alternative, .. }) if target == t1 && alternative == t2
        ));
    }
}
