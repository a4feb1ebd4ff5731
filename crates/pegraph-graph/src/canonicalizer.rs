use pegraph_core::{
    BinaryOp, Canonicalizer, GraphError, Node, NodeId, NodeKind, PhaseContext, ResolvedMethod,
    Result, StructuredGraph,
};
use tracing::{debug, instrument};

/// Single forward simplification pass followed by dead-node removal.
///
/// Not a fixed point: a rewrite only sees inputs that were already
/// simplified earlier in the same pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalizerPhase;

impl CanonicalizerPhase {
    pub fn new() -> Self {
        Self
    }
}

enum Rewrite {
    /// Use an existing node instead.
    Alias(NodeId),
    Emit(NodeKind, Vec<NodeId>),
}

fn constant_of(nodes: &[Node], id: NodeId) -> Option<i64> {
    nodes.get(id.index()).and_then(|n| n.kind.as_constant())
}

fn simplify_binary(
    op: BinaryOp,
    x: NodeId,
    y: NodeId,
    nodes: &[Node],
    ctx: &PhaseContext,
) -> Option<Rewrite> {
    let cx = constant_of(nodes, x);
    let cy = constant_of(nodes, y);

    if ctx.fold_constants {
        if let (Some(a), Some(b)) = (cx, cy) {
            if let Some(folded) = op.fold(a, b) {
                return Some(Rewrite::Emit(NodeKind::Constant(folded), vec![]));
            }
        }
    }

    if !ctx.algebraic_simplification {
        return None;
    }

    let zero = Rewrite::Emit(NodeKind::Constant(0), vec![]);
    match op {
        BinaryOp::Add | BinaryOp::Or | BinaryOp::Xor if cx == Some(0) => Some(Rewrite::Alias(y)),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or | BinaryOp::Xor if cy == Some(0) => {
            Some(Rewrite::Alias(x))
        }
        BinaryOp::Shl | BinaryOp::Shr if cy.map(|s| s & 63) == Some(0) => Some(Rewrite::Alias(x)),
        BinaryOp::Mul if cy == Some(1) => Some(Rewrite::Alias(x)),
        BinaryOp::Mul if cx == Some(1) => Some(Rewrite::Alias(y)),
        BinaryOp::Mul | BinaryOp::And if cx == Some(0) || cy == Some(0) => Some(zero),
        BinaryOp::Sub | BinaryOp::Xor if x == y => Some(zero),
        BinaryOp::And | BinaryOp::Or if x == y => Some(Rewrite::Alias(x)),
        _ => None,
    }
}

fn simplify(
    id: NodeId,
    kind: &NodeKind,
    inputs: Vec<NodeId>,
    nodes: &[Node],
    ctx: &PhaseContext,
) -> Result<Rewrite> {
    let rewrite = match kind {
        NodeKind::Binary(op) => {
            let [x, y] = inputs[..] else {
                return Err(GraphError::Canonicalization(format!(
                    "{}: binary node expects 2 inputs, found {}",
                    id,
                    inputs.len()
                )));
            };
            simplify_binary(*op, x, y, nodes, ctx)
        }
        NodeKind::Negate => {
            let [x] = inputs[..] else {
                return Err(GraphError::Canonicalization(format!(
                    "{}: negate expects 1 input, found {}",
                    id,
                    inputs.len()
                )));
            };
            match nodes.get(x.index()) {
                Some(n) if ctx.fold_constants && n.kind.as_constant().is_some() => {
                    let v = n.kind.as_constant().unwrap_or_default();
                    Some(Rewrite::Emit(NodeKind::Constant(v.wrapping_neg()), vec![]))
                }
                Some(n) if ctx.algebraic_simplification && n.kind == NodeKind::Negate => {
                    n.inputs.first().copied().map(Rewrite::Alias)
                }
                _ => None,
            }
        }
        _ => None,
    };
    Ok(rewrite.unwrap_or_else(|| Rewrite::Emit(kind.clone(), inputs)))
}

/// Liveness from anchors backwards. Parameters stay live so the graph keeps
/// its signature.
fn live_nodes(nodes: &[Node]) -> Vec<bool> {
    let mut live = vec![false; nodes.len()];
    for i in (0..nodes.len()).rev() {
        let node = &nodes[i];
        if node.kind.is_anchor() || matches!(node.kind, NodeKind::Parameter(_)) {
            live[i] = true;
        }
        if live[i] {
            for input in &node.inputs {
                live[input.index()] = true;
            }
        }
    }
    live
}

impl<M: ResolvedMethod> Canonicalizer<M> for CanonicalizerPhase {
    #[instrument(skip_all, fields(method = %graph.method()))]
    fn canonicalize(
        &self,
        graph: StructuredGraph<M>,
        context: &PhaseContext,
    ) -> Result<StructuredGraph<M>> {
        let before = graph.node_count();
        let mut nodes: Vec<Node> = Vec::with_capacity(before);
        // old id -> id in `nodes`
        let mut alias: Vec<NodeId> = Vec::with_capacity(before);

        for (id, node) in graph.nodes() {
            let inputs = node
                .inputs
                .iter()
                .map(|input| {
                    if input.index() >= id.index() {
                        return Err(GraphError::Canonicalization(format!(
                            "{} has dangling input {}",
                            id, input
                        )));
                    }
                    Ok(alias[input.index()])
                })
                .collect::<Result<Vec<_>>>()?;

            match simplify(id, &node.kind, inputs, &nodes, context)? {
                Rewrite::Alias(target) => alias.push(target),
                Rewrite::Emit(kind, inputs) => {
                    alias.push(NodeId(nodes.len() as u32));
                    nodes.push(Node { kind, inputs });
                }
            }
        }

        let live = if context.eliminate_dead_nodes {
            live_nodes(&nodes)
        } else {
            vec![true; nodes.len()]
        };

        let mut result = graph.empty_like();
        let mut renumber: Vec<Option<NodeId>> = vec![None; nodes.len()];
        for (i, node) in nodes.into_iter().enumerate() {
            if !live[i] {
                continue;
            }
            let inputs = node
                .inputs
                .iter()
                .filter_map(|input| renumber[input.index()])
                .collect();
            renumber[i] = Some(result.add_node(node.kind, inputs));
        }

        debug!(
            "Canonicalized {} nodes down to {}",
            before,
            result.node_count()
        );
        Ok(result)
    }
}
