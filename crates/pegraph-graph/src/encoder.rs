use pegraph_core::{
    EncodedGraph, GraphEncoder, GraphError, GraphSnapshot, ResolvedMethod, Result,
    StructuredGraph, TargetDescription,
};
use tracing::{debug, instrument};

/// Encodes graph snapshots with bincode, byte order chosen by the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeGraphEncoder;

impl BincodeGraphEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl<M: ResolvedMethod> GraphEncoder<M> for BincodeGraphEncoder {
    #[instrument(skip_all, fields(method = %graph.method(), arch = %target.arch))]
    fn encode(
        &self,
        graph: &StructuredGraph<M>,
        target: &TargetDescription,
    ) -> Result<EncodedGraph> {
        for (id, node) in graph.nodes() {
            if let Some(input) = node.inputs.iter().find(|i| i.index() >= id.index()) {
                return Err(GraphError::Encoding(format!(
                    "{} refers to {} which is not defined before it",
                    id, input
                )));
            }
        }

        let encoded = EncodedGraph::encode(GraphSnapshot::of(graph), target)?;
        debug!(
            "Encoded {} nodes into {} bytes",
            encoded.node_count(),
            encoded.size_bytes()
        );
        Ok(encoded)
    }
}
