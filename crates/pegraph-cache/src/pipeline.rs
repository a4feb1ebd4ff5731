use crate::concurrent::ConcurrentGraphProvider;
use crate::provider::CachingGraphProvider;
use pegraph_core::{
    BuildRequest, BytecodeProvider, Canonicalizer, EncodedGraph, GraphBuilder, GraphEncoder,
    GraphError, IntrinsicContext, IntrinsicSource, ProviderConfig, ResolvedMethod, Result,
    StructuredGraph,
};
use pegraph_graph::{BincodeGraphEncoder, BytecodeGraphBuilder, CanonicalizerPhase};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Parse → canonicalize → encode, with the collaborators and settings fixed
/// at provider construction.
pub(crate) struct BuildPipeline<M: ResolvedMethod> {
    pub(crate) config: ProviderConfig,
    bytecode: Arc<dyn BytecodeProvider<M>>,
    builder: Arc<dyn GraphBuilder<M>>,
    canonicalizer: Arc<dyn Canonicalizer<M>>,
    encoder: Arc<dyn GraphEncoder<M>>,
}

impl<M: ResolvedMethod> BuildPipeline<M> {
    /// Builds a fresh encoded graph. Failures come back wrapped in
    /// `GraphError::BuildFailed` naming the method.
    pub(crate) fn build_graph(
        &self,
        method: &M,
        intrinsic: Option<&IntrinsicSource<M>>,
    ) -> Result<EncodedGraph> {
        let span = info_span!(
            "create_graph",
            method = %method,
            intrinsic = intrinsic.map(|s| s.name()).unwrap_or("none")
        );
        let _enter = span.enter();
        let started = Instant::now();

        match self.run_phases(method, intrinsic) {
            Ok(encoded) => {
                info!(
                    "Built graph for {}: {} nodes, {} bytes in {:?}",
                    method,
                    encoded.node_count(),
                    encoded.size_bytes(),
                    started.elapsed()
                );
                Ok(encoded)
            }
            Err(e) => {
                warn!("Graph build for {} failed: {}", method, e);
                Err(GraphError::build_failed(method, e))
            }
        }
    }

    fn run_phases(&self, method: &M, intrinsic: Option<&IntrinsicSource<M>>) -> Result<EncodedGraph> {
        let graph = StructuredGraph::new(method.clone(), self.config.allow_assumptions.into());
        let intrinsic_context =
            intrinsic.map(|source| IntrinsicContext::inline_after_parsing(method, Arc::clone(source)));

        let request = BuildRequest {
            config: &self.config.builder,
            optimistic: &self.config.optimistic,
            bytecode: self.bytecode.as_ref(),
            intrinsic: intrinsic_context.as_ref(),
        };
        let graph = self.builder.build(graph, &request)?;
        let graph = self
            .canonicalizer
            .canonicalize(graph, &self.config.canonicalizer)?;
        self.encoder.encode(&graph, &self.config.target)
    }
}

/// Wires a provider's collaborators. Unset phases default to the reference
/// implementations in `pegraph-graph`.
pub struct ProviderBuilder<M: ResolvedMethod> {
    config: ProviderConfig,
    bytecode: Arc<dyn BytecodeProvider<M>>,
    builder: Arc<dyn GraphBuilder<M>>,
    canonicalizer: Arc<dyn Canonicalizer<M>>,
    encoder: Arc<dyn GraphEncoder<M>>,
}

impl<M: ResolvedMethod> ProviderBuilder<M> {
    pub fn new(bytecode: Arc<dyn BytecodeProvider<M>>) -> Self {
        Self {
            config: ProviderConfig::default(),
            bytecode,
            builder: Arc::new(BytecodeGraphBuilder),
            canonicalizer: Arc::new(CanonicalizerPhase),
            encoder: Arc::new(BincodeGraphEncoder),
        }
    }

    pub fn config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph_builder(mut self, builder: Arc<dyn GraphBuilder<M>>) -> Self {
        self.builder = builder;
        self
    }

    pub fn canonicalizer(mut self, canonicalizer: Arc<dyn Canonicalizer<M>>) -> Self {
        self.canonicalizer = canonicalizer;
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn GraphEncoder<M>>) -> Self {
        self.encoder = encoder;
        self
    }

    fn pipeline(self) -> Result<BuildPipeline<M>> {
        self.config.validate()?;
        Ok(BuildPipeline {
            config: self.config,
            bytecode: self.bytecode,
            builder: self.builder,
            canonicalizer: self.canonicalizer,
            encoder: self.encoder,
        })
    }

    pub fn build(self) -> Result<CachingGraphProvider<M>> {
        Ok(CachingGraphProvider::from_pipeline(self.pipeline()?))
    }

    pub fn build_concurrent(self) -> Result<ConcurrentGraphProvider<M>> {
        Ok(ConcurrentGraphProvider::from_pipeline(self.pipeline()?))
    }
}
