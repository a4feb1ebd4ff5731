use crate::pipeline::{BuildPipeline, ProviderBuilder};
use crate::stats::{CacheStats, StatsCollector};
use parking_lot::RwLock;
use pegraph_core::{
    BytecodeProvider, EncodedGraph, GraphSupplier, IntrinsicSource, ProviderConfig,
    ResolvedMethod, Result, TargetDescription,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Graph provider that builds each method's encoded graph on first lookup and
/// serves the cached graph afterwards.
///
/// Lookups are expected to come from one logical thread, possibly
/// recursively from inside a build. The cache lock is never held while a
/// graph is being built. Overlapping builds of the same method are not
/// coalesced; the first graph stored wins and later builds are discarded.
/// Use [`crate::ConcurrentGraphProvider`] when lookups run in parallel.
pub struct CachingGraphProvider<M: ResolvedMethod> {
    pipeline: BuildPipeline<M>,
    graph_cache: RwLock<HashMap<M, Arc<EncodedGraph>>>,
    stats: StatsCollector,
}

impl<M: ResolvedMethod> CachingGraphProvider<M> {
    pub fn builder(bytecode: Arc<dyn BytecodeProvider<M>>) -> ProviderBuilder<M> {
        ProviderBuilder::new(bytecode)
    }

    /// Provider using the reference builder, canonicalizer and encoder.
    pub fn with_defaults(
        bytecode: Arc<dyn BytecodeProvider<M>>,
        config: ProviderConfig,
    ) -> Result<Self> {
        ProviderBuilder::new(bytecode).config(config).build()
    }

    pub(crate) fn from_pipeline(pipeline: BuildPipeline<M>) -> Self {
        Self {
            pipeline,
            graph_cache: RwLock::new(HashMap::new()),
            stats: StatsCollector::default(),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.pipeline.config
    }

    pub fn target(&self) -> &TargetDescription {
        &self.pipeline.config.target
    }

    /// The cached graph for `method`, without building it.
    pub fn cached(&self, method: &M) -> Option<Arc<EncodedGraph>> {
        self.graph_cache.read().get(method).cloned()
    }

    pub fn contains(&self, method: &M) -> bool {
        self.graph_cache.read().contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.graph_cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph_cache.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }
}

impl<M: ResolvedMethod> GraphSupplier<M> for CachingGraphProvider<M> {
    fn lookup(
        &self,
        method: &M,
        intrinsic: Option<&IntrinsicSource<M>>,
    ) -> Result<Option<Arc<EncodedGraph>>> {
        let cached = self.cached(method);
        if let Some(graph) = cached {
            self.stats.record_hit();
            debug!("Graph cache hit: {}", method);
            return Ok(Some(graph));
        }

        self.stats.record_miss();
        if !method.has_bytecodes() {
            self.stats.record_absent();
            debug!("No bytecode for {}, nothing to inline", method);
            return Ok(None);
        }

        let encoded = match self.pipeline.build_graph(method, intrinsic) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.stats.record_failure();
                return Err(e);
            }
        };
        self.stats.record_build();

        let mut cache = self.graph_cache.write();
        if let Some(existing) = cache.get(method) {
            debug!("Discarding duplicate build of {}", method);
            return Ok(Some(Arc::clone(existing)));
        }
        let graph = Arc::new(encoded);
        cache.insert(method.clone(), Arc::clone(&graph));
        Ok(Some(graph))
    }
}
