use crate::bytecode::Bytecode;
use crate::config::{GraphBuilderConfig, OptimisticOptimizations, PhaseContext};
use crate::encoded::EncodedGraph;
use crate::graph::StructuredGraph;
use crate::method::ResolvedMethod;
use crate::target::TargetDescription;
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// An origin of method bytecode: the methods' own code, or a substitute
/// used by compiler intrinsics.
pub trait BytecodeProvider<M: ResolvedMethod>: Send + Sync {
    fn name(&self) -> &str;

    fn code(&self, method: &M) -> Result<Option<Arc<Bytecode>>>;
}

/// Alternate bytecode origin for a method substituted by an intrinsic.
pub type IntrinsicSource<M> = Arc<dyn BytecodeProvider<M>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationContext {
    /// The substitute body is parsed as the method's own body and stays
    /// eligible for inlining at the same depth as normal parsing.
    InlineAfterParsing,
}

/// Marks a graph whose body comes from substitute bytecode.
#[derive(Clone)]
pub struct IntrinsicContext<M: ResolvedMethod> {
    pub original: M,
    pub intrinsic: M,
    pub bytecode: IntrinsicSource<M>,
    pub mode: CompilationContext,
}

impl<M: ResolvedMethod> IntrinsicContext<M> {
    pub fn inline_after_parsing(method: &M, bytecode: IntrinsicSource<M>) -> Self {
        Self {
            original: method.clone(),
            intrinsic: method.clone(),
            bytecode,
            mode: CompilationContext::InlineAfterParsing,
        }
    }
}

impl<M: ResolvedMethod> fmt::Debug for IntrinsicContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrinsicContext")
            .field("original", &self.original)
            .field("intrinsic", &self.intrinsic)
            .field("bytecode", &self.bytecode.name())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Everything a builder needs besides the graph itself.
pub struct BuildRequest<'a, M: ResolvedMethod> {
    pub config: &'a GraphBuilderConfig,
    pub optimistic: &'a OptimisticOptimizations,
    pub bytecode: &'a dyn BytecodeProvider<M>,
    pub intrinsic: Option<&'a IntrinsicContext<M>>,
}

impl<M: ResolvedMethod> BuildRequest<'_, M> {
    /// The provider the method body is read from.
    pub fn code_source(&self) -> &dyn BytecodeProvider<M> {
        match self.intrinsic {
            Some(ctx) => ctx.bytecode.as_ref(),
            None => self.bytecode,
        }
    }
}

/// Populates an empty graph from bytecode.
pub trait GraphBuilder<M: ResolvedMethod>: Send + Sync {
    fn build(
        &self,
        graph: StructuredGraph<M>,
        request: &BuildRequest<'_, M>,
    ) -> Result<StructuredGraph<M>>;
}

/// A single simplification pass over a populated graph.
pub trait Canonicalizer<M: ResolvedMethod>: Send + Sync {
    fn canonicalize(
        &self,
        graph: StructuredGraph<M>,
        context: &PhaseContext,
    ) -> Result<StructuredGraph<M>>;
}

/// Turns a finished graph into its immutable encoded form. Must be a pure
/// function of the graph content and target.
pub trait GraphEncoder<M: ResolvedMethod>: Send + Sync {
    fn encode(&self, graph: &StructuredGraph<M>, target: &TargetDescription)
        -> Result<EncodedGraph>;
}

/// Supplies encoded graphs to an inlining decoder.
///
/// `Ok(None)` means the method has no bytecode and there is nothing to
/// inline. Errors are fatal to the current compilation attempt.
pub trait GraphSupplier<M: ResolvedMethod>: Send + Sync {
    fn lookup(
        &self,
        method: &M,
        intrinsic: Option<&IntrinsicSource<M>>,
    ) -> Result<Option<Arc<EncodedGraph>>>;
}
