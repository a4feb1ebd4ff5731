#![allow(dead_code)]

use anyhow::anyhow;
use pegraph_core::logging::init_tracing;
use pegraph_core::{
    BuildRequest, Bytecode, GraphBuilder, GraphSupplier, Instruction, LoggingConfig, MethodId,
    Result, StructuredGraph,
};
use pegraph_graph::{BytecodeGraphBuilder, InMemoryBytecodeProvider};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, OnceLock, Weak};

pub fn init_logging() {
    init_tracing(&LoggingConfig {
        level: "debug".to_string(),
        ..Default::default()
    });
}

pub fn add() -> MethodId {
    MethodId::new("Arith", "add", "(II)I")
}

pub fn abs() -> MethodId {
    MethodId::new("Math", "abs", "(I)I")
}

pub fn twice() -> MethodId {
    MethodId::new("Arith", "twice", "(I)I")
}

pub fn hash_code() -> MethodId {
    MethodId::new("Object", "hashCode", "()I").native()
}

fn add_body() -> Bytecode {
    Bytecode::new(
        2,
        2,
        vec![
            Instruction::Load(0),
            Instruction::Load(1),
            Instruction::Add,
            Instruction::Return,
        ],
    )
}

/// 0 - x, as the library ships it.
fn abs_body() -> Bytecode {
    Bytecode::new(
        1,
        1,
        vec![
            Instruction::Const(0),
            Instruction::Load(0),
            Instruction::Sub,
            Instruction::Return,
        ],
    )
}

/// Intrinsic replacement for `Math.abs`: -x.
fn abs_intrinsic_body() -> Bytecode {
    Bytecode::new(
        1,
        1,
        vec![Instruction::Load(0), Instruction::Neg, Instruction::Return],
    )
}

fn twice_body() -> Bytecode {
    Bytecode::new(
        1,
        1,
        vec![
            Instruction::Load(0),
            Instruction::Load(0),
            Instruction::Invoke {
                callee: add().to_string(),
                argc: 2,
                virtual_call: false,
            },
            Instruction::Return,
        ],
    )
}

pub fn classpath() -> Arc<InMemoryBytecodeProvider<MethodId>> {
    Arc::new(
        InMemoryBytecodeProvider::new("classpath")
            .with(add(), add_body())
            .with(abs(), abs_body())
            .with(twice(), twice_body()),
    )
}

pub fn intrinsics() -> Arc<InMemoryBytecodeProvider<MethodId>> {
    Arc::new(InMemoryBytecodeProvider::new("intrinsics").with(abs(), abs_intrinsic_body()))
}

/// Reference builder with an invocation counter and an injectable failure.
#[derive(Default)]
pub struct CountingBuilder {
    builds: AtomicUsize,
    fail: AtomicBool,
}

impl CountingBuilder {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl GraphBuilder<MethodId> for CountingBuilder {
    fn build(
        &self,
        graph: StructuredGraph<MethodId>,
        request: &BuildRequest<'_, MethodId>,
    ) -> Result<StructuredGraph<MethodId>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("injected builder failure").into());
        }
        BytecodeGraphBuilder.build(graph, request)
    }
}

/// Builder that looks up other graphs through its own provider before
/// building, the way an inliner would while parsing a caller.
#[derive(Default)]
pub struct NestingBuilder {
    supplier: OnceLock<Weak<dyn GraphSupplier<MethodId>>>,
    nested: Vec<(MethodId, MethodId)>,
    rendezvous: Option<(usize, Barrier)>,
    builds: AtomicUsize,
}

impl NestingBuilder {
    pub fn new(nested: Vec<(MethodId, MethodId)>) -> Self {
        Self {
            nested,
            ..Default::default()
        }
    }

    /// The first `parties` builds meet at a barrier before their nested
    /// lookups, so those builds are all in flight at once.
    pub fn with_rendezvous(mut self, parties: usize) -> Self {
        self.rendezvous = Some((parties, Barrier::new(parties)));
        self
    }

    pub fn attach(&self, supplier: &Arc<dyn GraphSupplier<MethodId>>) {
        let _ = self.supplier.set(Arc::downgrade(supplier));
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl GraphBuilder<MethodId> for NestingBuilder {
    fn build(
        &self,
        graph: StructuredGraph<MethodId>,
        request: &BuildRequest<'_, MethodId>,
    ) -> Result<StructuredGraph<MethodId>> {
        let seq = self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some((parties, barrier)) = &self.rendezvous {
            if seq < *parties {
                barrier.wait();
            }
        }
        if let Some(supplier) = self.supplier.get().and_then(Weak::upgrade) {
            for (caller, callee) in &self.nested {
                if caller == graph.method() {
                    supplier.lookup(callee, None)?;
                }
            }
        }
        BytecodeGraphBuilder.build(graph, request)
    }
}

/// Builder whose first `parties` invocations finish parsing and then wait
/// for each other, so their builds overlap.
pub struct OverlappingBuilder {
    parties: usize,
    meet: Barrier,
    builds: AtomicUsize,
}

impl OverlappingBuilder {
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            meet: Barrier::new(parties),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl GraphBuilder<MethodId> for OverlappingBuilder {
    fn build(
        &self,
        graph: StructuredGraph<MethodId>,
        request: &BuildRequest<'_, MethodId>,
    ) -> Result<StructuredGraph<MethodId>> {
        let seq = self.builds.fetch_add(1, Ordering::SeqCst);
        let built = BytecodeGraphBuilder.build(graph, request)?;
        if seq < self.parties {
            self.meet.wait();
        }
        Ok(built)
    }
}

/// Builder whose first invocation parks until the test releases it, then
/// fails.
pub struct GatedFailingBuilder {
    pub entered: Barrier,
    pub release: Barrier,
    gated: AtomicBool,
    builds: AtomicUsize,
}

impl GatedFailingBuilder {
    pub fn new() -> Self {
        Self {
            entered: Barrier::new(2),
            release: Barrier::new(2),
            gated: AtomicBool::new(true),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl GraphBuilder<MethodId> for GatedFailingBuilder {
    fn build(
        &self,
        graph: StructuredGraph<MethodId>,
        request: &BuildRequest<'_, MethodId>,
    ) -> Result<StructuredGraph<MethodId>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
            return Err(anyhow!("builder gave up").into());
        }
        BytecodeGraphBuilder.build(graph, request)
    }
}
