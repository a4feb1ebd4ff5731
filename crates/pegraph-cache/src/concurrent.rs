use crate::pipeline::{BuildPipeline, ProviderBuilder};
use crate::stats::{CacheStats, StatsCollector};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use pegraph_core::{
    BytecodeProvider, EncodedGraph, GraphError, GraphSupplier, IntrinsicSource, ProviderConfig,
    ResolvedMethod, Result, TargetDescription,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::debug;

type Outcome = std::result::Result<Arc<EncodedGraph>, String>;

/// A build in progress. Waiters block on `done` until the owner publishes
/// an outcome.
struct InFlight {
    owner: ThreadId,
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            owner: thread::current().id(),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.outcome.lock().is_some()
    }

    fn publish(&self, outcome: Outcome) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }
}

#[derive(Clone)]
enum Slot {
    Ready(Arc<EncodedGraph>),
    Building(Arc<InFlight>),
}

/// Clears the in-flight marker if the owning build unwinds before
/// publishing, so waiters are released and a later lookup can retry.
struct FlightGuard<'a, M: ResolvedMethod> {
    slots: &'a DashMap<M, Slot>,
    method: &'a M,
    flight: Arc<InFlight>,
    published: bool,
}

impl<M: ResolvedMethod> FlightGuard<'_, M> {
    fn clear_marker(&self) {
        self.slots.remove_if(self.method, |_, slot| {
            matches!(slot, Slot::Building(f) if Arc::ptr_eq(f, &self.flight))
        });
    }

    fn succeed(mut self, graph: Arc<EncodedGraph>) {
        self.slots
            .insert(self.method.clone(), Slot::Ready(Arc::clone(&graph)));
        self.flight.publish(Ok(graph));
        self.published = true;
    }

    fn fail(mut self, reason: String) {
        self.clear_marker();
        self.flight.publish(Err(reason));
        self.published = true;
    }
}

impl<M: ResolvedMethod> Drop for FlightGuard<'_, M> {
    fn drop(&mut self) {
        if !self.published {
            self.clear_marker();
            self.flight
                .publish(Err("builder unwound before finishing".to_string()));
        }
    }
}

/// Which in-flight build each blocked thread is waiting for.
type WaitsFor = Mutex<HashMap<ThreadId, Arc<InFlight>>>;

/// True if waiting on `flight` would close a chain of builders that ends
/// with `me`.
fn closes_cycle(
    waits: &HashMap<ThreadId, Arc<InFlight>>,
    flight: &InFlight,
    me: ThreadId,
) -> bool {
    let mut owner = flight.owner;
    for _ in 0..=waits.len() {
        if owner == me {
            return true;
        }
        match waits.get(&owner) {
            Some(next) if !next.is_done() => owner = next.owner,
            _ => return false,
        }
    }
    false
}

/// Removes the calling thread from the waits-for table when its wait ends.
struct WaitRegistration<'a> {
    waits: &'a WaitsFor,
    thread: ThreadId,
}

impl Drop for WaitRegistration<'_> {
    fn drop(&mut self) {
        self.waits.lock().remove(&self.thread);
    }
}

/// Graph provider for parallel compilation: concurrent lookups of the same
/// method share one build (single flight).
///
/// A lookup that would wait on a build which, directly or through other
/// waiting threads, is waiting on the caller fails with
/// `GraphError::CyclicBuild` instead of blocking. This covers both a thread
/// re-entering its own build and two threads whose builds need each other.
pub struct ConcurrentGraphProvider<M: ResolvedMethod> {
    pipeline: BuildPipeline<M>,
    slots: DashMap<M, Slot>,
    waits: WaitsFor,
    stats: StatsCollector,
}

impl<M: ResolvedMethod> ConcurrentGraphProvider<M> {
    pub fn builder(bytecode: Arc<dyn BytecodeProvider<M>>) -> ProviderBuilder<M> {
        ProviderBuilder::new(bytecode)
    }

    pub fn with_defaults(
        bytecode: Arc<dyn BytecodeProvider<M>>,
        config: ProviderConfig,
    ) -> Result<Self> {
        ProviderBuilder::new(bytecode)
            .config(config)
            .build_concurrent()
    }

    pub(crate) fn from_pipeline(pipeline: BuildPipeline<M>) -> Self {
        Self {
            pipeline,
            slots: DashMap::new(),
            waits: Mutex::new(HashMap::new()),
            stats: StatsCollector::default(),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.pipeline.config
    }

    pub fn target(&self) -> &TargetDescription {
        &self.pipeline.config.target
    }

    pub fn cached(&self, method: &M) -> Option<Arc<EncodedGraph>> {
        match self.slots.get(method).map(|slot| slot.value().clone()) {
            Some(Slot::Ready(graph)) => Some(graph),
            _ => None,
        }
    }

    pub fn contains(&self, method: &M) -> bool {
        self.cached(method).is_some()
    }

    /// Number of stored graphs; builds in progress are not counted.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    /// Threads currently blocked on another thread's build.
    pub fn waiting(&self) -> usize {
        self.waits.lock().len()
    }

    fn await_peer(
        &self,
        method: &M,
        flight: &Arc<InFlight>,
    ) -> Result<Option<Arc<EncodedGraph>>> {
        let outcome = self.wait_for(method, flight);
        match outcome {
            Ok(_) => self.stats.record_hit(),
            Err(_) => self.stats.record_miss(),
        }
        outcome
    }

    fn wait_for(&self, method: &M, flight: &Arc<InFlight>) -> Result<Option<Arc<EncodedGraph>>> {
        let me = thread::current().id();
        let _registration = {
            let mut waits = self.waits.lock();
            if closes_cycle(&waits, flight, me) {
                debug!(
                    "Refusing to wait on {}: its build depends on this thread",
                    method
                );
                return Err(GraphError::CyclicBuild {
                    method: method.to_string(),
                });
            }
            waits.insert(me, Arc::clone(flight));
            WaitRegistration {
                waits: &self.waits,
                thread: me,
            }
        };

        debug!("Waiting for in-flight build of {}", method);
        let mut outcome = flight.outcome.lock();
        loop {
            match outcome.as_ref() {
                Some(Ok(graph)) => return Ok(Some(Arc::clone(graph))),
                Some(Err(reason)) => {
                    return Err(GraphError::PeerBuildFailed {
                        method: method.to_string(),
                        reason: reason.clone(),
                    })
                }
                None => flight.done.wait(&mut outcome),
            }
        }
    }
}

impl<M: ResolvedMethod> GraphSupplier<M> for ConcurrentGraphProvider<M> {
    fn lookup(
        &self,
        method: &M,
        intrinsic: Option<&IntrinsicSource<M>>,
    ) -> Result<Option<Arc<EncodedGraph>>> {
        let existing = self.slots.get(method).map(|slot| slot.value().clone());
        match existing {
            Some(Slot::Ready(graph)) => {
                self.stats.record_hit();
                debug!("Graph cache hit: {}", method);
                return Ok(Some(graph));
            }
            Some(Slot::Building(flight)) => return self.await_peer(method, &flight),
            None => {}
        }

        if !method.has_bytecodes() {
            self.stats.record_miss();
            self.stats.record_absent();
            debug!("No bytecode for {}, nothing to inline", method);
            return Ok(None);
        }

        let flight = match self.slots.entry(method.clone()) {
            Entry::Occupied(entry) => {
                let slot = entry.get().clone();
                drop(entry);
                return match slot {
                    Slot::Ready(graph) => {
                        self.stats.record_hit();
                        Ok(Some(graph))
                    }
                    Slot::Building(flight) => self.await_peer(method, &flight),
                };
            }
            Entry::Vacant(entry) => {
                let flight = Arc::new(InFlight::new());
                entry.insert(Slot::Building(Arc::clone(&flight)));
                flight
            }
        };
        self.stats.record_miss();

        let guard = FlightGuard {
            slots: &self.slots,
            method,
            flight,
            published: false,
        };
        match self.pipeline.build_graph(method, intrinsic) {
            Ok(encoded) => {
                self.stats.record_build();
                let graph = Arc::new(encoded);
                guard.succeed(Arc::clone(&graph));
                Ok(Some(graph))
            }
            Err(e) => {
                self.stats.record_failure();
                guard.fail(e.to_string());
                Err(e)
            }
        }
    }
}
