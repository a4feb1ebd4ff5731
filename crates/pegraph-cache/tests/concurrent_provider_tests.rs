mod common;

use common::*;
use pegraph_cache::{ConcurrentGraphProvider, GraphError, GraphSupplier, IntrinsicSource};
use pegraph_core::{MethodId, ProviderConfig};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;

fn counted_provider() -> (ConcurrentGraphProvider<MethodId>, Arc<CountingBuilder>) {
    let builder = Arc::new(CountingBuilder::default());
    let provider = ConcurrentGraphProvider::builder(classpath())
        .graph_builder(builder.clone())
        .build_concurrent()
        .unwrap();
    (provider, builder)
}

#[test]
fn repeated_lookup_returns_same_graph() {
    let (provider, builder) = counted_provider();

    let first = provider.lookup(&add(), None).unwrap().unwrap();
    let second = provider.lookup(&add(), None).unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builder.builds(), 1);
    assert_eq!(provider.len(), 1);
}

#[test]
fn concurrent_lookups_share_one_build() {
    init_logging();
    let (provider, builder) = counted_provider();
    let start = Barrier::new(THREADS);

    let graphs: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    provider.lookup(&twice(), None).unwrap().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(builder.builds(), 1);
    assert!(graphs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

    let stats = provider.stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.hits + stats.misses, THREADS as u64);
}

#[test]
fn distinct_methods_build_independently() {
    let (provider, builder) = counted_provider();
    let methods = [add(), abs(), twice()];
    let start = Barrier::new(methods.len() * 2);

    thread::scope(|s| {
        for method in methods.iter().chain(methods.iter()) {
            let (provider, start) = (&provider, &start);
            s.spawn(move || {
                start.wait();
                provider.lookup(method, None).unwrap().unwrap();
            });
        }
    });

    assert_eq!(builder.builds(), methods.len());
    assert_eq!(provider.len(), methods.len());
}

#[test]
fn waiter_observes_builder_failure_then_retry_succeeds() {
    let builder = Arc::new(GatedFailingBuilder::new());
    let provider = ConcurrentGraphProvider::builder(classpath())
        .graph_builder(builder.clone())
        .build_concurrent()
        .unwrap();

    thread::scope(|s| {
        let owner = s.spawn(|| provider.lookup(&add(), None));
        builder.entered.wait();

        let waiter = s.spawn(|| provider.lookup(&add(), None));
        while provider.waiting() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        builder.release.wait();

        let owner_err = owner.join().unwrap().unwrap_err();
        assert!(matches!(owner_err, GraphError::BuildFailed { .. }));

        match waiter.join().unwrap() {
            Err(GraphError::PeerBuildFailed { method, reason }) => {
                assert_eq!(method, "Arith.add(II)I");
                assert!(reason.contains("builder gave up"));
            }
            other => panic!("unexpected waiter outcome: {other:?}"),
        }
    });

    assert!(!provider.contains(&add()));
    assert_eq!(provider.len(), 0);
    assert_eq!(provider.waiting(), 0);

    let stats = provider.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.failures, 1);

    let retried = provider.lookup(&add(), None).unwrap();
    assert!(retried.is_some());
    assert_eq!(builder.builds(), 2);
}

#[test]
fn same_thread_reentry_is_a_cycle() {
    let builder = Arc::new(NestingBuilder::new(vec![(add(), add())]));
    let provider = Arc::new(
        ConcurrentGraphProvider::builder(classpath())
            .graph_builder(builder.clone())
            .build_concurrent()
            .unwrap(),
    );
    let supplier: Arc<dyn GraphSupplier<MethodId>> = provider.clone();
    builder.attach(&supplier);

    let err = provider.lookup(&add(), None).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        GraphError::CyclicBuild { method } if method == "Arith.add(II)I"
    ));
    assert!(provider.is_empty());
    assert!(!provider.contains(&add()));
    assert_eq!(builder.builds(), 1);
}

#[test]
fn builds_waiting_on_each_other_across_threads_fail_instead_of_hanging() {
    let builder = Arc::new(
        NestingBuilder::new(vec![(add(), abs()), (abs(), add())]).with_rendezvous(2),
    );
    let provider = Arc::new(
        ConcurrentGraphProvider::builder(classpath())
            .graph_builder(builder.clone())
            .build_concurrent()
            .unwrap(),
    );
    let supplier: Arc<dyn GraphSupplier<MethodId>> = provider.clone();
    builder.attach(&supplier);

    let (left, right) = thread::scope(|s| {
        let left = s.spawn(|| provider.lookup(&add(), None));
        let right = s.spawn(|| provider.lookup(&abs(), None));
        (left.join().unwrap(), right.join().unwrap())
    });

    let left = left.unwrap_err();
    let right = right.unwrap_err();
    let cyclic = [&left, &right]
        .iter()
        .filter(|e| matches!(e.root_cause(), GraphError::CyclicBuild { .. }))
        .count();
    assert_eq!(cyclic, 1, "left: {left}, right: {right}");
    for err in [&left, &right] {
        assert!(matches!(
            err.root_cause(),
            GraphError::CyclicBuild { .. } | GraphError::PeerBuildFailed { .. }
        ));
    }

    assert!(provider.is_empty());
    assert_eq!(provider.waiting(), 0);
    assert_eq!(builder.builds(), 2);
}

#[test]
fn waiters_count_as_hits_once_the_build_lands() {
    let (provider, _builder) = counted_provider();
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                provider.lookup(&abs(), None).unwrap();
            });
        }
    });

    let stats = provider.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, THREADS as u64 - 1);
    assert_eq!(stats.builds, 1);
}

#[test]
fn build_may_look_up_other_methods() {
    let builder = Arc::new(NestingBuilder::new(vec![(twice(), add())]));
    let provider = Arc::new(
        ConcurrentGraphProvider::builder(classpath())
            .graph_builder(builder.clone())
            .build_concurrent()
            .unwrap(),
    );
    let supplier: Arc<dyn GraphSupplier<MethodId>> = provider.clone();
    builder.attach(&supplier);

    assert!(provider.lookup(&twice(), None).unwrap().is_some());
    assert!(provider.contains(&add()));
    assert_eq!(provider.len(), 2);
    assert_eq!(builder.builds(), 2);
}

#[test]
fn method_without_bytecode_is_not_cached() {
    let (provider, builder) = counted_provider();

    assert!(provider.lookup(&hash_code(), None).unwrap().is_none());
    assert!(provider.is_empty());
    assert_eq!(builder.builds(), 0);
}

#[test]
fn failure_is_not_cached() {
    let (provider, builder) = counted_provider();
    builder.set_failing(true);
    assert!(provider.lookup(&add(), None).is_err());
    assert!(provider.cached(&add()).is_none());

    builder.set_failing(false);
    assert!(provider.lookup(&add(), None).unwrap().is_some());
    assert_eq!(builder.builds(), 2);
    assert_eq!(provider.stats().failures, 1);
}

#[test]
fn matches_single_threaded_provider_output() {
    let intrinsic: IntrinsicSource<MethodId> = intrinsics();
    let concurrent =
        ConcurrentGraphProvider::with_defaults(classpath(), ProviderConfig::default()).unwrap();
    let caching =
        pegraph_cache::CachingGraphProvider::with_defaults(classpath(), ProviderConfig::default())
            .unwrap();

    let a = concurrent.lookup(&abs(), Some(&intrinsic)).unwrap().unwrap();
    let b = caching.lookup(&abs(), Some(&intrinsic)).unwrap().unwrap();
    assert!(a.structurally_eq(&b));
}
