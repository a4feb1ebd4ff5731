//! Encoded-graph providers for the partial-evaluation inliner.
//!
//! A provider answers "give me the encoded graph for this method", building
//! it on first request (parse, canonicalize, encode) and serving the cached
//! result afterwards.
//!
//! - `provider`: `CachingGraphProvider`, the single-threaded memoizing provider
//! - `concurrent`: `ConcurrentGraphProvider`, single-flight builds for parallel lookups
//! - `pipeline`: the build pipeline and `ProviderBuilder`
//! - `stats`: hit/miss/build counters

pub mod concurrent;
pub mod pipeline;
pub mod provider;
pub mod stats;

pub use concurrent::ConcurrentGraphProvider;
pub use pipeline::ProviderBuilder;
pub use provider::CachingGraphProvider;
pub use stats::CacheStats;

pub use pegraph_core::{EncodedGraph, GraphError, GraphSupplier, IntrinsicSource, Result};
