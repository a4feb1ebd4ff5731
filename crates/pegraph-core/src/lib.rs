//! Core types and collaborator contracts for the PEGraph graph-supply layer.
//!
//! - `method`: method identities used as cache keys
//! - `graph`: the mutable IR graph built for one method
//! - `encoded`: immutable encoded graphs handed to the inlining decoder
//! - `traits`: builder, canonicalizer, encoder and supplier contracts

pub mod bytecode;
pub mod config;
pub mod encoded;
pub mod error;
pub mod graph;
pub mod logging;
pub mod method;
pub mod target;
pub mod traits;

pub use bytecode::*;
pub use config::*;
pub use encoded::*;
pub use error::*;
pub use graph::*;
pub use method::*;
pub use target::*;
pub use traits::*;
