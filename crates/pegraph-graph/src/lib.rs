//! Reference build phases for PEGraph.
//!
//! - `builder`: stack bytecode → `StructuredGraph`
//! - `canonicalizer`: single-pass folding and dead-node removal
//! - `encoder`: `StructuredGraph` → `EncodedGraph`
//! - `bytecode_store`: in-memory `BytecodeProvider`

pub mod builder;
pub mod bytecode_store;
pub mod canonicalizer;
pub mod encoder;

pub use builder::*;
pub use bytecode_store::*;
pub use canonicalizer::*;
pub use encoder::*;
