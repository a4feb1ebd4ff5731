use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A method resolved by the host's method-resolution universe.
///
/// The graph-supply layer only uses it as a cache key and for diagnostics,
/// so equality and hashing must be stable for the lifetime of a provider.
pub trait ResolvedMethod: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync {
    /// Whether the method has executable bytecode (false for native and
    /// abstract methods).
    fn has_bytecodes(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_native: bool,
    pub is_abstract: bool,
}

/// Method identity used by the reference collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId {
    pub holder: String,
    pub name: String,
    pub descriptor: String,
    pub modifiers: Modifiers,
}

impl MethodId {
    pub fn new(
        holder: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            holder: holder.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            modifiers: Modifiers::default(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn native(mut self) -> Self {
        self.modifiers.is_native = true;
        self
    }

    pub fn abstract_method(mut self) -> Self {
        self.modifiers.is_abstract = true;
        self
    }
}

impl ResolvedMethod for MethodId {
    fn has_bytecodes(&self) -> bool {
        !self.modifiers.is_native && !self.modifiers.is_abstract
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.holder, self.name, self.descriptor)
    }
}
