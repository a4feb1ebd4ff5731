use parking_lot::RwLock;
use pegraph_core::{Bytecode, BytecodeProvider, ResolvedMethod, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Named bytecode origin backed by an in-memory table.
pub struct InMemoryBytecodeProvider<M: ResolvedMethod> {
    name: String,
    code: RwLock<HashMap<M, Arc<Bytecode>>>,
}

impl<M: ResolvedMethod> InMemoryBytecodeProvider<M> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: RwLock::new(HashMap::new()),
        }
    }

    pub fn with(self, method: M, bytecode: Bytecode) -> Self {
        self.insert(method, bytecode);
        self
    }

    pub fn insert(&self, method: M, bytecode: Bytecode) {
        self.code.write().insert(method, Arc::new(bytecode));
    }

    pub fn remove(&self, method: &M) -> Option<Arc<Bytecode>> {
        self.code.write().remove(method)
    }

    pub fn len(&self) -> usize {
        self.code.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.read().is_empty()
    }
}

impl<M: ResolvedMethod> BytecodeProvider<M> for InMemoryBytecodeProvider<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn code(&self, method: &M) -> Result<Option<Arc<Bytecode>>> {
        Ok(self.code.read().get(method).cloned())
    }
}
