use serde::{Deserialize, Serialize};

/// Stack bytecode understood by the reference graph builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    Const(i64),
    Load(u16),
    Store(u16),
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Dup,
    Pop,
    /// Call `callee` with `argc` arguments popped from the stack. Virtual
    /// calls may be devirtualized under an assumption.
    Invoke {
        callee: String,
        argc: u8,
        virtual_call: bool,
    },
    Return,
    ReturnVoid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytecode {
    /// Number of incoming arguments, bound to locals `0..parameters`.
    pub parameters: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
}

impl Bytecode {
    pub fn new(parameters: u16, max_locals: u16, instructions: Vec<Instruction>) -> Self {
        Self {
            parameters,
            max_locals: max_locals.max(parameters),
            instructions,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
