use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    /// Folds two constants. Division and remainder by zero do not fold.
    pub fn fold(self, x: i64, y: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => Some(x.wrapping_add(y)),
            BinaryOp::Sub => Some(x.wrapping_sub(y)),
            BinaryOp::Mul => Some(x.wrapping_mul(y)),
            BinaryOp::Div if y == 0 => None,
            BinaryOp::Div => Some(x.wrapping_div(y)),
            BinaryOp::Rem if y == 0 => None,
            BinaryOp::Rem => Some(x.wrapping_rem(y)),
            BinaryOp::And => Some(x & y),
            BinaryOp::Or => Some(x | y),
            BinaryOp::Xor => Some(x ^ y),
            BinaryOp::Shl => Some(x.wrapping_shl((y & 63) as u32)),
            BinaryOp::Shr => Some(x.wrapping_shr((y & 63) as u32)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Parameter(u16),
    Constant(i64),
    Binary(BinaryOp),
    Negate,
    Invoke { callee: String, direct: bool },
    Return { has_value: bool },
}

impl NodeKind {
    /// Side-effecting or control nodes that anchor liveness.
    pub fn is_anchor(&self) -> bool {
        matches!(self, NodeKind::Invoke { .. } | NodeKind::Return { .. })
    }

    pub fn as_constant(&self) -> Option<i64> {
        match self {
            NodeKind::Constant(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub inputs: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Assumption {
    /// The named callee has a single concrete implementation.
    ConcreteMethod { callee: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllowAssumptions {
    Yes,
    No,
}

impl From<bool> for AllowAssumptions {
    fn from(allow: bool) -> Self {
        if allow {
            AllowAssumptions::Yes
        } else {
            AllowAssumptions::No
        }
    }
}

/// Mutable IR graph scoped to a single method while it is being built.
#[derive(Debug, Clone)]
pub struct StructuredGraph<M> {
    method: M,
    allow_assumptions: AllowAssumptions,
    intrinsic_origin: Option<String>,
    nodes: Vec<Node>,
    assumptions: Vec<Assumption>,
}

impl<M> StructuredGraph<M> {
    pub fn new(method: M, allow_assumptions: AllowAssumptions) -> Self {
        Self {
            method,
            allow_assumptions,
            intrinsic_origin: None,
            nodes: Vec::new(),
            assumptions: Vec::new(),
        }
    }

    pub fn method(&self) -> &M {
        &self.method
    }

    pub fn allow_assumptions(&self) -> AllowAssumptions {
        self.allow_assumptions
    }

    pub fn intrinsic_origin(&self) -> Option<&str> {
        self.intrinsic_origin.as_deref()
    }

    pub fn set_intrinsic_origin(&mut self, origin: impl Into<String>) {
        self.intrinsic_origin = Some(origin.into());
    }

    pub fn add_node(&mut self, kind: NodeKind, inputs: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, inputs });
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Records an assumption the graph depends on. Returns `false` (and
    /// records nothing) when the graph does not allow assumptions.
    pub fn record_assumption(&mut self, assumption: Assumption) -> bool {
        if self.allow_assumptions == AllowAssumptions::No {
            return false;
        }
        if !self.assumptions.contains(&assumption) {
            self.assumptions.push(assumption);
        }
        true
    }

    pub fn assumptions(&self) -> &[Assumption] {
        &self.assumptions
    }

    /// A node-less graph carrying the same method, flags and assumptions.
    pub fn empty_like(&self) -> Self
    where
        M: Clone,
    {
        Self {
            method: self.method.clone(),
            allow_assumptions: self.allow_assumptions,
            intrinsic_origin: self.intrinsic_origin.clone(),
            nodes: Vec::new(),
            assumptions: self.assumptions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assumptions_are_dropped_when_not_allowed() {
        let mut g = StructuredGraph::new("m", AllowAssumptions::No);
        let recorded = g.record_assumption(Assumption::ConcreteMethod {
            callee: "A.f()V".into(),
        });
        assert!(!recorded);
        assert!(g.assumptions().is_empty());

        let mut g = StructuredGraph::new("m", AllowAssumptions::Yes);
        let a = Assumption::ConcreteMethod {
            callee: "A.f()V".into(),
        };
        assert!(g.record_assumption(a.clone()));
        assert!(g.record_assumption(a));
        assert_eq!(g.assumptions().len(), 1);
    }

    #[test]
    fn fold_skips_division_by_zero() {
        assert_eq!(BinaryOp::Div.fold(7, 0), None);
        assert_eq!(BinaryOp::Rem.fold(7, 0), None);
        assert_eq!(BinaryOp::Div.fold(i64::MIN, -1), Some(i64::MIN));
        assert_eq!(BinaryOp::Shl.fold(1, 65), Some(2));
    }
}
