//! Immutable encoded graphs and the snapshot format they carry.

use crate::graph::{Assumption, Node, StructuredGraph};
use crate::target::TargetDescription;
use crate::{GraphError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Structural content of a graph: nodes with their input edges, plus the
/// assumptions and intrinsic origin the graph was built under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub method: String,
    pub nodes: Vec<Node>,
    pub assumptions: Vec<Assumption>,
    pub intrinsic_origin: Option<String>,
}

impl GraphSnapshot {
    pub fn of<M: fmt::Display>(graph: &StructuredGraph<M>) -> Self {
        Self {
            method: graph.method().to_string(),
            nodes: graph.nodes().map(|(_, n)| n.clone()).collect(),
            assumptions: graph.assumptions().to_vec(),
            intrinsic_origin: graph.intrinsic_origin().map(str::to_owned),
        }
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.inputs.len()).sum()
    }

    fn encode_bytes(&self, target: &TargetDescription) -> Result<Vec<u8>> {
        let config = bincode::config::standard();
        let encoded = if target.big_endian {
            bincode::serde::encode_to_vec(self, config.with_big_endian())
        } else {
            bincode::serde::encode_to_vec(self, config)
        };
        encoded.map_err(|e| GraphError::Encoding(e.to_string()))
    }

    fn decode_bytes(bytes: &[u8], target: &TargetDescription) -> Result<Self> {
        let config = bincode::config::standard();
        let decoded = if target.big_endian {
            bincode::serde::decode_from_slice::<Self, _>(bytes, config.with_big_endian())
        } else {
            bincode::serde::decode_from_slice::<Self, _>(bytes, config)
        };
        decoded
            .map(|(snapshot, _)| snapshot)
            .map_err(|e| GraphError::Encoding(e.to_string()))
    }
}

/// Compact, self-contained, immutable form of an IR graph.
#[derive(Clone)]
pub struct EncodedGraph {
    method: String,
    target: TargetDescription,
    node_count: usize,
    assumptions: Vec<Assumption>,
    intrinsic_origin: Option<String>,
    payload: Bytes,
    fingerprint: [u8; 32],
}

impl EncodedGraph {
    pub fn encode(snapshot: GraphSnapshot, target: &TargetDescription) -> Result<Self> {
        let payload = Bytes::from(snapshot.encode_bytes(target)?);
        let fingerprint: [u8; 32] = Sha256::digest(&payload).into();
        Ok(Self {
            method: snapshot.method,
            target: target.clone(),
            node_count: snapshot.nodes.len(),
            assumptions: snapshot.assumptions,
            intrinsic_origin: snapshot.intrinsic_origin,
            payload,
            fingerprint,
        })
    }

    pub fn decode(&self) -> Result<GraphSnapshot> {
        GraphSnapshot::decode_bytes(&self.payload, &self.target)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &TargetDescription {
        &self.target
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn assumptions(&self) -> &[Assumption] {
        &self.assumptions
    }

    pub fn intrinsic_origin(&self) -> Option<&str> {
        self.intrinsic_origin.as_deref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }

    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    pub fn fingerprint_hex(&self) -> String {
        self.fingerprint.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Same node/edge content encoded for the same target.
    pub fn structurally_eq(&self, other: &EncodedGraph) -> bool {
        self.target == other.target && self.fingerprint == other.fingerprint
    }
}

impl fmt::Debug for EncodedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedGraph")
            .field("method", &self.method)
            .field("arch", &self.target.arch)
            .field("nodes", &self.node_count)
            .field("bytes", &self.payload.len())
            .field("fingerprint", &self.fingerprint_hex())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AllowAssumptions, BinaryOp, NodeKind};
    use crate::target::Architecture;

    fn sample() -> StructuredGraph<&'static str> {
        let mut g = StructuredGraph::new("Foo.add(II)I", AllowAssumptions::Yes);
        let a = g.add_node(NodeKind::Parameter(0), vec![]);
        let b = g.add_node(NodeKind::Parameter(1), vec![]);
        let sum = g.add_node(NodeKind::Binary(BinaryOp::Add), vec![a, b]);
        g.add_node(NodeKind::Return { has_value: true }, vec![sum]);
        g
    }

    #[test]
    fn decode_recovers_snapshot_for_either_endianness() {
        let snapshot = GraphSnapshot::of(&sample());
        for big_endian in [false, true] {
            let target = TargetDescription {
                arch: Architecture::Aarch64,
                big_endian,
            };
            let encoded = EncodedGraph::encode(snapshot.clone(), &target).unwrap();
            assert_eq!(encoded.node_count(), 4);
            assert_eq!(encoded.decode().unwrap(), snapshot);
        }
    }

    #[test]
    fn fingerprint_tracks_content() {
        let target = TargetDescription::default();
        let a = EncodedGraph::encode(GraphSnapshot::of(&sample()), &target).unwrap();
        let b = EncodedGraph::encode(GraphSnapshot::of(&sample()), &target).unwrap();
        assert!(a.structurally_eq(&b));

        let mut other = sample();
        other.add_node(NodeKind::Constant(1), vec![]);
        let c = EncodedGraph::encode(GraphSnapshot::of(&other), &target).unwrap();
        assert!(!a.structurally_eq(&c));
        assert_eq!(a.fingerprint_hex().len(), 64);
    }
}
