use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Symmetric content similarity.
    Similar,
    /// Directed: source should be read before target.
    Prerequisite,
    /// Directed: source cites target.
    Citation,
}

impl EdgeKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similar => "similar",
            Self::Prerequisite => "prerequisite",
            Self::Citation => "citation",
        }
    }

    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::Similar)
    }
}

impl std::str::FromStr for EdgeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "similar" => Ok(Self::Similar),
            "prerequisite" => Ok(Self::Prerequisite),
            "citation" => Ok(Self::Citation),
            _ => Err(Error::Configuration(format!("unknown edge kind: {s}"))),
        }
    }
}

/// A scored relation between two documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReferenceEdge {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub score: f64,
    pub kind: EdgeKind,
}

impl CrossReferenceEdge {
    /// Self-loops are rejected at construction, so the graph never has to
    /// repair them.
    pub fn new(source_id: Uuid, target_id: Uuid, score: f64, kind: EdgeKind) -> Result<Self> {
        if source_id == target_id {
            return Err(Error::GraphCorruption(format!(
                "self-loop edge on document {source_id}"
            )));
        }
        if !(0.0..=1.0).contains(&score) {
            return Err(Error::GraphCorruption(format!(
                "edge score {score} outside [0, 1]"
            )));
        }

        Ok(Self {
            source_id,
            target_id,
            score,
            kind,
        })
    }

    #[must_use]
    pub fn touches(&self, id: Uuid) -> bool {
        self.source_id == id || self.target_id == id
    }

    #[must_use]
    pub fn other(&self, id: Uuid) -> Uuid {
        if self.source_id == id {
            self.target_id
        } else {
            self.source_id
        }
    }
}

/// Point-in-time view handed to external consumers (dashboard, CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Uuid>,
    pub edges: Vec<CrossReferenceEdge>,
}

/// Document id → incident edges.
///
/// Edge-set mutation for one document is transactional: `replace_edges`
/// validates everything before touching state, so a failure leaves the
/// prior graph untouched.
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    edges: HashMap<Uuid, Vec<CrossReferenceEdge>>,
}

impl KnowledgeGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace all edges incident to `doc_id`.
    ///
    /// Every edge must touch `doc_id`; symmetric edges are mirrored onto
    /// the peer's entry so lookups from either endpoint agree. Validation
    /// happens up front; state changes only after it passes in full.
    pub fn replace_edges(&mut self, doc_id: Uuid, edges: Vec<CrossReferenceEdge>) -> Result<()> {
        for edge in &edges {
            if !edge.touches(doc_id) {
                return Err(Error::GraphCorruption(format!(
                    "edge {} -> {} does not touch document {doc_id}",
                    edge.source_id, edge.target_id
                )));
            }
            if edge.source_id == edge.target_id {
                return Err(Error::GraphCorruption(format!(
                    "self-loop edge on document {doc_id}"
                )));
            }
        }

        // Drop the old incident set from both endpoints.
        let old = self.edges.remove(&doc_id).unwrap_or_default();
        for edge in &old {
            let peer = edge.other(doc_id);
            if let Some(peer_edges) = self.edges.get_mut(&peer) {
                peer_edges.retain(|e| !e.touches(doc_id));
            }
        }

        for edge in &edges {
            let peer = edge.other(doc_id);
            if edge.kind.is_symmetric() {
                self.edges.entry(peer).or_default().push(edge.clone());
            }
        }
        self.edges.insert(doc_id, edges);

        Ok(())
    }

    /// Remove a document and exactly its incident edges.
    pub fn remove_document(&mut self, doc_id: Uuid) {
        let removed = self.edges.remove(&doc_id).unwrap_or_default();
        for edge in &removed {
            let peer = edge.other(doc_id);
            if let Some(peer_edges) = self.edges.get_mut(&peer) {
                peer_edges.retain(|e| !e.touches(doc_id));
            }
        }
        // Mirrored entries may exist even when the doc itself had none.
        for edges in self.edges.values_mut() {
            edges.retain(|e| !e.touches(doc_id));
        }
    }

    #[must_use]
    pub fn edges_for(&self, doc_id: Uuid) -> &[CrossReferenceEdge] {
        self.edges.get(&doc_id).map_or(&[], Vec::as_slice)
    }

    pub fn document_count(&self) -> usize {
        self.edges.len()
    }

    /// Deterministic snapshot: nodes sorted, each undirected edge listed
    /// once from its smaller endpoint.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<Uuid> = self.edges.keys().copied().collect();
        nodes.sort();

        let mut edges = Vec::new();
        for (&doc_id, incident) in &self.edges {
            for edge in incident {
                let keep = if edge.kind.is_symmetric() {
                    doc_id == edge.source_id.min(edge.target_id)
                } else {
                    doc_id == edge.source_id
                };
                if keep {
                    edges.push(edge.clone());
                }
            }
        }
        edges.sort_by(|a, b| {
            (a.source_id, a.target_id, a.kind.as_str())
                .cmp(&(b.source_id, b.target_id, b.kind.as_str()))
        });
        edges.dedup();

        GraphSnapshot { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: Uuid, b: Uuid, score: f64) -> CrossReferenceEdge {
        CrossReferenceEdge::new(a, b, score, EdgeKind::Similar).unwrap()
    }

    #[test]
    fn test_edge_rejects_self_loop() {
        let id = Uuid::now_v7();
        let result = CrossReferenceEdge::new(id, id, 0.9, EdgeKind::Similar);

        assert!(matches!(result, Err(Error::GraphCorruption(_))));
    }

    #[test]
    fn test_edge_rejects_out_of_range_score() {
        let result =
            CrossReferenceEdge::new(Uuid::now_v7(), Uuid::now_v7(), 1.5, EdgeKind::Citation);
        assert!(matches!(result, Err(Error::GraphCorruption(_))));
    }

    #[test]
    fn test_replace_edges_mirrors_symmetric() {
        let mut graph = KnowledgeGraph::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        graph.replace_edges(a, vec![edge(a, b, 0.8)]).unwrap();

        assert_eq!(graph.edges_for(a).len(), 1);
        assert_eq!(graph.edges_for(b).len(), 1);
    }

    #[test]
    fn test_replace_edges_is_atomic_on_failure() {
        let mut graph = KnowledgeGraph::new();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        graph.replace_edges(a, vec![edge(a, b, 0.8)]).unwrap();

        // One good edge plus one that does not touch `a`.
        let result = graph.replace_edges(a, vec![edge(a, c, 0.9), edge(b, c, 0.7)]);

        assert!(result.is_err());
        assert_eq!(graph.edges_for(a).len(), 1);
        assert_eq!(graph.edges_for(a)[0].other(a), b);
    }

    #[test]
    fn test_replace_clears_previous_mirrors() {
        let mut graph = KnowledgeGraph::new();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        graph.replace_edges(a, vec![edge(a, b, 0.8)]).unwrap();
        graph.replace_edges(a, vec![edge(a, c, 0.9)]).unwrap();

        assert!(graph.edges_for(b).is_empty());
        assert_eq!(graph.edges_for(c).len(), 1);
    }

    #[test]
    fn test_remove_document_removes_exactly_incident_edges() {
        let mut graph = KnowledgeGraph::new();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        graph.replace_edges(a, vec![edge(a, b, 0.8)]).unwrap();
        graph.replace_edges(c, vec![edge(c, b, 0.75)]).unwrap();

        graph.remove_document(a);

        assert!(graph.edges_for(a).is_empty());
        assert_eq!(graph.edges_for(b).len(), 1);
        assert_eq!(graph.edges_for(b)[0].other(b), c);
        assert_eq!(graph.edges_for(c).len(), 1);
    }

    #[test]
    fn test_snapshot_lists_undirected_edges_once() {
        let mut graph = KnowledgeGraph::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        graph.replace_edges(a, vec![edge(a, b, 0.8)]).unwrap();
        let snapshot = graph.snapshot();

        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.edges.len(), 1);
    }

    #[test]
    fn test_directed_edges_not_mirrored() {
        let mut graph = KnowledgeGraph::new();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let citation = CrossReferenceEdge::new(a, b, 1.0, EdgeKind::Citation).unwrap();

        graph.replace_edges(a, vec![citation]).unwrap();

        assert_eq!(graph.edges_for(a).len(), 1);
        assert!(graph.edges_for(b).is_empty());
    }
}
