use std::collections::HashMap;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::XrefConfig;
use crate::document::Document;
use crate::Result;

use super::fingerprint::Fingerprint;
use super::graph::{CrossReferenceEdge, EdgeKind, GraphSnapshot, KnowledgeGraph};

/// Fingerprints documents and maintains the similarity graph.
///
/// Scoring happens outside any lock; the graph write lock is held only for
/// the atomic per-document edge replacement, so independent documents do
/// not block each other during computation.
pub struct CrossReferenceEngine {
    config: XrefConfig,
    index: RwLock<HashMap<Uuid, Fingerprint>>,
    graph: Mutex<KnowledgeGraph>,
}

impl CrossReferenceEngine {
    #[must_use]
    pub fn new(config: XrefConfig) -> Self {
        Self {
            config,
            index: RwLock::new(HashMap::new()),
            graph: Mutex::new(KnowledgeGraph::new()),
        }
    }

    /// Fingerprint a processed document and store it in the candidate index.
    ///
    /// Re-indexing the same document id replaces its fingerprint.
    pub async fn index(&self, document: &Document) {
        let fingerprint = Fingerprint::of(&document.content);
        self.index.write().await.insert(document.id, fingerprint);
    }

    /// Restore a previously persisted fingerprint without recomputing it.
    pub async fn restore(&self, doc_id: Uuid, fingerprint: Fingerprint) {
        self.index.write().await.insert(doc_id, fingerprint);
    }

    pub async fn indexed_count(&self) -> usize {
        self.index.read().await.len()
    }

    /// Compare `document` against the index and replace its `similar`
    /// edges transactionally.
    ///
    /// Keeps scores ≥ the configured threshold, caps at `max_suggestions`,
    /// and breaks ties by higher score then smaller candidate id. Returns
    /// the new incident edge set.
    pub async fn compute_edges(&self, document: &Document) -> Result<Vec<CrossReferenceEdge>> {
        let scores = {
            let index = self.index.read().await;
            let Some(fingerprint) = index.get(&document.id).cloned() else {
                return Err(crate::Error::DocumentNotFound(document.id));
            };

            let mut scores: Vec<(Uuid, f64)> = index
                .iter()
                .filter(|(&id, _)| id != document.id)
                .map(|(&id, other)| (id, fingerprint.similarity(other)))
                .filter(|(_, score)| *score >= self.config.threshold)
                .collect();

            scores.sort_by(|(a_id, a_score), (b_id, b_score)| {
                b_score
                    .partial_cmp(a_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a_id.cmp(b_id))
            });
            scores.truncate(self.config.max_suggestions);
            scores
        };

        let edges: Vec<CrossReferenceEdge> = scores
            .into_iter()
            .map(|(id, score)| CrossReferenceEdge::new(document.id, id, score, EdgeKind::Similar))
            .collect::<Result<_>>()?;

        let mut graph = self.graph.lock().await;
        graph.replace_edges(document.id, edges.clone())?;
        drop(graph);

        tracing::info!(
            "Computed {} cross-reference edges for document {}",
            edges.len(),
            document.id
        );
        Ok(edges)
    }

    /// Replace a document's directed edges (prerequisite, citation) while
    /// keeping its similarity edges intact.
    pub async fn set_directed_edges(
        &self,
        doc_id: Uuid,
        directed: Vec<CrossReferenceEdge>,
    ) -> Result<()> {
        let mut graph = self.graph.lock().await;
        let mut edges: Vec<CrossReferenceEdge> = graph
            .edges_for(doc_id)
            .iter()
            .filter(|e| e.kind.is_symmetric())
            .cloned()
            .collect();
        edges.extend(directed);
        graph.replace_edges(doc_id, edges)
    }

    /// Drop a document from the index and remove exactly its incident edges.
    pub async fn remove(&self, doc_id: Uuid) {
        self.index.write().await.remove(&doc_id);
        self.graph.lock().await.remove_document(doc_id);
    }

    pub async fn edges_for(&self, doc_id: Uuid) -> Vec<CrossReferenceEdge> {
        self.graph.lock().await.edges_for(doc_id).to_vec()
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        self.graph.lock().await.snapshot()
    }

    /// Fingerprints for persistence.
    pub async fn export_index(&self) -> Vec<(Uuid, Fingerprint)> {
        self.index
            .read()
            .await
            .iter()
            .map(|(&id, fp)| (id, fp.clone()))
            .collect()
    }
}
