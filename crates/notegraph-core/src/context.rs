use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::NotegraphConfig;
use crate::document::Document;
use crate::plugin::{PipelineExecutor, PipelineOutput, PluginRegistry};
use crate::services::{AnalyzeResponse, QueryResponse, ServiceClientManager};
use crate::storage::Storage;
use crate::sync::{GitBackend, OrgSyncManager, SyncTask};
use crate::xref::{CrossReferenceEngine, GraphSnapshot};
use crate::Result;

/// Explicitly constructed holder of all manager instances.
///
/// Created once at process start and dropped at process stop; nothing in
/// the crate relies on process-wide globals.
pub struct NotegraphContext {
    pub registry: RwLock<PluginRegistry>,
    pub executor: Arc<PipelineExecutor>,
    pub xref: CrossReferenceEngine,
    pub sync: OrgSyncManager,
    pub services: ServiceClientManager,
    pub storage: Arc<Storage>,
}

impl NotegraphContext {
    pub fn new(
        config: NotegraphConfig,
        storage: Arc<Storage>,
        git: Box<dyn GitBackend>,
    ) -> Result<Self> {
        Ok(Self {
            registry: RwLock::new(PluginRegistry::new()),
            executor: Arc::new(PipelineExecutor::new(config.pipeline)),
            xref: CrossReferenceEngine::new(config.xref),
            sync: OrgSyncManager::new(config.sync, git),
            services: ServiceClientManager::new(config.services)?,
            storage,
        })
    }

    /// Open against a database path using the system `git` binary.
    pub async fn open(config: NotegraphConfig, db_path: &str) -> Result<Self> {
        let storage = Arc::new(Storage::open(db_path).await?);
        let git = crate::sync::SystemGit::locate()
            .map_err(|e| crate::Error::Configuration(format!("git unavailable: {e}")))?;
        let context = Self::new(config, storage, Box::new(git))?;
        context.restore().await?;
        Ok(context)
    }

    /// Reload the fingerprint index and graph edges from storage.
    pub async fn restore(&self) -> Result<()> {
        for (doc_id, fingerprint) in self.storage.load_fingerprints().await? {
            self.xref.restore(doc_id, fingerprint).await;
        }

        let mut by_doc: BTreeMap<Uuid, Vec<_>> = BTreeMap::new();
        for edge in self.storage.load_edges().await? {
            by_doc.entry(edge.source_id).or_default().push(edge);
        }
        for (doc_id, edges) in by_doc {
            self.xref.set_directed_edges(doc_id, edges).await?;
        }

        tracing::info!(
            "Restored {} fingerprints from storage",
            self.xref.indexed_count().await
        );
        Ok(())
    }

    /// Full processing flow for one converted document: run the matching
    /// plugins, persist the new version, index it, and recompute its
    /// cross-reference edges.
    pub async fn process_document(&self, document: Document) -> Result<PipelineOutput> {
        let plugins = {
            let registry = self.registry.read().await;
            registry.select_plugins(&document.metadata)
        };

        let output = self.executor.execute(&document, &plugins);
        let processed = &output.document;

        self.storage.upsert_document(processed).await?;
        self.xref.index(processed).await;

        let edges = self.xref.compute_edges(processed).await?;
        self.storage.replace_edges(processed.id, &edges).await?;
        self.storage
            .save_fingerprint(processed.id, &crate::xref::Fingerprint::of(&processed.content))
            .await?;

        Ok(output)
    }

    /// Remove a document everywhere: storage, index, and graph.
    pub async fn remove_document(&self, doc_id: Uuid) -> Result<()> {
        self.storage.delete_document(doc_id).await?;
        self.xref.remove(doc_id).await;
        Ok(())
    }

    /// Natural-language query against the semantic-query service.
    pub async fn query(&self, text: &str, filters: BTreeMap<String, String>) -> QueryResponse {
        self.services.query(text, filters).await
    }

    /// Analyze a stored document, merging remote suggestions with the
    /// local graph's edges.
    pub async fn analyze(&self, doc_id: Uuid) -> Result<AnalyzeResponse> {
        let document = self.storage.get_document(doc_id).await?;
        let local_edges = self.xref.edges_for(doc_id).await;
        Ok(self
            .services
            .analyze(doc_id, &document.content, &local_edges)
            .await)
    }

    /// Commit (and optionally push) processed artifacts into an
    /// organization repository.
    pub async fn sync_files(
        &self,
        files: Vec<PathBuf>,
        target_repo: &str,
        course: &str,
    ) -> Result<SyncTask> {
        self.sync.sync(files, target_repo, course).await
    }

    pub async fn graph_snapshot(&self) -> GraphSnapshot {
        self.xref.snapshot().await
    }
}
