use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::PipelineConfig;
use crate::document::Document;

use super::Plugin;

/// Result of running one document through the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub document: Document,
    /// Warnings from plugins, including those skipped on failure.
    pub warnings: Vec<String>,
    /// Plugins that ran to completion.
    pub applied: Vec<String>,
    /// Plugins skipped because they returned an error.
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

/// Accumulated results of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub successful: Vec<PipelineOutput>,
}

impl BatchOutput {
    pub fn success_count(&self) -> usize {
        self.successful.len()
    }

    pub fn total_warnings(&self) -> usize {
        self.successful.iter().map(|o| o.warnings.len()).sum()
    }
}

/// Applies an ordered plugin set to documents.
///
/// Plugins are pure functions of (content, metadata), so executing the same
/// set against identical input yields identical output. A failing plugin is
/// recorded as a warning and skipped; the pipeline never aborts on plugin
/// errors.
pub struct PipelineExecutor {
    config: PipelineConfig,
}

impl PipelineExecutor {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run `plugins` sequentially over `document`, producing a new version.
    ///
    /// The input document is not mutated; provenance on the output lists
    /// exactly the plugins that ran.
    #[must_use]
    pub fn execute(&self, document: &Document, plugins: &[Arc<dyn Plugin>]) -> PipelineOutput {
        let start = std::time::Instant::now();

        let mut content = document.content.clone();
        let mut metadata = document.metadata.clone();
        let mut warnings = Vec::new();
        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for plugin in plugins {
            let name = plugin.descriptor().name.clone();

            match plugin.process(&content, &metadata) {
                Ok(result) => {
                    content = result.content;
                    metadata.apply_delta(&result.metadata_delta);
                    warnings.extend(result.warnings);
                    applied.push(name);
                }
                Err(e) => {
                    tracing::warn!("Plugin {name} failed, skipping: {e}");
                    warnings.push(format!("plugin {name} skipped: {e}"));
                    skipped.push(name);
                }
            }
        }

        let document = document.next_version(content, metadata, applied.clone());

        PipelineOutput {
            document,
            warnings,
            applied,
            skipped,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Run many documents over a bounded worker pool.
    ///
    /// Each document's pipeline is single-threaded; parallelism is across
    /// documents only, capped at `max_parallel`.
    pub async fn execute_batch(
        self: &Arc<Self>,
        documents: Vec<Document>,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> BatchOutput {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut handles = Vec::with_capacity(documents.len());

        for document in documents {
            let executor = Arc::clone(self);
            let plugins = plugins.clone();
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                executor.execute(&document, &plugins)
            }));
        }

        let mut batch = BatchOutput::default();
        for handle in handles {
            if let Ok(output) = handle.await {
                batch.successful.push(output);
            }
        }
        batch
    }
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentFormat, DocumentMetadata};
    use crate::plugin::{PluginDescriptor, PluginError, PluginResult, ProcessingResult};

    struct Uppercase {
        descriptor: PluginDescriptor,
    }

    impl Uppercase {
        fn create() -> Arc<dyn Plugin> {
            Arc::new(Self {
                descriptor: PluginDescriptor::new("uppercase", "1.0.0").with_course_type("*"),
            })
        }
    }

    impl Plugin for Uppercase {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        fn process(
            &self,
            content: &str,
            _metadata: &DocumentMetadata,
        ) -> PluginResult<ProcessingResult> {
            Ok(ProcessingResult::unchanged(content.to_uppercase()))
        }
    }

    struct AlwaysFails {
        descriptor: PluginDescriptor,
    }

    impl AlwaysFails {
        fn create() -> Arc<dyn Plugin> {
            Arc::new(Self {
                descriptor: PluginDescriptor::new("broken", "1.0.0").with_course_type("*"),
            })
        }
    }

    impl Plugin for AlwaysFails {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        fn process(
            &self,
            _content: &str,
            _metadata: &DocumentMetadata,
        ) -> PluginResult<ProcessingResult> {
            Err(PluginError::Failed("simulated failure".into()))
        }
    }

    fn doc(content: &str) -> Document {
        Document::new("notes/a.md", DocumentFormat::Markdown, content.into())
    }

    #[test]
    fn test_execute_applies_in_order() {
        let executor = PipelineExecutor::default();
        let output = executor.execute(&doc("hello"), &[Uppercase::create()]);

        assert_eq!(output.document.content, "HELLO");
        assert_eq!(output.applied, vec!["uppercase"]);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_failing_plugin_is_skipped_not_fatal() {
        let executor = PipelineExecutor::default();
        let plugins = vec![AlwaysFails::create(), Uppercase::create()];

        let output = executor.execute(&doc("hello"), &plugins);

        assert_eq!(output.document.content, "HELLO");
        assert_eq!(output.skipped, vec!["broken"]);
        assert_eq!(output.applied, vec!["uppercase"]);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("broken"));
    }

    #[test]
    fn test_provenance_lists_only_applied_plugins() {
        let executor = PipelineExecutor::default();
        let plugins = vec![AlwaysFails::create(), Uppercase::create()];

        let output = executor.execute(&doc("x"), &plugins);

        assert_eq!(output.document.provenance, vec!["uppercase".to_string()]);
    }

    #[test]
    fn test_idempotence_identical_input_identical_output() {
        let executor = PipelineExecutor::default();
        let plugins = vec![Uppercase::create()];

        let a = executor.execute(&doc("same input"), &plugins);
        let b = executor.execute(&doc("same input"), &plugins);

        assert_eq!(a.document.content, b.document.content);
        assert_eq!(a.document.metadata, b.document.metadata);
        assert_eq!(a.applied, b.applied);
    }

    #[test]
    fn test_input_document_not_mutated() {
        let executor = PipelineExecutor::default();
        let input = doc("hello");

        let output = executor.execute(&input, &[Uppercase::create()]);

        assert_eq!(input.content, "hello");
        assert!(input.provenance.is_empty());
        assert_eq!(output.document.id, input.id);
    }

    #[tokio::test]
    async fn test_batch_bounded_pool() {
        let executor = Arc::new(PipelineExecutor::new(PipelineConfig { max_parallel: 2 }));
        let documents: Vec<Document> = (0..8).map(|i| doc(&format!("doc {i}"))).collect();

        let batch = executor
            .execute_batch(documents, vec![Uppercase::create()])
            .await;

        assert_eq!(batch.success_count(), 8);
        assert!(batch
            .successful
            .iter()
            .all(|o| o.document.content.starts_with("DOC")));
    }
}
