pub mod builtin;
pub mod executor;
pub mod registry;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::DocumentMetadata;

pub use builtin::{CitationCollector, HeadingNormalizer, KeywordTagger, MathTidy};
pub use executor::{BatchOutput, PipelineExecutor, PipelineOutput};
pub use registry::PluginRegistry;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin failed: {0}")]
    Failed(String),
    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Static description of a registered plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Courses or topics this plugin applies to. Must be non-empty.
    pub course_types: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub enabled: bool,
    /// Lower runs earlier among plugins registered in the same call order.
    pub priority: i32,
    pub options: BTreeMap<String, String>,
}

impl PluginDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            course_types: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            enabled: true,
            priority: 0,
            options: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_course_type(mut self, course: impl Into<String>) -> Self {
        self.course_types.insert(course.into());
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether this plugin applies to a document's course or topic.
    ///
    /// The wildcard course type `*` matches everything.
    #[must_use]
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        if self.course_types.contains("*") {
            return true;
        }
        let course_hit = metadata
            .course
            .as_deref()
            .is_some_and(|c| self.course_types.contains(c));
        let topic_hit = metadata
            .topic
            .as_deref()
            .is_some_and(|t| self.course_types.contains(t));
        course_hit || topic_hit
    }
}

/// Output of one plugin application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub content: String,
    /// Only fields the plugin wants to change; merged via
    /// `DocumentMetadata::apply_delta`.
    pub metadata_delta: DocumentMetadata,
    pub warnings: Vec<String>,
}

impl ProcessingResult {
    #[must_use]
    pub fn unchanged(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata_delta: DocumentMetadata::default(),
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_delta(mut self, delta: DocumentMetadata) -> Self {
        self.metadata_delta = delta;
        self
    }

    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A content processor applied during pipeline execution.
///
/// Implementations must be pure: the same content and metadata always
/// produce the same result, with no state carried between calls. The
/// executor relies on this for the cross-reference determinism guarantee.
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    fn process(&self, content: &str, metadata: &DocumentMetadata)
        -> PluginResult<ProcessingResult>;
}
