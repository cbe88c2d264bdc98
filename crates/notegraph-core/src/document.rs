use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Markdown,
    Latex,
    Pdf,
    Docx,
    Html,
    PlainText,
    Jupyter,
}

impl DocumentFormat {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Latex => "latex",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Html => "html",
            Self::PlainText => "plain_text",
            Self::Jupyter => "jupyter",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(Self::Markdown),
            "latex" => Ok(Self::Latex),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "html" => Ok(Self::Html),
            "plain_text" => Ok(Self::PlainText),
            "jupyter" => Ok(Self::Jupyter),
            _ => Err(crate::Error::Configuration(format!(
                "unknown document format: {s}"
            ))),
        }
    }
}

/// Metadata extracted from a converted document.
///
/// Tags use a `BTreeSet` so serialized output and plugin selection stay
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl DocumentMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_course(mut self, course: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Merge a delta produced by a plugin into this metadata.
    ///
    /// Scalar fields are overwritten only when the delta sets them; tags
    /// accumulate.
    pub fn apply_delta(&mut self, delta: &Self) {
        if delta.course.is_some() {
            self.course.clone_from(&delta.course);
        }
        if delta.topic.is_some() {
            self.topic.clone_from(&delta.topic);
        }
        if delta.title.is_some() {
            self.title.clone_from(&delta.title);
        }
        if delta.author.is_some() {
            self.author.clone_from(&delta.author);
        }
        if delta.date.is_some() {
            self.date = delta.date;
        }
        for tag in &delta.tags {
            self.tags.insert(tag.clone());
        }
        if !delta.extra.is_null() {
            self.extra = delta.extra.clone();
        }
    }
}

/// A converted academic document flowing through the pipeline.
///
/// Immutable once a pipeline run completes: `PipelineExecutor::execute`
/// returns a new version rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub source_path: String,
    pub format: DocumentFormat,
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Names of plugins applied to produce this version, in order.
    pub provenance: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn new(source_path: impl Into<String>, format: DocumentFormat, content: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            source_path: source_path.into(),
            format,
            content,
            metadata: DocumentMetadata::default(),
            provenance: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Produce the next version of this document after a pipeline run.
    ///
    /// Keeps the id stable so the cross-reference index can re-fingerprint
    /// the same logical document.
    #[must_use]
    pub fn next_version(
        &self,
        content: String,
        metadata: DocumentMetadata,
        applied: Vec<String>,
    ) -> Self {
        Self {
            id: self.id,
            source_path: self.source_path.clone(),
            format: self.format,
            content,
            metadata,
            provenance: applied,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_delta_overwrites_scalars() {
        let mut meta = DocumentMetadata::new()
            .with_course("CS101")
            .with_topic("recursion");

        let delta = DocumentMetadata::new().with_topic("iteration");
        meta.apply_delta(&delta);

        assert_eq!(meta.course.as_deref(), Some("CS101"));
        assert_eq!(meta.topic.as_deref(), Some("iteration"));
    }

    #[test]
    fn test_metadata_delta_accumulates_tags() {
        let mut meta = DocumentMetadata::new().with_tag("lecture");
        let delta = DocumentMetadata::new().with_tag("exam");

        meta.apply_delta(&delta);

        assert_eq!(meta.tags.len(), 2);
        assert!(meta.tags.contains("lecture"));
        assert!(meta.tags.contains("exam"));
    }

    #[test]
    fn test_next_version_keeps_id() {
        let doc = Document::new("notes/rec.md", DocumentFormat::Markdown, "# Rec".into());
        let next = doc.next_version(
            "# Recursion".into(),
            doc.metadata.clone(),
            vec!["heading_normalizer".into()],
        );

        assert_eq!(doc.id, next.id);
        assert_eq!(next.provenance, vec!["heading_normalizer".to_string()]);
        assert_eq!(doc.provenance.len(), 0);
    }

    #[test]
    fn test_format_round_trip() {
        let fmt: DocumentFormat = "latex".parse().unwrap();
        assert_eq!(fmt, DocumentFormat::Latex);
        assert_eq!(fmt.as_str(), "latex");

        let err: Result<DocumentFormat, _> = "wordperfect".parse();
        assert!(err.is_err());
    }
}
