//! Built-in content processors for common academic note formats.

use regex::Regex;

use crate::document::DocumentMetadata;

use super::{Plugin, PluginDescriptor, PluginResult, ProcessingResult};

/// Normalizes display math to fenced `$$` blocks and strips stray
/// `\begin{equation}` wrappers left over from LaTeX conversion.
pub struct MathTidy {
    descriptor: PluginDescriptor,
    equation_env: Regex,
    bracket_display: Regex,
}

impl MathTidy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new("math_tidy", "1.0.0")
                .with_description("Normalize LaTeX math blocks in converted notes")
                .with_course_type("*")
                .with_capability("math"),
            equation_env: Regex::new(r"\\(?:begin|end)\{equation\*?\}").unwrap(),
            bracket_display: Regex::new(r"(?s)\\\[(.*?)\\\]").unwrap(),
        }
    }
}

impl Default for MathTidy {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for MathTidy {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn process(
        &self,
        content: &str,
        _metadata: &DocumentMetadata,
    ) -> PluginResult<ProcessingResult> {
        let content = self.equation_env.replace_all(content, "$$$$");
        let content = self.bracket_display.replace_all(&content, "$$$$${1}$$$$");

        Ok(ProcessingResult::unchanged(content.into_owned()))
    }
}

/// Collects citation keys (`[@key]` and `\cite{key}`) into metadata tags.
pub struct CitationCollector {
    descriptor: PluginDescriptor,
    pandoc_cite: Regex,
    latex_cite: Regex,
}

impl CitationCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new("citation_collector", "1.0.0")
                .with_description("Collect citation keys into document tags")
                .with_course_type("*")
                .with_capability("citations"),
            pandoc_cite: Regex::new(r"\[@([A-Za-z0-9_:\-]+)\]").unwrap(),
            latex_cite: Regex::new(r"\\cite[tp]?\{([^}]+)\}").unwrap(),
        }
    }
}

impl Default for CitationCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for CitationCollector {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn process(
        &self,
        content: &str,
        _metadata: &DocumentMetadata,
    ) -> PluginResult<ProcessingResult> {
        let mut delta = DocumentMetadata::default();

        for capture in self.pandoc_cite.captures_iter(content) {
            delta.tags.insert(format!("cite:{}", &capture[1]));
        }
        for capture in self.latex_cite.captures_iter(content) {
            for key in capture[1].split(',') {
                let key = key.trim();
                if !key.is_empty() {
                    delta.tags.insert(format!("cite:{key}"));
                }
            }
        }

        Ok(ProcessingResult::unchanged(content).with_delta(delta))
    }
}

/// Ensures exactly one top-level heading and demotes extras.
pub struct HeadingNormalizer {
    descriptor: PluginDescriptor,
}

impl HeadingNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new("heading_normalizer", "1.0.0")
                .with_description("Demote duplicate top-level headings")
                .with_course_type("*")
                .with_capability("structure"),
        }
    }
}

impl Default for HeadingNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for HeadingNormalizer {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn process(
        &self,
        content: &str,
        _metadata: &DocumentMetadata,
    ) -> PluginResult<ProcessingResult> {
        let mut seen_top = false;
        let mut title = None;
        let mut lines = Vec::new();

        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("# ") {
                if seen_top {
                    lines.push(format!("## {rest}"));
                } else {
                    seen_top = true;
                    title = Some(rest.trim().to_string());
                    lines.push(line.to_string());
                }
            } else {
                lines.push(line.to_string());
            }
        }

        let mut delta = DocumentMetadata::default();
        delta.title = title;

        let mut rebuilt = lines.join("\n");
        if content.ends_with('\n') {
            rebuilt.push('\n');
        }

        Ok(ProcessingResult::unchanged(rebuilt).with_delta(delta))
    }
}

/// Tags documents with configured keywords found in their content.
pub struct KeywordTagger {
    descriptor: PluginDescriptor,
    keywords: Vec<String>,
}

impl KeywordTagger {
    #[must_use]
    pub fn new(course: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            descriptor: PluginDescriptor::new("keyword_tagger", "1.0.0")
                .with_description("Tag documents with matched course keywords")
                .with_course_type(course)
                .with_capability("tagging"),
            keywords,
        }
    }
}

impl Plugin for KeywordTagger {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn process(
        &self,
        content: &str,
        _metadata: &DocumentMetadata,
    ) -> PluginResult<ProcessingResult> {
        let haystack = content.to_lowercase();
        let mut delta = DocumentMetadata::default();

        for keyword in &self.keywords {
            if haystack.contains(&keyword.to_lowercase()) {
                delta.tags.insert(keyword.to_lowercase());
            }
        }

        Ok(ProcessingResult::unchanged(content).with_delta(delta))
    }
}
