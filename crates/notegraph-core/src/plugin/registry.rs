use std::collections::HashMap;
use std::sync::Arc;

use crate::document::DocumentMetadata;
use crate::{Error, Result};

use super::{Plugin, PluginDescriptor};

/// Registry of named plugins.
///
/// Read-mostly: selection only borrows, registration takes `&mut self`.
/// The context wraps this in an `RwLock` so registration is the only
/// exclusive operation.
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
    /// Registration order, the primary selection sort key.
    order: Vec<String>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a plugin under its descriptor name.
    ///
    /// Fails if the name is already taken or the course-type set is empty;
    /// both are configuration mistakes and fatal at startup.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let descriptor = plugin.descriptor();
        let name = descriptor.name.clone();

        if name.is_empty() {
            return Err(Error::Configuration("plugin name must not be empty".into()));
        }
        if descriptor.course_types.is_empty() {
            return Err(Error::Configuration(format!(
                "plugin {name} declares no course types"
            )));
        }
        if self.plugins.contains_key(&name) {
            return Err(Error::Configuration(format!(
                "plugin name already registered: {name}"
            )));
        }

        tracing::info!("Registered plugin {name} v{}", descriptor.version);
        self.plugins.insert(name.clone(), plugin);
        self.order.push(name);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> Result<()> {
        if self.plugins.remove(name).is_none() {
            return Err(Error::Configuration(format!(
                "plugin not registered: {name}"
            )));
        }
        self.order.retain(|n| n != name);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.order
            .iter()
            .filter_map(|n| self.plugins.get(n))
            .map(|p| p.descriptor().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Select enabled plugins whose course types intersect the document's
    /// course or topic.
    ///
    /// Ordered by registration order, then declared priority. Stable across
    /// runs for a fixed registry, which the pipeline idempotence contract
    /// depends on.
    #[must_use]
    pub fn select_plugins(&self, metadata: &DocumentMetadata) -> Vec<Arc<dyn Plugin>> {
        let mut selected: Vec<(usize, Arc<dyn Plugin>)> = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| self.plugins.get(name).map(|p| (idx, Arc::clone(p))))
            .filter(|(_, p)| p.descriptor().enabled && p.descriptor().matches(metadata))
            .collect();

        selected.sort_by_key(|(idx, p)| (*idx, p.descriptor().priority));
        selected.into_iter().map(|(_, p)| p).collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginResult, ProcessingResult};

    struct StubPlugin {
        descriptor: PluginDescriptor,
    }

    impl StubPlugin {
        fn named(name: &str, course: &str) -> Arc<dyn Plugin> {
            Arc::new(Self {
                descriptor: PluginDescriptor::new(name, "1.0.0").with_course_type(course),
            })
        }
    }

    impl Plugin for StubPlugin {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        fn process(
            &self,
            content: &str,
            _metadata: &DocumentMetadata,
        ) -> PluginResult<ProcessingResult> {
            Ok(ProcessingResult::unchanged(content))
        }
    }

    #[test]
    fn test_register_rejects_duplicate_name() {
        let mut registry = PluginRegistry::new();
        registry.register(StubPlugin::named("math", "CS101")).unwrap();

        let result = registry.register(StubPlugin::named("math", "MATH200"));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_register_rejects_empty_course_types() {
        let mut registry = PluginRegistry::new();
        let plugin: Arc<dyn Plugin> = Arc::new(StubPlugin {
            descriptor: PluginDescriptor::new("bare", "1.0.0"),
        });

        assert!(matches!(
            registry.register(plugin),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_selection_filters_by_course() {
        let mut registry = PluginRegistry::new();
        registry.register(StubPlugin::named("math", "CS101")).unwrap();
        registry.register(StubPlugin::named("bio", "BIO110")).unwrap();

        let metadata = DocumentMetadata::new().with_course("CS101");
        let selected = registry.select_plugins(&metadata);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].descriptor().name, "math");
    }

    #[test]
    fn test_selection_matches_topic() {
        let mut registry = PluginRegistry::new();
        registry
            .register(StubPlugin::named("algo", "algorithms"))
            .unwrap();

        let metadata = DocumentMetadata::new()
            .with_course("CS999")
            .with_topic("algorithms");

        assert_eq!(registry.select_plugins(&metadata).len(), 1);
    }

    #[test]
    fn test_selection_order_is_registration_order() {
        let mut registry = PluginRegistry::new();
        registry.register(StubPlugin::named("b", "CS101")).unwrap();
        registry.register(StubPlugin::named("a", "CS101")).unwrap();
        registry.register(StubPlugin::named("c", "CS101")).unwrap();

        let metadata = DocumentMetadata::new().with_course("CS101");
        let names: Vec<String> = registry
            .select_plugins(&metadata)
            .iter()
            .map(|p| p.descriptor().name.clone())
            .collect();

        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_wildcard_course_matches_everything() {
        let mut registry = PluginRegistry::new();
        registry.register(StubPlugin::named("all", "*")).unwrap();

        let metadata = DocumentMetadata::new().with_course("ANY999");
        assert_eq!(registry.select_plugins(&metadata).len(), 1);
    }

    #[test]
    fn test_unregister() {
        let mut registry = PluginRegistry::new();
        registry.register(StubPlugin::named("math", "CS101")).unwrap();

        registry.unregister("math").unwrap();
        assert!(registry.is_empty());
        assert!(registry.unregister("math").is_err());
    }
}
