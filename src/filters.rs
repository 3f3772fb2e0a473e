//! Lookup of filters by id or by file extension.

use std::{collections::HashMap, path::Path};

use log::debug;

use crate::{document::RawDocument, error::Error, traits::Filter};

type FilterFactory = Box<dyn Fn() -> Box<dyn Filter> + Send + Sync>;

/// Registered filter factories.
///
/// Every lookup creates a fresh filter, so concurrent pipelines never share
/// filter state.
#[derive(Default)]
pub struct FilterRegistry {
    factories: HashMap<String, FilterFactory>,
    extensions: HashMap<String, String>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under the id of the filters it creates, along
    /// with the extensions they declare. A later registration wins.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        let sample = factory();
        let id = sample.name().to_string();
        for ext in sample.extensions() {
            self.extensions
                .insert(ext.trim_start_matches('.').to_ascii_lowercase(), id.clone());
        }
        debug!("Registered filter `{}`", id);
        self.factories.insert(id, Box::new(factory));
    }

    pub fn with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        self.register(factory);
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn create(&self, id: &str) -> Result<Box<dyn Filter>, Error> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownFilter(id.to_string()))
    }

    /// Picks a filter from the extension of `path`.
    pub fn infer_from_path<P: AsRef<Path>>(&self, path: P) -> Option<Box<dyn Filter>> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        let id = self.extensions.get(&ext)?;
        self.create(id).ok()
    }

    /// The filter for `raw`: its explicit filter id, otherwise the one
    /// matching its file extension.
    pub fn resolve(&self, raw: &RawDocument) -> Result<Box<dyn Filter>, Error> {
        if let Some(id) = &raw.filter_id {
            return self.create(id);
        }
        raw.path()
            .and_then(|path| self.infer_from_path(path))
            .ok_or_else(|| Error::UnknownFilter(format!("no filter for `{}`", raw.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EventStream;

    struct Dummy(&'static str, &'static [&'static str]);

    impl Filter for Dummy {
        fn name(&self) -> &str {
            self.0
        }

        fn mime_type(&self) -> &str {
            "text/plain"
        }

        fn extensions(&self) -> &[&str] {
            self.1
        }

        fn open<'a>(&'a mut self, _raw: &'a RawDocument) -> Result<EventStream<'a>, Error> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    fn registry() -> FilterRegistry {
        FilterRegistry::new()
            .with(|| Box::new(Dummy("okf_properties", &["properties"])))
            .with(|| Box::new(Dummy("okf_po", &[".po", "pot"])))
    }

    #[test]
    fn test_create_by_id() {
        let registry = registry();
        assert_eq!(registry.create("okf_po").unwrap().name(), "okf_po");
        assert!(matches!(
            registry.create("okf_html"),
            Err(Error::UnknownFilter(_))
        ));
        assert_eq!(registry.ids(), vec!["okf_po", "okf_properties"]);
    }

    #[test]
    fn test_infer_from_extension() {
        let registry = registry();
        let filter = registry.infer_from_path("res/Messages.PROPERTIES").unwrap();
        assert_eq!(filter.name(), "okf_properties");
        assert_eq!(registry.infer_from_path("a.pot").unwrap().name(), "okf_po");
        assert!(registry.infer_from_path("a.xml").is_none());
        assert!(registry.infer_from_path("noext").is_none());
    }

    #[test]
    fn test_resolve_prefers_explicit_id() {
        let registry = registry();
        let raw = RawDocument::from_path("a.properties").with_filter_id("okf_po");
        assert_eq!(registry.resolve(&raw).unwrap().name(), "okf_po");
        let raw = RawDocument::from_path("a.properties");
        assert_eq!(registry.resolve(&raw).unwrap().name(), "okf_properties");
        assert!(registry.resolve(&RawDocument::from_text("x")).is_err());
    }
}
