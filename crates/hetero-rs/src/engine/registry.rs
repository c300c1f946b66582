use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::SubgraphConverter;

struct ConverterRegistry {
    converters: RwLock<HashMap<String, Arc<dyn SubgraphConverter>>>,
}

impl ConverterRegistry {
    fn new() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, converter: Arc<dyn SubgraphConverter>) {
        self.converters
            .write()
            .expect("converter registry poisoned")
            .insert(converter.name().to_string(), converter);
    }

    fn unregister(&self, name: &str) -> Option<Arc<dyn SubgraphConverter>> {
        self.converters
            .write()
            .expect("converter registry poisoned")
            .remove(name)
    }

    fn get(&self, name: &str) -> Option<Arc<dyn SubgraphConverter>> {
        self.converters
            .read()
            .expect("converter registry poisoned")
            .get(name)
            .cloned()
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .converters
            .read()
            .expect("converter registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

static GLOBAL_REGISTRY: OnceLock<ConverterRegistry> = OnceLock::new();

fn registry() -> &'static ConverterRegistry {
    GLOBAL_REGISTRY.get_or_init(ConverterRegistry::new)
}

/// Registers a converter under its own name, replacing any previous one.
pub fn register_converter(converter: Arc<dyn SubgraphConverter>) {
    registry().register(converter);
}

pub fn unregister_converter(name: &str) -> Option<Arc<dyn SubgraphConverter>> {
    registry().unregister(name)
}

pub fn get_converter(name: &str) -> Option<Arc<dyn SubgraphConverter>> {
    registry().get(name)
}

/// Lists registered converter names in sorted order.
pub fn list_converters() -> Vec<String> {
    registry().list()
}
