//! SurfacerRegistry - maps a config type tag to a surfacer constructor

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::SurfacerDef;
use crate::logger::{FailureCounter, Logger};

use super::file::FileSurfacer;
use super::log::LogSurfacer;
use super::set::SurfacerEntry;
use super::{Surfacer, SurfacerError};

/// Builds one surfacer from its definition
pub type SurfacerFactory =
    Arc<dyn Fn(&SurfacerDef, Logger) -> Result<Arc<dyn Surfacer>, SurfacerError> + Send + Sync>;

/// Known surfacer types
#[derive(Clone)]
pub struct SurfacerRegistry {
    factories: HashMap<String, SurfacerFactory>,
}

impl SurfacerRegistry {
    /// Registry with the built-in `file` and `log` surfacers
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("file", |def, logger| {
            Ok(Arc::new(FileSurfacer::from_def(def, logger)?) as Arc<dyn Surfacer>)
        });
        registry.register("log", |def, logger| {
            Ok(Arc::new(LogSurfacer::new(def.name(), logger)) as Arc<dyn Surfacer>)
        });
        registry
    }

    /// Create an empty registry (for testing)
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Add or replace the constructor for `type_tag`
    pub fn register<F>(&mut self, type_tag: impl Into<String>, factory: F)
    where
        F: Fn(&SurfacerDef, Logger) -> Result<Arc<dyn Surfacer>, SurfacerError> + Send + Sync + 'static,
    {
        self.factories.insert(type_tag.into(), Arc::new(factory));
    }

    /// Check if a type tag is known
    pub fn has_type(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Build one surfacer
    pub fn build(&self, def: &SurfacerDef, logger: Logger) -> Result<Arc<dyn Surfacer>, SurfacerError> {
        debug!(surfacer_type = %def.surfacer_type, name = def.name(), "SurfacerRegistry::build: called");
        let factory = self
            .factories
            .get(&def.surfacer_type)
            .ok_or_else(|| SurfacerError::UnknownType(def.surfacer_type.clone()))?;
        factory(def, logger)
    }

    /// Build every surfacer in declared order; the first failure aborts
    pub fn build_all(&self, defs: &[SurfacerDef], failures: &FailureCounter) -> Result<Vec<SurfacerEntry>, SurfacerError> {
        let mut entries = Vec::with_capacity(defs.len());
        for def in defs {
            let logger = Logger::new(&format!("surfacer.{}", def.name()), failures).map_err(|e| {
                SurfacerError::InvalidOptions {
                    name: def.name().to_string(),
                    reason: e.to_string(),
                }
            })?;
            let surfacer = self.build(def, logger.clone())?;
            entries.push(SurfacerEntry::new(surfacer, def.queue_capacity, logger).with_overflow(def.overflow));
        }
        Ok(entries)
    }
}

impl Default for SurfacerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
