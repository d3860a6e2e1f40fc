//! ProbeRegistry - maps a config type tag to a probe constructor

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{GlobalTargetsOptions, ProbeDef};
use crate::logger::{FailureCounter, Logger};

use super::{Probe, ProbeContext, ProbeError, http, tcp};

/// Builds one probe from its definition
pub type ProbeFactory = Arc<dyn Fn(&ProbeDef, ProbeContext) -> Result<Arc<dyn Probe>, ProbeError> + Send + Sync>;

/// Known probe types
#[derive(Clone)]
pub struct ProbeRegistry {
    factories: HashMap<String, ProbeFactory>,
}

impl ProbeRegistry {
    /// Registry with the built-in `tcp` and `http` probes
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("tcp", tcp::build);
        registry.register("http", http::build);
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
        F: Fn(&ProbeDef, ProbeContext) -> Result<Arc<dyn Probe>, ProbeError> + Send + Sync + 'static,
    {
        self.factories.insert(type_tag.into(), Arc::new(factory));
    }

    pub fn has_type(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Build every probe, keyed by name
    ///
    /// The first duplicate name, unknown type or constructor failure aborts
    /// the whole set.
    pub fn init(
        &self,
        defs: &[ProbeDef],
        targets_options: Option<&GlobalTargetsOptions>,
        vars: Arc<HashMap<String, String>>,
        failures: &FailureCounter,
    ) -> Result<HashMap<String, Arc<dyn Probe>>, ProbeError> {
        debug!(count = defs.len(), "ProbeRegistry::init: called");
        let mut probes: HashMap<String, Arc<dyn Probe>> = HashMap::with_capacity(defs.len());

        for def in defs {
            if probes.contains_key(&def.name) {
                return Err(ProbeError::DuplicateName(def.name.clone()));
            }
            let factory = self
                .factories
                .get(&def.probe_type)
                .ok_or_else(|| ProbeError::UnknownType {
                    name: def.name.clone(),
                    probe_type: def.probe_type.clone(),
                })?;

            let ctx = ProbeContext {
                targets_options: targets_options.cloned(),
                vars: vars.clone(),
                logger: Logger::new(&format!("probe.{}", def.name), failures)?,
            };
            let probe = factory(def, ctx)?;
            info!(probe = %def.name, probe_type = %def.probe_type, "ProbeRegistry::init: built probe");
            probes.insert(def.name.clone(), probe);
        }

        Ok(probes)
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSink;
    use crate::logger::LoggerError;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Idle {
        name: String,
    }

    #[async_trait]
    impl Probe for Idle {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, lifetime: CancellationToken, _sink: EventSink) {
            lifetime.cancelled().await;
        }
    }

    fn idle_registry() -> ProbeRegistry {
        let mut registry = ProbeRegistry::empty();
        registry.register("idle", |def, _ctx| Ok(Arc::new(Idle { name: def.name.clone() }) as Arc<dyn Probe>));
        registry
    }

    fn init(registry: &ProbeRegistry, defs: &[ProbeDef]) -> Result<HashMap<String, Arc<dyn Probe>>, ProbeError> {
        registry.init(defs, None, Arc::new(HashMap::new()), &FailureCounter::new())
    }

    #[test]
    fn test_standard_registry_has_builtins() {
        let registry = ProbeRegistry::standard();
        assert!(registry.has_type("tcp"));
        assert!(registry.has_type("http"));
        assert!(!registry.has_type("icmp"));
    }

    #[test]
    fn test_init_keys_by_name() {
        let probes = init(&idle_registry(), &[ProbeDef::new("a", "idle"), ProbeDef::new("b", "idle")]).unwrap();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes["a"].name(), "a");
        assert_eq!(probes["b"].name(), "b");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = init(&idle_registry(), &[ProbeDef::new("a", "idle"), ProbeDef::new("a", "idle")]);
        assert!(matches!(result, Err(ProbeError::DuplicateName(n)) if n == "a"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = init(&idle_registry(), &[ProbeDef::new("a", "idle"), ProbeDef::new("b", "icmp")]);
        assert!(matches!(result, Err(ProbeError::UnknownType { probe_type, .. }) if probe_type == "icmp"));
    }

    #[test]
    fn test_bad_logger_name_rejected() {
        let result = init(&idle_registry(), &[ProbeDef::new("has space", "idle")]);
        assert!(matches!(result, Err(ProbeError::Logger(LoggerError::InvalidName(_)))));
    }

    #[test]
    fn test_constructor_error_propagates() {
        // tcp probe without targets
        let result = init(&ProbeRegistry::standard(), &[ProbeDef::new("db", "tcp")]);
        assert!(matches!(result, Err(ProbeError::NoTargets(_))));
    }

    #[test]
    fn test_context_carries_vars_and_logger() {
        let mut registry = ProbeRegistry::empty();
        registry.register("check", |def, ctx| {
            assert_eq!(ctx.vars.get("hostname").map(String::as_str), Some("box1"));
            assert_eq!(ctx.logger.name(), "proberd.probe.p1");
            assert!(ctx.targets_options.is_some());
            Ok(Arc::new(Idle { name: def.name.clone() }) as Arc<dyn Probe>)
        });
        let vars = Arc::new(HashMap::from([("hostname".to_string(), "box1".to_string())]));
        let opts = GlobalTargetsOptions::default();
        registry
            .init(&[ProbeDef::new("p1", "check")], Some(&opts), vars, &FailureCounter::new())
            .unwrap();
    }
}
