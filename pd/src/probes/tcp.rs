//! TCP probe - measures connect latency

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::ProbeDef;
use crate::targets::Targets;

use super::runner::{TargetCheck, TargetLoop};
use super::{Probe, ProbeContext, ProbeError};

pub const DEFAULT_TCP_PORT: u16 = 80;

pub struct TcpCheck {
    port: u16,
}

#[async_trait]
impl TargetCheck for TcpCheck {
    fn probe_type(&self) -> &'static str {
        "tcp"
    }

    async fn check(&self, targets: &Targets, target: &str) -> Result<(), String> {
        let addr = targets.resolve(target, self.port).await.map_err(|e| e.to_string())?;
        TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Build a `tcp` probe
pub fn build(def: &ProbeDef, ctx: ProbeContext) -> Result<Arc<dyn Probe>, ProbeError> {
    if def.targets.is_empty() {
        return Err(ProbeError::NoTargets(def.name.clone()));
    }
    if !def.options.is_null() {
        return Err(ProbeError::InvalidOptions {
            name: def.name.clone(),
            reason: "tcp probe takes no options".to_string(),
        });
    }
    let targets = Targets::new(def.targets.clone(), ctx.targets_options.as_ref());
    let check = TcpCheck {
        port: def.port.unwrap_or(DEFAULT_TCP_PORT),
    };
    Ok(Arc::new(TargetLoop::new(def, targets, check, ctx.logger)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{FailureCounter, Logger};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    fn ctx() -> ProbeContext {
        ProbeContext {
            targets_options: None,
            vars: Arc::new(HashMap::new()),
            logger: Logger::new("probe.tcp", &FailureCounter::new()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_connects_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let targets = Targets::new(vec!["127.0.0.1".to_string()], None);
        let check = TcpCheck { port };
        assert!(check.check(&targets, "127.0.0.1").await.is_ok());
    }

    #[tokio::test]
    async fn test_refused_connection_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let targets = Targets::new(vec!["127.0.0.1".to_string()], None);
        let check = TcpCheck { port };
        assert!(check.check(&targets, "127.0.0.1").await.is_err());
    }

    #[test]
    fn test_build_requires_targets() {
        let def = ProbeDef::new("db", "tcp");
        assert!(matches!(build(&def, ctx()), Err(ProbeError::NoTargets(n)) if n == "db"));
    }

    #[test]
    fn test_build_rejects_options() {
        let mut def = ProbeDef::new("db", "tcp");
        def.targets = vec!["localhost".to_string()];
        def.options = serde_yaml::from_str("path: /").unwrap();
        assert!(matches!(build(&def, ctx()), Err(ProbeError::InvalidOptions { .. })));
    }

    #[test]
    fn test_build_ok() {
        let mut def = ProbeDef::new("db", "tcp");
        def.targets = vec!["localhost".to_string()];
        let probe = build(&def, ctx()).unwrap();
        assert_eq!(probe.name(), "db");
    }
}
