//! Shared run loop for target-based probes
//!
//! Every interval, each target is checked once under the probe timeout. The
//! loop keeps cumulative counters per target and emits one record per target
//! per round:
//!
//! ```text
//! <ts> labels=ptype=tcp,probe=db,dst=10.0.0.5 total=12 success=11 latency_usec=48211
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ProbeDef;
use crate::events::EventSink;
use crate::logger::Logger;
use crate::metrics::{EventRecord, MetricKind};
use crate::targets::Targets;

use super::Probe;

/// One check against one target
#[async_trait]
pub trait TargetCheck: Send + Sync {
    /// Value of the `ptype` label
    fn probe_type(&self) -> &'static str;

    async fn check(&self, targets: &Targets, target: &str) -> Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TargetStats {
    pub total: u64,
    pub success: u64,
    pub latency_usec: u64,
}

/// Drives a [`TargetCheck`] over a target list on a fixed interval
pub struct TargetLoop<C> {
    name: String,
    interval: Duration,
    timeout: Duration,
    targets: Targets,
    check: C,
    logger: Logger,
}

impl<C: TargetCheck> TargetLoop<C> {
    pub fn new(def: &ProbeDef, targets: Targets, check: C, logger: Logger) -> Self {
        Self {
            name: def.name.clone(),
            interval: def.interval(),
            timeout: def.timeout(),
            targets,
            check,
            logger,
        }
    }

    /// Check every target once, updating `stats`
    pub async fn run_round(&self, stats: &mut HashMap<String, TargetStats>) {
        for target in self.targets.list() {
            let started = Instant::now();
            let result = match time::timeout(self.timeout, self.check.check(&self.targets, target)).await {
                Ok(r) => r,
                Err(_) => Err(format!("timed out after {:?}", self.timeout)),
            };

            let entry = stats.entry(target.clone()).or_default();
            entry.total += 1;
            match result {
                Ok(()) => {
                    entry.success += 1;
                    entry.latency_usec += u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
                }
                Err(e) => self.logger.debug(format!("target {} failed: {}", target, e)),
            }
        }
    }

    fn record_for(&self, target: &str, stats: &TargetStats) -> EventRecord {
        EventRecord::new(MetricKind::Cumulative)
            .with_label("ptype", self.check.probe_type())
            .with_label("probe", self.name.as_str())
            .with_label("dst", target)
            .with_metric("total", stats.total)
            .with_metric("success", stats.success)
            .with_metric("latency_usec", stats.latency_usec)
    }
}

#[async_trait]
impl<C: TargetCheck> Probe for TargetLoop<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, lifetime: CancellationToken, sink: EventSink) {
        debug!(probe = %self.name, interval = ?self.interval, "TargetLoop::run: starting");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats: HashMap<String, TargetStats> = HashMap::new();

        loop {
            tokio::select! {
                _ = lifetime.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = lifetime.cancelled() => break,
                _ = self.run_round(&mut stats) => {}
            }

            for target in self.targets.list() {
                let Some(s) = stats.get(target) else { continue };
                if sink.send(self.record_for(target, s)).await.is_err() {
                    self.logger.warn("event bus closed, stopping probe");
                    return;
                }
            }
        }
        debug!(probe = %self.name, "TargetLoop::run: stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::logger::FailureCounter;

    struct EvenOnly;

    #[async_trait]
    impl TargetCheck for EvenOnly {
        fn probe_type(&self) -> &'static str {
            "fake"
        }

        async fn check(&self, _targets: &Targets, target: &str) -> Result<(), String> {
            let n: u32 = target.parse().map_err(|_| "not a number".to_string())?;
            if n % 2 == 0 { Ok(()) } else { Err("odd".to_string()) }
        }
    }

    struct Slow;

    #[async_trait]
    impl TargetCheck for Slow {
        fn probe_type(&self) -> &'static str {
            "slow"
        }

        async fn check(&self, _targets: &Targets, _target: &str) -> Result<(), String> {
            time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn def(interval_msec: u64, timeout_msec: u64) -> ProbeDef {
        ProbeDef {
            interval_msec,
            timeout_msec,
            ..ProbeDef::new("p1", "fake")
        }
    }

    fn logger() -> Logger {
        Logger::new("probe.p1", &FailureCounter::new()).unwrap()
    }

    fn targets(hosts: &[&str]) -> Targets {
        Targets::new(hosts.iter().map(|h| h.to_string()).collect(), None)
    }

    #[tokio::test]
    async fn test_round_counts_success_and_failure() {
        let probe = TargetLoop::new(&def(1000, 100), targets(&["2", "3"]), EvenOnly, logger());
        let mut stats = HashMap::new();
        probe.run_round(&mut stats).await;
        probe.run_round(&mut stats).await;

        assert_eq!(stats["2"].total, 2);
        assert_eq!(stats["2"].success, 2);
        assert_eq!(stats["3"].total, 2);
        assert_eq!(stats["3"].success, 0);
        assert_eq!(stats["3"].latency_usec, 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let probe = TargetLoop::new(&def(100, 20), targets(&["x"]), Slow, logger());
        let mut stats = HashMap::new();
        probe.run_round(&mut stats).await;
        assert_eq!(stats["x"], TargetStats { total: 1, success: 0, latency_usec: 0 });
    }

    #[tokio::test]
    async fn test_run_emits_one_record_per_target() {
        let probe = TargetLoop::new(&def(20, 10), targets(&["2", "4"]), EvenOnly, logger());
        let (sink, mut stream) = EventBus::new(16).split();
        let token = CancellationToken::new();
        let run_token = token.clone();
        let handle = tokio::spawn(async move { probe.run(run_token, sink).await });

        let first = stream.recv().await.unwrap();
        let second = stream.recv().await.unwrap();
        token.cancel();
        handle.await.unwrap();

        assert_eq!(first.label("ptype"), Some("fake"));
        assert_eq!(first.label("probe"), Some("p1"));
        assert_eq!(first.label("dst"), Some("2"));
        assert_eq!(second.label("dst"), Some("4"));
        assert_eq!(first.metric("total").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(first.metric("success").and_then(|v| v.as_i64()), Some(1));
    }

    #[tokio::test]
    async fn test_run_stops_when_bus_closed() {
        let probe = TargetLoop::new(&def(10, 5), targets(&["2"]), EvenOnly, logger());
        let (sink, stream) = EventBus::new(1).split();
        drop(stream);
        let token = CancellationToken::new();
        tokio::time::timeout(Duration::from_secs(5), probe.run(token, sink))
            .await
            .unwrap();
    }
}
