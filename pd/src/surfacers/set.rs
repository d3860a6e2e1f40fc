//! SurfacerSet - non-blocking fan-out over every registered surfacer
//!
//! ```text
//!    emit(Arc<EventRecord>)
//!        ├──► [queue S1] ─► worker S1 ─► S1.write()
//!        ├──► [queue S2] ─► worker S2 ─► S2.write()
//!        └──► [queue SN] ─► worker SN ─► SN.write()
//! ```
//!
//! `emit` never waits, so it returns immediately no matter what a surfacer
//! does. Each queue is FIFO, so every surfacer sees records in dispatch order.
//! By default a queue keeps every record and a backlog past `queue-capacity`
//! is only reported; with [`Overflow::Drop`] records beyond the capacity are
//! dropped for that surfacer alone. Errors and panics inside `write` are
//! logged and counted, and the worker moves on to the next record.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Overflow;
use crate::logger::Logger;
use crate::metrics::EventRecord;

use super::Surfacer;

/// A constructed surfacer with its queue settings and logger, ready to be spawned
pub struct SurfacerEntry {
    pub surfacer: Arc<dyn Surfacer>,
    pub queue_capacity: usize,
    pub overflow: Overflow,
    pub logger: Logger,
}

impl SurfacerEntry {
    pub fn new(surfacer: Arc<dyn Surfacer>, queue_capacity: usize, logger: Logger) -> Self {
        Self {
            surfacer,
            queue_capacity,
            overflow: Overflow::default(),
            logger,
        }
    }

    pub fn with_overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn name(&self) -> &str {
        self.surfacer.name()
    }
}

struct SurfacerChannel {
    name: String,
    sender: mpsc::UnboundedSender<Arc<EventRecord>>,
    capacity: usize,
    overflow: Overflow,
    /// Records queued but not yet taken by the worker
    backlog: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
    logger: Logger,
}

/// Fan-out with one queue and one worker task per surfacer
pub struct SurfacerSet {
    channels: Vec<SurfacerChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl SurfacerSet {
    /// Spawn one worker per surfacer, in registration order
    pub fn spawn(entries: Vec<SurfacerEntry>, lifetime: &CancellationToken) -> Self {
        let mut channels = Vec::with_capacity(entries.len());
        let mut workers = Vec::with_capacity(entries.len());

        for entry in entries {
            let name = entry.name().to_string();
            let capacity = entry.queue_capacity.max(1);
            debug!(surfacer = %name, capacity, overflow = ?entry.overflow, "SurfacerSet::spawn: starting worker");

            let (tx, rx) = mpsc::unbounded_channel::<Arc<EventRecord>>();
            let backlog = Arc::new(AtomicUsize::new(0));
            let handle = tokio::spawn(run_worker(
                Arc::clone(&entry.surfacer),
                rx,
                Arc::clone(&backlog),
                lifetime.clone(),
                entry.logger.clone(),
            ));

            channels.push(SurfacerChannel {
                name,
                sender: tx,
                capacity,
                overflow: entry.overflow,
                backlog,
                dropped: Arc::new(AtomicU64::new(0)),
                logger: entry.logger,
            });
            workers.push(handle);
        }

        Self { channels, workers }
    }

    /// Queue `record` for every surfacer without waiting on any of them
    pub fn emit(&self, record: Arc<EventRecord>) {
        for channel in &self.channels {
            let backlog = channel.backlog.load(Ordering::Acquire);
            if channel.overflow == Overflow::Drop && backlog >= channel.capacity {
                let dropped = channel.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                channel
                    .logger
                    .warn(format!("surfacer '{}' dropped record: queue full (total dropped {})", channel.name, dropped));
                continue;
            }

            channel.backlog.fetch_add(1, Ordering::AcqRel);
            if channel.sender.send(Arc::clone(&record)).is_err() {
                channel.backlog.fetch_sub(1, Ordering::AcqRel);
                channel.dropped.fetch_add(1, Ordering::Relaxed);
                channel
                    .logger
                    .warn(format!("surfacer '{}' dropped record: worker closed", channel.name));
                continue;
            }
            if channel.overflow == Overflow::Buffer && backlog + 1 == channel.capacity {
                channel.logger.warn(format!(
                    "surfacer '{}' is lagging: {} records queued",
                    channel.name,
                    backlog + 1
                ));
            }
        }
    }

    /// Per-surfacer count of records dropped on a full or closed queue
    pub fn dropped(&self) -> Vec<(String, u64)> {
        self.channels
            .iter()
            .map(|c| (c.name.clone(), c.dropped.load(Ordering::Relaxed)))
            .collect()
    }

    /// Per-surfacer count of records waiting for the worker
    pub fn backlog(&self) -> Vec<(String, usize)> {
        self.channels
            .iter()
            .map(|c| (c.name.clone(), c.backlog.load(Ordering::Acquire)))
            .collect()
    }

    /// Surfacer names in fan-out order
    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Close every queue and wait for the workers to drain what they hold
    pub async fn shutdown(self) {
        drop(self.channels);
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

async fn run_worker(
    surfacer: Arc<dyn Surfacer>,
    mut rx: mpsc::UnboundedReceiver<Arc<EventRecord>>,
    backlog: Arc<AtomicUsize>,
    lifetime: CancellationToken,
    logger: Logger,
) {
    loop {
        let record = tokio::select! {
            _ = lifetime.cancelled() => break,
            next = rx.recv() => match next {
                Some(record) => record,
                None => break,
            },
        };
        backlog.fetch_sub(1, Ordering::AcqRel);

        let write = AssertUnwindSafe(surfacer.write(&lifetime, record)).catch_unwind();
        let outcome = tokio::select! {
            _ = lifetime.cancelled() => break,
            outcome = write => outcome,
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => logger.error(format!("surfacer '{}' write failed: {}", surfacer.name(), e)),
            Err(panic) => logger.error(format!(
                "surfacer '{}' panicked: {}",
                surfacer.name(),
                panic_message(panic.as_ref())
            )),
        }
    }
    debug!(surfacer = surfacer.name(), "SurfacerSet: worker exiting");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::FailureCounter;
    use crate::metrics::MetricKind;
    use crate::surfacers::SurfacerError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Surfacer for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn write(&self, _lifetime: &CancellationToken, record: Arc<EventRecord>) -> Result<(), SurfacerError> {
            let value = record.metric("value").and_then(|v| v.as_i64()).unwrap_or(-1);
            self.seen.lock().unwrap().push(value);
            Ok(())
        }
    }

    /// Healthy, but slower than the producer
    #[derive(Default)]
    struct Slow {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Surfacer for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn write(&self, _lifetime: &CancellationToken, record: Arc<EventRecord>) -> Result<(), SurfacerError> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            let value = record.metric("value").and_then(|v| v.as_i64()).unwrap_or(-1);
            self.seen.lock().unwrap().push(value);
            Ok(())
        }
    }

    struct Stuck;

    #[async_trait]
    impl Surfacer for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn write(&self, _lifetime: &CancellationToken, _record: Arc<EventRecord>) -> Result<(), SurfacerError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct Exploding;

    #[async_trait]
    impl Surfacer for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        async fn write(&self, _lifetime: &CancellationToken, record: Arc<EventRecord>) -> Result<(), SurfacerError> {
            if record.metric("value").and_then(|v| v.as_i64()) == Some(1) {
                panic!("boom");
            }
            Err(SurfacerError::Write("backend down".to_string()))
        }
    }

    fn record(value: i64) -> Arc<EventRecord> {
        Arc::new(EventRecord::new(MetricKind::Gauge).with_metric("value", value))
    }

    fn entry(surfacer: Arc<dyn Surfacer>, cap: usize, counter: &FailureCounter) -> SurfacerEntry {
        let logger = Logger::new(&format!("surfacer.{}", surfacer.name()), counter).unwrap();
        SurfacerEntry::new(surfacer, cap, logger)
    }

    async fn wait_for(recording: &Recording, n: usize) {
        for _ in 0..100 {
            if recording.seen.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_emit_delivers_in_order() {
        let counter = FailureCounter::new();
        let token = CancellationToken::new();
        let recording = Arc::new(Recording::default());
        let set = SurfacerSet::spawn(vec![entry(recording.clone(), 16, &counter)], &token);

        for i in 0..5 {
            set.emit(record(i));
        }
        wait_for(&recording, 5).await;

        assert_eq!(*recording.seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_stuck_surfacer_does_not_delay_others() {
        let counter = FailureCounter::new();
        let token = CancellationToken::new();
        let recording = Arc::new(Recording::default());
        let set = SurfacerSet::spawn(
            vec![entry(Arc::new(Stuck), 2, &counter), entry(recording.clone(), 4, &counter)],
            &token,
        );

        for i in 0..20 {
            set.emit(record(i));
        }
        wait_for(&recording, 20).await;

        assert_eq!(recording.seen.lock().unwrap().len(), 20);
        // at most one record is held by the stuck worker, the rest stay queued
        let backlog = set.backlog();
        assert_eq!(backlog[0].0, "stuck");
        assert!(backlog[0].1 >= 19);
        assert_eq!(set.dropped(), vec![("stuck".to_string(), 0), ("recording".to_string(), 0)]);

        token.cancel();
        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_overflow_only_affects_its_surfacer() {
        let counter = FailureCounter::new();
        let token = CancellationToken::new();
        let recording = Arc::new(Recording::default());
        let set = SurfacerSet::spawn(
            vec![
                entry(Arc::new(Stuck), 2, &counter).with_overflow(Overflow::Drop),
                entry(recording.clone(), 64, &counter),
            ],
            &token,
        );

        for i in 0..20 {
            set.emit(record(i));
        }
        wait_for(&recording, 20).await;

        assert_eq!(recording.seen.lock().unwrap().len(), 20);
        let dropped = set.dropped();
        assert_eq!(dropped[0].0, "stuck");
        assert!(dropped[0].1 >= 17, "stuck surfacer should overflow its own queue");
        assert_eq!(dropped[1], ("recording".to_string(), 0));
        assert_eq!(counter.get(), 0);

        token.cancel();
        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_surfacer_gets_whole_burst() {
        let counter = FailureCounter::new();
        let token = CancellationToken::new();
        let slow = Arc::new(Slow::default());
        let set = SurfacerSet::spawn(vec![entry(slow.clone(), 16, &counter)], &token);

        for i in 0..200 {
            set.emit(record(i));
        }
        set.shutdown().await;

        assert_eq!(*slow.seen.lock().unwrap(), (0..200).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_panics_and_errors_are_isolated() {
        let counter = FailureCounter::new();
        let token = CancellationToken::new();
        let recording = Arc::new(Recording::default());
        let set = SurfacerSet::spawn(
            vec![entry(Arc::new(Exploding), 16, &counter), entry(recording.clone(), 16, &counter)],
            &token,
        );

        for i in 0..3 {
            set.emit(record(i));
        }
        wait_for(&recording, 3).await;
        assert_eq!(*recording.seen.lock().unwrap(), vec![0, 1, 2]);

        set.shutdown().await;
        // value 1 panics, 0 and 2 return errors
        assert_eq!(counter.get(), 3);
    }

    #[tokio::test]
    async fn test_names_follow_registration_order() {
        let counter = FailureCounter::new();
        let token = CancellationToken::new();
        let set = SurfacerSet::spawn(
            vec![
                entry(Arc::new(Recording::default()), 1, &counter),
                entry(Arc::new(Stuck), 1, &counter),
            ],
            &token,
        );
        assert_eq!(set.names(), vec!["recording", "stuck"]);
        assert_eq!(set.len(), 2);
        token.cancel();
        set.shutdown().await;
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
