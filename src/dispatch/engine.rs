//! # Dispatch Engine
//!
//! Single consumer loop that drains the event queue in publish order and fans
//! each event out to every matching handler.
//!
//! ## Delivery
//!
//! For every event pulled from the queue:
//!
//! 1. look up the handlers whose patterns match the routing key,
//! 2. discard the event if there are none,
//! 3. bind the event onto each handler's parameters,
//! 4. run every invocation as an independent task,
//! 5. publish a [`DispatchOutcome`] per invocation.
//!
//! The loop never waits for handlers to finish; it only waits for a free slot
//! when `max_jobs` invocations are already in flight. Handler errors, panics,
//! and timeouts are contained in the invocation task.
//!
//! ## Shutdown
//!
//! Shutdown is observed even while the loop waits for a free slot. The queue
//! is then closed and one drain deadline (`drain_timeout`) starts. Until it
//! passes, queued events are still dispatched and in-flight invocations are
//! awaited. Past the deadline, events never handed to their handlers are
//! counted as undelivered and running invocations are aborted.

use crate::config::DispatcherConfig;
use crate::dispatch::dead_letter::DeadLetterStore;
use crate::dispatch::handler::{HandlerArgs, HandlerError};
use crate::events::types::{DeadLetter, DispatchOutcome, PublishedEvent};
use crate::logging::log_handler_failure;
use crate::registry::handler_registry::{HandlerEntry, HandlerRegistry};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Summary of a completed drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events handed to all of their handlers over the consumer's lifetime
    pub events_dispatched: u64,
    /// Accepted events not handed to all of their handlers before the drain deadline
    pub undelivered_events: usize,
    /// Invocations aborted because the drain timeout elapsed
    pub abandoned_handlers: usize,
}

/// Invocations of one event still waiting for a free slot
struct FanOut {
    event: Arc<PublishedEvent>,
    entries: VecDeque<Arc<HandlerEntry>>,
}

pub(crate) struct DispatchEngine {
    registry: Arc<HandlerRegistry>,
    outcomes: broadcast::Sender<DispatchOutcome>,
    dead_letters: Arc<DeadLetterStore>,
    /// Bounds concurrent handler invocations
    permits: Arc<Semaphore>,
    max_jobs: usize,
    retry_delay: Duration,
    handler_timeout: Option<Duration>,
    drain_timeout: Duration,
}

impl DispatchEngine {
    pub(crate) fn new(
        registry: Arc<HandlerRegistry>,
        config: &DispatcherConfig,
        outcomes: broadcast::Sender<DispatchOutcome>,
        dead_letters: Arc<DeadLetterStore>,
    ) -> Self {
        Self {
            registry,
            outcomes,
            dead_letters,
            permits: Arc::new(Semaphore::new(config.max_jobs)),
            max_jobs: config.max_jobs,
            retry_delay: config.retry_delay(),
            handler_timeout: config.handler_timeout(),
            drain_timeout: config.drain_timeout(),
        }
    }

    /// Number of handler invocations currently running
    pub(crate) fn in_flight(&self) -> usize {
        self.max_jobs - self.permits.available_permits()
    }

    /// Consumer loop; returns once the queue is drained after shutdown
    pub(crate) async fn run(
        self: Arc<Self>,
        mut queue: mpsc::UnboundedReceiver<PublishedEvent>,
        mut shutdown: oneshot::Receiver<()>,
        ready: oneshot::Sender<()>,
    ) -> DrainReport {
        let mut in_flight = JoinSet::new();
        let mut events_dispatched = 0u64;
        let mut interrupted = None;

        info!(max_jobs = self.max_jobs, "Dispatch consumer loop started");
        let _ = ready.send(());

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    Self::reap(joined);
                }
                event = queue.recv() => match event {
                    Some(event) => {
                        let mut fan_out = self.fan_out(event);
                        if self.spawn_all(&mut fan_out, &mut in_flight, &mut shutdown).await {
                            events_dispatched += 1;
                        } else {
                            // Shutdown arrived while waiting for a free slot
                            interrupted = Some(fan_out);
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        queue.close();
        let report = self
            .drain(queue, &mut in_flight, interrupted, events_dispatched)
            .await;

        if report.undelivered_events > 0 {
            warn!(
                undelivered_events = report.undelivered_events,
                drain_timeout_ms = self.drain_timeout.as_millis() as u64,
                "Drain timeout reached before all queued events were dispatched"
            );
        }
        info!(
            events_dispatched = report.events_dispatched,
            undelivered_events = report.undelivered_events,
            abandoned_handlers = report.abandoned_handlers,
            "Dispatch consumer loop drained"
        );

        report
    }

    /// Delivers what is left under a single `drain_timeout` deadline
    async fn drain(
        self: &Arc<Self>,
        mut queue: mpsc::UnboundedReceiver<PublishedEvent>,
        in_flight: &mut JoinSet<()>,
        mut pending: Option<FanOut>,
        mut events_dispatched: u64,
    ) -> DrainReport {
        let expiry = tokio::time::sleep(self.drain_timeout);
        tokio::pin!(expiry);
        let mut undelivered_events = 0;

        loop {
            let mut fan_out = match pending.take() {
                Some(fan_out) => fan_out,
                None => tokio::select! {
                    biased;
                    _ = &mut expiry => break,
                    event = queue.recv() => match event {
                        Some(event) => self.fan_out(event),
                        None => break,
                    },
                },
            };

            if self.spawn_all(&mut fan_out, in_flight, &mut expiry).await {
                events_dispatched += 1;
            } else {
                undelivered_events += 1;
                break;
            }
        }

        while queue.try_recv().is_ok() {
            undelivered_events += 1;
        }

        let abandoned_handlers = self.wait_in_flight(in_flight, &mut expiry).await;

        DrainReport {
            events_dispatched,
            undelivered_events,
            abandoned_handlers,
        }
    }

    fn fan_out(&self, event: PublishedEvent) -> FanOut {
        let entries = self.registry.lookup(&event.routing_key);
        if entries.is_empty() {
            debug!(
                routing_key = %event.routing_key,
                event_id = %event.id,
                "No handlers registered for event, discarding"
            );
        }

        FanOut {
            event: Arc::new(event),
            entries: entries.into(),
        }
    }

    /// Spawns every pending invocation, one permit each.
    ///
    /// Returns `false` if `interrupt` completes first; invocations not yet
    /// spawned stay in `fan_out`.
    async fn spawn_all<I>(
        self: &Arc<Self>,
        fan_out: &mut FanOut,
        in_flight: &mut JoinSet<()>,
        interrupt: &mut I,
    ) -> bool
    where
        I: Future + Unpin,
    {
        while !fan_out.entries.is_empty() {
            let permit = tokio::select! {
                biased;
                _ = &mut *interrupt => return false,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(error = %e, "Handler semaphore closed, dropping event");
                        fan_out.entries.clear();
                        return true;
                    }
                },
            };

            let Some(entry) = fan_out.entries.pop_front() else {
                break;
            };
            let engine = Arc::clone(self);
            let event = Arc::clone(&fan_out.event);
            in_flight.spawn(async move {
                engine.invoke(entry, event).await;
                drop(permit);
            });
        }

        true
    }

    async fn invoke(&self, entry: Arc<HandlerEntry>, event: Arc<PublishedEvent>) {
        let span = info_span!(
            "consumer",
            use_case = %entry.use_case(),
            routing_key = %event.routing_key,
            event_id = %event.id,
        );
        self.deliver(&entry, &event).instrument(span).await;
    }

    async fn deliver(&self, entry: &HandlerEntry, event: &PublishedEvent) {
        let max_attempts = entry.retries().saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.call_once(entry, event).await {
                Ok(()) => {
                    debug!(attempt = attempt, "Handler completed");
                    self.record(DispatchOutcome::Succeeded {
                        use_case: entry.use_case().to_string(),
                        event_id: event.id,
                        routing_key: event.routing_key.clone(),
                        attempts: attempt,
                    });
                    return;
                }
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %error,
                        "Handler failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(error) => {
                    let error = error.to_string();
                    log_handler_failure(entry.use_case(), &event.routing_key, attempt, &error);

                    self.dead_letters.push(DeadLetter {
                        use_case: entry.use_case().to_string(),
                        event: event.clone(),
                        error: error.clone(),
                        attempts: attempt,
                        failed_at: Utc::now(),
                    });
                    self.record(DispatchOutcome::Failed {
                        use_case: entry.use_case().to_string(),
                        event_id: event.id,
                        routing_key: event.routing_key.clone(),
                        attempts: attempt,
                        error,
                    });
                    return;
                }
            }
        }
    }

    async fn call_once(
        &self,
        entry: &HandlerEntry,
        event: &PublishedEvent,
    ) -> Result<(), HandlerError> {
        let args = HandlerArgs::bind(entry.plan(), event);
        let call = AssertUnwindSafe(entry.handler().handle(args)).catch_unwind();

        let result = match self.handler_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| HandlerError::Timeout(limit))?,
            None => call.await,
        };

        result.unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))))
    }

    fn record(&self, outcome: DispatchOutcome) {
        // No outcome subscribers is fine
        let _ = self.outcomes.send(outcome);
    }

    async fn wait_in_flight(
        &self,
        in_flight: &mut JoinSet<()>,
        expiry: &mut Pin<&mut Sleep>,
    ) -> usize {
        if in_flight.is_empty() {
            return 0;
        }

        debug!(in_flight = in_flight.len(), "Waiting for in-flight handlers");
        loop {
            tokio::select! {
                biased;
                joined = in_flight.join_next() => match joined {
                    Some(joined) => Self::reap(joined),
                    None => return 0,
                },
                _ = &mut *expiry => break,
            }
        }

        let abandoned = in_flight.len();
        warn!(
            abandoned = abandoned,
            drain_timeout_ms = self.drain_timeout.as_millis() as u64,
            "Drain timeout reached, abandoning in-flight handlers"
        );
        in_flight.abort_all();
        while in_flight.join_next().await.is_some() {}

        abandoned
    }

    fn reap(joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "Handler task panicked");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handler::FnHandler;
    use crate::events::payload::Payload;
    use crate::registry::pattern::RoutingPattern;
    use crate::registry::signature::HandlerSignature;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Harness {
        registry: Arc<HandlerRegistry>,
        outcomes: broadcast::Receiver<DispatchOutcome>,
        dead_letters: Arc<DeadLetterStore>,
        engine: Arc<DispatchEngine>,
    }

    fn harness(config: DispatcherConfig) -> Harness {
        let registry = Arc::new(HandlerRegistry::new());
        let (tx, outcomes) = broadcast::channel(64);
        let dead_letters = Arc::new(DeadLetterStore::new(16));
        let engine = Arc::new(DispatchEngine::new(
            Arc::clone(&registry),
            &config,
            tx,
            Arc::clone(&dead_letters),
        ));
        Harness {
            registry,
            outcomes,
            dead_letters,
            engine,
        }
    }

    fn register<F, Fut>(registry: &HandlerRegistry, pattern: &str, use_case: &str, retries: u32, f: F)
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let signature = HandlerSignature::new().payload("event");
        let plan = signature.inspect().unwrap();
        registry
            .register(
                vec![RoutingPattern::new(pattern).unwrap()],
                use_case,
                Arc::new(FnHandler::new(signature, f)),
                plan,
                retries,
            )
            .unwrap();
    }

    fn event(routing_key: &str) -> PublishedEvent {
        PublishedEvent::new(routing_key, Payload::try_from(json!({"name": "test"})).unwrap())
    }

    async fn run_events(engine: Arc<DispatchEngine>, events: Vec<PublishedEvent>) -> DrainReport {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(engine.run(queue_rx, shutdown_rx, ready_tx));
        ready_rx.await.unwrap();

        for event in events {
            queue_tx.send(event).unwrap();
        }
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap()
    }

    #[tokio::test]
    async fn test_unmatched_event_is_discarded() {
        let h = harness(DispatcherConfig::default());
        let report = run_events(h.engine, vec![event("nobody.listens")]).await;

        assert_eq!(report.events_dispatched, 1);
        assert_eq!(report.abandoned_handlers, 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let mut h = harness(DispatcherConfig::default());
        register(&h.registry, "user.created", "panics", 0, |_args| async {
            if true {
                panic!("handler exploded");
            }
            Ok(())
        });

        run_events(Arc::clone(&h.engine), vec![event("user.created")]).await;

        let outcome = h.outcomes.recv().await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.error().unwrap().contains("handler exploded"));
        assert_eq!(h.dead_letters.get("panics").len(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_dead_letters() {
        let config = DispatcherConfig {
            retry_delay_ms: 1,
            ..DispatcherConfig::default()
        };
        let mut h = harness(config);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        register(&h.registry, "user.created", "always_fails", 2, move |_args| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HandlerError::failed("KeyError: foo"))
            }
        });

        run_events(Arc::clone(&h.engine), vec![event("user.created")]).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let outcome = h.outcomes.recv().await.unwrap();
        assert_eq!(outcome.attempts(), 3);
        let letters = h.dead_letters.get("always_fails");
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].error, "KeyError: foo");
    }

    #[tokio::test]
    async fn test_decode_errors_are_not_retried() {
        let mut h = harness(DispatcherConfig {
            retry_delay_ms: 1,
            ..DispatcherConfig::default()
        });
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        register(&h.registry, "user.created", "strict", 5, move |args| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ages: Vec<u32> = args.decode()?;
                Ok::<(), HandlerError>(())
            }
        });

        run_events(Arc::clone(&h.engine), vec![event("user.created")]).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.outcomes.recv().await.unwrap().attempts(), 1);
    }

    #[tokio::test]
    async fn test_handler_timeout() {
        let mut h = harness(DispatcherConfig {
            handler_timeout_ms: Some(20),
            ..DispatcherConfig::default()
        });
        register(&h.registry, "user.created", "slow", 0, |_args| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });

        run_events(Arc::clone(&h.engine), vec![event("user.created")]).await;

        let outcome = h.outcomes.recv().await.unwrap();
        assert!(outcome.error().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_drain_timeout_abandons_handlers() {
        let h = harness(DispatcherConfig {
            drain_timeout_ms: 20,
            ..DispatcherConfig::default()
        });
        register(&h.registry, "user.created", "stuck", 0, |_args| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let report = run_events(Arc::clone(&h.engine), vec![event("user.created")]).await;

        assert_eq!(report.abandoned_handlers, 1);
        assert_eq!(h.engine.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_deadline_covers_events_waiting_for_a_slot() {
        let h = harness(DispatcherConfig {
            max_jobs: 1,
            drain_timeout_ms: 20,
            ..DispatcherConfig::default()
        });
        register(&h.registry, "user.#", "stuck", 0, |_args| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let events = vec![event("user.one"), event("user.two"), event("user.three")];
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            run_events(Arc::clone(&h.engine), events),
        )
        .await
        .expect("drain must finish once the deadline passes");

        assert_eq!(report.events_dispatched, 1);
        assert_eq!(report.undelivered_events, 2);
        assert_eq!(report.abandoned_handlers, 1);
        assert_eq!(h.engine.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_fifo_dispatch_with_single_slot() {
        let h = harness(DispatcherConfig {
            max_jobs: 1,
            ..DispatcherConfig::default()
        });
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        register(&h.registry, "seq.*", "recorder", 0, move |args| {
            let recorder = Arc::clone(&recorder);
            async move {
                let n: u64 = args.payload().get("n").and_then(|v| v.as_u64()).unwrap_or(0);
                recorder.lock().push(n);
                Ok::<(), HandlerError>(())
            }
        });

        let events = (0..20u64)
            .map(|n| PublishedEvent::new("seq.step", Payload::try_from(json!({ "n": n })).unwrap()))
            .collect();
        let report = run_events(Arc::clone(&h.engine), events).await;

        assert_eq!(report.events_dispatched, 20);
        assert_eq!(*seen.lock(), (0..20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_max_jobs_bounds_concurrency() {
        let h = harness(DispatcherConfig {
            max_jobs: 2,
            ..DispatcherConfig::default()
        });
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));
        let (running_c, peak_c) = (Arc::clone(&running), Arc::clone(&peak));
        register(&h.registry, "job.#", "worker", 0, move |_args| {
            let running = Arc::clone(&running_c);
            let peak = Arc::clone(&peak_c);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let events = (0..8).map(|i| event(&format!("job.{i}"))).collect();
        let report = run_events(Arc::clone(&h.engine), events).await;

        assert_eq!(report.events_dispatched, 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
