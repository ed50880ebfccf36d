//! Trigger scheduling.
//!
//! The [`Scheduler`] fuses a wall-clock interval and an inbound event queue
//! into a single stream of [`TriggerEvent`]s. Each call to
//! [`Scheduler::next_trigger`] makes one decision:
//!
//! 1. queue an `interval` event if the interval is due,
//! 2. normalize and queue the oldest pending payload as an `external` event,
//! 3. hand out the oldest decided event (FIFO, not priority),
//! 4. otherwise sleep until the interval is due, waking early if an event
//!    is received, and try again,
//! 5. if still nothing is ready, return a `fallback` event.
//!
//! Scheduling never fails; internal anomalies degrade to a fallback event.

pub mod events;
pub mod interval;

pub use events::normalize_deployment;
pub use interval::IntervalTrigger;

use crate::models::TriggerEvent;
use serde_json::Value;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Callback invoked with every received event, after normalization.
pub type EventHandler = Arc<dyn Fn(&TriggerEvent) -> anyhow::Result<()> + Send + Sync>;

struct State {
    interval: IntervalTrigger,
    /// Raw payloads awaiting a scheduling decision.
    pending: VecDeque<Value>,
    /// Decided events awaiting delivery.
    decided: VecDeque<TriggerEvent>,
}

/// Merges the interval clock and the inbound event queue.
pub struct Scheduler {
    state: Mutex<State>,
    handlers: Mutex<Vec<EventHandler>>,
    wake: Notify,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                interval: IntervalTrigger::new(interval),
                pending: VecDeque::new(),
                decided: VecDeque::new(),
            }),
            handlers: Mutex::new(Vec::new()),
            wake: Notify::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.lock_state().interval.interval()
    }

    /// Register a callback for received events.
    pub fn register_handler<F>(&self, handler: F)
    where
        F: Fn(&TriggerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        lock(&self.handlers).push(Arc::new(handler));
    }

    /// Accept an inbound payload.
    ///
    /// The payload is queued for the next scheduling decision and every
    /// handler is called with its normalized form. A failing handler is
    /// logged and skipped; it never affects the other handlers or the queue.
    pub fn receive(&self, payload: Value) {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!("Received event: {}", action);

        let event = normalize_deployment(&payload);
        self.lock_state().pending.push_back(payload);
        self.wake.notify_one();

        let handlers: Vec<EventHandler> = lock(&self.handlers).clone();
        for (index, handler) in handlers.iter().enumerate() {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error in event handler #{}: {:#}", index, e),
                Err(_) => error!("Event handler #{} panicked", index),
            }
        }
    }

    pub fn has_pending_events(&self) -> bool {
        !self.lock_state().pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Wait for the next trigger decision.
    ///
    /// Dropping the returned future while it waits leaves the scheduler
    /// untouched: decisions are made synchronously under the lock.
    pub async fn next_trigger(&self) -> TriggerEvent {
        loop {
            // Register interest before checking state so a receive that
            // lands in between still wakes us.
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.decide() {
                debug!("Trigger decided: {}", event.kind);
                return event;
            }

            let deadline = match self.next_deadline() {
                Some(deadline) => deadline,
                None => {
                    warn!("Interval deadline overflowed; emitting fallback trigger");
                    return TriggerEvent::fallback();
                }
            };

            debug!(
                "Waiting {:?} for the next interval",
                deadline.saturating_duration_since(Instant::now())
            );

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(event) = self.decide() {
                        return event;
                    }
                    warn!("Woke at interval deadline with nothing to run; emitting fallback trigger");
                    return TriggerEvent::fallback();
                }
                _ = &mut notified => {
                    // Either an event arrived or the permit was left over from a
                    // payload that was already consumed; the loop re-checks.
                }
            }
        }
    }

    /// One non-blocking scheduling decision.
    fn decide(&self) -> Option<TriggerEvent> {
        let mut state = self.lock_state();
        let now = Instant::now();

        if state.interval.should_fire(now) {
            state.decided.push_back(TriggerEvent::interval());
            state.interval.mark_fired(now);
        }

        if let Some(payload) = state.pending.pop_front() {
            let event = normalize_deployment(&payload);
            state.decided.push_back(event);
        }

        state.decided.pop_front()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.lock_state().interval.next_fire_at(Instant::now())
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

/// Recover from poisoning: the queues stay structurally valid even if a
/// holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TriggerKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const INTERVAL: Duration = Duration::from_secs(30 * 60);

    fn deployment() -> Value {
        json!({
            "deployment": { "environment": "production", "ref": "main", "sha": "abc123" },
            "repository": { "full_name": "o/r" }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_trigger_is_interval_without_waiting() {
        let scheduler = Scheduler::new(INTERVAL);
        let start = Instant::now();

        let event = scheduler.next_trigger().await;
        assert_eq!(event.kind, TriggerKind::Interval);
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_and_external_both_delivered() {
        let scheduler = Scheduler::new(INTERVAL);
        scheduler.receive(deployment());

        let first = scheduler.next_trigger().await;
        let second = scheduler.next_trigger().await;

        assert_eq!(first.kind, TriggerKind::Interval);
        assert_eq!(second.kind, TriggerKind::External);
        assert_eq!(
            second.deployment.unwrap().sha.as_deref(),
            Some("abc123")
        );
        assert!(!scheduler.has_pending_events());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_delivered_in_arrival_order() {
        let scheduler = Scheduler::new(INTERVAL);
        scheduler.next_trigger().await;

        scheduler.receive(json!({ "sha": "one" }));
        scheduler.receive(json!({ "sha": "two" }));
        assert_eq!(scheduler.pending_len(), 2);

        let a = scheduler.next_trigger().await;
        let b = scheduler.next_trigger().await;
        assert_eq!(a.deployment.unwrap().sha.as_deref(), Some("one"));
        assert_eq!(b.deployment.unwrap().sha.as_deref(), Some("two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_full_interval() {
        let scheduler = Scheduler::new(INTERVAL);
        let start = Instant::now();
        scheduler.next_trigger().await;

        let event = scheduler.next_trigger().await;
        assert_eq!(event.kind, TriggerKind::Interval);
        assert!(Instant::now() - start >= INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_event_cuts_wait_short() {
        let scheduler = Arc::new(Scheduler::new(INTERVAL));
        let start = Instant::now();
        scheduler.next_trigger().await;

        let producer = Arc::clone(&scheduler);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            producer.receive(deployment());
        });

        let event = scheduler.next_trigger().await;
        assert_eq!(event.kind, TriggerKind::External);
        assert!(Instant::now() - start < INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_wakeup_does_not_produce_fallback() {
        let scheduler = Scheduler::new(INTERVAL);
        scheduler.next_trigger().await;

        // Consumed before anyone waits, leaving a stored permit behind.
        scheduler.receive(deployment());
        assert_eq!(scheduler.next_trigger().await.kind, TriggerKind::External);

        let event = scheduler.next_trigger().await;
        assert_eq!(event.kind, TriggerKind::Interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_is_resumable() {
        let scheduler = Scheduler::new(INTERVAL);
        scheduler.next_trigger().await;

        let timed_out =
            tokio::time::timeout(Duration::from_secs(5), scheduler.next_trigger()).await;
        assert!(timed_out.is_err());

        scheduler.receive(deployment());
        assert_eq!(scheduler.next_trigger().await.kind, TriggerKind::External);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_deadline_degrades_to_fallback() {
        let scheduler = Scheduler::new(Duration::MAX);
        assert_eq!(scheduler.next_trigger().await.kind, TriggerKind::Interval);

        let event = scheduler.next_trigger().await;
        assert_eq!(event.kind, TriggerKind::Fallback);
        assert!(event.deployment.is_none());

        // Events still flow after a fallback.
        scheduler.receive(deployment());
        assert_eq!(scheduler.next_trigger().await.kind, TriggerKind::External);
    }

    #[tokio::test]
    async fn test_handlers_called_and_failures_isolated() {
        let scheduler = Scheduler::new(INTERVAL);
        let calls = Arc::new(AtomicUsize::new(0));

        scheduler.register_handler(|_| Err(anyhow::anyhow!("handler exploded")));
        scheduler.register_handler(|_| panic!("handler panicked"));
        let counter = Arc::clone(&calls);
        scheduler.register_handler(move |event| {
            assert_eq!(event.kind, TriggerKind::External);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        scheduler.receive(deployment());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_len(), 1);
    }

    #[test]
    fn test_receive_without_handlers() {
        let scheduler = Scheduler::new(INTERVAL);
        assert!(!scheduler.has_pending_events());
        scheduler.receive(json!({}));
        assert!(scheduler.has_pending_events());
        assert_eq!(scheduler.interval(), INTERVAL);
    }
}
