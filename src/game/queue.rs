//! Deferred Event Queue
//!
//! Named-handler dispatcher drained once per tick. Exactly one handler per
//! signal; registering again replaces the previous handler. Events become
//! eligible once their delay (in ticks) has elapsed and are dispatched in
//! enqueue order.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::game::events::{EventError, Origin, Signal};

/// A pending event.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedEvent {
    /// Event name
    pub signal: Signal,
    /// Positional arguments
    pub params: Vec<Value>,
    /// Ticks left before the event is eligible
    pub delay: u32,
    /// Local or remote
    pub origin: Origin,
}

impl QueuedEvent {
    /// Local event with no delay.
    pub fn local(signal: Signal, params: Vec<Value>) -> Self {
        Self { signal, params, delay: 0, origin: Origin::Local }
    }

    /// Event received from the channel, no delay.
    pub fn remote(signal: Signal, params: Vec<Value>) -> Self {
        Self { signal, params, delay: 0, origin: Origin::Remote }
    }

    /// Builder-style delay.
    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }
}

/// View of an event handed to its handler.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch<'a> {
    /// Event name
    pub signal: Signal,
    /// Positional arguments
    pub params: &'a [Value],
    /// Local or remote
    pub origin: Origin,
}

/// Handler over an explicit context.
pub type Handler<C> = Box<dyn FnMut(&mut C, &Dispatch<'_>) -> Result<(), EventError> + Send>;

/// Result of one `advance` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events dispatched this tick.
    pub dispatched: usize,
    /// Handlers that returned an error.
    pub failed: usize,
    /// The queue went from non-empty to empty during this tick.
    pub drained: bool,
}

/// Delay-aware FIFO dispatcher.
pub struct EventQueue<C> {
    handlers: BTreeMap<Signal, Handler<C>>,
    pending: VecDeque<QueuedEvent>,
}

impl<C> Default for EventQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("pending", &self.pending)
            .finish()
    }
}

impl<C> EventQueue<C> {
    /// Empty queue with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Register the handler for `signal`, replacing any previous one.
    /// Returns true if a handler was replaced.
    pub fn define_handler<F>(&mut self, signal: Signal, handler: F) -> bool
    where
        F: FnMut(&mut C, &Dispatch<'_>) -> Result<(), EventError> + Send + 'static,
    {
        self.handlers.insert(signal, Box::new(handler)).is_some()
    }

    /// Whether `signal` has a handler.
    pub fn is_defined(&self, signal: Signal) -> bool {
        self.handlers.contains_key(&signal)
    }

    /// Append an event. Silently ignored (returns false) when the signal
    /// has no handler yet; handlers may register after early enqueues.
    pub fn push(&mut self, event: QueuedEvent) -> bool {
        if !self.is_defined(event.signal) {
            debug!("Dropping {} enqueued before its handler was defined", event.signal);
            return false;
        }
        self.pending.push_back(event);
        true
    }

    /// Append a local event with zero delay.
    pub fn enqueue(&mut self, signal: Signal, params: Vec<Value>) -> bool {
        self.push(QueuedEvent::local(signal, params))
    }

    /// Append a local event that becomes eligible after `delay` ticks.
    pub fn enqueue_delayed(&mut self, signal: Signal, params: Vec<Value>, delay: u32) -> bool {
        self.push(QueuedEvent::local(signal, params).with_delay(delay))
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run one tick: count every delay down by one, then dispatch every
    /// event whose delay reached zero, in enqueue order.
    pub fn advance(&mut self, ctx: &mut C) -> DrainReport {
        let mut report = DrainReport::default();
        if self.pending.is_empty() {
            return report;
        }

        let mut ready = Vec::new();
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        for mut event in self.pending.drain(..) {
            event.delay = event.delay.saturating_sub(1);
            if event.delay == 0 {
                ready.push(event);
            } else {
                waiting.push_back(event);
            }
        }
        self.pending = waiting;

        for event in ready {
            let Some(handler) = self.handlers.get_mut(&event.signal) else {
                continue;
            };

            #[cfg(feature = "debug-tracing")]
            tracing::trace!(signal = %event.signal, origin = ?event.origin, params = ?event.params, "dispatch");

            let dispatch = Dispatch {
                signal: event.signal,
                params: &event.params,
                origin: event.origin,
            };
            report.dispatched += 1;
            if let Err(e) = handler(ctx, &dispatch) {
                report.failed += 1;
                warn!("Handler for {} failed: {}", event.signal, e);
            }
        }

        report.drained = report.dispatched > 0 && self.pending.is_empty();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    /// Records (signal, first param) in dispatch order.
    type Log = Vec<(Signal, Value)>;

    fn recording_queue() -> EventQueue<Log> {
        let mut queue = EventQueue::new();
        for signal in [Signal::MoveEntity, Signal::Rerender, Signal::DebugMsg] {
            queue.define_handler(signal, |log: &mut Log, d: &Dispatch<'_>| {
                log.push((d.signal, d.params.first().cloned().unwrap_or(Value::Null)));
                Ok(())
            });
        }
        queue
    }

    #[test]
    fn test_unknown_signal_is_noop() {
        let mut queue: EventQueue<Log> = EventQueue::new();
        assert!(!queue.enqueue(Signal::MoveEntity, vec![]));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_redefine_replaces_handler() {
        let mut queue: EventQueue<Vec<&'static str>> = EventQueue::new();
        assert!(!queue.define_handler(Signal::Rerender, |log, _| {
            log.push("first");
            Ok(())
        }));
        assert!(queue.define_handler(Signal::Rerender, |log, _| {
            log.push("second");
            Ok(())
        }));

        let mut log = Vec::new();
        queue.enqueue(Signal::Rerender, vec![]);
        queue.advance(&mut log);
        assert_eq!(log, vec!["second"]);
    }

    #[test]
    fn test_move_then_rerender_single_drain() {
        let mut queue = recording_queue();
        let mut log = Vec::new();

        queue.enqueue(Signal::MoveEntity, vec![json!(1), json!(1), json!(0)]);
        queue.enqueue(Signal::Rerender, vec![]);
        assert_eq!(queue.len(), 2);

        let report = queue.advance(&mut log);
        assert_eq!(report.dispatched, 2);
        assert!(report.drained);
        assert_eq!(log[0].0, Signal::MoveEntity);
        assert_eq!(log[1].0, Signal::Rerender);

        // Already empty: no second drain transition
        let report = queue.advance(&mut log);
        assert!(!report.drained);
        assert_eq!(report.dispatched, 0);
    }

    #[test]
    fn test_delayed_event_waits() {
        let mut queue = recording_queue();
        let mut log = Vec::new();

        queue.enqueue_delayed(Signal::DebugMsg, vec![json!("late")], 3);
        queue.enqueue(Signal::Rerender, vec![]);

        let report = queue.advance(&mut log);
        assert_eq!(report.dispatched, 1);
        assert!(!report.drained);

        queue.advance(&mut log);
        assert_eq!(log.len(), 1);

        let report = queue.advance(&mut log);
        assert!(report.drained);
        assert_eq!(log[1], (Signal::DebugMsg, json!("late")));
    }

    #[test]
    fn test_failing_handler_does_not_stall() {
        let mut queue: EventQueue<Vec<Signal>> = EventQueue::new();
        queue.define_handler(Signal::MoveEntity, |_, d| {
            crate::game::events::decode_args::<(u64, i32, i32)>(d.signal, d.params).map(|_| ())
        });
        queue.define_handler(Signal::Rerender, |log, d| {
            log.push(d.signal);
            Ok(())
        });

        let mut log = Vec::new();
        queue.enqueue(Signal::MoveEntity, vec![json!("garbage")]);
        queue.enqueue(Signal::Rerender, vec![]);
        let report = queue.advance(&mut log);

        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 2);
        assert_eq!(log, vec![Signal::Rerender]);
    }

    proptest! {
        #[test]
        fn prop_zero_delay_dispatches_in_enqueue_order(ids in proptest::collection::vec(0u64..1000, 0..64)) {
            let mut queue = recording_queue();
            let mut log = Vec::new();
            for id in &ids {
                queue.enqueue(Signal::DebugMsg, vec![json!(id)]);
            }
            queue.advance(&mut log);
            let seen: Vec<u64> = log.iter().map(|(_, v)| v.as_u64().unwrap()).collect();
            prop_assert_eq!(seen, ids);
            prop_assert!(queue.is_empty());
        }

        #[test]
        fn prop_never_dispatched_early(delays in proptest::collection::vec(0u32..12, 1..24)) {
            let mut queue = recording_queue();
            let mut log = Vec::new();
            for (i, delay) in delays.iter().enumerate() {
                queue.enqueue_delayed(Signal::DebugMsg, vec![json!(i)], *delay);
            }

            for call in 1..=12u32 {
                log.clear();
                queue.advance(&mut log);
                for (_, v) in &log {
                    let idx = v.as_u64().unwrap() as usize;
                    prop_assert!(delays[idx] <= call);
                    // Dispatched exactly when due
                    prop_assert!(delays[idx].max(1) == call);
                }
            }
            prop_assert!(queue.is_empty());
        }

        #[test]
        fn prop_same_delay_keeps_fifo(delay in 0u32..6, count in 1usize..20) {
            let mut queue = recording_queue();
            let mut log = Vec::new();
            for i in 0..count {
                queue.enqueue_delayed(Signal::DebugMsg, vec![json!(i)], delay);
            }
            for _ in 0..delay.max(1) {
                queue.advance(&mut log);
            }
            let seen: Vec<usize> = log.iter().map(|(_, v)| v.as_u64().unwrap() as usize).collect();
            prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
        }
    }
}
