//! Event sinks.
//!
//! The orchestrator only knows [`EventSink::emit`]. [`event_channel`] is the
//! transport-side adapter: a bounded buffer that never blocks the emitter,
//! drops the oldest non-terminal event when full, and always keeps the
//! terminal `complete` event.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use strmshot_models::BatchEvent;
use tokio::sync::Notify;
use tracing::warn;

/// Fire-and-forget delivery of batch events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Must not block on the consumer.
    fn emit(&self, event: BatchEvent);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: BatchEvent) {}
}

struct ChannelState {
    buffer: VecDeque<BatchEvent>,
    capacity: usize,
    closed: bool,
    dropped: u64,
}

struct Shared {
    state: Mutex<ChannelState>,
    notify: Notify,
}

/// Producer half of an event channel.
pub struct EventSender {
    shared: Arc<Shared>,
}

/// Consumer half of an event channel.
pub struct EventReceiver {
    shared: Arc<Shared>,
}

/// Create a drop-oldest event channel holding at most `capacity`
/// non-terminal events.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(ChannelState {
            buffer: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            closed: false,
            dropped: 0,
        }),
        notify: Notify::new(),
    });

    (
        EventSender {
            shared: shared.clone(),
        },
        EventReceiver { shared },
    )
}

impl EventSink for EventSender {
    fn emit(&self, event: BatchEvent) {
        {
            let mut state = self.shared.state.lock();

            if !event.is_terminal() && state.buffer.len() >= state.capacity {
                // Evict the oldest event that is not terminal
                if let Some(pos) = state.buffer.iter().position(|e| !e.is_terminal()) {
                    state.buffer.remove(pos);
                    state.dropped += 1;
                    if state.dropped == 1 {
                        warn!("Event consumer is slow, dropping oldest events");
                    }
                }
            }

            state.buffer.push_back(event);
        }
        self.shared.notify.notify_one();
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.notify.notify_one();
    }
}

impl EventReceiver {
    /// Next event, or `None` once the sender is gone and the buffer is empty.
    pub async fn recv(&mut self) -> Option<BatchEvent> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut state = self.shared.state.lock();
                if let Some(event) = state.buffer.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Number of events evicted because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.shared.state.lock().dropped
    }
}
