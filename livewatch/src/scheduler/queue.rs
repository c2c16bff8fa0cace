//! Due-time ordered queue of unit ids.
//!
//! Units are served in ascending due order, ties by scheduling order. Each id
//! has at most one live entry; superseded heap entries are skipped lazily.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<(Instant, u64, String)>>,
    /// Live entry per id: (due, sequence).
    entries: HashMap<String, (Instant, u64)>,
    next_seq: u64,
}

impl QueueState {
    fn push(&mut self, id: &str, due: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(id.to_string(), (due, seq));
        self.heap.push(Reverse((due, seq, id.to_string())));
    }

    fn is_live(&self, seq: u64, id: &str) -> bool {
        self.entries.get(id).is_some_and(|(_, live)| *live == seq)
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse((_, seq, id))) = self.heap.peek() {
            if self.is_live(*seq, id) {
                break;
            }
            self.heap.pop();
        }
    }

    fn pop_due(&mut self, now: Instant) -> Option<String> {
        self.drop_stale();
        let due = match self.heap.peek() {
            Some(Reverse((due, _, _))) => *due,
            None => return None,
        };
        if due > now {
            return None;
        }
        let Reverse((_, _, id)) = self.heap.pop()?;
        self.entries.remove(&id);
        Some(id)
    }

    fn next_due(&mut self) -> Option<Instant> {
        self.drop_stale();
        self.heap.peek().map(|Reverse((due, _, _))| *due)
    }
}

#[derive(Default)]
pub struct DueQueue {
    state: parking_lot::Mutex<QueueState>,
    notify: Notify,
}

impl DueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the due time of `id`, replacing any existing entry.
    pub fn schedule(&self, id: &str, due: Instant) {
        self.state.lock().push(id, due);
        self.notify.notify_one();
    }

    /// Schedule `id` at `due` unless it is already due earlier.
    pub fn reschedule(&self, id: &str, due: Instant) {
        let mut state = self.state.lock();
        if state.entries.get(id).is_some_and(|(existing, _)| *existing <= due) {
            return;
        }
        state.push(id, due);
        drop(state);
        self.notify.notify_one();
    }

    pub fn remove(&self, id: &str) {
        self.state.lock().entries.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    pub fn due_at(&self, id: &str) -> Option<Instant> {
        self.state.lock().entries.get(id).map(|(due, _)| *due)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the earliest id due at `now`, if any.
    pub fn pop_due(&self, now: Instant) -> Option<String> {
        self.state.lock().pop_due(now)
    }

    /// Wait until some id is due and take it.
    ///
    /// With nothing queued, re-checks every `idle_poll`. Cancel safe.
    pub async fn wait_due(&self, idle_poll: Duration) -> String {
        loop {
            let notified = self.notify.notified();
            let now = Instant::now();
            let wake_at = {
                let mut state = self.state.lock();
                if let Some(id) = state.pop_due(now) {
                    return id;
                }
                state.next_due().unwrap_or(now + idle_poll)
            };

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}
