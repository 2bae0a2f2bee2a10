// src/dag/event.rs

//! Completion events.
//!
//! A backend creates one [`Completion`] per enqueued operation and signals
//! it once the operation has run. Nodes hold an [`Event`], which is either
//! already ready (virtual nodes), a single completion, or the conjunction of
//! several (a requirement that needed more than one copy).

use std::sync::Arc;

use tokio::sync::watch;

/// One-shot completion flag that can be polled or awaited.
#[derive(Debug)]
pub struct Completion {
    tx: watch::Sender<bool>,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(false);
        Arc::new(Self { tx })
    }

    /// Signal completion. Signalling twice is harmless.
    pub fn complete(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_complete(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|done| *done).await;
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Nothing to wait for.
    Ready,
    Pending(Arc<Completion>),
    /// Complete once every member is complete.
    All(Vec<Event>),
}

impl Event {
    pub fn pending(completion: &Arc<Completion>) -> Self {
        Event::Pending(Arc::clone(completion))
    }

    pub fn is_complete(&self) -> bool {
        match self {
            Event::Ready => true,
            Event::Pending(c) => c.is_complete(),
            Event::All(events) => events.iter().all(Event::is_complete),
        }
    }

    /// Wait until the event is complete.
    pub async fn wait(&self) {
        let mut pending = Vec::new();
        self.collect_pending(&mut pending);
        for completion in pending {
            completion.wait().await;
        }
    }

    /// Event that completes when both `self` and `other` have completed.
    pub fn and(self, other: Event) -> Event {
        match (self, other) {
            (Event::Ready, e) | (e, Event::Ready) => e,
            (Event::All(mut a), Event::All(b)) => {
                a.extend(b);
                Event::All(a)
            }
            (Event::All(mut a), e) | (e, Event::All(mut a)) => {
                a.push(e);
                Event::All(a)
            }
            (a, b) => Event::All(vec![a, b]),
        }
    }

    fn collect_pending(&self, out: &mut Vec<Arc<Completion>>) {
        match self {
            Event::Ready => {}
            Event::Pending(c) => {
                if !c.is_complete() {
                    out.push(Arc::clone(c));
                }
            }
            Event::All(events) => {
                for e in events {
                    e.collect_pending(out);
                }
            }
        }
    }
}
