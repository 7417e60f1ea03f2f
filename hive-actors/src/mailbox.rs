//! Per-actor MPSC mailbox.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;

/// One queued unit of work for an agent of type `A`.
pub(crate) enum Envelope<A> {
    /// Run a closure against the agent state.
    Call(Box<dyn FnOnce(&mut A) + Send>),
    /// Tear the actor down on its scheduler thread.
    Dispose,
}

/// Unbounded lock-free FIFO of deferred closures targeted at one actor.
///
/// Producers run on any thread; dequeueing happens only on the scheduler
/// thread that owns the actor. `post` reports whether the caller performed
/// the empty-to-non-empty transition: exactly one of any set of racing
/// producers observes it, and that producer is responsible for kicking the
/// scheduler. The length counter is bumped before the push so a sweep that
/// races a post sees the mailbox as non-empty and keeps the actor.
pub(crate) struct Mailbox<A> {
    queue: SegQueue<Envelope<A>>,
    len: AtomicUsize,
}

impl<A> Mailbox<A> {
    pub(crate) fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            len: AtomicUsize::new(0),
        }
    }

    /// Append an envelope. Returns `true` when the mailbox was empty, i.e.
    /// the calling producer must re-animate the actor.
    pub(crate) fn post(&self, envelope: Envelope<A>) -> bool {
        let was_empty = self.len.fetch_add(1, Ordering::AcqRel) == 0;
        self.queue.push(envelope);
        was_empty
    }

    /// Dequeue one envelope, if any. Owning scheduler thread only.
    pub(crate) fn try_dequeue(&self) -> Option<Envelope<A>> {
        let envelope = self.queue.pop()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(envelope)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }

    /// Drop everything still queued. Disposal path only.
    pub(crate) fn drain(&self) {
        while self.try_dequeue().is_some() {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn call(n: u32, log: &std::sync::Arc<parking_lot::Mutex<Vec<u32>>>) -> Envelope<Vec<u32>> {
        let log = log.clone();
        Envelope::Call(Box::new(move |_state| log.lock().push(n)))
    }

    #[test]
    fn test_fifo_order() {
        let log = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mailbox: Mailbox<Vec<u32>> = Mailbox::new();
        for n in 1..=5 {
            mailbox.post(call(n, &log));
        }

        let mut state = Vec::new();
        while let Some(Envelope::Call(f)) = mailbox.try_dequeue() {
            f(&mut state);
        }
        assert_eq!(*log.lock(), vec![1, 2, 3, 4, 5]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_post_reports_empty_transition() {
        let mailbox: Mailbox<()> = Mailbox::new();
        assert!(mailbox.post(Envelope::Dispose));
        assert!(!mailbox.post(Envelope::Dispose));

        mailbox.try_dequeue();
        mailbox.try_dequeue();
        assert!(mailbox.is_empty());
        // Empty again: the next producer owns the transition again.
        assert!(mailbox.post(Envelope::Dispose));
    }

    #[test]
    fn test_drain_discards_pending() {
        let mailbox: Mailbox<()> = Mailbox::new();
        for _ in 0..4 {
            mailbox.post(Envelope::Dispose);
        }
        mailbox.drain();
        assert!(mailbox.is_empty());
        assert!(mailbox.try_dequeue().is_none());
    }
}
