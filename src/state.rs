//! Live activity counters for the scheduler.
//!
//! Buffer pool totals only show payloads that are sitting in a pool. A payload
//! that a pump has taken out, or that a fire-and-forget send has not yet put
//! back, is invisible to them. `CrawlerState` counts those, so that
//! `Scheduler::idle` cannot report idle while work is merely in transit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One kind of in-transit work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// A spawned put into one of the pools.
    Send,
    /// A request taken from the request pool.
    Download,
    /// A response taken from the response pool.
    Parse,
    /// An item taken from the item pool.
    Process,
}

#[derive(Debug, Default)]
pub struct CrawlerState {
    pub pending_sends: AtomicUsize,
    pub in_flight_requests: AtomicUsize,
    pub parsing_responses: AtomicUsize,
    pub processing_items: AtomicUsize,
}

impl CrawlerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn counter(&self, activity: Activity) -> &AtomicUsize {
        match activity {
            Activity::Send => &self.pending_sends,
            Activity::Download => &self.in_flight_requests,
            Activity::Parse => &self.parsing_responses,
            Activity::Process => &self.processing_items,
        }
    }

    pub fn count(&self, activity: Activity) -> usize {
        self.counter(activity).load(Ordering::SeqCst)
    }

    /// Counts `activity` as running until the guard is dropped.
    pub fn track(self: &Arc<Self>, activity: Activity) -> ActivityGuard {
        self.counter(activity).fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            state: Arc::clone(self),
            activity,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending_sends.load(Ordering::SeqCst) == 0
            && self.in_flight_requests.load(Ordering::SeqCst) == 0
            && self.parsing_responses.load(Ordering::SeqCst) == 0
            && self.processing_items.load(Ordering::SeqCst) == 0
    }
}

#[must_use = "the activity ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ActivityGuard {
    state: Arc<CrawlerState>,
    activity: Activity,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.state
            .counter(self.activity)
            .fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_keep_the_state_busy() {
        let state = CrawlerState::new();
        assert!(state.is_idle());
        let send = state.track(Activity::Send);
        let parse = state.track(Activity::Parse);
        assert!(!state.is_idle());
        assert_eq!(state.count(Activity::Send), 1);
        drop(send);
        assert!(!state.is_idle());
        drop(parse);
        assert!(state.is_idle());
    }

    #[tokio::test]
    async fn guard_can_move_into_a_task() {
        let state = CrawlerState::new();
        let guard = state.track(Activity::Send);
        tokio::spawn(async move {
            let _guard = guard;
        })
        .await
        .unwrap();
        assert!(state.is_idle());
    }
}
