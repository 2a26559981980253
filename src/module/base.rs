use super::{Mid, Module};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// A consistent-enough snapshot of a module's four counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub called: u64,
    pub accepted: u64,
    pub completed: u64,
    pub handling: u64,
}

/// Turns a module's counters into a load score; lower means less loaded.
pub type ScoreCalculator = fn(&Counts) -> u64;

/// `called + accepted*2 + completed*4 + handling*16`.
pub fn calculate_score_simple(counts: &Counts) -> u64 {
    counts
        .called
        .saturating_add(counts.accepted.saturating_mul(2))
        .saturating_add(counts.completed.saturating_mul(4))
        .saturating_add(counts.handling.saturating_mul(16))
}

/// Recomputes the score of `module` and stores it if it changed.
pub fn set_score(module: &dyn Module) -> bool {
    let base = module.base();
    let score = (base.score_calculator())(&base.counts());
    if score == base.score() {
        return false;
    }
    base.set_score(score);
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    pub id: Mid,
    pub called: u64,
    pub accepted: u64,
    pub completed: u64,
    pub handling: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Identity and bookkeeping shared by every module implementation.
#[derive(Debug)]
pub struct ModuleBase {
    mid: Mid,
    score: AtomicU64,
    calculator: ScoreCalculator,
    called: AtomicU64,
    accepted: AtomicU64,
    completed: AtomicU64,
    handling: AtomicU64,
}

impl ModuleBase {
    pub fn new(mid: Mid) -> Self {
        Self::with_calculator(mid, calculate_score_simple)
    }

    pub fn with_calculator(mid: Mid, calculator: ScoreCalculator) -> Self {
        Self {
            mid,
            score: AtomicU64::new(0),
            calculator,
            called: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            handling: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &Mid {
        &self.mid
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.mid.addr()
    }

    pub fn score(&self) -> u64 {
        self.score.load(Ordering::SeqCst)
    }

    pub fn set_score(&self, score: u64) {
        self.score.store(score, Ordering::SeqCst);
    }

    pub fn score_calculator(&self) -> ScoreCalculator {
        self.calculator
    }

    pub fn called_count(&self) -> u64 {
        self.called.load(Ordering::SeqCst)
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn handling_number(&self) -> u64 {
        self.handling.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> Counts {
        Counts {
            called: self.called_count(),
            accepted: self.accepted_count(),
            completed: self.completed_count(),
            handling: self.handling_number(),
        }
    }

    pub fn summary(&self) -> ModuleSummary {
        let counts = self.counts();
        ModuleSummary {
            id: self.mid.clone(),
            called: counts.called,
            accepted: counts.accepted,
            completed: counts.completed,
            handling: counts.handling,
            extra: None,
        }
    }

    pub fn incr_called_count(&self) {
        self.called.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_accepted_count(&self) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_completed_count(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_handling_number(&self) {
        self.handling.fetch_add(1, Ordering::SeqCst);
    }

    /// Never goes below zero.
    pub fn decr_handling_number(&self) {
        let _ = self
            .handling
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Marks one call as in flight until the returned guard is dropped.
    pub fn begin_handling(&self) -> HandlingGuard<'_> {
        self.incr_handling_number();
        HandlingGuard { base: self }
    }

    pub fn clear(&self) {
        self.handling.store(0, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.accepted.store(0, Ordering::SeqCst);
        self.called.store(0, Ordering::SeqCst);
    }
}

#[must_use = "the call stops counting as in flight as soon as the guard is dropped"]
pub struct HandlingGuard<'a> {
    base: &'a ModuleBase,
}

impl Drop for HandlingGuard<'_> {
    fn drop(&mut self) {
        self.base.decr_handling_number();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleType;

    fn base() -> ModuleBase {
        ModuleBase::new(Mid::new(ModuleType::Downloader, 1, None))
    }

    #[test]
    fn simple_score_weights_in_flight_work() {
        let counts = Counts {
            called: 1,
            accepted: 1,
            completed: 1,
            handling: 1,
        };
        assert_eq!(calculate_score_simple(&counts), 1 + 2 + 4 + 16);
        assert_eq!(calculate_score_simple(&Counts::default()), 0);
    }

    #[test]
    fn handling_guard_decrements_on_drop() {
        let base = base();
        {
            let _outer = base.begin_handling();
            let _inner = base.begin_handling();
            assert_eq!(base.handling_number(), 2);
        }
        assert_eq!(base.handling_number(), 0);
    }

    #[test]
    fn decrement_saturates_at_zero() {
        let base = base();
        base.decr_handling_number();
        assert_eq!(base.handling_number(), 0);
    }

    #[test]
    fn clear_resets_all_counters() {
        let base = base();
        base.incr_called_count();
        base.incr_accepted_count();
        base.incr_completed_count();
        base.incr_handling_number();
        base.clear();
        assert_eq!(base.counts(), Counts::default());
    }
}
