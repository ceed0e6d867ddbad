//! Search budgets and the cooperative check that enforces them.
//!
//! A [`Budget`] caps a search by wall-clock time, by the number of visited nodes, or through a
//! caller-owned interrupt flag. The engine asks a [`BudgetMonitor`] for a [`SearchCommand`] at
//! every branch point. The clock is only read every `clock_check_mask + 1` steps so the common
//! case stays a couple of atomic operations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum SearchCommand {
    #[default]
    Continue,
    Terminate(String),
}

impl std::fmt::Display for SearchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchCommand::Continue => write!(f, "Continue"),
            SearchCommand::Terminate(reason) => write!(f, "Terminate: {}", reason),
        }
    }
}

/// Limits on a single solve call. The default is unlimited.
#[derive(Debug, Clone, Default)]
pub struct Budget {
    time_limit: Option<Duration>,
    deadline: Option<Instant>,
    node_limit: Option<u64>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Stop after `limit` has elapsed since the solve started.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Stop at an absolute point in time.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stop after visiting `limit` search nodes, counted across all worker threads.
    pub fn with_node_limit(mut self, limit: u64) -> Self {
        self.node_limit = Some(limit);
        self
    }

    /// Stop as soon as `flag` is set to `true`.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    pub fn node_limit(&self) -> Option<u64> {
        self.node_limit
    }

    pub fn is_unlimited(&self) -> bool {
        self.time_limit.is_none()
            && self.deadline.is_none()
            && self.node_limit.is_none()
            && self.interrupt.is_none()
    }

    /// The earliest of the deadline and the time limit counted from `started`.
    pub fn cutoff(&self, started: Instant) -> Option<Instant> {
        let from_limit = self.time_limit.and_then(|limit| started.checked_add(limit));
        match (from_limit, self.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Per-thread view of a [`Budget`]. The node counter is shared by every monitor of a solve.
#[derive(Debug)]
pub struct BudgetMonitor<'a> {
    budget: &'a Budget,
    nodes: &'a AtomicU64,
    cutoff: Option<Instant>,
    clock_check_mask: u64,
    steps: u64,
}

impl<'a> BudgetMonitor<'a> {
    /// Check the clock every 1024 steps.
    const DEFAULT_CLOCK_CHECK_MASK: u64 = 0x3FF;

    pub fn new(budget: &'a Budget, nodes: &'a AtomicU64, started: Instant) -> Self {
        Self::with_clock_check_mask(budget, nodes, started, Self::DEFAULT_CLOCK_CHECK_MASK)
    }

    pub fn with_clock_check_mask(
        budget: &'a Budget,
        nodes: &'a AtomicU64,
        started: Instant,
        clock_check_mask: u64,
    ) -> Self {
        Self {
            budget,
            nodes,
            cutoff: budget.cutoff(started),
            clock_check_mask,
            // The first step reads the clock.
            steps: clock_check_mask,
        }
    }

    /// Record one visited node and decide whether the search may go on.
    #[inline]
    pub fn step(&mut self) -> SearchCommand {
        let visited = self.nodes.fetch_add(1, Ordering::Relaxed) + 1;
        if self.budget.node_limit.is_some_and(|limit| visited > limit) {
            return SearchCommand::Terminate("node limit reached".to_string());
        }
        if let Some(flag) = &self.budget.interrupt {
            if flag.load(Ordering::Relaxed) {
                return SearchCommand::Terminate("interrupted".to_string());
            }
        }
        self.steps = self.steps.wrapping_add(1);
        if let Some(cutoff) = self.cutoff {
            if (self.steps & self.clock_check_mask) == 0 && Instant::now() >= cutoff {
                return SearchCommand::Terminate("time limit reached".to_string());
            }
        }
        SearchCommand::Continue
    }
}
