//! Best schedule found so far during makespan minimization.
//!
//! Search branches read the upper bound from an atomic on every node, so the common path
//! never takes a lock. The schedule itself sits behind a mutex and is the source of truth;
//! the atomic only lets branches skip obviously worse candidates.

use crate::schedule::Schedule;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct SharedIncumbent {
    /// `u32::MAX` while nothing is installed.
    upper_bound: AtomicU32,
    best: Mutex<Option<(u32, Schedule)>>,
}

impl Default for SharedIncumbent {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SharedIncumbent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.upper_bound() {
            None => write!(f, "Incumbent(none)"),
            Some(makespan) => write!(f, "Incumbent(makespan: {})", makespan),
        }
    }
}

impl SharedIncumbent {
    pub fn new() -> Self {
        Self {
            upper_bound: AtomicU32::new(u32::MAX),
            best: Mutex::new(None),
        }
    }

    /// Makespan of the installed schedule, if any.
    #[inline]
    pub fn upper_bound(&self) -> Option<u32> {
        match self.upper_bound.load(Ordering::Relaxed) {
            u32::MAX => None,
            makespan => Some(makespan),
        }
    }

    /// Raw bound for pruning: every new schedule must finish strictly before it.
    #[inline]
    pub(crate) fn bound(&self) -> u32 {
        self.upper_bound.load(Ordering::Relaxed)
    }

    /// Install `schedule` if its makespan is strictly better than the current one.
    pub fn try_install(&self, makespan: u32, schedule: &Schedule) -> bool {
        if makespan >= self.bound() {
            return false;
        }
        let mut best = self.best.lock().unwrap_or_else(PoisonError::into_inner);
        if best.as_ref().is_some_and(|(current, _)| makespan >= *current) {
            return false;
        }
        *best = Some((makespan, schedule.clone()));
        self.upper_bound.store(makespan, Ordering::Relaxed);
        true
    }

    pub fn snapshot(&self) -> Option<(u32, Schedule)> {
        self.best
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn into_inner(self) -> Option<(u32, Schedule)> {
        self.best.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
