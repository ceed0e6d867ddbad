use crate::schedule::Schedule;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveResult {
    /// A feasible schedule, with no claim about its makespan.
    Feasible(Schedule),
    /// A schedule of minimum makespan, proven by exhausting the search space.
    Optimal(Schedule),
    /// The search space holds no feasible schedule.
    Infeasible,
    /// A budget stopped the search before it could decide. Optimization keeps the best
    /// schedule found up to that point.
    Inconclusive {
        incumbent: Option<Schedule>,
        reason: String,
    },
}

impl SolveResult {
    /// The schedule carried by this result, if any.
    pub fn schedule(&self) -> Option<&Schedule> {
        match self {
            SolveResult::Feasible(s) | SolveResult::Optimal(s) => Some(s),
            SolveResult::Inconclusive { incumbent, .. } => incumbent.as_ref(),
            SolveResult::Infeasible => None,
        }
    }

    pub fn into_schedule(self) -> Option<Schedule> {
        match self {
            SolveResult::Feasible(s) | SolveResult::Optimal(s) => Some(s),
            SolveResult::Inconclusive { incumbent, .. } => incumbent,
            SolveResult::Infeasible => None,
        }
    }
}

impl std::fmt::Display for SolveResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveResult::Feasible(_) => write!(f, "Feasible"),
            SolveResult::Optimal(_) => write!(f, "Optimal"),
            SolveResult::Infeasible => write!(f, "Infeasible"),
            SolveResult::Inconclusive { reason, .. } => write!(f, "Inconclusive ({})", reason),
        }
    }
}

/// Counters collected while solving.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchStatistics {
    /// Search nodes visited, across all threads.
    pub nodes: u64,
    /// Complete feasible assignments reached.
    pub solutions_found: u64,
    pub used_threads: usize,
    pub solve_duration: Duration,
}

impl std::fmt::Display for SearchStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Search Statistics:")?;
        writeln!(f, "  Nodes: {}", self.nodes)?;
        writeln!(f, "  Solutions Found: {}", self.solutions_found)?;
        writeln!(f, "  Used Threads: {}", self.used_threads)?;
        writeln!(
            f,
            "  Solve Duration (secs): {:.3}",
            self.solve_duration.as_secs_f64()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOutcome {
    pub result: SolveResult,
    pub statistics: SearchStatistics,
}

impl SolveOutcome {
    pub fn new(result: SolveResult, statistics: SearchStatistics) -> Self {
        Self { result, statistics }
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.result.schedule()
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self.result, SolveResult::Optimal(_))
    }

    pub fn is_feasible(&self) -> bool {
        matches!(self.result, SolveResult::Feasible(_))
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(self.result, SolveResult::Infeasible)
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self.result, SolveResult::Inconclusive { .. })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::project::ActivityId;

    #[test]
    fn exposes_schedules_by_variant() {
        let schedule: Schedule = [(ActivityId(1), 0)].into_iter().collect();
        assert_eq!(
            SolveResult::Optimal(schedule.clone()).schedule(),
            Some(&schedule)
        );
        assert_eq!(SolveResult::Infeasible.schedule(), None);
        let inconclusive = SolveResult::Inconclusive {
            incumbent: Some(schedule.clone()),
            reason: "node limit reached".into(),
        };
        assert_eq!(inconclusive.to_string(), "Inconclusive (node limit reached)");
        assert_eq!(inconclusive.into_schedule(), Some(schedule));
    }

    #[test]
    fn statistics_display_formats_all_fields() {
        let stats = SearchStatistics {
            nodes: 42,
            solutions_found: 2,
            used_threads: 4,
            solve_duration: Duration::from_millis(1234),
        };
        let rendered = stats.to_string();
        assert!(rendered.contains("Search Statistics:"));
        assert!(rendered.contains("Nodes: 42"));
        assert!(rendered.contains("Solutions Found: 2"));
        assert!(rendered.contains("Used Threads: 4"));
        assert!(rendered.contains("Solve Duration (secs): 1.234"));
    }
}
