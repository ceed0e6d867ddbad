pub mod budget;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod incumbent;
pub mod project;
pub mod psplib;
pub mod result;
pub mod schedule;
pub mod solver;

pub use budget::Budget;
pub use config::{ActivityConfig, ConfigError, ProjectConfig, ResourceConfig};
pub use error::Error;
pub use evaluator::{Evaluator, Violation};
pub use project::{Activity, ActivityId, Project, Resource, ValidationError};
pub use result::{SearchStatistics, SolveOutcome, SolveResult};
pub use schedule::{normalize, Schedule};
pub use solver::{Backtracking, BranchAndBound, BranchingOrder, Objective, SearchOptions, Solver};

/// First feasible schedule, searching without limits.
pub fn solve_feasible(project: &Project) -> Result<SolveOutcome, Error> {
    Backtracking::default().solve(project)
}

/// Solve under `budget`. With [`Objective::MinimizeMakespan`] the result is `Optimal` only when
/// the search finished; a budget stop keeps the best schedule found as an inconclusive result.
pub fn solve_optimal(
    project: &Project,
    objective: Objective,
    budget: Budget,
) -> Result<SolveOutcome, Error> {
    let options = SearchOptions::default().with_budget(budget);
    match objective {
        Objective::FirstFeasible => Backtracking::new(options).solve(project),
        Objective::MinimizeMakespan => BranchAndBound::new(options).solve(project),
    }
}
