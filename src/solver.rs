use crate::budget::{Budget, BudgetMonitor, SearchCommand};
use crate::error::Error;
use crate::evaluator::{Evaluator, PartialAssignment, Timeline};
use crate::incumbent::SharedIncumbent;
use crate::project::Project;
use crate::result::{SearchStatistics, SolveOutcome, SolveResult};
use crate::schedule::Schedule;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{debug, info, warn};

pub trait Solver {
    type Error;
    /// Search the project for a schedule.
    fn solve(&self, project: &Project) -> Result<SolveOutcome, Self::Error>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Objective {
    /// Stop at the first feasible schedule.
    #[default]
    FirstFeasible,
    /// Keep searching for schedules that finish earlier.
    MinimizeMakespan,
}

/// Order in which activities receive a start time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BranchingOrder {
    #[default]
    ById,
    /// Predecessors first. Every window is then bounded by the activity's predecessors, which
    /// usually prunes far earlier than id order.
    Topological,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub budget: Budget,
    /// Explore the candidates of the first activity on the rayon thread pool.
    pub parallel: bool,
    pub branching: BranchingOrder,
}

impl SearchOptions {
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn branching(mut self, branching: BranchingOrder) -> Self {
        self.branching = branching;
        self
    }
}

/// Depth-first backtracking that returns the first feasible schedule.
#[derive(Debug, Clone, Default)]
pub struct Backtracking {
    options: SearchOptions,
}

impl Backtracking {
    pub fn new(options: SearchOptions) -> Self {
        Backtracking { options }
    }
}

impl Solver for Backtracking {
    type Error = Error;

    fn solve(&self, project: &Project) -> Result<SolveOutcome, Error> {
        search(project, Objective::FirstFeasible, &self.options, self.name())
    }

    fn name(&self) -> &'static str {
        "backtracking"
    }
}

/// Depth-first branch and bound on the makespan.
#[derive(Debug, Clone, Default)]
pub struct BranchAndBound {
    options: SearchOptions,
}

impl BranchAndBound {
    pub fn new(options: SearchOptions) -> Self {
        BranchAndBound { options }
    }
}

impl Solver for BranchAndBound {
    type Error = Error;

    fn solve(&self, project: &Project) -> Result<SolveOutcome, Error> {
        search(project, Objective::MinimizeMakespan, &self.options, self.name())
    }

    fn name(&self) -> &'static str {
        "branch-and-bound"
    }
}

/// State shared by every branch of one solve.
struct Shared {
    budget: Budget,
    started: Instant,
    nodes: AtomicU64,
    solutions: AtomicU64,
    incumbent: SharedIncumbent,
    /// Smallest first-activity start that led to a feasible schedule in satisfaction mode.
    first_found: AtomicU32,
    /// Set once the incumbent meets the critical-path lower bound.
    proven: AtomicBool,
    /// First budget stop seen by any branch.
    aborted: OnceLock<String>,
    lower_bound: u32,
}

enum Stop {
    Found,
    Proven,
    Aborted(String),
    Superseded,
}

enum BranchOutcome {
    Exhausted,
    Found(Schedule),
    Proven,
    Aborted(String),
    Superseded,
    /// The first activity starts too late to beat the incumbent. Later starts are cut off too.
    CutOff,
}

impl BranchOutcome {
    /// Outcomes that end the scan over first-activity starts.
    fn settled(self) -> Option<BranchOutcome> {
        match self {
            BranchOutcome::Exhausted | BranchOutcome::Superseded => None,
            settled => Some(settled),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BranchOutcome::Exhausted => "exhausted",
            BranchOutcome::Found(_) => "found",
            BranchOutcome::Proven => "proven",
            BranchOutcome::Aborted(_) => "aborted",
            BranchOutcome::Superseded => "superseded",
            BranchOutcome::CutOff => "cut off",
        }
    }
}

fn search(
    project: &Project,
    objective: Objective,
    options: &SearchOptions,
    solver: &str,
) -> Result<SolveOutcome, Error> {
    let started = Instant::now();
    let threads = if options.parallel {
        rayon::current_num_threads()
    } else {
        1
    };
    if project.due_date().is_some() && project.sinks().next().is_none() {
        return Err(Error::NoSinkActivities);
    }

    let evaluator = Evaluator::new(project);
    let shared = Shared {
        budget: options.budget.clone(),
        started,
        nodes: AtomicU64::new(0),
        solutions: AtomicU64::new(0),
        incumbent: SharedIncumbent::new(),
        first_found: AtomicU32::new(u32::MAX),
        proven: AtomicBool::new(false),
        aborted: OnceLock::new(),
        lower_bound: project.critical_path(),
    };
    let statistics = |shared: &Shared| SearchStatistics {
        nodes: shared.nodes.load(Ordering::Relaxed),
        solutions_found: shared.solutions.load(Ordering::Relaxed),
        used_threads: threads,
        solve_duration: started.elapsed(),
    };

    if let Some(reason) = evaluator.static_infeasibility() {
        info!(solver, %reason, "project is infeasible before search");
        return Ok(SolveOutcome::new(SolveResult::Infeasible, statistics(&shared)));
    }

    let order: Vec<usize> = match options.branching {
        BranchingOrder::ById => (0..project.activities.len()).collect(),
        BranchingOrder::Topological => project.topological.clone(),
    };
    let Some(&first) = order.first() else {
        let result = match objective {
            Objective::FirstFeasible => SolveResult::Feasible(Schedule::new()),
            Objective::MinimizeMakespan => SolveResult::Optimal(Schedule::new()),
        };
        return Ok(SolveOutcome::new(result, statistics(&shared)));
    };

    let candidates = evaluator
        .window_at(&PartialAssignment::new(project), first)
        .map_or(1..=0, |(earliest, latest)| earliest..=latest);
    debug!(
        solver,
        activities = order.len(),
        earliest = *candidates.start(),
        latest = *candidates.end(),
        lower_bound = shared.lower_bound,
        "starting search"
    );

    // Candidates ascend, so the leftmost settled outcome is the one sequential search stops at.
    let settled = if options.parallel {
        candidates
            .into_par_iter()
            .map_init(
                || Branch::new(project, evaluator, &order, &shared, objective),
                |branch, start| branch.explore(first, start),
            )
            .find_map_first(BranchOutcome::settled)
    } else {
        let mut branch = Branch::new(project, evaluator, &order, &shared, objective);
        candidates.into_iter().find_map(|start| branch.explore(first, start).settled())
    };

    let result = match objective {
        Objective::FirstFeasible => match settled {
            Some(BranchOutcome::Found(schedule)) => SolveResult::Feasible(schedule),
            Some(BranchOutcome::Aborted(reason)) => SolveResult::Inconclusive {
                incumbent: None,
                reason,
            },
            _ => SolveResult::Infeasible,
        },
        Objective::MinimizeMakespan => {
            let proven = shared.proven.load(Ordering::Relaxed);
            let best = shared.incumbent.snapshot().map(|(_, schedule)| schedule);
            match (best, shared.aborted.get()) {
                (Some(schedule), _) if proven => SolveResult::Optimal(schedule),
                (best, Some(reason)) => SolveResult::Inconclusive {
                    incumbent: best,
                    reason: reason.clone(),
                },
                (Some(schedule), None) => SolveResult::Optimal(schedule),
                (None, None) => SolveResult::Infeasible,
            }
        }
    };

    let statistics = statistics(&shared);
    let makespan = result.schedule().and_then(|s| s.makespan(project));
    match &result {
        SolveResult::Inconclusive { reason, .. } => {
            warn!(solver, %reason, nodes = statistics.nodes, "search stopped before completion")
        }
        _ => info!(
            solver,
            result = %result,
            makespan = ?makespan,
            nodes = statistics.nodes,
            elapsed = ?statistics.solve_duration,
            "search finished"
        ),
    }
    Ok(SolveOutcome::new(result, statistics))
}

/// Search state for subtrees rooted at one start of the first activity. Owns its partial
/// assignment and timeline so branches never share mutable state; both are empty again
/// between roots, so one `Branch` serves many of them.
struct Branch<'a> {
    project: &'a Project,
    evaluator: Evaluator<'a>,
    order: &'a [usize],
    shared: &'a Shared,
    objective: Objective,
    root_start: u32,
    partial: PartialAssignment,
    timeline: Timeline,
    monitor: BudgetMonitor<'a>,
    /// Running maximum of `start + tail` over bound activities, one entry per depth.
    bounds: Vec<u32>,
    found: Option<Schedule>,
}

impl<'a> Branch<'a> {
    fn new(
        project: &'a Project,
        evaluator: Evaluator<'a>,
        order: &'a [usize],
        shared: &'a Shared,
        objective: Objective,
    ) -> Self {
        Branch {
            project,
            evaluator,
            order,
            shared,
            objective,
            root_start: 0,
            partial: PartialAssignment::new(project),
            timeline: Timeline::new(project),
            monitor: BudgetMonitor::new(&shared.budget, &shared.nodes, shared.started),
            bounds: Vec::with_capacity(order.len() + 1),
            found: None,
        }
    }

    fn explore(&mut self, first: usize, root_start: u32) -> BranchOutcome {
        let project = self.project;
        let activity = &project.activities[first];
        self.root_start = root_start;
        if self.superseded() {
            return BranchOutcome::Superseded;
        }
        if self.exceeds_incumbent(root_start, project.tails[first]) {
            return BranchOutcome::CutOff;
        }
        if !self.timeline.fits(activity, root_start) {
            return BranchOutcome::Exhausted;
        }
        self.bind(first, root_start);
        let step = self.descend(1);
        self.unbind(first, root_start);
        let outcome = match step {
            Ok(()) => BranchOutcome::Exhausted,
            Err(Stop::Found) => match self.found.take() {
                Some(schedule) => BranchOutcome::Found(schedule),
                None => BranchOutcome::Exhausted,
            },
            Err(Stop::Proven) => BranchOutcome::Proven,
            Err(Stop::Aborted(reason)) => {
                let _ = self.shared.aborted.set(reason.clone());
                BranchOutcome::Aborted(reason)
            }
            Err(Stop::Superseded) => BranchOutcome::Superseded,
        };
        debug!(root_start, outcome = outcome.label(), "branch finished");
        outcome
    }

    /// Returns `Ok(())` once the subtree is exhausted, or the reason to unwind early.
    fn descend(&mut self, depth: usize) -> Result<(), Stop> {
        if let SearchCommand::Terminate(reason) = self.monitor.step() {
            return Err(Stop::Aborted(reason));
        }
        if self.superseded() {
            return Err(Stop::Superseded);
        }
        if self.objective == Objective::MinimizeMakespan
            && self.bounds.last().is_some_and(|&lb| lb >= self.shared.incumbent.bound())
        {
            return Ok(());
        }
        if depth == self.order.len() {
            return self.complete();
        }

        let project = self.project;
        let index = self.order[depth];
        let activity = &project.activities[index];
        let tail = project.tails[index];
        let Some((earliest, latest)) = self.evaluator.window_at(&self.partial, index) else {
            return Ok(());
        };
        for start in earliest..=latest {
            if self.exceeds_incumbent(start, tail) {
                break;
            }
            if !self.timeline.fits(activity, start) {
                continue;
            }
            self.bind(index, start);
            let step = self.descend(depth + 1);
            self.unbind(index, start);
            step?;
        }
        Ok(())
    }

    fn complete(&mut self) -> Result<(), Stop> {
        let Some(schedule) = self.partial.to_schedule(self.project) else {
            return Ok(());
        };
        self.shared.solutions.fetch_add(1, Ordering::Relaxed);
        match self.objective {
            Objective::FirstFeasible => {
                self.shared
                    .first_found
                    .fetch_min(self.root_start, Ordering::Relaxed);
                self.found = Some(schedule);
                Err(Stop::Found)
            }
            Objective::MinimizeMakespan => {
                let Some(makespan) = self.evaluator.makespan(&schedule) else {
                    return Ok(());
                };
                if self.shared.incumbent.try_install(makespan, &schedule) {
                    debug!(makespan, "new incumbent");
                    if makespan <= self.shared.lower_bound {
                        self.shared.proven.store(true, Ordering::Relaxed);
                        return Err(Stop::Proven);
                    }
                }
                Ok(())
            }
        }
    }

    fn bind(&mut self, index: usize, start: u32) {
        let activity = &self.project.activities[index];
        self.partial.bind_at(index, start);
        self.timeline.place(activity, start);
        let reach = start + self.project.tails[index];
        let bound = self.bounds.last().map_or(reach, |&lb| lb.max(reach));
        self.bounds.push(bound);
    }

    fn unbind(&mut self, index: usize, start: u32) {
        self.bounds.pop();
        self.timeline.remove(&self.project.activities[index], start);
        self.partial.unbind_at(index);
    }

    /// Whether starting here can no longer beat the incumbent.
    fn exceeds_incumbent(&self, start: u32, tail: u32) -> bool {
        self.objective == Objective::MinimizeMakespan
            && start as u64 + tail as u64 >= self.shared.incumbent.bound() as u64
    }

    /// Another branch already settled the answer this branch could give.
    fn superseded(&self) -> bool {
        match self.objective {
            Objective::FirstFeasible => {
                self.shared.first_found.load(Ordering::Relaxed) < self.root_start
            }
            Objective::MinimizeMakespan => self.shared.proven.load(Ordering::Relaxed),
        }
    }
}
