//! Constraint checks shared by every search strategy.
//!
//! A [`Timeline`] accumulates per-resource usage over discrete instants, a
//! [`PartialAssignment`] tracks which activities have a start time, and the [`Evaluator`]
//! answers whether precedence, capacity and due-date constraints hold for either of them.
//! Violations are ordinary values; nothing here fails for an infeasible assignment.

use crate::error::Error;
use crate::project::{Activity, ActivityId, Project, ResourceId};
use crate::schedule::Schedule;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Unassigned(ActivityId),
    UnknownActivity(ActivityId),
    BeyondHorizon {
        activity: ActivityId,
        start: u32,
        horizon: u32,
    },
    Precedence {
        predecessor: ActivityId,
        successor: ActivityId,
        finish: u32,
        start: u32,
    },
    Capacity {
        resource: String,
        time: u32,
        usage: u32,
        capacity: u32,
    },
    DueDate {
        activity: ActivityId,
        finish: u32,
        due_date: u32,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Unassigned(id) => write!(f, "activity {id} has no start time"),
            Violation::UnknownActivity(id) => write!(f, "activity {id} is not part of the project"),
            Violation::BeyondHorizon {
                activity,
                start,
                horizon,
            } => write!(f, "activity {activity} starts at {start}, after the horizon {horizon}"),
            Violation::Precedence {
                predecessor,
                successor,
                finish,
                start,
            } => write!(
                f,
                "activity {successor} starts at {start} before predecessor {predecessor} finishes at {finish}"
            ),
            Violation::Capacity {
                resource,
                time,
                usage,
                capacity,
            } => write!(
                f,
                "resource {resource:?} is used {usage} at time {time}, capacity is {capacity}"
            ),
            Violation::DueDate {
                activity,
                finish,
                due_date,
            } => write!(f, "sink activity {activity} finishes at {finish}, after due date {due_date}"),
        }
    }
}

/// Start times for a subset of the project's activities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialAssignment {
    starts: Vec<Option<u32>>,
    bound: usize,
}

impl PartialAssignment {
    pub fn new(project: &Project) -> Self {
        Self {
            starts: vec![None; project.activities.len()],
            bound: 0,
        }
    }

    /// Bind an activity. Returns `false` when the activity is not part of the project.
    pub fn bind(&mut self, project: &Project, id: ActivityId, start: u32) -> bool {
        match project.index_of(id) {
            Some(i) => {
                self.bind_at(i, start);
                true
            }
            None => false,
        }
    }

    pub fn unbind(&mut self, project: &Project, id: ActivityId) {
        if let Some(i) = project.index_of(id) {
            self.unbind_at(i);
        }
    }

    pub fn start(&self, project: &Project, id: ActivityId) -> Option<u32> {
        project.index_of(id).and_then(|i| self.start_at(i))
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn is_complete(&self) -> bool {
        self.bound == self.starts.len()
    }

    /// The assignment as a schedule, once every activity is bound.
    pub fn to_schedule(&self, project: &Project) -> Option<Schedule> {
        if !self.is_complete() {
            return None;
        }
        Some(
            project
                .activities
                .iter()
                .zip(&self.starts)
                .filter_map(|(a, start)| start.map(|s| (a.id, s)))
                .collect(),
        )
    }

    pub(crate) fn bind_at(&mut self, index: usize, start: u32) {
        if self.starts[index].replace(start).is_none() {
            self.bound += 1;
        }
    }

    pub(crate) fn unbind_at(&mut self, index: usize) {
        if self.starts[index].take().is_some() {
            self.bound -= 1;
        }
    }

    #[inline]
    pub(crate) fn start_at(&self, index: usize) -> Option<u32> {
        self.starts[index]
    }
}

/// Resource usage per instant.
///
/// The time axis covers `[0, horizon + longest duration)`, which holds every activity that
/// starts within the horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    length: usize,
    capacities: Vec<u32>,
    usage: Vec<u32>,
}

impl Timeline {
    pub fn new(project: &Project) -> Self {
        Self::with_length(project, project.horizon as usize + project.max_duration() as usize)
    }

    pub fn with_length(project: &Project, length: usize) -> Self {
        let capacities: Vec<u32> = project.resources.iter().map(|r| r.capacity).collect();
        Self {
            length,
            usage: vec![0; capacities.len() * length],
            capacities,
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn usage(&self, resource: ResourceId, time: usize) -> u32 {
        if time >= self.length {
            return 0;
        }
        self.usage
            .get(resource.0 * self.length + time)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the activity can run from `start` without exceeding any capacity. Only the
    /// instants the activity occupies are inspected.
    pub fn fits(&self, activity: &Activity, start: u32) -> bool {
        if activity.duration == 0 {
            return true;
        }
        let from = start as usize;
        let to = from + activity.duration as usize;
        if to > self.length {
            return false;
        }
        activity.demands().all(|(r, amount)| {
            let capacity = self.capacities[r.0];
            if amount > capacity {
                return false;
            }
            let headroom = capacity - amount;
            self.row(r)[from..to].iter().all(|&used| used <= headroom)
        })
    }

    /// Add the activity's footprint. Instants past the end of the timeline are ignored.
    pub fn place(&mut self, activity: &Activity, start: u32) {
        self.apply(activity, start, |used, amount| used.saturating_add(amount));
    }

    /// Undo a previous [`Timeline::place`].
    pub fn remove(&mut self, activity: &Activity, start: u32) {
        self.apply(activity, start, |used, amount| used.saturating_sub(amount));
    }

    fn apply(&mut self, activity: &Activity, start: u32, op: impl Fn(u32, u32) -> u32) {
        let from = (start as usize).min(self.length);
        let to = (start as usize + activity.duration as usize).min(self.length);
        for (r, amount) in activity.demands() {
            let base = r.0 * self.length;
            for used in self.usage[base + from..base + to].iter_mut() {
                *used = op(*used, amount);
            }
        }
    }

    /// First instant, per resource, where usage exceeds capacity.
    pub fn overloads(&self) -> impl Iterator<Item = (ResourceId, u32, u32)> + '_ {
        (0..self.capacities.len()).filter_map(move |r| {
            let capacity = self.capacities[r];
            self.row(ResourceId(r))
                .iter()
                .position(|&used| used > capacity)
                .map(|t| (ResourceId(r), t as u32, self.row(ResourceId(r))[t]))
        })
    }

    fn row(&self, resource: ResourceId) -> &[u32] {
        let base = resource.0 * self.length;
        &self.usage[base..base + self.length]
    }
}

/// Feasibility checks over a project.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'p> {
    project: &'p Project,
}

impl<'p> Evaluator<'p> {
    pub fn new(project: &'p Project) -> Self {
        Self { project }
    }

    pub fn project(&self) -> &'p Project {
        self.project
    }

    /// A reason the project cannot have any feasible schedule, found without search.
    pub fn static_infeasibility(&self) -> Option<String> {
        let project = self.project;
        for activity in project.activities.iter().filter(|a| a.duration > 0) {
            for (r, amount) in activity.demands() {
                let resource = &project.resources[r.0];
                if amount > resource.capacity {
                    return Some(format!(
                        "activity {} demands {} of resource {:?} with capacity {}",
                        activity.id, amount, resource.name, resource.capacity
                    ));
                }
            }
        }
        for (i, activity) in project.activities.iter().enumerate() {
            if project.heads[i] > project.horizon {
                return Some(format!(
                    "activity {} cannot start before {}, past the horizon {}",
                    activity.id, project.heads[i], project.horizon
                ));
            }
        }
        if let Some(due_date) = project.due_date {
            let critical_path = project.critical_path();
            if critical_path > due_date {
                return Some(format!(
                    "critical path {critical_path} exceeds the due date {due_date}"
                ));
            }
        }
        None
    }

    /// Start times for `id` consistent with the horizon, the due date and every bound
    /// neighbour in the precedence graph. `None` when that window is empty.
    pub fn start_window(&self, partial: &PartialAssignment, id: ActivityId) -> Option<(u32, u32)> {
        self.window_at(partial, self.project.index_of(id)?)
    }

    pub(crate) fn window_at(&self, partial: &PartialAssignment, index: usize) -> Option<(u32, u32)> {
        let project = self.project;
        let duration = project.activities[index].duration;
        let mut earliest = project.heads[index];
        for &p in project.predecessors[index].iter() {
            if let Some(start) = partial.start_at(p) {
                earliest = earliest.max(start + project.activities[p].duration);
            }
        }
        let mut latest = project.horizon;
        for &s in project.successors[index].iter() {
            if let Some(start) = partial.start_at(s) {
                latest = latest.min(start.checked_sub(duration)?);
            }
        }
        if let Some(due_date) = project.due_date {
            latest = latest.min(due_date.checked_sub(project.tails[index])?);
        }
        (earliest <= latest).then_some((earliest, latest))
    }

    /// Whether binding `id` at `start` keeps the partial assignment feasible, given a
    /// timeline that already holds every bound activity.
    pub fn admits(
        &self,
        partial: &PartialAssignment,
        timeline: &Timeline,
        id: ActivityId,
        start: u32,
    ) -> bool {
        let Some(index) = self.project.index_of(id) else {
            return false;
        };
        self.window_at(partial, index)
            .is_some_and(|(earliest, latest)| earliest <= start && start <= latest)
            && timeline.fits(&self.project.activities[index], start)
    }

    /// First violated constraint among the bound activities.
    pub fn check_partial(&self, partial: &PartialAssignment) -> Result<(), Violation> {
        match self.collect(&partial.starts, true).into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    /// First violated constraint of a complete schedule.
    pub fn check(&self, schedule: &Schedule) -> Result<(), Violation> {
        match self.violations(schedule).into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    pub fn is_feasible(&self, schedule: &Schedule) -> bool {
        self.check(schedule).is_ok()
    }

    /// Every violated constraint of a complete schedule. Capacity problems are reported once
    /// per resource, at the first overloaded instant.
    pub fn violations(&self, schedule: &Schedule) -> Vec<Violation> {
        let mut unknown = Vec::new();
        let mut starts = vec![None; self.project.activities.len()];
        for (id, start) in schedule.iter() {
            match self.project.index_of(id) {
                Some(i) => starts[i] = Some(start),
                None => unknown.push(Violation::UnknownActivity(id)),
            }
        }
        unknown.extend(self.collect(&starts, false));
        unknown
    }

    /// Whether every sink completes by the project's due date. Projects without a due date
    /// always pass.
    pub fn meets_due_date(&self, schedule: &Schedule) -> Result<bool, Error> {
        let Some(due_date) = self.project.due_date else {
            return Ok(true);
        };
        let mut sinks = self.project.sinks().peekable();
        if sinks.peek().is_none() {
            return Err(Error::NoSinkActivities);
        }
        Ok(sinks.all(|sink| {
            schedule
                .start(sink.id)
                .is_some_and(|start| sink.finish(start) <= due_date)
        }))
    }

    fn collect(&self, starts: &[Option<u32>], partial: bool) -> Vec<Violation> {
        let project = self.project;
        let mut violations = Vec::new();

        for (activity, start) in project.activities.iter().zip(starts) {
            match start {
                None if !partial => violations.push(Violation::Unassigned(activity.id)),
                Some(start) if *start > project.horizon => {
                    violations.push(Violation::BeyondHorizon {
                        activity: activity.id,
                        start: *start,
                        horizon: project.horizon,
                    })
                }
                _ => {}
            }
        }

        for (i, activity) in project.activities.iter().enumerate() {
            let Some(start) = starts[i] else { continue };
            let finish = activity.finish(start);
            for &s in project.successors[i].iter() {
                if let Some(successor_start) = starts[s] {
                    if finish > successor_start {
                        violations.push(Violation::Precedence {
                            predecessor: activity.id,
                            successor: project.activities[s].id,
                            finish,
                            start: successor_start,
                        });
                    }
                }
            }
        }

        // Starts past the horizon are already reported above.
        let mut timeline = Timeline::new(project);
        for (activity, start) in project.activities.iter().zip(starts) {
            if let Some(start) = start.filter(|s| *s <= project.horizon) {
                timeline.place(activity, start);
            }
        }
        for (r, time, usage) in timeline.overloads() {
            let resource = &project.resources[r.0];
            violations.push(Violation::Capacity {
                resource: resource.name.clone(),
                time,
                usage,
                capacity: resource.capacity,
            });
        }

        if let Some(due_date) = project.due_date {
            for sink in project.sinks() {
                let Some(i) = project.index_of(sink.id) else { continue };
                if let Some(start) = starts[i] {
                    let finish = sink.finish(start);
                    if finish > due_date {
                        violations.push(Violation::DueDate {
                            activity: sink.id,
                            finish,
                            due_date,
                        });
                    }
                }
            }
        }

        violations
    }

    /// See [`Schedule::makespan`].
    pub fn makespan(&self, schedule: &Schedule) -> Option<u32> {
        schedule.makespan(self.project)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ActivityConfig;

    fn project() -> Project {
        Project::builder()
            .horizon(10)
            .resource("R1", 2)
            .activity(ActivityConfig::new(1, 3).demand("R1", 1).successor(2))
            .activity(ActivityConfig::new(2, 2).demand("R1", 2))
            .activity(ActivityConfig::new(3, 4).demand("R1", 1))
            .build()
            .unwrap()
    }

    fn schedule(starts: &[(u32, u32)]) -> Schedule {
        starts.iter().map(|&(id, s)| (ActivityId(id), s)).collect()
    }

    #[test]
    fn timeline_tracks_footprints() {
        let project = project();
        let a1 = project.activity(ActivityId(1)).unwrap();
        let a2 = project.activity(ActivityId(2)).unwrap();
        let mut timeline = Timeline::new(&project);
        assert_eq!(timeline.length(), 14);
        timeline.place(a1, 2);
        assert_eq!(timeline.usage(ResourceId(0), 1), 0);
        assert_eq!(timeline.usage(ResourceId(0), 2), 1);
        assert_eq!(timeline.usage(ResourceId(0), 4), 1);
        assert_eq!(timeline.usage(ResourceId(0), 5), 0);
        assert!(!timeline.fits(a2, 3));
        assert!(!timeline.fits(a2, 1));
        assert!(timeline.fits(a2, 5));
        assert!(timeline.fits(a2, 0));
        timeline.remove(a1, 2);
        assert!(timeline.fits(a2, 3));
        assert_eq!(timeline.overloads().count(), 0);
    }

    #[test]
    fn timeline_rejects_work_past_its_end() {
        let project = project();
        let a3 = project.activity(ActivityId(3)).unwrap();
        let timeline = Timeline::with_length(&project, 5);
        assert!(timeline.fits(a3, 1));
        assert!(!timeline.fits(a3, 2));
    }

    #[test]
    fn precedence_is_checked_as_soon_as_both_ends_are_bound() {
        let project = project();
        let evaluator = Evaluator::new(&project);
        let mut partial = PartialAssignment::new(&project);
        assert!(partial.bind(&project, ActivityId(2), 2));
        assert_eq!(evaluator.check_partial(&partial), Ok(()));
        assert!(partial.bind(&project, ActivityId(1), 0));
        assert!(matches!(
            evaluator.check_partial(&partial),
            Err(Violation::Precedence { finish: 3, start: 2, .. })
        ));
        partial.unbind(&project, ActivityId(1));
        assert_eq!(partial.bound(), 1);
        assert!(!partial.bind(&project, ActivityId(9), 0));
    }

    #[test]
    fn start_window_follows_bound_neighbours() {
        let project = project();
        let evaluator = Evaluator::new(&project);
        let mut partial = PartialAssignment::new(&project);
        assert_eq!(evaluator.start_window(&partial, ActivityId(2)), Some((3, 10)));
        partial.bind(&project, ActivityId(1), 4);
        assert_eq!(evaluator.start_window(&partial, ActivityId(2)), Some((7, 10)));
        partial.unbind(&project, ActivityId(1));
        partial.bind(&project, ActivityId(2), 5);
        assert_eq!(evaluator.start_window(&partial, ActivityId(1)), Some((0, 2)));
        partial.bind(&project, ActivityId(2), 2);
        assert_eq!(evaluator.start_window(&partial, ActivityId(1)), None);
    }

    #[test]
    fn admits_combines_window_and_capacity() {
        let project = project();
        let evaluator = Evaluator::new(&project);
        let mut partial = PartialAssignment::new(&project);
        let mut timeline = Timeline::new(&project);
        let a3 = project.activity(ActivityId(3)).unwrap();
        partial.bind(&project, ActivityId(3), 3);
        timeline.place(a3, 3);
        assert!(evaluator.admits(&partial, &timeline, ActivityId(1), 0));
        assert!(!evaluator.admits(&partial, &timeline, ActivityId(2), 4));
        assert!(evaluator.admits(&partial, &timeline, ActivityId(2), 7));
        assert!(!evaluator.admits(&partial, &timeline, ActivityId(2), 11));
    }

    #[test]
    fn reports_violations_of_complete_schedules() {
        let project = project();
        let evaluator = Evaluator::new(&project);
        assert!(evaluator.is_feasible(&schedule(&[(1, 0), (2, 4), (3, 0)])));

        let overlapping = schedule(&[(1, 0), (2, 3), (3, 2)]);
        assert_eq!(
            evaluator.check(&overlapping),
            Err(Violation::Capacity {
                resource: "R1".into(),
                time: 3,
                usage: 3,
                capacity: 2
            })
        );

        let missing = schedule(&[(1, 0), (3, 0)]);
        assert_eq!(
            evaluator.check(&missing),
            Err(Violation::Unassigned(ActivityId(2)))
        );

        let late = schedule(&[(1, 0), (2, 11), (3, 0)]);
        assert!(matches!(
            evaluator.check(&late),
            Err(Violation::BeyondHorizon { start: 11, .. })
        ));

        let stranger = schedule(&[(1, 0), (2, 4), (3, 0), (7, 1)]);
        assert_eq!(
            evaluator.violations(&stranger),
            vec![Violation::UnknownActivity(ActivityId(7))]
        );
    }

    #[test]
    fn due_date_needs_sinks() {
        let empty = Project::builder().horizon(3).due_date(2).build().unwrap();
        assert_eq!(
            Evaluator::new(&empty).meets_due_date(&Schedule::new()),
            Err(Error::NoSinkActivities)
        );

        let project = Project::builder()
            .horizon(10)
            .due_date(5)
            .activity(ActivityConfig::new(1, 3).successor(2))
            .activity(ActivityConfig::new(2, 2))
            .build()
            .unwrap();
        let evaluator = Evaluator::new(&project);
        assert_eq!(evaluator.meets_due_date(&schedule(&[(1, 0), (2, 3)])), Ok(true));
        assert_eq!(evaluator.meets_due_date(&schedule(&[(1, 0), (2, 4)])), Ok(false));
        assert!(matches!(
            evaluator.check(&schedule(&[(1, 0), (2, 4)])),
            Err(Violation::DueDate { finish: 6, .. })
        ));
        assert_eq!(
            evaluator.start_window(&PartialAssignment::new(&project), ActivityId(1)),
            Some((0, 0))
        );
    }

    #[test]
    fn detects_static_infeasibility() {
        let greedy = Project::builder()
            .horizon(10)
            .resource("R1", 1)
            .activity(ActivityConfig::new(1, 2).demand("R1", 2))
            .build()
            .unwrap();
        assert!(Evaluator::new(&greedy).static_infeasibility().is_some());

        let long_chain = Project::builder()
            .horizon(2)
            .activity(ActivityConfig::new(1, 3).successor(2))
            .activity(ActivityConfig::new(2, 1))
            .build()
            .unwrap();
        assert!(Evaluator::new(&long_chain).static_infeasibility().is_some());

        assert_eq!(Evaluator::new(&project()).static_infeasibility(), None);
    }

    #[test]
    fn makespan_covers_all_sinks() {
        let project = project();
        let evaluator = Evaluator::new(&project);
        assert_eq!(
            evaluator.makespan(&schedule(&[(1, 0), (2, 4), (3, 5)])),
            Some(9)
        );
        assert_eq!(evaluator.makespan(&schedule(&[(1, 0)])), None);
    }
}
