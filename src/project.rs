use crate::config::ActivityConfig;
use itertools::Itertools;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use thiserror::Error;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct ActivityId(pub u32);

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a resource in [`Project::resources`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub usize);

/// Reasons a project description is rejected before any search starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("activity id {0} is not a positive 32-bit integer")]
    InvalidActivityId(i64),
    #[error("activity {0} is defined more than once")]
    DuplicateActivity(ActivityId),
    #[error("resource {0:?} is defined more than once")]
    DuplicateResource(String),
    #[error("activity {activity} lists unknown successor {successor}")]
    UnknownSuccessor { activity: ActivityId, successor: i64 },
    #[error("activity {activity} demands unknown resource {resource:?}")]
    UnknownResource {
        activity: ActivityId,
        resource: String,
    },
    #[error("precedence cycle through activities {}", .0.iter().join(", "))]
    CyclicPrecedence(Vec<ActivityId>),
    #[error("{what} must not be negative (got {value})")]
    NegativeValue { what: String, value: i64 },
    #[error("{what} is out of range (got {value})")]
    OutOfRange { what: String, value: i64 },
    #[error("horizon {horizon} plus total work {work} overflows the time axis")]
    TimeOverflow { horizon: u32, work: u64 },
}

fn non_negative(what: impl FnOnce() -> String, value: i64) -> Result<u32, ValidationError> {
    if value < 0 {
        return Err(ValidationError::NegativeValue {
            what: what(),
            value,
        });
    }
    u32::try_from(value).map_err(|_| ValidationError::OutOfRange {
        what: what(),
        value,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub(crate) id: ResourceId,
    pub(crate) name: String,
    pub(crate) capacity: u32,
}

impl Resource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub(crate) id: ActivityId,
    pub(crate) mode: u32,
    pub(crate) duration: u32,
    /// Demand per resource, indexed by [`ResourceId`].
    pub(crate) demand: Vec<u32>,
}

impl Activity {
    pub fn id(&self) -> ActivityId {
        self.id
    }

    /// Execution mode from the input. Only single-mode projects are scheduled, so this is
    /// informational.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn demand(&self, resource: ResourceId) -> u32 {
        self.demand.get(resource.0).copied().unwrap_or(0)
    }

    /// The resources this activity consumes while running, with the consumed amount.
    pub fn demands(&self) -> impl Iterator<Item = (ResourceId, u32)> + '_ {
        self.demand
            .iter()
            .enumerate()
            .filter(|(_, amount)| **amount > 0)
            .map(|(i, amount)| (ResourceId(i), *amount))
    }

    pub fn finish(&self, start: u32) -> u32 {
        start.saturating_add(self.duration)
    }
}

/// Validated, read-only description of a scheduling problem.
///
/// Activities are stored in ascending id order; internal indices follow that order.
#[derive(Debug, Clone)]
pub struct Project {
    pub(crate) activities: Vec<Activity>,
    pub(crate) index: HashMap<ActivityId, usize>,
    pub(crate) resources: Vec<Resource>,
    pub(crate) successors: Vec<Vec<usize>>,
    pub(crate) predecessors: Vec<Vec<usize>>,
    pub(crate) topological: Vec<usize>,
    /// Earliest start of each activity implied by precedence alone.
    pub(crate) heads: Vec<u32>,
    /// Longest chain of durations from each activity to the end, its own duration included.
    pub(crate) tails: Vec<u32>,
    pub(crate) horizon: u32,
    pub(crate) due_date: Option<u32>,
}

impl Project {
    pub fn builder() -> ProjectBuilder {
        ProjectBuilder::default()
    }

    pub fn horizon(&self) -> u32 {
        self.horizon
    }

    pub fn due_date(&self) -> Option<u32> {
        self.due_date
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.index.get(&id).map(|&i| &self.activities[i])
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn successors(&self, id: ActivityId) -> impl Iterator<Item = &Activity> + '_ {
        self.neighbours(id, &self.successors)
    }

    pub fn predecessors(&self, id: ActivityId) -> impl Iterator<Item = &Activity> + '_ {
        self.neighbours(id, &self.predecessors)
    }

    fn neighbours<'a>(
        &'a self,
        id: ActivityId,
        edges: &'a [Vec<usize>],
    ) -> impl Iterator<Item = &'a Activity> + 'a {
        self.index
            .get(&id)
            .into_iter()
            .flat_map(move |&i| edges[i].iter())
            .map(move |&j| &self.activities[j])
    }

    /// Activities without successors.
    pub fn sinks(&self) -> impl Iterator<Item = &Activity> + '_ {
        self.activities
            .iter()
            .enumerate()
            .filter(|(i, _)| self.successors[*i].is_empty())
            .map(|(_, a)| a)
    }

    /// Activities without predecessors.
    pub fn roots(&self) -> impl Iterator<Item = &Activity> + '_ {
        self.activities
            .iter()
            .enumerate()
            .filter(|(i, _)| self.predecessors[*i].is_empty())
            .map(|(_, a)| a)
    }

    pub fn is_root(&self, id: ActivityId) -> bool {
        self.index
            .get(&id)
            .is_some_and(|&i| self.predecessors[i].is_empty())
    }

    /// Activity ids in a precedence-respecting order, ties broken by ascending id.
    pub fn topological_order(&self) -> Vec<ActivityId> {
        self.topological
            .iter()
            .map(|&i| self.activities[i].id)
            .collect()
    }

    /// Earliest start implied by precedence alone.
    pub fn head(&self, id: ActivityId) -> Option<u32> {
        self.index.get(&id).map(|&i| self.heads[i])
    }

    pub fn tail(&self, id: ActivityId) -> Option<u32> {
        self.index.get(&id).map(|&i| self.tails[i])
    }

    /// Length of the longest precedence chain, a lower bound on every makespan.
    pub fn critical_path(&self) -> u32 {
        self.heads
            .iter()
            .zip(&self.tails)
            .map(|(head, tail)| head + tail)
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn index_of(&self, id: ActivityId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub(crate) fn max_duration(&self) -> u32 {
        self.activities
            .iter()
            .map(|a| a.duration)
            .max()
            .unwrap_or(0)
    }
}

/// Collects raw project data and validates it into a [`Project`].
#[derive(Debug, Clone, Default)]
pub struct ProjectBuilder {
    horizon: i64,
    due_date: Option<i64>,
    resources: Vec<(String, i64)>,
    activities: Vec<ActivityConfig>,
}

impl ProjectBuilder {
    pub fn horizon(mut self, horizon: i64) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn due_date(mut self, due_date: i64) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn resource(mut self, name: impl Into<String>, capacity: i64) -> Self {
        self.resources.push((name.into(), capacity));
        self
    }

    pub fn activity(mut self, activity: ActivityConfig) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn activities(mut self, activities: impl IntoIterator<Item = ActivityConfig>) -> Self {
        self.activities.extend(activities);
        self
    }

    pub fn build(self) -> Result<Project, ValidationError> {
        let horizon = non_negative(|| "horizon".to_string(), self.horizon)?;
        let due_date = self
            .due_date
            .map(|d| non_negative(|| "due date".to_string(), d))
            .transpose()?;

        let mut resources: Vec<Resource> = Vec::with_capacity(self.resources.len());
        for (name, capacity) in self.resources {
            if resources.iter().any(|r| r.name == name) {
                return Err(ValidationError::DuplicateResource(name));
            }
            let capacity = non_negative(|| format!("capacity of resource {name:?}"), capacity)?;
            resources.push(Resource {
                id: ResourceId(resources.len()),
                name,
                capacity,
            });
        }

        let mut configs = self.activities;
        configs.sort_by_key(|a| a.id);
        let mut activities = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());
        for config in configs.iter() {
            let id = match u32::try_from(config.id) {
                Ok(id) if id > 0 => ActivityId(id),
                _ => return Err(ValidationError::InvalidActivityId(config.id)),
            };
            if index.insert(id, activities.len()).is_some() {
                return Err(ValidationError::DuplicateActivity(id));
            }
            let duration = non_negative(|| format!("duration of activity {id}"), config.duration)?;
            let mut demand = vec![0; resources.len()];
            for (name, amount) in config.demand.iter() {
                let resource = resources.iter().find(|r| &r.name == name).ok_or_else(|| {
                    ValidationError::UnknownResource {
                        activity: id,
                        resource: name.clone(),
                    }
                })?;
                demand[resource.id.0] = non_negative(
                    || format!("demand of activity {id} on resource {name:?}"),
                    *amount,
                )?;
            }
            activities.push(Activity {
                id,
                mode: config.mode.unwrap_or(1),
                duration,
                demand,
            });
        }

        let mut successors = vec![Vec::new(); activities.len()];
        let mut predecessors = vec![Vec::new(); activities.len()];
        for (i, config) in configs.iter().enumerate() {
            for &successor in config.successors.iter() {
                let j = u32::try_from(successor)
                    .ok()
                    .and_then(|s| index.get(&ActivityId(s)).copied())
                    .ok_or(ValidationError::UnknownSuccessor {
                        activity: activities[i].id,
                        successor,
                    })?;
                successors[i].push(j);
            }
            successors[i].sort_unstable();
            successors[i].dedup();
            for &j in successors[i].iter() {
                predecessors[j].push(i);
            }
        }

        let topological = topological_order(&successors, &predecessors)
            .map_err(|cycle| {
                ValidationError::CyclicPrecedence(
                    cycle.into_iter().map(|i| activities[i].id).collect(),
                )
            })?;

        let work: u64 = activities.iter().map(|a| a.duration as u64).sum();
        if horizon as u64 + work >= u32::MAX as u64 {
            return Err(ValidationError::TimeOverflow { horizon, work });
        }

        let mut heads = vec![0u32; activities.len()];
        for &i in topological.iter() {
            let finish = heads[i] + activities[i].duration;
            for &j in successors[i].iter() {
                heads[j] = heads[j].max(finish);
            }
        }
        let mut tails = vec![0u32; activities.len()];
        for &i in topological.iter().rev() {
            let longest = successors[i].iter().map(|&j| tails[j]).max().unwrap_or(0);
            tails[i] = activities[i].duration + longest;
        }

        Ok(Project {
            activities,
            index,
            resources,
            successors,
            predecessors,
            topological,
            heads,
            tails,
            horizon,
            due_date,
        })
    }
}

/// Kahn's algorithm, preferring the smallest ready index. On a cycle, returns the indices that
/// lie on or between cycles, sorted ascending.
fn topological_order(
    successors: &[Vec<usize>],
    predecessors: &[Vec<usize>],
) -> Result<Vec<usize>, Vec<usize>> {
    let n = successors.len();
    let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut ready: std::collections::BTreeSet<usize> =
        (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &j in successors[i].iter() {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.insert(j);
            }
        }
    }
    if order.len() == n {
        return Ok(order);
    }

    // Peel off everything downstream of a cycle that does not lead back into one.
    let mut remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
    let mut out_degree: Vec<usize> = (0..n)
        .map(|i| successors[i].iter().filter(|&&j| remaining[j]).count())
        .collect();
    let mut queue: VecDeque<usize> = (0..n)
        .filter(|&i| remaining[i] && out_degree[i] == 0)
        .collect();
    while let Some(i) = queue.pop_front() {
        remaining[i] = false;
        for &p in predecessors[i].iter() {
            if remaining[p] {
                out_degree[p] -= 1;
                if out_degree[p] == 0 {
                    queue.push_back(p);
                }
            }
        }
    }
    Err((0..n).filter(|&i| remaining[i]).collect())
}

#[cfg(test)]
mod test {
    use super::*;

    fn chain() -> Project {
        Project::builder()
            .horizon(20)
            .resource("R1", 2)
            .activity(ActivityConfig::new(1, 3).demand("R1", 1).successor(2))
            .activity(ActivityConfig::new(2, 2).demand("R1", 2).successor(3))
            .activity(ActivityConfig::new(3, 4))
            .activity(ActivityConfig::new(4, 1).successor(3))
            .build()
            .unwrap()
    }

    #[test]
    fn builds_a_valid_project() {
        let project = chain();
        assert_eq!(project.activities().len(), 4);
        assert_eq!(project.horizon(), 20);
        assert_eq!(project.resource("R1").unwrap().capacity(), 2);
        let a2 = project.activity(ActivityId(2)).unwrap();
        assert_eq!(a2.duration(), 2);
        assert_eq!(a2.demand(ResourceId(0)), 2);
        assert_eq!(a2.mode(), 1);
    }

    #[test]
    fn exposes_graph_accessors() {
        let project = chain();
        let succ: Vec<_> = project.successors(ActivityId(1)).map(|a| a.id()).collect();
        assert_eq!(succ, vec![ActivityId(2)]);
        let pred: Vec<_> = project.predecessors(ActivityId(3)).map(|a| a.id()).collect();
        assert_eq!(pred, vec![ActivityId(2), ActivityId(4)]);
        let sinks: Vec<_> = project.sinks().map(|a| a.id()).collect();
        assert_eq!(sinks, vec![ActivityId(3)]);
        let roots: Vec<_> = project.roots().map(|a| a.id()).collect();
        assert_eq!(roots, vec![ActivityId(1), ActivityId(4)]);
        assert!(project.is_root(ActivityId(4)));
        assert!(!project.is_root(ActivityId(2)));
        assert_eq!(project.successors(ActivityId(99)).count(), 0);
    }

    #[test]
    fn computes_heads_tails_and_critical_path() {
        let project = chain();
        assert_eq!(project.head(ActivityId(3)), Some(5));
        assert_eq!(project.tail(ActivityId(1)), Some(9));
        assert_eq!(project.tail(ActivityId(4)), Some(5));
        assert_eq!(project.critical_path(), 9);
        let order = project.topological_order();
        let pos = |id: u32| order.iter().position(|a| *a == ActivityId(id)).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(3));
        assert!(pos(4) < pos(3));
    }

    #[test]
    fn rejects_cycles() {
        let err = Project::builder()
            .horizon(10)
            .activity(ActivityConfig::new(1, 1).successor(2))
            .activity(ActivityConfig::new(2, 1).successor(1))
            .activity(ActivityConfig::new(3, 1))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::CyclicPrecedence(vec![ActivityId(1), ActivityId(2)])
        );
    }

    #[test]
    fn cycle_report_skips_activities_downstream_of_the_cycle() {
        let err = Project::builder()
            .horizon(10)
            .activity(ActivityConfig::new(1, 1).successor(2))
            .activity(ActivityConfig::new(2, 1).successors([3, 4]))
            .activity(ActivityConfig::new(3, 1).successor(2))
            .activity(ActivityConfig::new(4, 1))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::CyclicPrecedence(vec![ActivityId(2), ActivityId(3)])
        );
        assert_eq!(err.to_string(), "precedence cycle through activities 2, 3");
    }

    #[test]
    fn rejects_self_loops() {
        let err = Project::builder()
            .horizon(10)
            .activity(ActivityConfig::new(1, 1).successor(1))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::CyclicPrecedence(vec![ActivityId(1)]));
    }

    #[test]
    fn rejects_dangling_references() {
        let err = Project::builder()
            .horizon(10)
            .activity(ActivityConfig::new(1, 1).successor(7))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownSuccessor {
                activity: ActivityId(1),
                successor: 7
            }
        );

        let err = Project::builder()
            .horizon(10)
            .activity(ActivityConfig::new(1, 1).demand("crane", 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownResource { .. }));
    }

    #[test]
    fn rejects_negative_values() {
        let err = Project::builder()
            .horizon(10)
            .activity(ActivityConfig::new(1, -1))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::NegativeValue { value: -1, .. }));

        let err = Project::builder()
            .horizon(10)
            .resource("R1", -3)
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::NegativeValue { value: -3, .. }));

        let err = Project::builder().horizon(-1).build().unwrap_err();
        assert!(matches!(err, ValidationError::NegativeValue { .. }));

        let err = Project::builder()
            .horizon(10)
            .resource("R1", 1)
            .activity(ActivityConfig::new(1, 1).demand("R1", -2))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::NegativeValue { value: -2, .. }));
    }

    #[test]
    fn rejects_duplicates_and_bad_ids() {
        let err = Project::builder()
            .horizon(10)
            .activity(ActivityConfig::new(1, 1))
            .activity(ActivityConfig::new(1, 2))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateActivity(ActivityId(1)));

        let err = Project::builder()
            .horizon(10)
            .resource("R1", 1)
            .resource("R1", 2)
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateResource("R1".into()));

        let err = Project::builder()
            .horizon(10)
            .activity(ActivityConfig::new(0, 1))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidActivityId(0));
    }

    #[test]
    fn rejects_time_axis_overflow() {
        let err = Project::builder()
            .horizon(u32::MAX as i64 - 1)
            .activity(ActivityConfig::new(1, 5))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::TimeOverflow { .. }));
    }

    #[test]
    fn empty_project_is_valid() {
        let project = Project::builder().horizon(0).build().unwrap();
        assert_eq!(project.sinks().count(), 0);
        assert_eq!(project.roots().count(), 0);
        assert_eq!(project.critical_path(), 0);
    }
}
