use crate::project::{ActivityId, ValidationError};
use thiserror::Error;

/// Errors surfaced by the solving and normalization entry points.
///
/// Running out of schedules is not an error: infeasible and inconclusive
/// searches are reported through [`SolveResult`](crate::result::SolveResult).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid project: {0}")]
    Validation(#[from] ValidationError),
    #[error("project declares a due date but has no sink activities")]
    NoSinkActivities,
    #[error("schedule contains no root activities to normalize against")]
    NoRootActivities,
    #[error("activity {activity} starts at {start}, before the normalization offset {offset}")]
    StartBeforeOffset {
        activity: ActivityId,
        start: u32,
        offset: u32,
    },
}
