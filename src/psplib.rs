//! Reader for the sectioned, whitespace-separated project format.
//!
//! ```text
//! #General Information
//! projects: 1
//! jobs (incl. supersource/sink ): 4
//! horizon: 20
//! #Projects summary
//! pronr.  #jobs rel.date duedate tardcost  MPM-Time
//!     1      4      0      12        0       10
//! #Precedence relations
//! #jobnr.    #modes  #successors   successors
//!    1        1          2           2   3
//! #Duration and resources
//! #jobnr. mode duration  R1  R2
//!    1      1     2       1   0
//! #Resource availability
//! R1  1
//! ```
//!
//! Lines starting with `**` and blank lines are ignored. Resource columns in the duration
//! section are named `R1`, `R2`, ... in order.

use crate::config::{ActivityConfig, ProjectConfig, ResourceConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Line { line: usize, message: String },
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("job {0} has precedence relations but no duration")]
    MissingDuration(i64),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Section {
    Preamble,
    GeneralInformation,
    ProjectsSummary,
    PrecedenceRelations,
    DurationAndResources,
    ResourceAvailability,
}

impl Section {
    fn from_header(line: &str) -> Option<Self> {
        match line {
            "#General Information" => Some(Section::GeneralInformation),
            "#Projects summary" => Some(Section::ProjectsSummary),
            "#Precedence relations" => Some(Section::PrecedenceRelations),
            "#Duration and resources" => Some(Section::DurationAndResources),
            "#Resource availability" => Some(Section::ResourceAvailability),
            _ => None,
        }
    }
}

struct DurationRow {
    mode: u32,
    duration: i64,
    demand: BTreeMap<String, i64>,
}

pub fn from_path(path: impl AsRef<Path>) -> Result<ProjectConfig, ParseError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

/// Parse a project. The due date is taken from the first project summary row, when present.
pub fn parse(text: &str) -> Result<ProjectConfig, ParseError> {
    let mut section = Section::Preamble;
    let mut horizon = None;
    let mut due_date = None;
    let mut successors: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let mut durations: BTreeMap<i64, DurationRow> = BTreeMap::new();
    let mut resources: Vec<ResourceConfig> = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        let number = number + 1;
        if line.is_empty() || line.starts_with("**") {
            continue;
        }
        if let Some(next) = Section::from_header(line) {
            section = next;
            continue;
        }
        // Column headings
        if line.starts_with('#') || line.starts_with("pronr.") || line.starts_with("jobnr.") {
            continue;
        }
        let error = |message: String| ParseError::Line {
            line: number,
            message,
        };

        match section {
            Section::Preamble => {}
            Section::GeneralInformation => {
                let Some((key, value)) = line.split_once(':') else {
                    continue;
                };
                if key.trim() == "horizon" {
                    horizon = Some(integer(value).map_err(error)?);
                }
            }
            Section::ProjectsSummary => {
                let fields = integers(line).map_err(error)?;
                if fields.len() < 4 {
                    return Err(error(format!(
                        "expected at least 4 project summary fields, found {}",
                        fields.len()
                    )));
                }
                due_date.get_or_insert(fields[3]);
            }
            Section::PrecedenceRelations => {
                let fields = integers(line).map_err(error)?;
                let [job, _modes, count, rest @ ..] = fields.as_slice() else {
                    return Err(error("expected job, modes and successor count".into()));
                };
                if usize::try_from(*count).ok() != Some(rest.len()) {
                    return Err(error(format!(
                        "job {job} declares {count} successors but lists {}",
                        rest.len()
                    )));
                }
                if successors.insert(*job, rest.to_vec()).is_some() {
                    return Err(error(format!("job {job} has more than one precedence row")));
                }
            }
            Section::DurationAndResources => {
                let fields = integers(line).map_err(error)?;
                let [job, mode, duration, demand @ ..] = fields.as_slice() else {
                    return Err(error("expected job, mode and duration".into()));
                };
                let mode = u32::try_from(*mode)
                    .map_err(|_| error(format!("invalid mode {mode} for job {job}")))?;
                let demand = demand
                    .iter()
                    .enumerate()
                    .filter(|(_, amount)| **amount != 0)
                    .map(|(i, amount)| (format!("R{}", i + 1), *amount))
                    .collect();
                let row = DurationRow {
                    mode,
                    duration: *duration,
                    demand,
                };
                if durations.insert(*job, row).is_some() {
                    return Err(error(format!(
                        "job {job} has more than one mode, only single-mode projects are supported"
                    )));
                }
            }
            Section::ResourceAvailability => {
                let mut fields = line.split_whitespace();
                let (Some(name), Some(capacity), None) = (fields.next(), fields.next(), fields.next())
                else {
                    return Err(error("expected a resource name and its capacity".into()));
                };
                resources.push(ResourceConfig {
                    name: name.to_string(),
                    capacity: integer(capacity).map_err(error)?,
                });
            }
        }
    }

    let horizon = horizon.ok_or(ParseError::Missing("horizon"))?;
    if successors.is_empty() && durations.is_empty() {
        return Err(ParseError::Missing("jobs"));
    }
    // Jobs only listed in the duration section have no successors.
    for job in durations.keys() {
        successors.entry(*job).or_default();
    }
    let activities = successors
        .into_iter()
        .map(|(job, successors)| {
            let row = durations
                .remove(&job)
                .ok_or(ParseError::MissingDuration(job))?;
            let mut activity = ActivityConfig::new(job, row.duration)
                .mode(row.mode)
                .successors(successors);
            activity.demand = row.demand;
            Ok(activity)
        })
        .collect::<Result<Vec<_>, ParseError>>()?;
    debug!(
        activities = activities.len(),
        resources = resources.len(),
        horizon,
        "parsed project"
    );

    Ok(ProjectConfig {
        horizon,
        due_date,
        resources,
        activities,
    })
}

fn integer(value: &str) -> Result<i64, String> {
    let value = value.trim();
    value
        .parse()
        .map_err(|_| format!("expected an integer, found {value:?}"))
}

fn integers(line: &str) -> Result<Vec<i64>, String> {
    line.split_whitespace().map(integer).collect()
}
