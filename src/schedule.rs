use crate::error::Error;
use crate::project::{ActivityId, Project};
use prettytable::Table;
use prettytable::{format::FormatBuilder, format::LinePosition, format::LineSeparator, row, table};
use std::collections::BTreeMap;
use std::fmt;

/// Start time per activity, kept in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    starts: BTreeMap<ActivityId, u32>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start of an activity, returning the previous start if there was one.
    pub fn insert(&mut self, id: ActivityId, start: u32) -> Option<u32> {
        self.starts.insert(id, start)
    }

    pub fn start(&self, id: ActivityId) -> Option<u32> {
        self.starts.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActivityId, u32)> + '_ {
        self.starts.iter().map(|(id, start)| (*id, *start))
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn finish(&self, project: &Project, id: ActivityId) -> Option<u32> {
        let start = self.start(id)?;
        project.activity(id).map(|a| a.finish(start))
    }

    /// Completion time of the last sink activity. `None` if a sink is unscheduled or the project
    /// has no sinks.
    pub fn makespan(&self, project: &Project) -> Option<u32> {
        let finishes: Option<Vec<u32>> = project
            .sinks()
            .map(|a| self.start(a.id()).map(|s| a.finish(s)))
            .collect();
        finishes?.into_iter().max()
    }

    /// See [`normalize`].
    pub fn normalize(&self, project: &Project) -> Result<Schedule, Error> {
        normalize(self, project)
    }

    /// Gantt style table with one row per activity.
    pub fn timeline(&self, project: &Project) -> Table {
        let end = self
            .iter()
            .filter_map(|(id, _)| self.finish(project, id))
            .max()
            .unwrap_or(0);
        // Keep wide schedules readable in a terminal.
        let unit_width = if end > 80 { 80.0 / end as f64 } else { 1.0 };
        let mut t = table!(["Activity", "Start", "Finish", "Timeline"]);
        let format = FormatBuilder::new()
            .column_separator('|')
            .borders('|')
            .separator(LinePosition::Top, LineSeparator::new('-', '+', '+', '+'))
            .separator(LinePosition::Title, LineSeparator::new('-', '+', '+', '+'))
            .separator(LinePosition::Bottom, LineSeparator::new('-', '+', '+', '+'))
            .padding(1, 1)
            .build();
        t.set_format(format);
        for (id, start) in self.iter() {
            let duration = project.activity(id).map(|a| a.duration()).unwrap_or(0);
            t.add_row(row![
                id,
                start,
                start + duration,
                bar(start, duration, unit_width)
            ]);
        }
        t
    }

    /// Print the timeline table to stdout.
    pub fn print(&self, project: &Project) -> std::io::Result<()> {
        self.timeline(project).print_tty(false)?;
        Ok(())
    }

    /// Table with calendar dates, counting one time unit as one day from `start_date`.
    pub fn csv_table(&self, project: &Project, start_date: chrono::NaiveDate) -> Table {
        let mut table = Table::new();
        table.add_row(row!["Activity", "Mode", "Start", "End"]);
        for (id, start) in self.iter() {
            let Some(activity) = project.activity(id) else {
                continue;
            };
            let entry_start_date = start_date + chrono::Duration::days(start as i64);
            let entry_end_date = start_date + chrono::Duration::days(activity.finish(start) as i64);
            table.add_row(row![id, activity.mode(), entry_start_date, entry_end_date]);
        }
        table
    }
}

fn bar(start: u32, duration: u32, unit_width: f64) -> String {
    let offset = (start as f64 * unit_width).floor() as usize;
    let width = ((duration as f64 * unit_width).round() as usize).max(usize::from(duration > 0));
    let mut line = " ".repeat(offset);
    line.push_str(&"#".repeat(width));
    line
}

impl FromIterator<(ActivityId, u32)> for Schedule {
    fn from_iter<I: IntoIterator<Item = (ActivityId, u32)>>(iter: I) -> Self {
        Self {
            starts: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (id, start) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{id}@{start}")?;
            first = false;
        }
        Ok(())
    }
}

/// Shift a schedule so the earliest root activity starts at time zero.
///
/// Subtracting the same offset from every start keeps all precedence and resource window
/// inequalities intact, so a feasible schedule stays feasible.
pub fn normalize(schedule: &Schedule, project: &Project) -> Result<Schedule, Error> {
    let offset = schedule
        .iter()
        .filter(|(id, _)| project.is_root(*id))
        .map(|(_, start)| start)
        .min()
        .ok_or(Error::NoRootActivities)?;
    schedule
        .iter()
        .map(|(activity, start)| match start.checked_sub(offset) {
            Some(shifted) => Ok((activity, shifted)),
            None => Err(Error::StartBeforeOffset {
                activity,
                start,
                offset,
            }),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ActivityConfig;
    use crate::evaluator::Evaluator;

    fn project() -> Project {
        Project::builder()
            .horizon(30)
            .resource("R1", 1)
            .activity(ActivityConfig::new(1, 3).demand("R1", 1).successor(2))
            .activity(ActivityConfig::new(2, 2).demand("R1", 1))
            .activity(ActivityConfig::new(3, 4))
            .build()
            .unwrap()
    }

    fn schedule(starts: &[(u32, u32)]) -> Schedule {
        starts.iter().map(|&(id, s)| (ActivityId(id), s)).collect()
    }

    #[test]
    fn normalize_shifts_earliest_root_to_zero() {
        let project = project();
        let raw = schedule(&[(1, 7), (2, 10), (3, 5)]);
        let normalized = normalize(&raw, &project).unwrap();
        assert_eq!(normalized, schedule(&[(1, 2), (2, 5), (3, 0)]));
        let ids: Vec<_> = normalized.iter().map(|(id, _)| id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn normalize_is_idempotent_and_preserves_feasibility() {
        let project = project();
        let raw = schedule(&[(1, 4), (2, 8), (3, 6)]);
        let evaluator = Evaluator::new(&project);
        assert!(evaluator.is_feasible(&raw));
        let once = raw.normalize(&project).unwrap();
        let twice = once.normalize(&project).unwrap();
        assert_eq!(once, twice);
        assert!(evaluator.is_feasible(&once));
    }

    #[test]
    fn normalize_requires_a_root() {
        let project = project();
        let raw = schedule(&[(2, 3)]);
        assert_eq!(normalize(&raw, &project), Err(Error::NoRootActivities));
        assert_eq!(
            normalize(&Schedule::new(), &project),
            Err(Error::NoRootActivities)
        );
    }

    #[test]
    fn normalize_refuses_to_wrap_below_zero() {
        let project = project();
        let raw = schedule(&[(1, 5), (2, 1), (3, 6)]);
        assert_eq!(
            normalize(&raw, &project),
            Err(Error::StartBeforeOffset {
                activity: ActivityId(2),
                start: 1,
                offset: 5
            })
        );
    }

    #[test]
    fn makespan_uses_sink_completion() {
        let project = project();
        let s = schedule(&[(1, 0), (2, 3), (3, 0)]);
        assert_eq!(s.makespan(&project), Some(5));
        assert_eq!(s.finish(&project, ActivityId(3)), Some(4));
        assert_eq!(Schedule::new().makespan(&project), None);
        let missing_sink = schedule(&[(1, 0), (2, 3)]);
        assert_eq!(missing_sink.makespan(&project), None);
        assert_eq!(Evaluator::new(&project).makespan(&missing_sink), None);
    }

    #[test]
    fn schedules_export_as_a_yaml_map() {
        let s = schedule(&[(1, 0), (2, 3), (3, 0)]);
        let text = serde_yml::to_string(&s).unwrap();
        assert!(text.contains("2: 3"), "{text}");
        let loaded: Schedule = serde_yml::from_str(&text).unwrap();
        assert_eq!(loaded, s);
    }

    #[test]
    fn renders_tables() {
        let project = project();
        let s = schedule(&[(1, 0), (2, 3), (3, 0)]);
        let timeline = s.timeline(&project).to_string();
        assert!(timeline.contains("###"));
        let csv = s.csv_table(&project, chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let mut out = Vec::new();
        csv.to_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2024-01-04"));
        assert!(text.contains("2024-01-06"));
        assert_eq!(s.to_string(), "1@0, 2@3, 3@0");
    }

    #[test]
    fn bars_scale_with_unit_width() {
        assert_eq!(bar(2, 3, 1.0), "  ###");
        assert_eq!(bar(0, 0, 1.0), "");
        assert_eq!(bar(10, 1, 0.1), " #");
    }
}
