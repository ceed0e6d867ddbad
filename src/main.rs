use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colorful::{Color, Colorful};
use tracing::info;

use makespan::solver::{Backtracking, BranchAndBound, BranchingOrder, SearchOptions, Solver};
use makespan::{psplib, Budget, Project, ProjectConfig, ResourceConfig, SolveResult};

#[derive(Parser, Debug)]
#[command(version, about = "Schedule activities under precedence and resource constraints")]
pub struct CliArgs {
    /// The project file. `.toml`, `.yaml` and `.yml` files are read as project configs, anything
    /// else as the sectioned job/duration/resource format
    project_file: PathBuf,

    /// Search for the schedule with the smallest makespan instead of the first feasible one
    #[arg(long)]
    optimize: bool,

    /// Stop searching after this many seconds
    #[arg(short, long)]
    time_limit: Option<f64>,

    /// Stop searching after visiting this many search nodes
    #[arg(short, long)]
    node_limit: Option<u64>,

    /// Explore the first activity's start times on all cores
    #[arg(short, long)]
    parallel: bool,

    /// Assign start times in precedence order instead of id order
    #[arg(long)]
    topological: bool,

    /// Add an additional resource with the form <name>=<capacity>
    #[arg(short, long)]
    add_resource: Vec<ResourceConfig>,

    /// Drop the project's due date before solving
    #[arg(long)]
    ignore_due_date: bool,

    /// Output the solution to a CSV file
    #[arg(short, long)]
    output_csv: Option<PathBuf>,

    /// Write the normalized start times to a YAML file
    #[arg(long)]
    output_yaml: Option<PathBuf>,

    /// Calculate the dates of the solution using the given start date
    #[arg(short, long)]
    start_date: Option<String>,
}

impl CliArgs {
    pub fn parse_start_date(&self) -> anyhow::Result<chrono::NaiveDate> {
        match self.start_date {
            None => Ok(chrono::Local::now().naive_local().date()),
            Some(ref date) if date == "today" => Ok(chrono::Local::now().naive_local().date()),
            Some(ref date) => Ok(chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("invalid start date {date:?}, expected YYYY-MM-DD"))?),
        }
    }

    pub fn budget(&self) -> anyhow::Result<Budget> {
        let mut budget = Budget::unlimited();
        if let Some(seconds) = self.time_limit {
            let limit = Duration::try_from_secs_f64(seconds)
                .with_context(|| format!("invalid time limit {seconds}"))?;
            budget = budget.with_time_limit(limit);
        }
        if let Some(nodes) = self.node_limit {
            budget = budget.with_node_limit(nodes);
        }
        Ok(budget)
    }

    pub fn search_options(&self) -> anyhow::Result<SearchOptions> {
        let branching = if self.topological {
            BranchingOrder::Topological
        } else {
            BranchingOrder::ById
        };
        Ok(SearchOptions::default()
            .with_budget(self.budget()?)
            .parallel(self.parallel)
            .branching(branching))
    }
}

fn load_config(path: &Path) -> anyhow::Result<ProjectConfig> {
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") | Some("yaml") | Some("yml") => ProjectConfig::from_path(path)?,
        _ => psplib::from_path(path)?,
    };
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::try_parse()?;
    let start_date = args.parse_start_date()?;
    let mut config = load_config(&args.project_file)
        .with_context(|| format!("failed to load {}", args.project_file.display()))?;
    for resource in args.add_resource.iter() {
        config.add_resource(&resource.name, resource.capacity);
    }
    if args.ignore_due_date {
        config.due_date = None;
    }
    let project = Project::try_from(config)?;
    info!(
        activities = project.activities().len(),
        resources = project.resources().len(),
        horizon = project.horizon(),
        critical_path = project.critical_path(),
        "loaded project"
    );

    let options = args.search_options()?;
    let outcome = if args.optimize {
        BranchAndBound::new(options).solve(&project)?
    } else {
        Backtracking::new(options).solve(&project)?
    };

    let (status, color) = match &outcome.result {
        SolveResult::Optimal(_) => ("Optimal schedule found".to_string(), Color::Green),
        SolveResult::Feasible(_) => ("Feasible schedule found".to_string(), Color::Green),
        SolveResult::Inconclusive { reason, .. } => {
            (format!("Search stopped early: {reason}"), Color::Yellow)
        }
        SolveResult::Infeasible => ("No feasible schedule exists".to_string(), Color::Red),
    };
    println!("{}", status.color(color).bold());

    if let Some(schedule) = outcome.schedule().filter(|s| !s.is_empty()) {
        let schedule = schedule.normalize(&project)?;
        schedule.print(&project)?;
        if let Some(output_csv) = &args.output_csv {
            let csv_file = File::create(output_csv)
                .with_context(|| format!("failed to create {}", output_csv.display()))?;
            let mut writer = BufWriter::new(csv_file);
            schedule.csv_table(&project, start_date).to_csv(&mut writer)?;
        }
        if let Some(output_yaml) = &args.output_yaml {
            std::fs::write(output_yaml, serde_yml::to_string(&schedule)?)
                .with_context(|| format!("failed to write {}", output_yaml.display()))?;
        }
        let makespan = schedule.makespan(&project).unwrap_or(0);
        println!("Project start date: {}", &start_date);
        println!("Solution completion time: {} days", makespan);
        println!(
            "Solution completion date: {}",
            start_date + chrono::Duration::days(makespan as i64)
        );
    }
    print!("{}", outcome.statistics);

    Ok(())
}
