use clap::{Args as ClapArgs, Parser, Subcommand};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use search_process::process::{JobRequest, ProcessConfig};
use search_process::walk::{WalkModel, WalkParameters, WalkSolution};

// --- Command Line Arguments ---

#[derive(Parser)]
#[command(name = "search-process")]
#[command(about = "search-process - parallel best-first expansion scheduler")]
#[command(version)]
#[command(subcommand_required = true)]
#[command(arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command.
#[derive(ClapArgs, Debug, Clone)]
struct SearchOptions {
    // --- Scheduler options ---
    /// Number of worker threads (defaults to the number of CPUs)
    #[arg(long, short = 'j')]
    workers: Option<usize>,
    /// Interval between a worker's exchanges with the manager, in milliseconds
    #[arg(long, default_value = "100")]
    sync_period_ms: u64,
    /// Stop once this many solutions were collected
    #[arg(long, default_value = "100")]
    solutions: usize,
    /// Maximum job duration in milliseconds
    #[arg(long, default_value = "10000")]
    max_duration_ms: u64,

    // --- Random-walk options ---
    /// Children produced per expansion
    #[arg(long, default_value = "10")]
    branching: u32,
    /// Depth at which walks become solutions
    #[arg(long, default_value = "5")]
    depth: u32,
    /// Seed for the walk's random steps
    #[arg(long, default_value = "0")]
    seed: u64,
    /// Artificial delay per expansion, in milliseconds
    #[arg(long, default_value = "0")]
    step_delay_ms: u64,
    /// Number of root nodes
    #[arg(long, default_value = "3")]
    roots: usize,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one random-walk search job and print its best solutions
    Run {
        #[command(flatten)]
        options: SearchOptions,
        /// Number of solutions to print
        #[arg(long, default_value = "5")]
        show: usize,
    },
    /// Submit jobs back to back, each superseding the previous one
    Stress {
        #[command(flatten)]
        options: SearchOptions,
        /// Number of jobs to submit
        #[arg(long, default_value = "100")]
        jobs: usize,
    },
}

impl SearchOptions {
    fn process_config(&self) -> ProcessConfig {
        let config = ProcessConfig::default().with_sync_period(Duration::from_millis(self.sync_period_ms));
        match self.workers {
            Some(workers) => config.with_workers(workers),
            None => config,
        }
    }

    fn walk_parameters(&self, seed: u64) -> WalkParameters {
        WalkParameters::default()
            .with_branching(self.branching)
            .with_solution_depth(self.depth)
            .with_seed(seed)
            .with_step_delay(Duration::from_millis(self.step_delay_ms))
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// --- Commands ---

fn run_command(options: &SearchOptions, show: usize) -> Result<(), Box<dyn std::error::Error>> {
    let model = Arc::new(WalkModel::new());
    let manager = model.manager(options.process_config())?;
    println!(
        "Running random-walk search with {} workers (sync period {:?})",
        manager.num_workers(),
        manager.config().effective_sync_period()
    );

    let request = JobRequest::new(model.roots(options.roots)?)
        .with_minimal_solutions(options.solutions)
        .with_parameter(options.walk_parameters(options.seed))
        .with_max_duration(Duration::from_millis(options.max_duration_ms));
    let outcome = manager.process(request).into_outcome()?;

    print!("{}", outcome.format_summary());
    println!("Nodes created: {}", model.node_count());
    if outcome.solutions.is_empty() {
        println!("No solutions found.");
        return Ok(());
    }

    println!("Best solutions:");
    for (rank, solution) in outcome.solutions.iter().take(show).enumerate() {
        println!("  {:>3}. {}", rank + 1, format_solution(solution));
    }
    Ok(())
}

fn stress_command(options: &SearchOptions, jobs: usize) -> Result<(), Box<dyn std::error::Error>> {
    if jobs == 0 {
        return Err("--jobs must be at least 1".into());
    }
    let model = Arc::new(WalkModel::new());
    let manager = model.manager(options.process_config())?;
    println!(
        "Submitting {} jobs to {} workers",
        jobs,
        manager.num_workers()
    );

    let started = Instant::now();
    let mut superseded = Vec::with_capacity(jobs - 1);
    let mut last = None;
    for job in 0..jobs {
        let request = JobRequest::new(model.roots(options.roots)?)
            .with_minimal_solutions(options.solutions)
            .with_parameter(options.walk_parameters(options.seed.wrapping_add(job as u64)))
            .with_max_duration(Duration::from_millis(options.max_duration_ms));
        if let Some(previous) = last.replace(manager.process(request)) {
            superseded.push(previous);
        }
    }

    let Some(last) = last else {
        return Err("no job was submitted".into());
    };
    let outcome = last.into_outcome()?;

    // Earlier jobs either completed before being superseded or were abandoned.
    let mut abandoned = 0;
    let mut completed = 0;
    for handle in &superseded {
        match handle.try_get() {
            Ok(Some(_)) => completed += 1,
            Ok(None) => {}
            Err(err) if err.is_abandoned() => abandoned += 1,
            Err(err) => return Err(err.into()),
        }
    }
    let sorted = outcome.solutions.windows(2).all(|w| w[0].cost <= w[1].cost);

    println!("Total time: {:.2?}", started.elapsed());
    println!("Superseded jobs abandoned: {}", abandoned);
    println!("Superseded jobs completed early: {}", completed);
    print!("{}", outcome.format_summary());
    println!("Final solutions sorted: {}", if sorted { "yes" } else { "no" });
    if !sorted {
        return Err("final solution list is not cost-ordered".into());
    }
    Ok(())
}

fn format_solution(solution: &WalkSolution) -> String {
    match &solution.path {
        Some(path) => {
            let path: Vec<String> = path.iter().map(|v| v.to_string()).collect();
            format!("cost {:>4}  path {}", solution.cost, path.join(" -> "))
        }
        None => format!("cost {:>4}  path unavailable", solution.cost),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Run { options, show } => {
            init_tracing(options.verbose);
            run_command(&options, show)
        }
        Commands::Stress { options, jobs } => {
            init_tracing(options.verbose);
            stress_command(&options, jobs)
        }
    }
}
