use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use search_process::process::{JobRequest, ProcessConfig, ProcessManager, Termination, WorkItem};
use search_process::walk::{WalkModel, WalkParameters};

#[derive(Debug, Clone)]
struct Chain {
    cost: u64,
    depth: u32,
    solution: bool,
}

impl WorkItem for Chain {
    fn cost(&self) -> u64 {
        self.cost
    }

    fn is_solution(&self) -> bool {
        self.solution
    }
}

fn seed() -> Chain {
    Chain {
        cost: 0,
        depth: 0,
        solution: false,
    }
}

/// How the shared test expansion behaves for a job.
#[derive(Debug, Clone, Copy)]
enum Mode {
    /// One non-solution child forever.
    Endless,
    /// Three solution children straight away.
    Instant,
    /// One non-solution child, plus a solution child once past depth 5.
    Deepening,
    /// No children at all.
    Barren,
}

fn expand(item: &Chain, mode: Option<&Mode>) -> Vec<Chain> {
    let next = |solution: bool| Chain {
        cost: item.cost + 1,
        depth: item.depth + 1,
        solution,
    };
    match mode.copied().unwrap_or(Mode::Barren) {
        Mode::Endless => vec![next(false)],
        Mode::Instant => vec![next(true), next(true), next(true)],
        Mode::Deepening => {
            let mut children = vec![next(false)];
            if item.depth >= 5 {
                children.push(next(true));
            }
            children
        }
        Mode::Barren => Vec::new(),
    }
}

fn config(workers: usize) -> ProcessConfig {
    ProcessConfig::default()
        .with_workers(workers)
        .with_sync_period(Duration::from_millis(5))
}

fn chain_manager(workers: usize) -> ProcessManager<Chain, Mode, u64> {
    ProcessManager::new(config(workers), expand, |item: Chain| item.cost)
        .expect("Failed to start process manager")
}

#[test]
fn test_terminates_by_solution_count() {
    let manager = chain_manager(4);
    let max_duration = Duration::from_secs(10);

    let started = Instant::now();
    let handle = manager.process(
        JobRequest::new(vec![seed()])
            .with_minimal_solutions(3)
            .with_parameter(Mode::Deepening)
            .with_max_duration(max_duration),
    );
    let outcome = handle.wait().expect("job should complete");

    assert!(started.elapsed() < max_duration);
    assert_eq!(outcome.termination, Termination::SolutionTarget);
    assert_eq!(outcome.solutions.len(), 3);
    // Cheapest solutions are the first ones found along the chain.
    assert_eq!(outcome.solutions, vec![6, 7, 8]);
}

#[test]
fn test_terminates_by_exhaustion() {
    let manager = chain_manager(6);

    let started = Instant::now();
    let handle = manager.process(
        JobRequest::new(vec![seed(), seed()])
            .with_parameter(Mode::Barren)
            .with_max_duration(Duration::from_secs(10)),
    );
    let outcome = handle.wait().expect("job should complete");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.termination, Termination::Exhausted);
    assert!(outcome.solutions.is_empty());
    assert_eq!(outcome.expansions, 2);
}

#[test]
fn test_terminates_by_timeout() {
    let manager = chain_manager(2);

    let started = Instant::now();
    let outcome = manager
        .process(
            JobRequest::new(vec![seed()])
                .with_parameter(Mode::Endless)
                .with_max_duration(Duration::from_millis(100)),
        )
        .into_outcome()
        .expect("job should complete");

    assert_eq!(outcome.termination, Termination::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(outcome.solutions.is_empty());
    assert!(outcome.expansions > 0);
}

#[test]
fn test_superseded_job_never_resolves() {
    let manager = chain_manager(4);

    let first = manager.process(
        JobRequest::new(vec![seed(), seed()])
            .with_parameter(Mode::Endless)
            .with_max_duration(Duration::from_secs(60)),
    );
    let second = manager.process(
        JobRequest::new(vec![seed()])
            .with_minimal_solutions(3)
            .with_parameter(Mode::Instant),
    );

    let outcome = second
        .wait_timeout(Duration::from_secs(5))
        .expect("second job should resolve");
    assert_eq!(outcome.solutions, vec![1, 1, 1]);
    assert_eq!(outcome.termination, Termination::SolutionTarget);

    let err = first
        .wait_timeout(Duration::from_millis(200))
        .expect_err("first job must not resolve");
    assert!(err.is_abandoned());
    assert!(second.job_id() > first.job_id());
}

#[test]
fn test_repeated_reads_return_same_result() {
    let manager = chain_manager(2);
    let handle = manager.process(
        JobRequest::new(vec![seed()])
            .with_minimal_solutions(3)
            .with_parameter(Mode::Instant),
    );

    let first = handle.wait().unwrap().solutions.clone();
    let second = handle.wait().unwrap().solutions.clone();
    let third = handle
        .wait_timeout(Duration::from_millis(1))
        .unwrap()
        .solutions
        .clone();
    assert_eq!(first, second);
    assert_eq!(second, third);
    assert!(handle.is_ready());
}

#[test]
fn test_each_solution_is_mapped_once() {
    let mapped = Arc::new(AtomicUsize::new(0));
    let flagged = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&mapped);
    let solutions_seen = Arc::clone(&flagged);

    // Full ternary tree of depth 3: 27 leaves per root, all solutions.
    let manager = ProcessManager::<Chain, (), u64>::new(
        config(3),
        move |item: &Chain, _: Option<&()>| {
            if item.depth >= 3 {
                return Vec::new();
            }
            let children: Vec<Chain> = (0..3)
                .map(|i| Chain {
                    cost: item.cost * 3 + i,
                    depth: item.depth + 1,
                    solution: item.depth + 1 == 3,
                })
                .collect();
            let solutions = children.iter().filter(|c| c.solution).count();
            solutions_seen.fetch_add(solutions, Ordering::SeqCst);
            children
        },
        move |item: Chain| {
            counter.fetch_add(1, Ordering::SeqCst);
            item.cost
        },
    )
    .unwrap();

    let outcome = manager
        .process(JobRequest::new(vec![seed(), seed()]).with_minimal_solutions(1_000))
        .into_outcome()
        .unwrap();

    assert_eq!(outcome.termination, Termination::Exhausted);
    assert_eq!(flagged.load(Ordering::SeqCst), 2 * 27);
    assert_eq!(outcome.solutions.len(), 2 * 27);
    assert_eq!(mapped.load(Ordering::SeqCst), outcome.solutions.len());
    assert!(outcome.solutions.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_rapid_restarts_only_last_job_counts() {
    let manager = chain_manager(6);
    let mut handles = Vec::new();
    for _ in 0..200 {
        handles.push(manager.process(
            JobRequest::new(vec![seed(), seed(), seed()])
                .with_minimal_solutions(3)
                .with_parameter(Mode::Deepening),
        ));
    }

    let last = handles.pop().unwrap();
    let outcome = last.wait().expect("last job should complete");
    assert_eq!(outcome.solutions.len(), 3);
    assert!(outcome.solutions.windows(2).all(|w| w[0] <= w[1]));

    for handle in handles {
        match handle.try_get() {
            Ok(Some(earlier)) => assert_eq!(earlier.solutions.len(), 3),
            Ok(None) => panic!("superseded job {} still pending", handle.job_id()),
            Err(err) => assert!(err.is_abandoned()),
        }
    }
}

#[test]
fn test_walk_search_end_to_end() {
    let model = Arc::new(WalkModel::new());
    let manager = model.manager(config(4)).unwrap();
    let parameters = WalkParameters::default()
        .with_branching(4)
        .with_solution_depth(3)
        .with_seed(11);

    let outcome = manager
        .process(
            JobRequest::new(model.roots(2).unwrap())
                .with_minimal_solutions(10)
                .with_parameter(parameters),
        )
        .into_outcome()
        .unwrap();

    assert_eq!(outcome.termination, Termination::SolutionTarget);
    assert_eq!(outcome.solutions.len(), 10);
    assert!(outcome.solutions.windows(2).all(|w| w[0].cost <= w[1].cost));
    for solution in &outcome.solutions {
        let path = solution.path.as_ref().unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), Some(&0));
        assert_eq!(path.last(), Some(&solution.cost));
    }
}
