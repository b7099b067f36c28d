use std::process::Command;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_search-process"))
}

fn run(args: &[&str]) -> (bool, String, String) {
    let output = binary()
        .args(args)
        .output()
        .expect("Failed to execute search-process");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

#[test]
fn test_run_prints_best_solutions() {
    let (success, stdout, stderr) = run(&[
        "run",
        "--workers",
        "2",
        "--sync-period-ms",
        "5",
        "--solutions",
        "5",
        "--branching",
        "3",
        "--depth",
        "3",
        "--seed",
        "7",
    ]);

    assert!(success, "stderr: {}\nstdout: {}", stderr, stdout);
    assert!(stdout.contains("Running random-walk search with 2 workers"));
    assert!(stdout.contains("Termination: solution target reached"));
    assert!(stdout.contains("Solutions: 5"));
    assert!(stdout.contains("Best solutions:"));
    assert!(stdout.contains("path 0 -> "));
}

#[test]
fn test_stress_supersedes_jobs() {
    let (success, stdout, stderr) = run(&[
        "stress",
        "--jobs",
        "25",
        "--workers",
        "3",
        "--sync-period-ms",
        "5",
        "--solutions",
        "5",
        "--branching",
        "3",
        "--depth",
        "3",
    ]);

    assert!(success, "stderr: {}\nstdout: {}", stderr, stdout);
    assert!(stdout.contains("Submitting 25 jobs to 3 workers"));
    assert!(stdout.contains("Final solutions sorted: yes"));
}

#[test]
fn test_requires_subcommand() {
    let (success, _, stderr) = run(&[]);
    assert!(!success);
    assert!(stderr.contains("Usage"));
}
