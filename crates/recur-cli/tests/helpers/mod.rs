use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test harness for running CLI commands with temporary databases
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    /// Create a new test harness with a temporary database
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");

        Self { temp_dir, db_path }
    }

    /// Get a Command instance configured for testing
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("recur").expect("Failed to find recur binary");

        // No recur.toml in the temp dir; everything comes from the environment
        cmd.current_dir(self.temp_dir.path());
        cmd.env("RECUR_DATABASE_PATH", &self.db_path);
        cmd.env("RECUR_CLINIC_TIMEZONE", "UTC");
        cmd.env_remove("RECUR_LOG");

        cmd
    }

    /// Helper to run a command and assert success
    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    /// Helper to run a command and assert failure
    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Runs a command and returns its stdout without color codes
    pub fn stdout(&self, args: &[&str]) -> String {
        let output = self.run_success(args).get_output().stdout.clone();
        strip_ansi(&String::from_utf8_lossy(&output))
    }

    /// Creates a series and returns its full ID
    pub fn create_series(&self, extra: &[&str]) -> String {
        let mut args = TestFixtures::weekly_series_args();
        args.extend_from_slice(extra);
        let stdout = self.stdout(&args);

        stdout
            .lines()
            .find(|line| line.contains("Series ID:"))
            .and_then(|line| line.split_whitespace().last())
            .map(str::to_string)
            .expect("create output should contain the series ID")
    }

    /// Gives prov-1 weekday hours of 09:00-17:00
    pub fn set_weekday_hours(&self) {
        self.run_success(&[
            "hours", "set", "prov-1", "--days", "mon,tue,wed,thu,fri", "--start", "09:00", "--end", "17:00",
        ]);
    }
}

/// Removes ANSI escape sequences from colored output.
pub fn strip_ansi(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            output.push(c);
        }
    }
    output
}

/// Common test fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Weekly Monday 10:00 series starting 2030-06-03
    pub fn weekly_series_args() -> Vec<&'static str> {
        vec![
            "create",
            "--patient", "pat-1",
            "--provider", "prov-1",
            "--service", "svc-facial",
            "--service-name", "HydraFacial",
            "--duration", "60",
            "--every", "weekly",
            "--start", "2030-06-03",
            "--at", "10:00",
        ]
    }
}

/// Utility functions for test assertions
pub mod assertions {
    use predicates::prelude::*;

    /// Predicate to check if output contains series table headers
    pub fn has_series_table_headers() -> impl Predicate<str> {
        predicate::str::contains("ID")
            .and(predicate::str::contains("Patient"))
            .and(predicate::str::contains("Status"))
    }

    /// Predicate to check if output indicates successful series creation
    pub fn series_created_successfully() -> impl Predicate<str> {
        predicate::str::contains("Created series")
    }

    /// Predicate to check for error messages
    pub fn has_error() -> impl Predicate<str> {
        predicate::str::contains("Error").or(predicate::str::contains("error"))
    }
}
