/// CLI integration tests for recur
///
/// These tests exercise the CLI commands as a black box against a temporary
/// database, covering the main command paths, error handling and output.
use predicates::prelude::*;

mod helpers;
use helpers::{assertions, CliTestHarness, TestFixtures};

const JUNE_WINDOW: [&str; 4] = ["--from", "2030-06-01", "--to", "2030-07-31"];

fn occurrences_args<'a>(id: &'a str, extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["occurrences", id];
    args.extend_from_slice(&JUNE_WINDOW);
    args.extend_from_slice(extra);
    args
}

/// Test basic CLI help and version commands
#[test]
fn test_cli_help_and_version() {
    let harness = CliTestHarness::new();

    harness
        .run_success(&["--help"])
        .stdout(predicate::str::contains("Recurring appointment series"));

    harness
        .run_success(&["--version"])
        .stdout(predicate::str::contains("recur"));

    harness
        .run_failure(&["invalid-command"])
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_create_list_and_show() {
    let harness = CliTestHarness::new();
    harness.set_weekday_hours();

    let mut args = TestFixtures::weekly_series_args();
    args.extend_from_slice(&["--count", "6", "--room", "room-1"]);
    harness
        .run_success(&args)
        .stdout(assertions::series_created_successfully())
        .stdout(predicate::str::contains("COUNT=6"));

    let list = harness.stdout(&["list"]);
    assert!(assertions::has_series_table_headers().eval(&list));
    assert!(list.contains("HydraFacial"));
    assert!(list.contains("after 6 occurrences"));

    let id = harness.create_series(&["--count", "3"]);
    let show = harness.stdout(&["show", &id[..8]]);
    assert!(show.contains("Series Information"));
    assert!(show.contains(&id));
    assert!(show.contains("FREQ=WEEKLY;INTERVAL=1;COUNT=3"));

    let filtered = harness.stdout(&["list", "--patient", "nobody"]);
    assert!(filtered.contains("No series found."));
}

#[test]
fn test_create_validation_errors() {
    let harness = CliTestHarness::new();

    let mut args = TestFixtures::weekly_series_args();
    args.extend_from_slice(&["--interval", "13"]);
    harness
        .run_failure(&args)
        .stderr(predicate::str::contains("Invalid input"));

    let mut args = TestFixtures::weekly_series_args();
    args.extend_from_slice(&["--duration", "500"]);
    harness.run_failure(&args).stderr(assertions::has_error());

    let mut args = TestFixtures::weekly_series_args();
    args.extend_from_slice(&["--on", "mon,funday"]);
    harness
        .run_failure(&args)
        .stderr(predicate::str::contains("Invalid day of week"));

    harness
        .run_failure(&["create", "--patient", "pat-1"])
        .stderr(predicate::str::contains("required"));

    assert!(harness.stdout(&["list"]).contains("No series found."));
}

#[test]
fn test_occurrence_exceptions() {
    let harness = CliTestHarness::new();
    let id = harness.create_series(&["--count", "6"]);

    let all = harness.stdout(&occurrences_args(&id, &[]));
    for date in ["2030-06-03", "2030-06-10", "2030-06-17", "2030-06-24", "2030-07-01", "2030-07-08"] {
        assert!(all.contains(date), "missing {} in\n{}", date, all);
    }

    harness
        .run_success(&["skip", &id, "--on", "2030-06-10", "--reason", "Travelling"])
        .stdout(predicate::str::contains("Skipped occurrence"));
    let visible = harness.stdout(&occurrences_args(&id, &[]));
    assert!(!visible.contains("2030-06-10"));
    let with_skipped = harness.stdout(&occurrences_args(&id, &["--include-skipped"]));
    assert!(with_skipped.contains("2030-06-10"));
    assert!(with_skipped.contains("skipped"));

    harness
        .run_failure(&["skip", &id, "--on", "2030-06-11"])
        .stderr(predicate::str::contains("has no occurrence on"));

    harness.run_success(&["reschedule", &id, "--on", "2030-06-17", "--to", "2030-06-19", "--at", "2:00 PM"]);
    let moved = harness.stdout(&occurrences_args(&id, &[]));
    assert!(moved.contains("(from 2030-06-17)"));
    assert!(moved.contains("14:00-15:00"));

    harness.run_success(&["modify", &id, "--on", "2030-06-24", "--duration", "90"]);
    let modified = harness.stdout(&occurrences_args(&id, &[]));
    assert!(modified.contains("10:00-11:30"));
    assert!(modified.contains("modified"));

    harness.run_failure(&["modify", &id, "--on", "2030-06-24"]).stderr(predicate::str::contains("Invalid input"));

    harness.run_success(&["unskip", &id, "--on", "2030-06-10"]);
    assert!(harness.stdout(&occurrences_args(&id, &[])).contains("2030-06-10"));
    harness
        .run_failure(&["unskip", &id, "--on", "2030-06-10"])
        .stderr(predicate::str::contains("Not found"));

    let show = harness.stdout(&["show", &id]);
    assert!(show.contains("Exceptions (2 exceptions)"));
}

#[test]
fn test_conflicts_with_bookings_and_hours() {
    let harness = CliTestHarness::new();
    harness.set_weekday_hours();
    harness.run_success(&[
        "booking", "add", "bk-1", "--provider", "prov-1", "--patient", "pat-9", "--start", "2030-06-10 10:30",
        "--duration", "30",
    ]);

    let mut args = TestFixtures::weekly_series_args();
    args.extend_from_slice(&["--count", "4"]);
    let created = harness.stdout(&args);
    assert!(created.contains("1 conflict(s) found"));
    assert!(created.contains("bk-1"));

    let id = created
        .lines()
        .find(|line| line.contains("Series ID:"))
        .and_then(|line| line.split_whitespace().last())
        .unwrap()
        .to_string();

    let conflicts = harness.stdout(&["conflicts", &id]);
    assert!(conflicts.contains("provider"));
    assert!(conflicts.contains("2030-06-10"));

    harness.run_success(&["booking", "cancel", "bk-1"]);
    assert!(harness.stdout(&["conflicts", &id]).contains("No conflicts found."));
    harness
        .run_failure(&["booking", "cancel", "bk-404"])
        .stderr(predicate::str::contains("Not found"));

    // Without Monday hours every occurrence falls outside working hours.
    harness.run_success(&["hours", "set", "prov-1", "--days", "mon", "--off"]);
    let outside = harness.stdout(&["conflicts", &id]);
    assert!(outside.contains("outside_hours"));

    let hours = harness.stdout(&["hours", "list", "prov-1"]);
    assert!(hours.contains("Tue"));
    assert!(!hours.contains("Mon"));
    assert!(hours.contains("09:00"));
}

#[test]
fn test_update_scopes() {
    let harness = CliTestHarness::new();
    let id = harness.create_series(&["--count", "10"]);

    harness
        .run_success(&["update", &id, "--service-name", "Chemical Peel"])
        .stdout(predicate::str::contains("Updated series"));
    assert!(harness.stdout(&occurrences_args(&id, &[])).contains("Chemical Peel"));

    harness
        .run_success(&["update", &id, "--scope", "future", "--from", "2030-06-20", "--at", "14:00"])
        .stdout(predicate::str::contains("Continued as series"))
        .stdout(predicate::str::contains("2030-06-24"));

    let before = harness.stdout(&occurrences_args(&id, &[]));
    assert!(before.contains("2030-06-17"));
    assert!(!before.contains("2030-06-24"));

    let list = harness.stdout(&["list"]);
    assert!(list.contains("on 2030-06-23"));
    assert!(list.contains("after 7 occurrences"));

    harness
        .run_failure(&["update", &id, "--scope", "future", "--at", "14:00"])
        .stderr(predicate::str::contains("--from"));
}

#[test]
fn test_lifecycle_commands() {
    let harness = CliTestHarness::new();
    let id = harness.create_series(&[]);

    harness
        .run_success(&["pause", &id])
        .stdout(predicate::str::contains("Paused series"));
    harness
        .run_failure(&["pause", &id])
        .stderr(predicate::str::contains("cannot pause a paused series"));
    harness
        .run_success(&["resume", &id])
        .stdout(predicate::str::contains("Resumed series"));

    let ended = harness.stdout(&["end", &id, "--on", "2030-08-31"]);
    assert!(ended.contains("ends on 2030-08-31 (active)"));

    harness
        .run_success(&["cancel", &id, "--force", "--reason", "Patient request"])
        .stdout(predicate::str::contains("Cancelled series"));
    assert!(harness
        .stdout(&occurrences_args(&id, &["--include-skipped"]))
        .contains("No occurrences in this window."));
    harness
        .run_failure(&["skip", &id, "--on", "2030-06-10"])
        .stderr(predicate::str::contains("cancelled"));
    harness
        .run_failure(&["resume", &id])
        .stderr(assertions::has_error());

    let list = harness.stdout(&["list", "--status", "cancelled"]);
    assert!(list.contains("cancelled"));
}

#[test]
fn test_id_resolution_errors() {
    let harness = CliTestHarness::new();
    harness.create_series(&[]);

    harness
        .run_failure(&["show", "z"])
        .stderr(predicate::str::contains("at least 2 characters"));
    harness
        .run_failure(&["show", "zz"])
        .stderr(predicate::str::contains("Not found"));
}
