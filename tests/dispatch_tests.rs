use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use simtest::cli::output::BufferReporter;
use simtest::context::TestContext;
use simtest::dispatch::{Dispatcher, Selection};
use simtest::registry::Registry;
use simtest::target::Target;
use simtest::{ErrorKind, HarnessError};

const A: Target = Target::Emulator;
const B: Target = Target::Simulator;

fn passing(_: &TestContext, _: &str, _: Target) -> simtest::Result<()> {
    Ok(())
}

fn failing(_: &TestContext, name: &str, _: Target) -> simtest::Result<()> {
    Err(HarnessError::failed(format!("{} went wrong", name)))
}

#[test]
fn target_restriction_counts_only_matching_invocations() {
    let mut registry = Registry::new();
    registry.register("t1", &[A, B], passing);
    registry.register("t2", &[A], passing);
    registry.register("t3", &[B], passing);
    let ctx = TestContext::default();

    let mut out = BufferReporter::new();
    let summary = Dispatcher::new(&registry, &ctx)
        .run(&Selection::all().targets([A]), &mut out)
        .unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.exit_code(), 0);
    assert!(out.as_str().contains("t1 (emulator)"));
    assert!(out.as_str().contains("t2 (emulator)"));
    assert!(!out.as_str().contains("t3"));
    assert!(out.as_str().ends_with("0/2 tests failed\n"));
}

#[test]
fn duplicate_name_runs_first_registration() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::new();
    {
        let first = first.clone();
        registry.register("X", &[A], move |_: &TestContext, _: &str, _: Target| {
            first.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    {
        let second = second.clone();
        registry.register("X", &[A], move |_: &TestContext, _: &str, _: Target| {
            second.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    assert_eq!(registry.duplicates(), vec!["X"]);

    let ctx = TestContext::default();
    let mut out = BufferReporter::new();
    Dispatcher::new(&registry, &ctx)
        .run(&Selection::all().targets([A]).names(["X"]), &mut out)
        .unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_name_aborts_before_running_anything() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::new();
    {
        let runs = runs.clone();
        registry.register("known", &[A], move |_: &TestContext, _: &str, _: Target| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    let ctx = TestContext::default();
    let mut out = BufferReporter::new();

    let err = Dispatcher::new(&registry, &ctx)
        .run(&Selection::all().names(["known", "foo"]), &mut out)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownTest);
    assert!(err.to_string().contains("foo"));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(out.as_str().is_empty());
}

#[test]
fn failures_are_listed_with_diagnostics_and_run_continues() {
    let mut registry = Registry::new();
    registry.register("good", &[A, B], passing);
    registry.register("bad", &[A, B], failing);
    let ctx = TestContext::default();

    let mut out = BufferReporter::new();
    let summary = Dispatcher::new(&registry, &ctx)
        .run(&Selection::all().targets([A, B]), &mut out)
        .unwrap();

    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.failed(), 2);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(summary.failures[0].0, "bad");
    assert_eq!(summary.failures[0].1, "bad went wrong");
    let text = out.as_str();
    assert!(text.contains("Failing tests:\nbad\nbad went wrong\n"));
    assert!(text.ends_with("2/4 tests failed\n"));
}

#[test]
fn panicking_body_is_recorded_as_failure() {
    let mut registry = Registry::new();
    registry.register(
        "explodes",
        &[A],
        |_: &TestContext, _: &str, _: Target| -> simtest::Result<()> {
            panic!("index out of range")
        },
    );
    registry.register("after", &[A], passing);
    let ctx = TestContext::default();

    let mut out = BufferReporter::new();
    let summary = Dispatcher::new(&registry, &ctx)
        .run(&Selection::all().targets([A]), &mut out)
        .unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.failed(), 1);
    let diagnostic = &summary.failures[0].1;
    assert!(diagnostic.starts_with("Test threw exception:"));
    assert!(diagnostic.contains("index out of range"));
}

#[test]
fn body_receives_its_name_and_target() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut registry = Registry::new();
    {
        let seen = seen.clone();
        registry.register_all_targets(
            "recorder",
            move |_: &TestContext, name: &str, target: Target| {
                seen.lock().unwrap().push(format!("{} {}", name, target));
                Ok(())
            },
        );
    }
    let ctx = TestContext::default();
    let mut out = BufferReporter::new();
    Dispatcher::new(&registry, &ctx)
        .run(&Selection::all(), &mut out)
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec!["recorder verilator", "recorder emulator"]);
}
