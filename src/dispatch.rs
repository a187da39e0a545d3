//! # Dispatcher
//!
//! Runs the selected tests against the selected targets, one (test, target)
//! pair at a time, and aggregates the results.
//!
//! A test body signals failure by returning an error; any error other than an
//! interrupt is recorded and the suite continues. A panicking body is recorded
//! as a failure too, with the panic message, location and backtrace. An
//! unknown test name or an operator interrupt aborts the run.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use tracing::debug;

use crate::cli::output::ReportSink;
use crate::context::TestContext;
use crate::errors::{HarnessError, Result};
use crate::interrupt;
use crate::registry::{Registry, TestCase};
use crate::target::Target;

/// Which part of the registry to run.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Restrict to these targets. `None` uses the configured defaults.
    pub targets: Option<Vec<Target>>,
    /// Run only these tests. Empty runs everything.
    pub names: Vec<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn targets(mut self, targets: impl IntoIterator<Item = Target>) -> Self {
        self.targets = Some(targets.into_iter().collect());
        self
    }

    pub fn names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Outcome of one (test, target) invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Pass,
    Fail(String),
}

/// Aggregated results of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Number of (test, target) invocations attempted.
    pub attempted: usize,
    /// Failing test names with their diagnostics, in run order.
    pub failures: Vec<(String, String)>,
}

impl Summary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn passed(&self) -> usize {
        self.attempted - self.failed()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }
}

pub struct Dispatcher<'a> {
    registry: &'a Registry,
    context: &'a TestContext,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a Registry, context: &'a TestContext) -> Self {
        Self { registry, context }
    }

    /// Resolves requested names to registry entries, or all entries when
    /// `names` is empty. The first entry registered under a name wins.
    pub fn resolve_tests(&self, names: &[String]) -> Result<Vec<&'a TestCase>> {
        if names.is_empty() {
            return Ok(self.registry.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.registry
                    .find(name)
                    .ok_or_else(|| HarnessError::UnknownTest { name: name.clone() })
            })
            .collect()
    }

    /// Runs the selection, reporting progress to `sink`.
    ///
    /// Returns `Err` only for an unknown test name or an interrupt; test
    /// failures are in the returned [`Summary`].
    pub fn run(&self, selection: &Selection, sink: &mut dyn ReportSink) -> Result<Summary> {
        let targets = selection
            .targets
            .clone()
            .unwrap_or_else(|| self.context.config.default_targets.clone());
        let tests = self.resolve_tests(&selection.names)?;

        let mut summary = Summary::default();
        for case in tests {
            for &target in &case.targets {
                if !targets.contains(&target) {
                    continue;
                }
                if interrupt::is_interrupted() {
                    return Err(HarnessError::Interrupted);
                }

                sink.begin(&format!("{} ({})", case.name, target));
                summary.attempted += 1;
                match self.invoke(case, target)? {
                    ExecutionResult::Pass => sink.pass(),
                    ExecutionResult::Fail(diagnostic) => {
                        sink.fail();
                        summary.failures.push((case.name.clone(), diagnostic));
                    }
                }
            }
        }

        sink.failures(&summary.failures);
        sink.summary(summary.failed(), summary.attempted);
        Ok(summary)
    }

    /// Runs one test body and classifies its outcome.
    pub fn invoke(&self, case: &TestCase, target: Target) -> Result<ExecutionResult> {
        debug!(test = %case.name, %target, "invoking test");
        let outcome = capture_panics(|| (case.body)(self.context, &case.name, target));

        if interrupt::is_interrupted() {
            return Err(HarnessError::Interrupted);
        }
        match outcome {
            Ok(Ok(())) => Ok(ExecutionResult::Pass),
            Ok(Err(HarnessError::Interrupted)) => Err(HarnessError::Interrupted),
            Ok(Err(e)) => Ok(ExecutionResult::Fail(e.to_string())),
            Err(report) => Ok(ExecutionResult::Fail(format!(
                "Test threw exception:\n{}",
                report
            ))),
        }
    }
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static PANIC_REPORT: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs a panic hook that records the report for threads currently inside
/// [`capture_panics`] and defers to the previous hook everywhere else.
fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let report = format!(
                    "{}\n\nstack backtrace:\n{}",
                    info,
                    Backtrace::force_capture()
                );
                PANIC_REPORT.with(|slot| *slot.borrow_mut() = Some(report));
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `f`, turning a panic into `Err` with the captured report.
fn capture_panics<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    install_panic_hook();
    CAPTURING.with(|c| c.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|c| c.set(false));

    result.map_err(|payload| {
        PANIC_REPORT
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| {
                payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string())
            })
    })
}
