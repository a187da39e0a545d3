//! # Test Registry
//!
//! An append-only list of named test bodies and the targets each one is valid
//! for. The registry is built once, before dispatch, and handed to the
//! [`Dispatcher`](crate::dispatch::Dispatcher) by reference.
//!
//! Registering the same name twice is tolerated: both entries are kept and
//! dispatched when running the whole suite, but a lookup by name always
//! resolves to the first one. [`Registry::duplicates`] lists such names so the
//! caller can warn about them.
//!
//! # Example
//! ```
//! use simtest::registry::Registry;
//! use simtest::target::Target;
//!
//! let mut registry = Registry::new();
//! registry.register("boot", &[Target::Emulator], |_ctx, _name, _target| Ok(()));
//! registry.register_many(&["a.c", "b.c"], &Target::ALL, |_ctx, _name, _target| Ok(()));
//! assert_eq!(registry.len(), 3);
//! assert!(registry.find("a.c").is_some());
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use crate::context::TestContext;
use crate::errors::Result;
use crate::target::Target;

/// A test body: receives the run context, the registered name and the target.
pub type TestFn = Arc<dyn Fn(&TestContext, &str, Target) -> Result<()> + Send + Sync>;

/// One registered test.
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub targets: Vec<Target>,
    pub body: TestFn,
}

impl TestCase {
    pub fn runs_on(&self, target: Target) -> bool {
        self.targets.contains(&target)
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Clone)]
pub struct Registry {
    entries: Vec<TestCase>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single test.
    pub fn register<F>(&mut self, name: impl Into<String>, targets: &[Target], body: F)
    where
        F: Fn(&TestContext, &str, Target) -> Result<()> + Send + Sync + 'static,
    {
        self.push(name.into(), targets, Arc::new(body));
    }

    /// Registers a test valid on every target in [`Target::ALL`].
    pub fn register_all_targets<F>(&mut self, name: impl Into<String>, body: F)
    where
        F: Fn(&TestContext, &str, Target) -> Result<()> + Send + Sync + 'static,
    {
        self.register(name, &Target::ALL, body);
    }

    /// Registers many names sharing one body and target set.
    pub fn register_many<S, F>(&mut self, names: &[S], targets: &[Target], body: F)
    where
        S: AsRef<str>,
        F: Fn(&TestContext, &str, Target) -> Result<()> + Send + Sync + 'static,
    {
        let body: TestFn = Arc::new(body);
        for name in names {
            self.push(name.as_ref().to_string(), targets, Arc::clone(&body));
        }
    }

    fn push(&mut self, name: String, targets: &[Target], body: TestFn) {
        let mut unique = Vec::with_capacity(targets.len());
        for target in targets {
            if !unique.contains(target) {
                unique.push(*target);
            }
        }
        self.entries.push(TestCase {
            name,
            targets: unique,
            body,
        });
    }

    /// First registered test with this name.
    pub fn find(&self, name: &str) -> Option<&TestCase> {
        self.entries.iter().find(|case| case.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names registered more than once, in first-seen order.
    pub fn duplicates(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut dups = Vec::new();
        for case in &self.entries {
            let name = case.name.as_str();
            if !seen.insert(name) && reported.insert(name) {
                dups.push(name);
            }
        }
        dups
    }
}
