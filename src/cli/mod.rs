//! The command-line front end shared by suite binaries.
//!
//! A suite binary builds its [`Registry`] and hands it to [`run_suite`], which
//! parses the arguments, sets up logging and configuration, dispatches, and
//! returns the process exit code.

use std::path::Path;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cli::args::HarnessArgs;
use crate::cli::output::ConsoleReporter;
use crate::config::HarnessConfig;
use crate::context::TestContext;
use crate::dispatch::{Dispatcher, Selection};
use crate::errors::{HarnessError, Result};
use crate::generic;
use crate::interrupt;
use crate::registry::Registry;

pub mod args;
pub mod output;

/// Initializes the global tracing subscriber. Later calls are no-ops.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Layers defaults, the optional config file, the environment and the flags.
pub fn load_config(args: &HarnessArgs) -> Result<HarnessConfig> {
    let config = match &args.config {
        Some(path) => HarnessConfig::from_yaml_file(path)?,
        None => HarnessConfig::default(),
    };
    let mut config = config.apply_env();
    config.debug |= args.debug;
    Ok(config)
}

pub fn selection(args: &HarnessArgs) -> Selection {
    Selection {
        targets: (!args.target.is_empty()).then(|| args.target.clone()),
        names: args.names.clone(),
    }
}

/// Parses the process arguments and runs the suite built by `build`.
pub fn run_suite<F>(build: F) -> i32
where
    F: FnOnce(&HarnessArgs) -> Result<Registry>,
{
    let args = HarnessArgs::parse();
    init_logging(args.debug);
    interrupt::install_handler();

    match try_run_suite(&args, build) {
        Ok(code) => code,
        Err(HarnessError::Interrupted) => 1,
        Err(HarnessError::UnknownTest { name }) => {
            println!("Unknown test {}", name);
            1
        }
        Err(e) => {
            eprintln!("Error: {:?}", miette::Report::new(e));
            1
        }
    }
}

fn try_run_suite<F>(args: &HarnessArgs, build: F) -> Result<i32>
where
    F: FnOnce(&HarnessArgs) -> Result<Registry>,
{
    let config = load_config(args)?;
    let registry = build(args)?;
    for name in registry.duplicates() {
        warn!("test {} is registered more than once; the first registration is used", name);
    }

    let context = TestContext::new(config);
    let mut reporter = ConsoleReporter::new(context.config.use_colors);
    let summary = Dispatcher::new(&registry, &context).run(&selection(args), &mut reporter)?;
    Ok(summary.exit_code())
}

/// Registers every C/C++ source in `dir` as a generic test and every assembly
/// source as a PASS/FAIL test. Names are file names relative to `dir`.
pub fn discover_generic_tests(dir: &Path) -> Result<Registry> {
    let file_names = |extensions: &[&str]| -> Result<Vec<String>> {
        Ok(generic::find_files(dir, extensions)?
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect())
    };

    let mut registry = Registry::new();
    generic::register_generic_tests(&mut registry, &file_names(&[".c", ".cpp"])?, &[]);
    generic::register_generic_assembly_tests(&mut registry, &file_names(&[".S"])?, &[]);
    Ok(registry)
}
