//! Defines the command-line arguments shared by every suite binary.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::Parser;
use std::path::PathBuf;

use crate::target::Target;

/// Arguments of a test suite binary.
#[derive(Debug, Parser)]
#[command(
    name = "simtest",
    version,
    about = "Run functional tests on simulator, emulator and FPGA targets."
)]
pub struct HarnessArgs {
    /// Restrict to only executing tests on this target.
    #[arg(long = "target", value_enum)]
    pub target: Vec<Target>,

    /// Enable verbose output to debug test failures.
    #[arg(long)]
    pub debug: bool,

    /// YAML file overriding the default tool and library locations.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the test sources.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Names of specific tests to run.
    #[arg(trailing_var_arg = true)]
    pub names: Vec<String>,
}
