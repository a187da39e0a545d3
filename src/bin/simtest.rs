// Generic suite runner: every C/C++ and assembly source in the test directory
// is a test.
// Usage: simtest [--target <name>] [--debug] [--dir <dir>] [test names...]

use std::path::Path;
use std::process;

use simtest::cli;
use simtest::errors::IoResultExt;

fn main() {
    let code = cli::run_suite(|args| {
        std::env::set_current_dir(&args.dir)
            .io_context(|| format!("Failed to enter {}", args.dir.display()))?;
        cli::discover_generic_tests(Path::new("."))
    });
    process::exit(code);
}
