// JTAG control channel scenario: loads test_program.S into the hardware model
// and exchanges scans over its debug socket.
// Usage: jtag_debug [--debug] [--dir <dir>]

use std::process;

use simtest::cli;
use simtest::errors::IoResultExt;
use simtest::jtag;
use simtest::registry::Registry;
use simtest::target::Target;

fn main() {
    let code = cli::run_suite(|args| {
        std::env::set_current_dir(&args.dir)
            .io_context(|| format!("Failed to enter {}", args.dir.display()))?;
        let mut registry = Registry::new();
        registry.register("jtag", &[Target::Simulator], jtag::jtag_test);
        Ok(registry)
    });
    process::exit(code);
}
