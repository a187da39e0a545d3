//! Ready-made test bodies for the common cases, plus small helpers for suite
//! authors.
//!
//! A *generic* test compiles one source file, runs it and checks the output
//! against the `CHECK:` comments in that same file. A *generic assembly* test
//! only looks for the strings `PASS` and `FAIL` in the output.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::context::TestContext;
use crate::errors::{HarnessError, IoResultExt, Result};
use crate::registry::Registry;
use crate::target::Target;

/// Build `name`, run it on `target`, check the output against its comments.
pub fn run_generic_test(ctx: &TestContext, name: &str, target: Target) -> Result<()> {
    ctx.build(&[name])?;
    let output = ctx.run(target)?;
    ctx.check_result(name, &output)
}

/// Build `name`, run it on `target`, require `PASS` and no `FAIL`.
pub fn run_generic_assembly_test(ctx: &TestContext, name: &str, target: Target) -> Result<()> {
    ctx.build(&[name])?;
    let output = ctx.run(target)?;
    if !output.contains("PASS") || output.contains("FAIL") {
        return Err(HarnessError::failed(format!("Test failed {}", output)));
    }
    Ok(())
}

/// Registers each source file in `names` as a generic test. An empty target
/// list means [`Target::ALL`].
pub fn register_generic_tests<S: AsRef<str>>(
    registry: &mut Registry,
    names: &[S],
    targets: &[Target],
) {
    registry.register_many(names, or_all(targets), run_generic_test);
}

/// Registers each assembly file in `names` as a PASS/FAIL test. An empty target
/// list means [`Target::ALL`].
pub fn register_generic_assembly_tests<S: AsRef<str>>(
    registry: &mut Registry,
    names: &[S],
    targets: &[Target],
) {
    registry.register_many(names, or_all(targets), run_generic_assembly_test);
}

fn or_all(targets: &[Target]) -> &[Target] {
    if targets.is_empty() {
        &Target::ALL
    } else {
        targets
    }
}

/// Files directly inside `dir` whose names end with one of `extensions`
/// (each including the dot, e.g. `".c"`). Sorted by name.
pub fn find_files(dir: impl AsRef<Path>, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry
            .map_err(std::io::Error::from)
            .io_context(|| format!("Failed to list {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if extensions.iter().any(|ext| name.ends_with(ext)) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Swaps the byte order of a 32-bit value.
pub fn endian_swap(value: u32) -> u32 {
    value.swap_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endian_swap_reverses_bytes() {
        assert_eq!(endian_swap(0x1234_5678), 0x7856_3412);
        assert_eq!(endian_swap(endian_swap(0xdead_beef)), 0xdead_beef);
    }

    #[test]
    fn empty_target_list_means_all() {
        let mut registry = Registry::new();
        register_generic_tests(&mut registry, &["a.c"], &[]);
        register_generic_assembly_tests(&mut registry, &["b.S"], &[Target::Emulator]);
        assert_eq!(registry.find("a.c").unwrap().targets, Target::ALL.to_vec());
        assert_eq!(registry.find("b.S").unwrap().targets, vec![Target::Emulator]);
    }
}
