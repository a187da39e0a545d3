use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::HarnessConfig;
use crate::errors::Result;
use crate::runner::{self, RunRequest};
use crate::target::Target;
use crate::toolchain::{self, BuildOptions, ImageType};
use crate::verify;

/// The services a test body needs during a run.
///
/// Constructed once per process and passed to every test body by reference;
/// it is never mutated after dispatch begins.
#[derive(Debug, Clone, Default)]
pub struct TestContext {
    pub config: HarnessConfig,
}

impl TestContext {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Builds a bare-metal image from `sources`.
    pub fn build<P: AsRef<Path>>(&self, sources: &[P]) -> Result<PathBuf> {
        self.build_with(sources, &BuildOptions::default())
    }

    pub fn build_image<P: AsRef<Path>>(
        &self,
        sources: &[P],
        image_type: ImageType,
    ) -> Result<PathBuf> {
        self.build_with(sources, &BuildOptions::image(image_type))
    }

    pub fn build_with<P: AsRef<Path>>(
        &self,
        sources: &[P],
        options: &BuildOptions,
    ) -> Result<PathBuf> {
        toolchain::build_program(&self.config, sources, options)
    }

    /// Runs the last built image on `target` with default settings.
    pub fn run(&self, target: Target) -> Result<String> {
        self.run_with(target, &RunRequest::default())
    }

    pub fn run_with(&self, target: Target, request: &RunRequest) -> Result<String> {
        runner::run_program(&self.config, target, request)
    }

    pub fn run_kernel(&self, target: Target, timeout: Option<Duration>) -> Result<String> {
        runner::run_kernel(&self.config, target, timeout)
    }

    /// Checks `output` against the `CHECK:` comments in `source_file`.
    pub fn check_result(&self, source_file: impl AsRef<Path>, output: &str) -> Result<()> {
        verify::check_output(source_file, output)
    }

    pub fn assert_files_equal(
        &self,
        first: impl AsRef<Path>,
        second: impl AsRef<Path>,
    ) -> Result<()> {
        verify::compare_files(first, second)
    }
}
