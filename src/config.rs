//! Harness configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! environment variables, then command-line flags (applied by the CLI).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{HarnessError, IoResultExt, Result};
use crate::target::Target;

const DEFAULT_COMPILER_DIR: &str = "/usr/local/llvm-nyuzi/bin/";
const DEFAULT_TIMEOUT_SECS: f64 = 60.0;
const DEFAULT_BUILD_TIMEOUT_SECS: f64 = 300.0;

/// Paths and knobs shared by every test body.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Root of the project tree the tests belong to.
    pub project_top: PathBuf,
    /// Directory holding clang, elf2hex and friends.
    pub compiler_dir: PathBuf,
    pub lib_dir: PathBuf,
    /// Directory holding the emulator, the hardware model and host tools.
    pub bin_dir: PathBuf,
    /// Per-test scratch directory, relative to the working directory.
    pub obj_dir: PathBuf,
    pub default_targets: Vec<Target>,
    /// Wall-clock bound for running a test program, in seconds.
    pub default_timeout: f64,
    /// Wall-clock bound for each toolchain invocation, in seconds.
    pub build_timeout: f64,
    pub serial_port: Option<String>,
    pub debug: bool,
    pub use_colors: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::with_project_top(PathBuf::from("."))
    }
}

impl HarnessConfig {
    /// Defaults with every project-relative path rooted at `top`.
    pub fn with_project_top(top: impl Into<PathBuf>) -> Self {
        let project_top = top.into();
        Self {
            lib_dir: project_top.join("software").join("libs"),
            bin_dir: project_top.join("bin"),
            project_top,
            compiler_dir: PathBuf::from(DEFAULT_COMPILER_DIR),
            obj_dir: PathBuf::from("obj"),
            default_targets: Target::DEFAULT.to_vec(),
            default_timeout: DEFAULT_TIMEOUT_SECS,
            build_timeout: DEFAULT_BUILD_TIMEOUT_SECS,
            serial_port: None,
            debug: false,
            use_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// Loads a YAML file on top of the defaults.
    ///
    /// Keys that are absent keep their default value. When the file sets
    /// `project_top` but not `lib_dir`/`bin_dir`, those are re-derived from it.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .io_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml_str(&text).map_err(|e| HarnessError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| HarnessError::Config {
                message: e.to_string(),
            })?;
        let mut config: HarnessConfig =
            serde_yaml::from_value(raw.clone()).map_err(|e| HarnessError::Config {
                message: e.to_string(),
            })?;

        let has_key = |key: &str| raw.get(key).is_some();
        config.validate()?;
        if has_key("project_top") {
            let derived = Self::with_project_top(config.project_top.clone());
            if !has_key("lib_dir") {
                config.lib_dir = derived.lib_dir;
            }
            if !has_key("bin_dir") {
                config.bin_dir = derived.bin_dir;
            }
        }
        Ok(config)
    }

    /// Applies `SIMTEST_PROJECT_TOP`, `SIMTEST_COMPILER_DIR` and `SERIAL_PORT`.
    pub fn apply_env(mut self) -> Self {
        if let Some(top) = std::env::var_os("SIMTEST_PROJECT_TOP") {
            let derived = Self::with_project_top(PathBuf::from(top));
            self.project_top = derived.project_top;
            self.lib_dir = derived.lib_dir;
            self.bin_dir = derived.bin_dir;
        }
        if let Some(dir) = std::env::var_os("SIMTEST_COMPILER_DIR") {
            self.compiler_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("SERIAL_PORT") {
            self.serial_port = Some(port);
        }
        self
    }

    /// Rejects timeouts that are negative, NaN or too large for a `Duration`.
    pub fn validate(&self) -> Result<()> {
        for (key, secs) in [
            ("default_timeout", self.default_timeout),
            ("build_timeout", self.build_timeout),
        ] {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(HarnessError::Config {
                    message: format!("{} must be a finite, non-negative number of seconds", key),
                });
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        seconds(self.default_timeout)
    }

    pub fn build_timeout(&self) -> Duration {
        seconds(self.build_timeout)
    }

    /// ELF output of the last build.
    pub fn elf_file(&self) -> PathBuf {
        self.obj_dir.join("program.elf")
    }

    /// Hex image of the last build.
    pub fn hex_file(&self) -> PathBuf {
        self.obj_dir.join("program.hex")
    }

    pub fn compiler_tool(&self, name: &str) -> PathBuf {
        self.compiler_dir.join(name)
    }

    pub fn bin_tool(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }
}

/// Saturates instead of panicking on values [`HarnessConfig::validate`] rejects.
fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}
