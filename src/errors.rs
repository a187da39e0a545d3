//! Error handling for the harness.
//!
//! Every failure a test body, the supervisor, or a verifier can produce is a
//! variant of [`HarnessError`]. The dispatcher records all of them against the
//! running (test, target) pair, except [`ErrorKind::UnknownTest`] and
//! [`ErrorKind::Interrupted`], which abort the whole run.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Which side of a file comparison ran out of bytes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shorter {
    First,
    Second,
}

impl std::fmt::Display for Shorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shorter::First => write!(f, "shorter than"),
            Shorter::Second => write!(f, "longer than"),
        }
    }
}

/// Fieldless classification of a [`HarnessError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    ProcessError,
    CheckMismatch,
    ForbiddenPatternPresent,
    NoDirectives,
    InvalidPattern,
    LengthMismatch,
    ContentMismatch,
    UnknownTest,
    CompilationFailure,
    AbnormalHalt,
    UnsupportedOption,
    Failed,
    Interrupted,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ProcessError => "ProcessError",
            ErrorKind::CheckMismatch => "CheckMismatch",
            ErrorKind::ForbiddenPatternPresent => "ForbiddenPatternPresent",
            ErrorKind::NoDirectives => "NoDirectives",
            ErrorKind::InvalidPattern => "InvalidPattern",
            ErrorKind::LengthMismatch => "LengthMismatch",
            ErrorKind::ContentMismatch => "ContentMismatch",
            ErrorKind::UnknownTest => "UnknownTest",
            ErrorKind::CompilationFailure => "CompilationFailure",
            ErrorKind::AbnormalHalt => "AbnormalHalt",
            ErrorKind::UnsupportedOption => "UnsupportedOption",
            ErrorKind::Failed => "Failed",
            ErrorKind::Interrupted => "Interrupted",
            ErrorKind::Config => "Config",
            ErrorKind::Io => "Io",
        }
    }

    /// Kinds that stop the whole run instead of failing a single test.
    pub fn aborts_run(&self) -> bool {
        matches!(self, ErrorKind::UnknownTest | ErrorKind::Interrupted)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for every harness failure mode.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("Test timed out after {seconds:.1}s (process {pid} was killed)")]
    #[diagnostic(code(simtest::timeout))]
    Timeout { seconds: f64, pid: u32 },

    #[error("Process returned error ({status}): {output}")]
    #[diagnostic(
        code(simtest::process_error),
        help("a non-zero exit usually means the target program crashed")
    )]
    ProcessError { status: String, output: String },

    #[error(
        "FAIL: line {line} expected string {pattern} was not found\nsearching here:{remaining}"
    )]
    #[diagnostic(code(simtest::check_mismatch))]
    CheckMismatch {
        pattern: String,
        line: usize,
        remaining: String,
    },

    #[error("FAIL: line {line} string {pattern} should not be here:\n{output}")]
    #[diagnostic(code(simtest::forbidden_pattern))]
    ForbiddenPatternPresent {
        pattern: String,
        line: usize,
        output: String,
    },

    #[error("FAIL: no lines with CHECK: were found in {}", .file.display())]
    #[diagnostic(
        code(simtest::no_directives),
        help("add at least one `CHECK: <regex>` or `CHECKN: <regex>` comment")
    )]
    NoDirectives { file: PathBuf },

    #[error("FAIL: line {line} pattern {pattern} is not a valid regular expression")]
    #[diagnostic(code(simtest::invalid_pattern))]
    InvalidPattern {
        pattern: String,
        line: usize,
        #[source]
        source: regex::Error,
    },

    #[error("{message}: file1 {shorter} file2")]
    #[diagnostic(code(simtest::length_mismatch))]
    LengthMismatch { message: String, shorter: Shorter },

    #[error("{message}:\n{diff}")]
    #[diagnostic(code(simtest::content_mismatch))]
    ContentMismatch {
        message: String,
        offset: u64,
        diff: String,
    },

    #[error("Unknown test {name}")]
    #[diagnostic(code(simtest::unknown_test))]
    UnknownTest { name: String },

    #[error("Compilation failed:\n{output}")]
    #[diagnostic(code(simtest::compilation_failure))]
    CompilationFailure { output: String },

    #[error("{output}\nProgram did not halt normally")]
    #[diagnostic(code(simtest::abnormal_halt))]
    AbnormalHalt { output: String },

    #[error("{option} is not supported on {target}")]
    #[diagnostic(code(simtest::unsupported_option))]
    UnsupportedOption { option: String, target: String },

    #[error("{message}")]
    #[diagnostic(code(simtest::failed))]
    Failed { message: String },

    #[error("Interrupted")]
    #[diagnostic(code(simtest::interrupted))]
    Interrupted,

    #[error("Configuration error: {message}")]
    #[diagnostic(code(simtest::config))]
    Config { message: String },

    #[error("{context}: {source}")]
    #[diagnostic(code(simtest::io))]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::Timeout { .. } => ErrorKind::Timeout,
            HarnessError::ProcessError { .. } => ErrorKind::ProcessError,
            HarnessError::CheckMismatch { .. } => ErrorKind::CheckMismatch,
            HarnessError::ForbiddenPatternPresent { .. } => ErrorKind::ForbiddenPatternPresent,
            HarnessError::NoDirectives { .. } => ErrorKind::NoDirectives,
            HarnessError::InvalidPattern { .. } => ErrorKind::InvalidPattern,
            HarnessError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            HarnessError::ContentMismatch { .. } => ErrorKind::ContentMismatch,
            HarnessError::UnknownTest { .. } => ErrorKind::UnknownTest,
            HarnessError::CompilationFailure { .. } => ErrorKind::CompilationFailure,
            HarnessError::AbnormalHalt { .. } => ErrorKind::AbnormalHalt,
            HarnessError::UnsupportedOption { .. } => ErrorKind::UnsupportedOption,
            HarnessError::Failed { .. } => ErrorKind::Failed,
            HarnessError::Interrupted => ErrorKind::Interrupted,
            HarnessError::Config { .. } => ErrorKind::Config,
            HarnessError::Io { .. } => ErrorKind::Io,
        }
    }

    /// A plain test failure with a free-text diagnostic.
    pub fn failed(message: impl Into<String>) -> Self {
        HarnessError::Failed {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        HarnessError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Attaches a context message to `std::io::Result` values.
pub trait IoResultExt<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| HarnessError::io(f(), source))
    }
}
