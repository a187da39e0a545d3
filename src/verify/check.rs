//! Ordered pattern matching against `CHECK:` / `CHECKN:` comments.
//!
//! A source file documents its own expected output:
//!
//! ```c
//! printf("stage 1\n");   // CHECK: stage 1
//! printf("stage 2\n");   // CHECK: stage \d
//!                        // CHECKN: panic
//! ```
//!
//! Present-patterns must appear in the output in file order, each one after
//! the end of the previous match. Absent-patterns must not appear anywhere from
//! the current position onward.

use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::errors::{HarnessError, IoResultExt, Result};

pub const CHECK_PREFIX: &str = "CHECK: ";
pub const CHECKN_PREFIX: &str = "CHECKN: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// `CHECK:`: the pattern must be found after the cursor.
    Present,
    /// `CHECKN:`: the pattern must not be found after the cursor.
    Absent,
}

/// One directive parsed from a source line.
#[derive(Debug, Clone)]
pub struct CheckDirective {
    pub kind: CheckKind,
    pub pattern: Regex,
    /// 1-based line number in the source file.
    pub line: usize,
}

impl CheckDirective {
    pub fn pattern_str(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Parses one source line. `Ok(None)` when the line holds no directive.
pub fn parse_directive(line: &str, line_num: usize) -> Result<Option<CheckDirective>> {
    let (kind, rest) = if let Some(offset) = line.find(CHECK_PREFIX) {
        (CheckKind::Present, &line[offset + CHECK_PREFIX.len()..])
    } else if let Some(offset) = line.find(CHECKN_PREFIX) {
        (CheckKind::Absent, &line[offset + CHECKN_PREFIX.len()..])
    } else {
        return Ok(None);
    };

    let text = rest.trim();
    let pattern = Regex::new(text).map_err(|source| HarnessError::InvalidPattern {
        pattern: text.to_string(),
        line: line_num,
        source,
    })?;
    Ok(Some(CheckDirective {
        kind,
        pattern,
        line: line_num,
    }))
}

/// Extracts all directives from `source`, in line order.
pub fn parse_directives(source: &str) -> Result<Vec<CheckDirective>> {
    let mut directives = Vec::new();
    for (index, line) in source.lines().enumerate() {
        if let Some(directive) = parse_directive(line, index + 1)? {
            directives.push(directive);
        }
    }
    Ok(directives)
}

/// Checks `output` against the directives embedded in `source_file`.
pub fn check_output(source_file: impl AsRef<Path>, output: &str) -> Result<()> {
    let source_file = source_file.as_ref();
    let source = fs::read_to_string(source_file)
        .io_context(|| format!("Failed to read {}", source_file.display()))?;
    check_source(source_file, &source, output)
}

/// Same as [`check_output`] for a source already in memory. `name` is only
/// used in diagnostics.
///
/// Each directive is evaluated as soon as it is parsed, so a mismatch is
/// reported before a malformed pattern further down the file.
pub fn check_source(name: impl AsRef<Path>, source: &str, output: &str) -> Result<()> {
    let mut cursor = Cursor::new(output);
    let mut found = false;
    for (index, line) in source.lines().enumerate() {
        if let Some(directive) = parse_directive(line, index + 1)? {
            found = true;
            cursor.apply(&directive)?;
        }
    }
    if !found {
        return Err(HarnessError::NoDirectives {
            file: name.as_ref().to_path_buf(),
        });
    }
    Ok(())
}

/// Evaluates directives in order against `output`.
pub fn match_directives(directives: &[CheckDirective], output: &str) -> Result<()> {
    let mut cursor = Cursor::new(output);
    directives.iter().try_for_each(|directive| cursor.apply(directive))
}

/// Search position in the program output. Only moves forward.
struct Cursor<'a> {
    output: &'a str,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(output: &'a str) -> Self {
        Self { output, position: 0 }
    }

    fn apply(&mut self, directive: &CheckDirective) -> Result<()> {
        match directive.kind {
            CheckKind::Present => {
                debug!(
                    "searching for pattern \"{}\", line {}",
                    directive.pattern_str(),
                    directive.line
                );
                match directive.pattern.find_at(self.output, self.position) {
                    Some(found) => {
                        self.position = found.end();
                        Ok(())
                    }
                    None => Err(HarnessError::CheckMismatch {
                        pattern: directive.pattern_str().to_string(),
                        line: directive.line,
                        remaining: self.output[self.position..].to_string(),
                    }),
                }
            }
            CheckKind::Absent => {
                debug!(
                    "ensuring absence of pattern \"{}\", line {}",
                    directive.pattern_str(),
                    directive.line
                );
                if directive.pattern.find_at(self.output, self.position).is_some() {
                    return Err(HarnessError::ForbiddenPatternPresent {
                        pattern: directive.pattern_str().to_string(),
                        line: directive.line,
                        output: self.output.to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}
