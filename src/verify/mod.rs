//! Output verification: ordered pattern checks and byte-exact file comparison.

pub mod check;
pub mod compare;

pub use check::{
    check_output, check_source, match_directives, parse_directive, parse_directives, CheckDirective,
    CheckKind,
};
pub use compare::{compare_files, compare_files_with_message, compare_readers};
