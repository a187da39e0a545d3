pub use crate::errors::{ErrorKind, HarnessError, Result};

pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod generic;
pub mod interrupt;
pub mod jtag;
pub mod registry;
pub mod runner;
pub mod supervisor;
pub mod target;
pub mod toolchain;
pub mod verify;
