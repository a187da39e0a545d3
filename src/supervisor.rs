//! Timeout-guarded execution of external programs.
//!
//! [`run_with_timeout`] spawns a command with stdout and stderr merged into a
//! single pipe, drains that pipe on a reader thread, and races a watchdog
//! thread against the wait for the child to exit. Both sides claim a shared
//! [`CompletionFlag`]; only the first claim succeeds, so a call reports exactly
//! one of: clean output, [`HarnessError::ProcessError`] or
//! [`HarnessError::Timeout`].
//!
//! On unix the child leads its own process group. Timeouts and interrupts kill
//! the whole group, so a backgrounded grandchild holding the output pipe cannot
//! keep the call alive past its deadline.

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::errors::{HarnessError, IoResultExt, Result};
use crate::interrupt;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Minimum time allowed for draining the pipe after a clean exit.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Set-once completion marker shared by the watchdog and the waiting thread.
#[derive(Debug, Clone, Default)]
pub struct CompletionFlag(Arc<AtomicBool>);

impl CompletionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims completion. Returns `true` only for the first caller.
    pub fn try_complete(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_complete(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Who claimed the completion flag for one supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Exited,
    Watchdog,
    Interrupt,
}

fn lock(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sends SIGKILL to the process group led by `pid`.
fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(pid) {
            unsafe {
                let _ = libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// Runs `program` with `args`, killing it if it is still alive after `timeout`.
///
/// Returns the merged stdout/stderr decoded as text when the process exits
/// with status zero.
pub fn run_with_timeout<P, S>(program: P, args: &[S], timeout: Duration) -> Result<String>
where
    P: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let display_name = program.to_string_lossy().into_owned();

    let (mut reader, writer) = std::io::pipe().io_context(|| "Failed to create output pipe")?;
    let started = Instant::now();
    let child = {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(
                writer
                    .try_clone()
                    .io_context(|| "Failed to duplicate output pipe")?,
            )
            .stderr(writer);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        // The command (and with it our copies of the write end) is dropped at
        // the end of this block so the reader sees EOF once the child exits.
        command
            .spawn()
            .io_context(|| format!("Failed to spawn {}", display_name))?
    };
    let pid = child.id();
    debug!(pid, program = %display_name, timeout = ?timeout, "spawned process");

    let (output_tx, output_rx) = mpsc::channel::<std::io::Result<Vec<u8>>>();
    thread::spawn(move || {
        let mut captured = Vec::new();
        let result = reader.read_to_end(&mut captured).map(|_| captured);
        let _ = output_tx.send(result);
    });

    let child = Arc::new(Mutex::new(child));
    let flag = CompletionFlag::new();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let watchdog = {
        let flag = flag.clone();
        let child = Arc::clone(&child);
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(timeout) {
                if flag.try_complete() {
                    let mut child = lock(&child);
                    kill_group(pid);
                    if let Err(e) = child.kill() {
                        warn!(pid, error = %e, "failed to kill timed out process");
                    }
                    return true;
                }
            }
            false
        })
    };

    let waited = wait_for_exit(&child, &flag);
    // Wake the watchdog; it may already be gone if it fired.
    let _ = stop_tx.send(());
    let watchdog_fired = watchdog.join().unwrap_or(false);
    let (status, interrupted) = waited?;

    let claim = if interrupted {
        Claim::Interrupt
    } else if watchdog_fired || !flag.try_complete() {
        Claim::Watchdog
    } else {
        Claim::Exited
    };

    let timed_out = || HarnessError::Timeout {
        seconds: timeout.as_secs_f64(),
        pid,
    };
    match claim {
        Claim::Watchdog => {
            debug!(pid, "process timed out and was killed");
            Err(timed_out())
        }
        Claim::Interrupt => Err(HarnessError::Interrupted),
        Claim::Exited => {
            // The pipe stays open while any process in the group holds it, so
            // the drain is bounded by what is left of the deadline.
            let remaining = started
                .checked_add(timeout)
                .map_or(Duration::MAX, |deadline| {
                    deadline.saturating_duration_since(Instant::now())
                })
                .max(DRAIN_GRACE);
            let captured = match output_rx.recv_timeout(remaining) {
                Ok(result) => {
                    result.io_context(|| format!("Failed to read output of {}", display_name))?
                }
                Err(RecvTimeoutError::Timeout) => {
                    debug!(pid, "output still held open after exit, killing process group");
                    kill_group(pid);
                    return Err(timed_out());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(HarnessError::failed("output reader thread panicked"))
                }
            };
            let output = String::from_utf8_lossy(&captured).into_owned();
            if status.success() {
                Ok(output)
            } else {
                Err(HarnessError::ProcessError {
                    status: status.to_string(),
                    output,
                })
            }
        }
    }
}

/// Polls the child until it exits. Returns its status and whether the wait was
/// cut short by an operator interrupt.
fn wait_for_exit(child: &Mutex<Child>, flag: &CompletionFlag) -> Result<(ExitStatus, bool)> {
    loop {
        {
            let mut guard = lock(child);
            if let Some(status) = guard.try_wait().io_context(|| "Failed to poll child")? {
                return Ok((status, false));
            }
            if interrupt::is_interrupted() && flag.try_complete() {
                kill_group(guard.id());
                let _ = guard.kill();
                let status = guard.wait().io_context(|| "Failed to reap child")?;
                return Ok((status, true));
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
}
