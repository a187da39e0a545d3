//! Running a built image on an execution target.
//!
//! Each target has its own launcher and flag syntax; this module turns a
//! [`RunRequest`] into the right command line and hands it to the supervisor.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, IoResultExt, Result};
use crate::supervisor::run_with_timeout;
use crate::target::Target;

/// Marker the hardware model prints when the program halts cleanly.
pub const HALT_MARKER: &str = "***HALTED***";

/// Memory region written to a file once the program finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDump {
    pub file: PathBuf,
    pub base: u64,
    pub length: u64,
}

/// Everything needed to run one image.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Image to load. Defaults to the hex file of the last build.
    pub executable: Option<PathBuf>,
    /// Filesystem image exposed as a virtual SD/MMC device.
    pub block_device: Option<PathBuf>,
    pub dump: Option<MemoryDump>,
    /// Defaults to `HarnessConfig::default_timeout`.
    pub timeout: Option<Duration>,
    pub flush_l2: bool,
    pub trace: bool,
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn block_device(mut self, path: impl Into<PathBuf>) -> Self {
        self.block_device = Some(path.into());
        self
    }

    pub fn dump(mut self, file: impl Into<PathBuf>, base: u64, length: u64) -> Self {
        self.dump = Some(MemoryDump {
            file: file.into(),
            base,
            length,
        });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn flush_l2(mut self, flush: bool) -> Self {
        self.flush_l2 = flush;
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

/// A fully resolved launch: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Builds the launcher command line for `target`.
pub fn invocation(
    config: &HarnessConfig,
    target: Target,
    request: &RunRequest,
) -> Result<Invocation> {
    let executable = request
        .executable
        .clone()
        .unwrap_or_else(|| config.hex_file());
    let image = executable.display().to_string();
    let mut args = Vec::new();

    let program = match target {
        Target::Emulator => {
            // Randomize thread scheduling.
            args.push("-a".to_string());
            if let Some(block) = &request.block_device {
                args.push("-b".to_string());
                args.push(block.display().to_string());
            }
            if let Some(dump) = &request.dump {
                args.push("-d".to_string());
                args.push(format!(
                    "{},{:#x},{:#x}",
                    dump.file.display(),
                    dump.base,
                    dump.length
                ));
            }
            args.push(image);
            config.bin_tool("emulator")
        }
        Target::Simulator => {
            if let Some(block) = &request.block_device {
                args.push(format!("+block={}", block.display()));
            }
            if let Some(dump) = &request.dump {
                args.push(format!("+memdumpfile={}", dump.file.display()));
                args.push(format!("+memdumpbase={:x}", dump.base));
                args.push(format!("+memdumplen={:x}", dump.length));
            }
            if request.flush_l2 {
                args.push("+autoflushl2=1".to_string());
            }
            if request.trace {
                args.push("+trace".to_string());
            }
            args.push(format!("+bin={}", image));
            config.bin_tool("verilator_model")
        }
        Target::Fpga => {
            if request.dump.is_some() {
                return Err(unsupported("dump file", target));
            }
            if request.flush_l2 {
                return Err(unsupported("flush_l2", target));
            }
            let port = config.serial_port.clone().ok_or_else(|| HarnessError::Config {
                message: "Need to set SERIAL_PORT to device path in environment".to_string(),
            })?;
            args.push(port);
            args.push(image);
            if let Some(block) = &request.block_device {
                args.push(block.display().to_string());
            }
            config.bin_tool("serial_boot")
        }
    };

    Ok(Invocation { program, args })
}

fn unsupported(option: &str, target: Target) -> HarnessError {
    HarnessError::UnsupportedOption {
        option: option.to_string(),
        target: target.to_string(),
    }
}

/// Runs an image and returns everything it printed.
///
/// On the simulator a run that exits without printing [`HALT_MARKER`] is an
/// abnormal termination.
pub fn run_program(config: &HarnessConfig, target: Target, request: &RunRequest) -> Result<String> {
    let invocation = invocation(config, target, request)?;
    if target == Target::Fpga {
        reset_fpga()?;
    }

    let timeout = request.timeout.unwrap_or_else(|| config.timeout());
    let output = run_with_timeout(&invocation.program, &invocation.args, timeout)?;
    if target == Target::Simulator && !output.contains(HALT_MARKER) {
        return Err(HarnessError::AbnormalHalt { output });
    }

    debug!("Program Output:\n{}", output);
    Ok(output)
}

/// Runs the last user-mode build under the kernel.
///
/// Packs `program.elf` into a filesystem image, which the kernel loads from
/// its block device.
pub fn run_kernel(
    config: &HarnessConfig,
    target: Target,
    timeout: Option<Duration>,
) -> Result<String> {
    let block_file = config.obj_dir.join("fsimage.bin");
    make_filesystem(config, &block_file, &[config.elf_file()])?;

    let mut request = RunRequest::new()
        .block_device(&block_file)
        .executable(config.project_top.join("software/kernel/kernel.hex"));
    request.timeout = timeout;
    run_program(config, target, &request)
}

/// Builds a filesystem image containing `files` with the `mkfs` host tool.
pub fn make_filesystem<P: AsRef<Path>>(
    config: &HarnessConfig,
    image: &Path,
    files: &[P],
) -> Result<()> {
    let mut args = vec![image.display().to_string()];
    args.extend(files.iter().map(|f| f.as_ref().display().to_string()));
    run_with_timeout(config.bin_tool("mkfs"), &args, config.build_timeout())?;
    Ok(())
}

/// Asks the operator to reset the attached board.
fn reset_fpga() -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "\nReset FPGA board and press enter")
        .and_then(|_| stdout.flush())
        .io_context(|| "Failed to write prompt")?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .io_context(|| "Failed to read from stdin")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HarnessConfig {
        HarnessConfig::with_project_top("/proj")
    }

    #[test]
    fn emulator_command_line() {
        let request = RunRequest::new()
            .block_device("fs.bin")
            .dump("mem.bin", 0x200000, 0x1000);
        let inv = invocation(&config(), Target::Emulator, &request).unwrap();
        assert_eq!(inv.program, PathBuf::from("/proj/bin/emulator"));
        assert_eq!(
            inv.args,
            vec!["-a", "-b", "fs.bin", "-d", "mem.bin,0x200000,0x1000", "obj/program.hex"]
        );
    }

    #[test]
    fn simulator_command_line() {
        let request = RunRequest::new()
            .executable("k.hex")
            .dump("mem.bin", 0x200000, 0x1000)
            .flush_l2(true)
            .trace(true);
        let inv = invocation(&config(), Target::Simulator, &request).unwrap();
        assert_eq!(inv.program, PathBuf::from("/proj/bin/verilator_model"));
        assert_eq!(
            inv.args,
            vec![
                "+memdumpfile=mem.bin",
                "+memdumpbase=200000",
                "+memdumplen=1000",
                "+autoflushl2=1",
                "+trace",
                "+bin=k.hex"
            ]
        );
    }

    #[test]
    fn fpga_rejects_dumps_and_needs_serial_port() {
        let request = RunRequest::new().dump("mem.bin", 0, 4);
        let err = invocation(&config(), Target::Fpga, &request).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::UnsupportedOption);

        let mut cfg = config();
        cfg.serial_port = None;
        let err = invocation(&cfg, Target::Fpga, &RunRequest::new()).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Config);

        cfg.serial_port = Some("/dev/ttyUSB0".to_string());
        let inv = invocation(&cfg, Target::Fpga, &RunRequest::new()).unwrap();
        assert_eq!(inv.program, PathBuf::from("/proj/bin/serial_boot"));
        assert_eq!(inv.args, vec!["/dev/ttyUSB0", "obj/program.hex"]);
    }
}
