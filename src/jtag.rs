//! JTAG control channel to the hardware model.
//!
//! The model exposes its test access port over a local TCP socket. Each
//! request is a fixed 14-byte little-endian record:
//!
//! | bytes | field |
//! |-------|-------|
//! | 1 | instruction register length in bits |
//! | 4 | instruction value |
//! | 1 | data register length in bits |
//! | 8 | data value |
//!
//! The reply is the 8-byte little-endian value shifted out of the data
//! register, masked to the requested data length.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::context::TestContext;
use crate::errors::{HarnessError, IoResultExt, Result};
use crate::target::Target;

/// Port the hardware model listens on unless told otherwise.
pub const JTAG_PORT: u16 = 8541;

pub const REQUEST_LEN: usize = 14;

const CONNECT_ATTEMPTS: usize = 10;
const CONNECT_DELAY: Duration = Duration::from_millis(300);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JtagRequest {
    pub instruction_length: u8,
    pub instruction: u32,
    pub data_length: u8,
    pub data: u64,
}

impl JtagRequest {
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut record = [0u8; REQUEST_LEN];
        record[0] = self.instruction_length;
        record[1..5].copy_from_slice(&self.instruction.to_le_bytes());
        record[5] = self.data_length;
        record[6..14].copy_from_slice(&self.data.to_le_bytes());
        record
    }

    pub fn decode(record: &[u8; REQUEST_LEN]) -> Self {
        let mut instruction = [0u8; 4];
        instruction.copy_from_slice(&record[1..5]);
        let mut data = [0u8; 8];
        data.copy_from_slice(&record[6..14]);
        Self {
            instruction_length: record[0],
            instruction: u32::from_le_bytes(instruction),
            data_length: record[5],
            data: u64::from_le_bytes(data),
        }
    }
}

/// Keeps the low `bits` bits of `value`.
pub fn mask_to_length(value: u64, bits: u8) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

/// An open control connection.
#[derive(Debug)]
pub struct JtagConnection {
    stream: TcpStream,
}

impl JtagConnection {
    /// Connects to `localhost:port`, retrying while the model starts up.
    pub fn connect(port: u16) -> Result<Self> {
        let mut last_error = None;
        for attempt in 0..CONNECT_ATTEMPTS {
            thread::sleep(CONNECT_DELAY);
            match TcpStream::connect(("localhost", port)) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(READ_TIMEOUT))
                        .io_context(|| "Failed to set socket timeout")?;
                    debug!(port, attempt, "connected to JTAG port");
                    return Ok(Self { stream });
                }
                Err(e) => last_error = Some(e),
            }
        }
        let source = last_error
            .unwrap_or_else(|| std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        Err(HarnessError::io(
            format!("Failed to connect to JTAG port {}", port),
            source,
        ))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Shifts `instruction` into IR and `data` through DR, returning the value
    /// shifted out of DR.
    pub fn transfer(
        &mut self,
        instruction_length: u8,
        instruction: u32,
        data_length: u8,
        data: u64,
    ) -> Result<u64> {
        let request = JtagRequest {
            instruction_length,
            instruction,
            data_length,
            data,
        };
        self.stream
            .write_all(&request.encode())
            .io_context(|| "Failed to send JTAG request")?;
        let mut reply = [0u8; 8];
        self.stream
            .read_exact(&mut reply)
            .io_context(|| "Failed to read JTAG reply")?;
        Ok(mask_to_length(u64::from_le_bytes(reply), data_length))
    }
}

/// The hardware model running in the background with its JTAG port open.
/// Killed when dropped.
#[derive(Debug)]
pub struct SimulatorSession {
    child: Child,
}

impl SimulatorSession {
    pub fn spawn(config: &HarnessConfig, hexfile: &Path, port: u16) -> Result<Self> {
        let model = config.bin_tool("verilator_model");
        let mut command = Command::new(&model);
        command
            .arg(format!("+bin={}", hexfile.display()))
            .arg(format!("+jtag_port={}", port))
            .arg(hexfile)
            .stdin(Stdio::null());
        if !config.debug {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let child = command
            .spawn()
            .io_context(|| format!("Failed to spawn {}", model.display()))?;
        Ok(Self { child })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for SimulatorSession {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!(pid = self.child.id(), error = %e, "failed to kill simulator");
        }
        let _ = self.child.wait();
    }
}

/// Test body: load `test_program.S` in the model and exchange two scans.
pub fn jtag_test(ctx: &TestContext, _name: &str, _target: Target) -> Result<()> {
    jtag_test_on_port(ctx, JTAG_PORT)
}

pub fn jtag_test_on_port(ctx: &TestContext, port: u16) -> Result<()> {
    let hexfile = ctx.build(&["test_program.S"])?;
    let _session = SimulatorSession::spawn(&ctx.config, &hexfile, port)?;
    let mut conn = JtagConnection::connect(port)?;

    let response1 = conn.transfer(4, 0xa, 32, 0x1234_5678)?;
    info!("response1: {:#x}", response1);
    let response2 = conn.transfer(4, 0x3, 32, 0xdead_beef)?;
    info!("response2: {:#x}", response2);
    Ok(())
}
