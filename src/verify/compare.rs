//! Byte-exact comparison of two files, typically a memory dump against a
//! reference image.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::errors::{HarnessError, IoResultExt, Result, Shorter};

const CHUNK_SIZE: usize = 0x1000;
const LINE_WIDTH: usize = 16;

/// Compares two files, failing with a hex-dump diagnostic on the first
/// difference.
pub fn compare_files(first: impl AsRef<Path>, second: impl AsRef<Path>) -> Result<()> {
    compare_files_with_message(first, second, "file mismatch")
}

/// Like [`compare_files`], with `message` prefixed to any failure.
pub fn compare_files_with_message(
    first: impl AsRef<Path>,
    second: impl AsRef<Path>,
    message: &str,
) -> Result<()> {
    let (first, second) = (first.as_ref(), second.as_ref());
    let a = File::open(first).io_context(|| format!("Failed to open {}", first.display()))?;
    let b = File::open(second).io_context(|| format!("Failed to open {}", second.display()))?;
    compare_readers(BufReader::new(a), BufReader::new(b), message)
}

/// Compares two byte streams chunk by chunk in lockstep.
pub fn compare_readers<A: Read, B: Read>(mut first: A, mut second: B, message: &str) -> Result<()> {
    let mut block_a = vec![0u8; CHUNK_SIZE];
    let mut block_b = vec![0u8; CHUNK_SIZE];
    let mut block_offset: u64 = 0;

    loop {
        let len_a = read_chunk(&mut first, &mut block_a).io_context(|| "Failed to read file1")?;
        let len_b = read_chunk(&mut second, &mut block_b).io_context(|| "Failed to read file2")?;
        if len_a != len_b {
            return Err(HarnessError::LengthMismatch {
                message: message.to_string(),
                shorter: if len_a < len_b {
                    Shorter::First
                } else {
                    Shorter::Second
                },
            });
        }

        let (a, b) = (&block_a[..len_a], &block_b[..len_b]);
        if let Some(index) = a.iter().zip(b).position(|(x, y)| x != y) {
            let rounded = index & !(LINE_WIDTH - 1);
            let offset = block_offset + rounded as u64;
            return Err(HarnessError::ContentMismatch {
                message: message.to_string(),
                offset,
                diff: render_diff(offset, &a[rounded..], &b[rounded..]),
            });
        }

        if len_a == 0 {
            return Ok(());
        }
        block_offset += len_a as u64;
    }
}

/// Fills `buf` as far as the stream allows. A short count means end of stream.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Renders the 16-byte line at `offset` for both inputs plus a marker line.
fn render_diff(offset: u64, a: &[u8], b: &[u8]) -> String {
    let hex_line = |bytes: &[u8]| {
        let mut line = format!("{:08x} ", offset);
        for i in 0..LINE_WIDTH {
            match bytes.get(i) {
                Some(byte) => {
                    let _ = write!(line, "{:02x}", byte);
                }
                None => line.push_str("  "),
            }
        }
        line
    };

    let mut markers = " ".repeat(9);
    for i in 0..LINE_WIDTH {
        match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) if x != y => markers.push_str("^^"),
            _ => markers.push_str("  "),
        }
    }

    format!("{}\n{}\n{}", hex_line(a), hex_line(b), markers.trim_end())
}
