//! Building test programs into loadable images.
//!
//! Wraps the cross compiler and the ELF-to-hex converter. Every tool runs under
//! the process supervisor, so a wedged compiler fails the test instead of
//! stalling the suite.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::HarnessConfig;
use crate::errors::{HarnessError, IoResultExt, Result};
use crate::supervisor::run_with_timeout;

/// How the program is linked and packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageType {
    /// Standalone program with ELF linkage, converted to a hex image.
    #[default]
    BareMetal,
    /// No header, linked at address 0, dumped word by word to hex.
    Raw,
    /// ELF binary linked at 0x1000 against the kernel libraries.
    User,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub image_type: ImageType,
    pub opt_level: String,
    pub cflags: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            image_type: ImageType::BareMetal,
            opt_level: "-O3".to_string(),
            cflags: Vec::new(),
        }
    }
}

impl BuildOptions {
    pub fn image(image_type: ImageType) -> Self {
        Self {
            image_type,
            ..Self::default()
        }
    }
}

fn is_c_source(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "c" || ext == "cpp")
}

/// Assembles the clang command line for `sources`.
pub fn compiler_args<P: AsRef<Path>>(
    config: &HarnessConfig,
    sources: &[P],
    options: &BuildOptions,
) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        config.elf_file().display().to_string(),
        "-w".to_string(),
        options.opt_level.clone(),
    ];
    args.extend(options.cflags.iter().cloned());

    match options.image_type {
        ImageType::Raw => args.push("-Wl,--script,../one-segment.ld,--oformat,binary".to_string()),
        ImageType::User => args.push("-Wl,--image-base=0x1000".to_string()),
        ImageType::BareMetal => {}
    }

    args.extend(sources.iter().map(|s| s.as_ref().display().to_string()));

    if sources.iter().any(|s| is_c_source(s.as_ref())) {
        let lib = |rel: &str| config.lib_dir.join(rel).display().to_string();
        args.push(format!("-I{}", lib("libc/include")));
        args.push(format!("-I{}", lib("libos")));
        args.push(lib("libc/libc.a"));
        args.push(lib("compiler-rt/compiler-rt.a"));
        if options.image_type == ImageType::User {
            args.push(lib("libos/crt0-kern.o"));
            args.push(lib("libos/libos-kern.a"));
        } else {
            args.push(lib("libos/crt0-bare.o"));
            args.push(lib("libos/libos-bare.a"));
        }
    }
    args
}

/// Compiles/assembles `sources` and returns the path of the loadable image.
pub fn build_program<P: AsRef<Path>>(
    config: &HarnessConfig,
    sources: &[P],
    options: &BuildOptions,
) -> Result<PathBuf> {
    fs::create_dir_all(&config.obj_dir)
        .io_context(|| format!("Failed to create {}", config.obj_dir.display()))?;

    let args = compiler_args(config, sources, options);
    debug!(?args, "compiling");
    run_tool(config, &config.compiler_tool("clang"), &args)?;

    match options.image_type {
        ImageType::Raw => {
            dump_hex(&config.hex_file(), &config.elf_file())?;
            Ok(config.hex_file())
        }
        ImageType::BareMetal => {
            let args = [
                "-o".to_string(),
                config.hex_file().display().to_string(),
                config.elf_file().display().to_string(),
            ];
            run_tool(config, &config.compiler_tool("elf2hex"), &args)?;
            Ok(config.hex_file())
        }
        ImageType::User => Ok(config.elf_file()),
    }
}

/// Runs a toolchain program, mapping a non-zero exit to a compilation failure.
fn run_tool(config: &HarnessConfig, tool: &Path, args: &[String]) -> Result<String> {
    run_with_timeout(tool, args, config.build_timeout()).map_err(|e| match e {
        HarnessError::ProcessError { output, .. } => HarnessError::CompilationFailure { output },
        other => other,
    })
}

/// Writes `input_file` as hex text, one 4-byte word per line.
pub fn dump_hex(output_file: &Path, input_file: &Path) -> Result<()> {
    let input = File::open(input_file)
        .io_context(|| format!("Failed to open {}", input_file.display()))?;
    let output = File::create(output_file)
        .io_context(|| format!("Failed to create {}", output_file.display()))?;
    let mut reader = BufReader::new(input);
    let mut writer = BufWriter::new(output);

    let mut word = [0u8; 4];
    loop {
        let n = read_word(&mut reader, &mut word)
            .io_context(|| format!("Failed to read {}", input_file.display()))?;
        if n == 0 {
            break;
        }
        let mut line = String::with_capacity(9);
        for byte in &word[..n] {
            line.push_str(&format!("{:02x}", byte));
        }
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .io_context(|| format!("Failed to write {}", output_file.display()))?;
    }
    writer
        .flush()
        .io_context(|| format!("Failed to write {}", output_file.display()))
}

fn read_word<R: Read>(reader: &mut R, word: &mut [u8; 4]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < word.len() {
        match reader.read(&mut word[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HarnessConfig {
        let mut config = HarnessConfig::with_project_top("/proj");
        config.compiler_dir = PathBuf::from("/cc");
        config
    }

    #[test]
    fn assembly_sources_skip_libraries() {
        let args = compiler_args(&config(), &["test.S"], &BuildOptions::default());
        assert_eq!(args, vec!["-o", "obj/program.elf", "-w", "-O3", "test.S"]);
    }

    #[test]
    fn c_sources_link_bare_metal_runtime() {
        let args = compiler_args(&config(), &["main.c"], &BuildOptions::default());
        assert!(args.contains(&"/proj/software/libs/libos/crt0-bare.o".to_string()));
        assert!(args.contains(&"-I/proj/software/libs/libc/include".to_string()));
        assert!(!args.iter().any(|a| a.contains("kern")));
    }

    #[test]
    fn user_images_are_rebased_and_link_kernel_libs() {
        let options = BuildOptions {
            cflags: vec!["-DUSER".to_string()],
            ..BuildOptions::image(ImageType::User)
        };
        let args = compiler_args(&config(), &["prog.cpp"], &options);
        assert_eq!(args[4], "-DUSER");
        assert!(args.contains(&"-Wl,--image-base=0x1000".to_string()));
        assert!(args.contains(&"/proj/software/libs/libos/libos-kern.a".to_string()));
    }

    #[test]
    fn raw_images_dump_one_word_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("program.elf");
        let output = dir.path().join("program.hex");
        fs::write(&input, [0x13u8, 0x00, 0x00, 0x00, 0xde, 0xad, 0xbe, 0xef, 0x01]).unwrap();

        dump_hex(&output, &input).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "13000000\ndeadbeef\n01\n");
    }
}
