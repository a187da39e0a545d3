//! Shared fixtures: a fake toolchain and fake targets written as shell scripts
//! into a temporary directory.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use simtest::config::HarnessConfig;
use tempfile::TempDir;

/// Records the source list into the output file so the fake targets can see
/// which program they are "running". Sources named `*broken*` fail to build.
const FAKE_CLANG: &str = r#"#!/bin/sh
out=""
srcs=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) shift; out="$1" ;;
    -*) ;;
    *.c|*.cpp|*.S) srcs="$srcs $1" ;;
  esac
  shift
done
case "$srcs" in
  *broken*) echo "broken.c:1:1: error: expected expression"; exit 1 ;;
esac
echo "$srcs" > "$out"
"#;

const FAKE_ELF2HEX: &str = r#"#!/bin/sh
cp "$3" "$2"
"#;

/// Prints the contents of each listed source's `OUT:` lines, crashes on
/// programs named `*crash*` and hangs on programs named `*hang*`.
const FAKE_EMULATOR: &str = r#"#!/bin/sh
for last; do :; done
image="$last"
case "$image" in +bin=*) image="${image#+bin=}" ;; esac
for src in $(cat "$image"); do
  case "$src" in
    *crash*) echo "unhandled exception"; exit 3 ;;
    *hang*) exec sleep 30 ;;
  esac
  sed -n 's/.*OUT: //p' "$src"
done
"#;

/// Records its arguments next to the image it creates.
const FAKE_MKFS: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$1.args"
: > "$1"
"#;

pub struct FakeTools {
    pub dir: TempDir,
}

impl FakeTools {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools");
        fs::create_dir_all(&tools).unwrap();
        write_script(&tools.join("clang"), FAKE_CLANG);
        write_script(&tools.join("elf2hex"), FAKE_ELF2HEX);
        write_script(&tools.join("emulator"), FAKE_EMULATOR);
        write_script(&tools.join("mkfs"), FAKE_MKFS);
        write_script(
            &tools.join("verilator_model"),
            &format!("{}echo '***HALTED***'\n", FAKE_EMULATOR),
        );
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn tools(&self) -> PathBuf {
        self.root().join("tools")
    }

    /// Replaces the hardware model with one that exits without printing the
    /// halt marker.
    pub fn model_without_halt(&self) {
        write_script(&self.tools().join("verilator_model"), FAKE_EMULATOR);
    }

    /// Replaces the hardware model with one that never exits.
    pub fn model_that_hangs(&self) {
        write_script(&self.tools().join("verilator_model"), "#!/bin/sh\nexec sleep 30\n");
    }

    /// A configuration pointing at the fake tools, with an absolute scratch
    /// directory so parallel tests do not share `obj/`.
    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::with_project_top(self.root());
        config.compiler_dir = self.tools();
        config.bin_dir = self.tools();
        config.obj_dir = self.root().join("obj");
        config.default_timeout = 5.0;
        config.build_timeout = 5.0;
        config.use_colors = false;
        config
    }

    /// Writes a test source and returns its absolute path as a string.
    pub fn source(&self, name: &str, contents: &str) -> String {
        let path = self.root().join(name);
        fs::write(&path, contents).unwrap();
        path.display().to_string()
    }
}

pub fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}
