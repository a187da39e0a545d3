use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// An execution target a test program can be run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    /// Cycle-accurate hardware model.
    #[value(name = "verilator", alias = "simulator")]
    #[serde(rename = "verilator", alias = "simulator")]
    Simulator,
    /// Instruction set emulator.
    #[value(name = "emulator")]
    Emulator,
    /// Physical board reached through the serial boot loader.
    #[value(name = "fpga", alias = "physical-device")]
    #[serde(rename = "fpga", alias = "physical-device")]
    Fpga,
}

impl Target {
    /// Targets a test is valid for when registered without an explicit list.
    pub const ALL: [Target; 2] = [Target::Simulator, Target::Emulator];

    /// Targets run when the caller does not restrict them.
    pub const DEFAULT: [Target; 2] = [Target::Simulator, Target::Emulator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Simulator => "verilator",
            Target::Emulator => "emulator",
            Target::Fpga => "fpga",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Target as ValueEnum>::from_str(s, true)
    }
}
