//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Operator volumes arrive with either decimal separator ("0.1" or "0,1").
pub fn parse_decimal(s: &str) -> Result<f64, String> {
    let normalized = s.replace(',', ".");
    normalized
        .parse::<f64>()
        .map_err(|_| format!("`{s}` is not a number"))
}

#[derive(Parser, Debug)]
#[command(name = "titrator", version, about = "Titrator CLI")]
pub struct Cli {
    /// Path to config TOML; built-in reference wiring when absent
    #[arg(long, value_name = "FILE", default_value = "etc/titrator.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on Linux: attempts SCHED_FIFO priority, pins the process to one CPU, and locks memory to cut page-fault jitter out of pulse timing. May require elevated privileges (CAP_SYS_NICE, memlock ulimit)."
    )]
    pub rt: bool,

    /// SCHED_FIFO priority for --rt (platform range, usually 1..=99)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,

    /// Memory locking mode for --rt: none, current, or all
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,

    /// CPU index to pin to for --rt (default 0)
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        if cfg!(target_os = "linux") {
            RtLock::Current
        } else {
            RtLock::None
        }
    }
}

/// Which port the rotary valve connects to the burette.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ValvePosition {
    /// Reagent bottle, for filling
    Bottle,
    /// Reaction vessel, for dosing
    Vessel,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fill the burette from the reagent bottle
    Fill,
    /// Empty the burette
    Empty,
    /// Rinse the burette: repeated empty + refill cycles
    Rinse {
        /// Number of cycles (config default when omitted)
        #[arg(long)]
        cycles: Option<u32>,
    },
    /// Rotate the valve to the given port
    Valve {
        #[arg(value_enum)]
        position: ValvePosition,
    },
    /// Dispense an exact volume into the vessel
    Dose {
        /// Volume in millilitres (dot or comma decimals)
        #[arg(long, value_parser = parse_decimal, allow_negative_numbers = true)]
        ml: f64,
    },
    /// Dose stepwise until the target pH is reached
    Titrate {
        /// Volume per increment in millilitres (0.05-0.5)
        #[arg(long, value_parser = parse_decimal, allow_negative_numbers = true)]
        step_ml: f64,
        /// Target pH (0-14, two decimals)
        #[arg(long, value_parser = parse_decimal, allow_negative_numbers = true)]
        target_ph: f64,
    },
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_comma_and_dot_decimals() {
        assert_eq!(parse_decimal("0.25").unwrap(), 0.25);
        assert_eq!(parse_decimal("0,25").unwrap(), 0.25);
        assert_eq!(parse_decimal("7").unwrap(), 7.0);
        assert!(parse_decimal("0,2,5").is_err());
        assert!(parse_decimal("abc").is_err());
    }
}
