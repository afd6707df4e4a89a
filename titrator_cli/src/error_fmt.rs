//! Human-readable error descriptions and structured JSON error formatting.

use titrator_core::error::{BuildError, TitratorError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingWaveDevice => {
                "What happened: No waveform unit was provided to a motor axis.\nLikely causes: The step-pin waveform device failed to initialize or was not wired into the builder.\nHow to fix: Ensure the waveform device opens successfully and is passed via wave_device(...).".to_string()
            }
            BuildError::MissingPins => {
                "What happened: A motor axis is missing one or more GPIO pins.\nLikely causes: Direction, enable or sensor pins failed to open, or were not wired into the builder.\nHow to fix: Check the [burette]/[valve] pin numbers in the config and GPIO permissions.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid axis configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<TitratorError>() {
        return match te {
            TitratorError::Timeout => {
                "What happened: The pH probe produced no reading in time.\nLikely causes: ADS1115 not wired correctly, wrong I2C bus/address, or the sampler thread has stalled.\nHow to fix: Verify SDA/SCL wiring and probe.i2c_address in the config, and consider raising probe.sample_timeout_ms.".to_string()
            }
            TitratorError::InvalidInput(msg) => format!(
                "What happened: Invalid input ({msg}).\nLikely causes: A volume or pH argument outside the instrument's range.\nHow to fix: Check the command arguments against the documented ranges and rerun."
            ),
            TitratorError::HardwareFault(msg) => format!(
                "What happened: A hardware operation failed ({msg}).\nLikely causes: GPIO or waveform unit error, loose wiring, or a busy peripheral.\nHow to fix: Check cabling and pin assignments; rerun with --log-level=debug for the failing call."
            ),
            _ => format!(
                "What happened: {te}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open ads1115") || lower.contains("i2c") {
        return "What happened: Failed to open the pH probe ADC.\nLikely causes: I2C disabled, wrong bus number, or wrong device address.\nHow to fix: Enable I2C, then check probe.i2c_bus and probe.i2c_address in the config.".to_string();
    }

    if lower.contains("gpio") || lower.contains("pin") {
        return "What happened: Failed to initialize GPIO pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [burette]/[valve] pin values in the config; ensure the process can access GPIO.".to_string();
    }

    if lower.contains("config") {
        return "What happened: Configuration is invalid or incomplete.\nLikely causes: Missing sections or out-of-range values in the TOML.\nHow to fix: Edit the config file and try again.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: bad input 2, probe timeout 3, hardware fault 4, everything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<TitratorError>() {
        Some(TitratorError::InvalidInput(_)) => 2,
        Some(TitratorError::Timeout) => 3,
        Some(TitratorError::HardwareFault(_)) => 4,
        _ => 1,
    }
}

fn error_reason(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<TitratorError>() {
        Some(TitratorError::InvalidInput(_)) => "InvalidInput",
        Some(TitratorError::Timeout) => "Timeout",
        Some(TitratorError::HardwareFault(_)) => "HardwareFault",
        Some(TitratorError::State(_)) => "State",
        Some(TitratorError::Io(_)) => "Io",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": error_reason(err), "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_gets_exit_code_2() {
        let err = eyre::Report::new(TitratorError::InvalidInput("volume too large".into()));
        assert_eq!(exit_code_for_error(&err), 2);
        assert!(humanize(&err).contains("Invalid input"));
    }

    #[test]
    fn probe_timeout_gets_exit_code_3() {
        let err = eyre::Report::new(TitratorError::Timeout);
        assert_eq!(exit_code_for_error(&err), 3);
    }

    #[test]
    fn json_error_carries_reason_and_message() {
        let err = eyre::Report::new(TitratorError::HardwareFault("wave transmit".into()));
        let parsed: serde_json::Value =
            serde_json::from_str(&format_error_json(&err)).expect("valid json");
        assert_eq!(parsed["reason"], "HardwareFault");
        assert!(parsed["message"].as_str().unwrap().contains("wave transmit"));
    }
}
