//! Maps `Box<dyn Error>` from trait boundaries to typed `TitratorError`.
//!
//! The traits in `titrator_traits` use `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed error enum,
//! with an optional feature-gated path for `titrator_hardware::HwError`
//! downcasting.

use crate::error::TitratorError;

/// Map a trait-boundary error to a typed `TitratorError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> TitratorError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<titrator_hardware::error::HwError>() {
            return match hw {
                titrator_hardware::error::HwError::Timeout => TitratorError::Timeout,
                other => TitratorError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        TitratorError::Timeout
    } else {
        // Pin/wave I/O failures are fatal for the move in flight.
        TitratorError::HardwareFault(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_hardware_fault() {
        let e = std::io::Error::other("dma unavailable");
        assert!(matches!(
            map_hw_error(&e),
            TitratorError::HardwareFault(msg) if msg.contains("dma")
        ));
    }

    #[test]
    fn timeout_text_maps_to_timeout() {
        let e = std::io::Error::other("conversion timeout");
        assert!(matches!(map_hw_error(&e), TitratorError::Timeout));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hw_errors_downcast_precisely() {
        use titrator_hardware::error::HwError;
        assert!(matches!(
            map_hw_error(&HwError::Timeout),
            TitratorError::Timeout
        ));
        assert!(matches!(
            map_hw_error(&HwError::Gpio("pin busy".into())),
            TitratorError::HardwareFault(_)
        ));
    }
}
