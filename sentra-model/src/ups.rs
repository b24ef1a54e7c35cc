//! UPS status as reported by NUT (Network UPS Tools).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsStatus {
    /// Raw NUT status code, e.g. `OL`, `OB`, `OL CHRG`.
    pub status: String,
    /// Human-readable form of `status`, see [`nut_status_label`].
    pub status_label: String,
    pub battery_charge_pct: f64,
    pub load_pct: f64,
    pub runtime_secs: u64,
    pub model: String,
}

impl UpsStatus {
    pub fn with_status(status: impl Into<String>) -> Self {
        let status = status.into();
        let status_label = nut_status_label(&status);
        Self {
            status,
            status_label,
            ..Default::default()
        }
    }
}

/// Maps a NUT status code to a human-readable label. Compound codes
/// (`"OL CHRG"`) are mapped token-by-token and joined with `", "`.
/// Unknown tokens pass through verbatim.
pub fn nut_status_label(code: &str) -> String {
    code.split_whitespace()
        .map(|token| match token {
            "OL" => "Online",
            "OB" => "On Battery",
            "LB" => "Low Battery",
            "HB" => "High Battery",
            "RB" => "Replace Battery",
            "CHRG" => "Charging",
            "DISCHRG" => "Discharging",
            "BYPASS" => "Bypass",
            "CAL" => "Calibrating",
            "OFF" => "Offline",
            "OVER" => "Overloaded",
            "TRIM" => "Trimming Voltage",
            "BOOST" => "Boosting Voltage",
            "FSD" => "Forced Shutdown",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(nut_status_label("OL"), "Online");
        assert_eq!(nut_status_label("OB"), "On Battery");
        assert_eq!(nut_status_label("LB"), "Low Battery");
        assert_eq!(nut_status_label("HB"), "High Battery");
        assert_eq!(nut_status_label("RB"), "Replace Battery");
        assert_eq!(nut_status_label("CHRG"), "Charging");
        assert_eq!(nut_status_label("DISCHRG"), "Discharging");
        assert_eq!(nut_status_label("BYPASS"), "Bypass");
        assert_eq!(nut_status_label("CAL"), "Calibrating");
        assert_eq!(nut_status_label("OFF"), "Offline");
        assert_eq!(nut_status_label("OVER"), "Overloaded");
        assert_eq!(nut_status_label("TRIM"), "Trimming Voltage");
        assert_eq!(nut_status_label("BOOST"), "Boosting Voltage");
        assert_eq!(nut_status_label("FSD"), "Forced Shutdown");
    }

    #[test]
    fn test_unknown_code_passes_through() {
        assert_eq!(nut_status_label("WEIRD"), "WEIRD");
    }

    #[test]
    fn test_compound_code() {
        assert_eq!(nut_status_label("OL CHRG"), "Online, Charging");
        assert_eq!(nut_status_label("OB DISCHRG LB"), "On Battery, Discharging, Low Battery");
    }

    #[test]
    fn test_with_status_fills_label() {
        let ups = UpsStatus::with_status("OB");
        assert_eq!(ups.status_label, "On Battery");
    }
}
