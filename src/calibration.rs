use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{HubResult, SmartHubError};

pub const IN_TO_M: f64 = 0.0254;
pub const DEFAULT_WHEEL_DIAMETER_IN: f64 = 24.0;
pub const DEFAULT_WHEEL_TRACK_IN: f64 = 26.0;
pub const DEFAULT_DEADBAND: f64 = 0.03;

/// Wheel geometry and per-wheel gyro gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub wheel_diameter_in: f64,
    /// Distance between the two wheel contact points
    pub wheel_track_in: f64,
    pub gain_left: f64,
    pub gain_right: f64,
    /// Wheel rates at or below this magnitude (after gains) count as still; 0 disables
    pub deadband: f64,
}

impl Calibration {
    pub fn new(wheel_diameter_in: f64, wheel_track_in: f64, gain_left: f64, gain_right: f64) -> HubResult<Self> {
        let calibration = Self {
            wheel_diameter_in,
            wheel_track_in,
            gain_left,
            gain_right,
            deadband: DEFAULT_DEADBAND,
        };
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn validate(&self) -> HubResult<()> {
        if !(self.wheel_diameter_in.is_finite() && self.wheel_diameter_in > 0.0) {
            return Err(SmartHubError::InvalidParameters(format!(
                "wheel diameter must be positive, got {}",
                self.wheel_diameter_in
            )));
        }
        if !(self.wheel_track_in.is_finite() && self.wheel_track_in > 0.0) {
            return Err(SmartHubError::InvalidParameters(format!(
                "wheel track must be positive, got {}",
                self.wheel_track_in
            )));
        }
        if !self.gain_left.is_finite() || !self.gain_right.is_finite() {
            return Err(SmartHubError::InvalidParameters(
                "gyro gains must be finite".to_string(),
            ));
        }
        if !(self.deadband.is_finite() && self.deadband >= 0.0) {
            return Err(SmartHubError::InvalidParameters(format!(
                "deadband must not be negative, got {}",
                self.deadband
            )));
        }
        Ok(())
    }

    pub fn with_deadband(mut self, deadband: f64) -> HubResult<Self> {
        self.deadband = deadband;
        self.validate()?;
        Ok(self)
    }

    /// Apply the gain for one wheel and zero it inside the deadband
    pub fn wheel_rate(&self, raw: f64, gain: f64) -> f64 {
        let rate = raw * gain;
        if rate.abs() > self.deadband {
            rate
        } else {
            0.0
        }
    }

    pub fn wheel_radius_m(&self) -> f64 {
        self.wheel_diameter_in / 2.0 * IN_TO_M
    }

    pub fn wheel_track_m(&self) -> f64 {
        self.wheel_track_in * IN_TO_M
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            wheel_diameter_in: DEFAULT_WHEEL_DIAMETER_IN,
            wheel_track_in: DEFAULT_WHEEL_TRACK_IN,
            gain_left: 1.0,
            gain_right: 1.0,
            deadband: DEFAULT_DEADBAND,
        }
    }
}

/// Named calibration profiles with an optional selection.
///
/// With nothing selected the default wheel geometry is used.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    profiles: BTreeMap<String, Calibration>,
    selected: Option<String>,
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load profiles from a JSON object of `{ name: calibration }`
    pub fn load(path: &Path) -> HubResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> HubResult<Self> {
        let profiles: BTreeMap<String, Calibration> = serde_json::from_str(json)?;
        let mut store = Self::new();
        for (name, calibration) in profiles {
            store.insert(name, calibration)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, name: impl Into<String>, calibration: Calibration) -> HubResult<()> {
        calibration.validate()?;
        self.profiles.insert(name.into(), calibration);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Calibration> {
        self.profiles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn select(&mut self, name: &str) -> HubResult<()> {
        if !self.profiles.contains_key(name) {
            return Err(SmartHubError::UnknownCalibration(name.to_string()));
        }
        self.selected = Some(name.to_string());
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Selected profile, or the default geometry when none is selected
    pub fn active(&self) -> Calibration {
        self.selected
            .as_ref()
            .and_then(|name| self.profiles.get(name))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let cal = Calibration::default();
        assert_eq!(cal.wheel_diameter_in, 24.0);
        assert_eq!(cal.wheel_track_in, 26.0);
        assert!((cal.wheel_radius_m() - 0.3048).abs() < 1e-12);
        assert!((cal.wheel_track_m() - 0.6604).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_geometry_rejected() {
        assert!(Calibration::new(0.0, 26.0, 1.0, 1.0).is_err());
        assert!(Calibration::new(24.0, -1.0, 1.0, 1.0).is_err());
        assert!(Calibration::new(24.0, 26.0, f64::NAN, 1.0).is_err());
        assert!(Calibration::new(25.0, 27.0, 1.1, 0.9).is_ok());
    }

    #[test]
    fn test_deadband_applied_after_gain() {
        let cal = Calibration::default();
        assert_eq!(cal.deadband, DEFAULT_DEADBAND);
        assert_eq!(cal.wheel_rate(0.02, 1.0), 0.0);
        assert_eq!(cal.wheel_rate(-0.03, 1.0), 0.0);
        // Gain pushes the rate over the threshold
        assert_eq!(cal.wheel_rate(0.02, 2.0), 0.04);
        assert_eq!(cal.wheel_rate(-0.5, 1.0), -0.5);

        let off = cal.with_deadband(0.0).unwrap();
        assert_eq!(off.wheel_rate(0.001, 1.0), 0.001);
        assert!(cal.with_deadband(-0.1).is_err());
    }

    #[test]
    fn test_store_falls_back_to_default() {
        let store = CalibrationStore::new();
        assert_eq!(store.active(), Calibration::default());
        assert!(store.selected_name().is_none());
    }

    #[test]
    fn test_store_select_profile() {
        let mut store = CalibrationStore::new();
        let lab = Calibration::new(25.0, 27.0, 1.13, 1.12).unwrap();
        store.insert("lab", lab).unwrap();

        assert!(matches!(
            store.select("missing"),
            Err(SmartHubError::UnknownCalibration(_))
        ));
        store.select("lab").unwrap();
        assert_eq!(store.active(), lab);

        store.clear_selection();
        assert_eq!(store.active(), Calibration::default());
    }

    #[test]
    fn test_store_from_json_partial_fields() {
        let json = r#"{
            "everyday": { "wheel_diameter_in": 25.0, "gain_left": 1.05 },
            "sport": { "wheel_diameter_in": 24.0, "wheel_track_in": 30.0, "gain_left": 1.0, "gain_right": 0.98 }
        }"#;
        let store = CalibrationStore::from_json(json).unwrap();

        let everyday = store.get("everyday").unwrap();
        assert_eq!(everyday.wheel_diameter_in, 25.0);
        assert_eq!(everyday.wheel_track_in, DEFAULT_WHEEL_TRACK_IN);
        assert_eq!(everyday.gain_right, 1.0);
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["everyday", "sport"]);
    }

    #[test]
    fn test_store_rejects_invalid_profile() {
        let json = r#"{ "broken": { "wheel_track_in": 0.0 } }"#;
        assert!(matches!(
            CalibrationStore::from_json(json),
            Err(SmartHubError::InvalidParameters(_))
        ));
    }
}
