use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::instrument::{Analyzer, InstrumentModel, DEFAULT_CALIBRATION_MZ};
use crate::error::{IsoError, Result};

pub const DEFAULT_THRESHOLD: f64 = 1e-4;
pub const DEFAULT_FFT_THRESHOLD: f64 = 1e-8;
pub const DEFAULT_MIN_ABUNDANCE: f64 = 1e-4;
pub const DEFAULT_POINTS_PER_FWHM: usize = 25;
pub const MIN_POINTS_PER_FWHM: usize = 5;

fn default_relative() -> bool {
    true
}

/// How the final peaks of an isotope distribution are chosen.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Selection {
    /// Keep peaks whose probability exceeds `threshold`, relative to the
    /// most probable peak when `relative` is set.
    Threshold {
        threshold: f64,
        #[serde(default = "default_relative")]
        relative: bool,
    },
    /// Keep the most probable peaks until their probabilities add up to `desired_prob`.
    Coverage { desired_prob: f64 },
}

impl Selection {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Selection::Threshold { threshold, .. } if !(0.0..1.0).contains(&threshold) => Err(
                IsoError::InvalidParameter(format!("threshold must be in [0, 1), got {}", threshold)),
            ),
            Selection::Coverage { desired_prob } if !(desired_prob > 0.0 && desired_prob <= 1.0) => Err(
                IsoError::InvalidParameter(format!("desired_prob must be in (0, 1], got {}", desired_prob)),
            ),
            _ => Ok(()),
        }
    }
}

pub(crate) fn validate_fft_threshold(fft_threshold: f64) -> Result<()> {
    if !(0.0..1.0).contains(&fft_threshold) {
        return Err(IsoError::InvalidParameter(format!("fft_threshold must be in [0, 1), got {}", fft_threshold)));
    }
    Ok(())
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Threshold { threshold: DEFAULT_THRESHOLD, relative: true }
    }
}

/// Parameters of the isotope pattern calculation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsotopeSettings {
    pub selection: Selection,
    /// Intermediate combinations below this probability are pruned.
    pub fft_threshold: f64,
    /// Overrides the charge parsed from the formula.
    pub charge: Option<i32>,
    /// Scale the result so that the largest peak is 1.0.
    pub normalize: bool,
}

impl Default for IsotopeSettings {
    fn default() -> Self {
        IsotopeSettings {
            selection: Selection::default(),
            fft_threshold: DEFAULT_FFT_THRESHOLD,
            charge: None,
            normalize: true,
        }
    }
}

impl IsotopeSettings {
    /// Relative threshold selection with the given pruning level.
    ///
    /// # Example
    ///
    /// ```
    /// use isocalc::settings::{IsotopeSettings, Selection};
    ///
    /// let settings = IsotopeSettings::with_threshold(1e-3, 1e-9);
    /// assert_eq!(settings.selection, Selection::Threshold { threshold: 1e-3, relative: true });
    /// assert!(settings.validate().is_ok());
    /// ```
    pub fn with_threshold(threshold: f64, fft_threshold: f64) -> Self {
        IsotopeSettings {
            selection: Selection::Threshold { threshold, relative: true },
            fft_threshold,
            ..IsotopeSettings::default()
        }
    }

    /// Coverage selection with the default pruning level.
    pub fn with_coverage(desired_prob: f64) -> Self {
        IsotopeSettings { selection: Selection::Coverage { desired_prob }, ..IsotopeSettings::default() }
    }

    pub fn validate(&self) -> Result<()> {
        validate_fft_threshold(self.fft_threshold)?;
        self.selection.validate()
    }
}

/// Parameters of envelope centroiding.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentroidSettings {
    /// Peaks and centroids weaker than this fraction of the strongest one are dropped.
    pub min_abundance: f64,
    /// Raster samples per full width at half maximum.
    pub points_per_fwhm: usize,
}

impl Default for CentroidSettings {
    fn default() -> Self {
        CentroidSettings { min_abundance: DEFAULT_MIN_ABUNDANCE, points_per_fwhm: DEFAULT_POINTS_PER_FWHM }
    }
}

impl CentroidSettings {
    pub fn new(min_abundance: f64, points_per_fwhm: usize) -> Result<Self> {
        let settings = CentroidSettings { min_abundance, points_per_fwhm };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.min_abundance) {
            return Err(IsoError::InvalidParameter(format!(
                "min_abundance must be in [0, 1), got {}",
                self.min_abundance
            )));
        }
        if self.points_per_fwhm < MIN_POINTS_PER_FWHM {
            return Err(IsoError::InvalidParameter(format!(
                "points_per_fwhm must be at least {}, got {}",
                MIN_POINTS_PER_FWHM, self.points_per_fwhm
            )));
        }
        Ok(())
    }
}

/// Serializable description of an [`InstrumentModel`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    pub analyzer: Analyzer,
    pub resolving_power: f64,
    pub at_mz: f64,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        InstrumentSettings { analyzer: Analyzer::Orbitrap, resolving_power: 140000.0, at_mz: DEFAULT_CALIBRATION_MZ }
    }
}

impl InstrumentSettings {
    pub fn model(&self) -> Result<InstrumentModel> {
        InstrumentModel::new(self.analyzer, self.resolving_power, self.at_mz)
    }
}

/// All settings of a run, as read from a JSON file.
///
/// # Example
///
/// ```
/// use isocalc::settings::{Selection, Settings};
///
/// let settings = Settings::from_json_str(r#"{
///     "isotope": { "selection": { "mode": "coverage", "desired_prob": 0.99 } },
///     "instrument": { "analyzer": "fticr", "resolving_power": 500000.0 }
/// }"#).unwrap();
/// assert_eq!(settings.isotope.selection, Selection::Coverage { desired_prob: 0.99 });
/// assert_eq!(settings.instrument.at_mz, 200.0);
/// assert_eq!(settings.centroid.points_per_fwhm, 25);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub isotope: IsotopeSettings,
    pub centroid: CentroidSettings,
    pub instrument: InstrumentSettings,
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|e| IsoError::InvalidParameter(format!("malformed settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| IsoError::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;
        Settings::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.isotope.validate()?;
        self.centroid.validate()?;
        self.instrument.model().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.isotope.fft_threshold, 1e-8);
        assert_eq!(settings.isotope.selection, Selection::Threshold { threshold: 1e-4, relative: true });
        assert_eq!(settings.centroid.min_abundance, 1e-4);
        assert_eq!(settings.centroid.points_per_fwhm, 25);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_threshold_relative_defaults_to_true() {
        let settings = Settings::from_json_str(r#"{"isotope": {"selection": {"mode": "threshold", "threshold": 0.01}}}"#)
            .unwrap();
        assert_eq!(settings.isotope.selection, Selection::Threshold { threshold: 0.01, relative: true });
    }

    #[test]
    fn test_centroid_validation() {
        assert_eq!(CentroidSettings::new(1e-4, 3).unwrap_err().kind(), ErrorKind::InvalidParameter);
        assert_eq!(CentroidSettings::new(1.0, 25).unwrap_err().kind(), ErrorKind::InvalidParameter);
        assert!(CentroidSettings::new(0.0, 5).is_ok());
    }

    #[test]
    fn test_invalid_json() {
        let err = Settings::from_json_str(r#"{"instrument": {"analyzer": "quadrupole"}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        let err = Settings::from_json_str(r#"{"isotope": {"fft_threshold": 2.0}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"centroid": {{"points_per_fwhm": 50}}, "isotope": {{"charge": 2}}}}"#).unwrap();
        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.centroid.points_per_fwhm, 50);
        assert_eq!(settings.isotope.charge, Some(2));

        let err = Settings::from_path("/nonexistent/settings.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
