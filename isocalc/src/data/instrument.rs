use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chemistry::constants::FWHM_TO_SIGMA;
use crate::error::{IsoError, Result};

/// Default m/z at which resolving power is specified.
pub const DEFAULT_CALIBRATION_MZ: f64 = 200.0;

/// Mass analyzer families, each with its own scaling of resolving power with m/z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analyzer {
    /// Orbital trap: resolving power falls with the square root of m/z.
    Orbitrap,
    /// Ion cyclotron resonance: resolving power falls linearly with m/z.
    Fticr,
    /// Time of flight: resolving power is constant over the mass range.
    Tof,
}

impl FromStr for Analyzer {
    type Err = IsoError;

    /// Parses an analyzer tag, ignoring case.
    ///
    /// # Example
    ///
    /// ```
    /// use isocalc::data::instrument::Analyzer;
    ///
    /// assert_eq!("Orbitrap".parse::<Analyzer>().unwrap(), Analyzer::Orbitrap);
    /// assert_eq!("FTICR".parse::<Analyzer>().unwrap(), Analyzer::Fticr);
    /// assert!("quadrupole".parse::<Analyzer>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orbitrap" => Ok(Analyzer::Orbitrap),
            "fticr" => Ok(Analyzer::Fticr),
            "tof" => Ok(Analyzer::Tof),
            other => Err(IsoError::InvalidParameter(format!(
                "unknown analyzer '{}', expected one of orbitrap, fticr, tof",
                other
            ))),
        }
    }
}

impl Display for Analyzer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Analyzer::Orbitrap => write!(f, "orbitrap"),
            Analyzer::Fticr => write!(f, "fticr"),
            Analyzer::Tof => write!(f, "tof"),
        }
    }
}

/// Resolving power of an instrument as a function of m/z.
///
/// Immutable after construction: the analyzer family and one calibration
/// point (`resolving_power` measured at `at_mz`) define the whole curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentModel {
    analyzer: Analyzer,
    resolving_power: f64,
    at_mz: f64,
}

impl InstrumentModel {
    /// Creates an instrument model from a calibration point.
    ///
    /// # Arguments
    ///
    /// * `analyzer` - The analyzer family.
    /// * `resolving_power` - Resolving power measured at `at_mz`, must be positive.
    /// * `at_mz` - The m/z of the calibration point, must be positive.
    pub fn new(analyzer: Analyzer, resolving_power: f64, at_mz: f64) -> Result<Self> {
        if !(resolving_power.is_finite() && resolving_power > 0.0) {
            return Err(IsoError::InvalidParameter(format!(
                "resolving power must be positive, got {}",
                resolving_power
            )));
        }
        if !(at_mz.is_finite() && at_mz > 0.0) {
            return Err(IsoError::InvalidParameter(format!("calibration m/z must be positive, got {}", at_mz)));
        }
        Ok(InstrumentModel { analyzer, resolving_power, at_mz })
    }

    /// Creates an instrument model from a case-insensitive analyzer tag.
    ///
    /// # Example
    ///
    /// ```
    /// use isocalc::data::instrument::InstrumentModel;
    ///
    /// let orbitrap = InstrumentModel::from_tag("orbitrap", 140000.0, 200.0).unwrap();
    /// assert!((orbitrap.resolving_power_at(800.0) - 70000.0).abs() < 1e-6);
    /// assert!(InstrumentModel::from_tag("magnetic", 1000.0, 200.0).is_err());
    /// ```
    pub fn from_tag(tag: &str, resolving_power: f64, at_mz: f64) -> Result<Self> {
        InstrumentModel::new(tag.parse()?, resolving_power, at_mz)
    }

    pub fn analyzer(&self) -> Analyzer {
        self.analyzer
    }

    pub fn resolving_power(&self) -> f64 {
        self.resolving_power
    }

    pub fn at_mz(&self) -> f64 {
        self.at_mz
    }

    pub fn resolving_power_at(&self, mz: f64) -> f64 {
        match self.analyzer {
            Analyzer::Orbitrap => self.resolving_power * (self.at_mz / mz).sqrt(),
            Analyzer::Fticr => self.resolving_power * self.at_mz / mz,
            Analyzer::Tof => self.resolving_power,
        }
    }

    /// Full width at half maximum of a peak at `mz`.
    pub fn fwhm_at(&self, mz: f64) -> f64 {
        mz / self.resolving_power_at(mz)
    }

    /// Standard deviation of the Gaussian peak shape at `mz`.
    pub fn sigma_at(&self, mz: f64) -> f64 {
        self.fwhm_at(mz) / FWHM_TO_SIGMA
    }
}
