use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::algorithm::centroid::centroid_profile;
use crate::algorithm::envelope::{envelope_centroids, Envelope};
use crate::chemistry::constants::MASS_ELECTRON;
use crate::data::instrument::InstrumentModel;
use crate::error::{IsoError, Result};
use crate::settings::CentroidSettings;

/// Which kind of data a [`Spectrum`] holds.
///
/// # Description
///
/// All kinds share the same storage and the same basic operations; a few
/// operations are only meaningful for some kinds and check the tag first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectrumKind {
    /// Isotopic peaks computed from a composition, intensities are probabilities or abundances.
    Theoretical,
    /// Dense, quasi-uniformly sampled signal, possibly with zero-intensity gaps.
    Profile,
    /// Discrete peaks extracted from one of the other two.
    Centroided,
}

impl Display for SpectrumKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SpectrumKind::Theoretical => write!(f, "Theoretical"),
            SpectrumKind::Profile => write!(f, "Profile"),
            SpectrumKind::Centroided => write!(f, "Centroided"),
        }
    }
}

/// Represents a mass spectrum with associated masses and intensities.
///
/// Every spectrum owns its peak storage; cloning is a deep copy, so spectra
/// returned by independent calls never alias each other.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    kind: SpectrumKind,
    mz: Vec<f64>,
    intensity: Vec<f64>,
}

impl Spectrum {
    /// Constructs a new `Spectrum` of the given kind, validating the arrays.
    ///
    /// # Arguments
    ///
    /// * `kind` - The kind of data held.
    /// * `mz` - A vector of masses.
    /// * `intensity` - A vector of non-negative intensities, one per mass.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use isocalc::data::spectrum::{Spectrum, SpectrumKind};
    /// let spectrum = Spectrum::new(SpectrumKind::Centroided, vec![100.0, 200.0], vec![10.0, 20.0]).unwrap();
    /// assert_eq!(spectrum.masses(), &[100.0, 200.0]);
    /// assert!(Spectrum::new(SpectrumKind::Centroided, vec![100.0], vec![]).is_err());
    /// ```
    pub fn new(kind: SpectrumKind, mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        if mz.len() != intensity.len() {
            return Err(IsoError::InvalidInput(format!(
                "mass array has {} entries but intensity array has {}",
                mz.len(),
                intensity.len()
            )));
        }
        if let Some(m) = mz.iter().find(|m| !m.is_finite()) {
            return Err(IsoError::InvalidInput(format!("mass {} is not finite", m)));
        }
        if let Some(i) = intensity.iter().find(|i| !i.is_finite() || **i < 0.0) {
            return Err(IsoError::InvalidInput(format!("intensity {} is not a finite non-negative number", i)));
        }
        Ok(Spectrum { kind, mz, intensity })
    }

    /// Constructs a profile spectrum from raw arrays, sorted by mass.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use isocalc::data::spectrum::Spectrum;
    /// let profile = Spectrum::profile(vec![100.2, 100.0, 100.1], vec![1.0, 0.0, 3.0]).unwrap();
    /// assert_eq!(profile.masses(), &[100.0, 100.1, 100.2]);
    /// assert_eq!(profile.intensities(), &[0.0, 3.0, 1.0]);
    /// ```
    pub fn profile(mz: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        let mut spectrum = Spectrum::new(SpectrumKind::Profile, mz, intensity)?;
        spectrum.sort_by_mass();
        Ok(spectrum)
    }

    /// Builds a spectrum from engine-produced (mass, intensity) pairs.
    pub(crate) fn from_peaks(kind: SpectrumKind, peaks: Vec<(f64, f64)>) -> Self {
        let (mz, intensity) = peaks.into_iter().unzip();
        Spectrum { kind, mz, intensity }
    }

    pub fn kind(&self) -> SpectrumKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    pub fn masses(&self) -> &[f64] {
        &self.mz
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensity
    }

    /// Iterates over (mass, intensity) pairs in storage order.
    pub fn peaks(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }

    pub fn max_intensity(&self) -> f64 {
        self.intensity.iter().copied().fold(0.0, f64::max)
    }

    /// Intensities scaled so that the largest one is 1.0.
    pub fn abundances(&self) -> Vec<f64> {
        let max = self.max_intensity();
        if max <= 0.0 {
            return self.intensity.clone();
        }
        self.intensity.iter().map(|i| i / max).collect()
    }

    /// Intensities as stored; for a theoretical spectrum computed without
    /// normalization these are the isotopologue probabilities.
    pub fn probabilities(&self) -> &[f64] {
        &self.intensity
    }

    /// A copy holding [`Spectrum::abundances`] as its intensities.
    pub fn normalized(&self) -> Spectrum {
        Spectrum { kind: self.kind, mz: self.mz.clone(), intensity: self.abundances() }
    }

    /// Writes the masses into a caller-provided buffer of matching length.
    pub fn copy_masses_into(&self, out: &mut [f64]) -> Result<()> {
        copy_into(&self.mz, out)
    }

    /// Writes the intensities into a caller-provided buffer of matching length.
    pub fn copy_intensities_into(&self, out: &mut [f64]) -> Result<()> {
        copy_into(&self.intensity, out)
    }

    fn reorder(&mut self, order: &[usize]) {
        self.mz = order.iter().map(|&i| self.mz[i]).collect();
        self.intensity = order.iter().map(|&i| self.intensity[i]).collect();
    }

    /// Stable sort by ascending mass.
    pub fn sort_by_mass(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.mz[a].total_cmp(&self.mz[b]));
        self.reorder(&order);
    }

    /// Stable sort by ascending intensity.
    pub fn sort_by_intensity(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.intensity[a].total_cmp(&self.intensity[b]));
        self.reorder(&order);
    }

    pub fn sorted_by_mass(&self) -> Spectrum {
        let mut copy = self.clone();
        copy.sort_by_mass();
        copy
    }

    pub fn sorted_by_intensity(&self) -> Spectrum {
        let mut copy = self.clone();
        copy.sort_by_intensity();
        copy
    }

    /// Keeps the `n_peaks` most intense peaks, leaving them in descending intensity order.
    ///
    /// Does nothing when the spectrum has at most `n_peaks` peaks.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use isocalc::data::spectrum::{Spectrum, SpectrumKind};
    /// let mut spectrum = Spectrum::new(SpectrumKind::Centroided, vec![1.0, 2.0, 3.0], vec![5.0, 9.0, 7.0]).unwrap();
    /// spectrum.trim(2);
    /// assert_eq!(spectrum.masses(), &[2.0, 3.0]);
    /// ```
    pub fn trim(&mut self, n_peaks: usize) {
        if n_peaks >= self.len() {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.intensity[b].total_cmp(&self.intensity[a]));
        order.truncate(n_peaks);
        self.reorder(&order);
    }

    pub fn trimmed(&self, n_peaks: usize) -> Spectrum {
        let mut copy = self.clone();
        copy.trim(n_peaks);
        copy
    }

    /// Adds `charge` positive charges by removing that many electron masses;
    /// a negative `charge` adds electron masses back. Intensities are untouched.
    pub fn add_charge(&mut self, charge: i32) {
        let shift = -(charge as f64) * MASS_ELECTRON;
        self.mz.iter_mut().for_each(|m| *m += shift);
    }

    pub fn charged(&self, charge: i32) -> Spectrum {
        let mut copy = self.clone();
        copy.add_charge(charge);
        copy
    }

    /// Scales all intensities by a finite, non-negative factor.
    pub fn multiply(&mut self, factor: f64) -> Result<()> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(IsoError::InvalidParameter(format!(
                "scaling factor must be finite and non-negative, got {}",
                factor
            )));
        }
        self.intensity.iter_mut().for_each(|i| *i *= factor);
        Ok(())
    }

    /// Merges the peaks of another theoretical spectrum into this one by concatenation.
    ///
    /// This is a union of peak lists for mixtures, peaks are not combined or convolved.
    pub fn add_spectrum(&mut self, other: &Spectrum) -> Result<()> {
        if self.kind != SpectrumKind::Theoretical || other.kind != SpectrumKind::Theoretical {
            return Err(IsoError::InvalidInput(format!(
                "only theoretical spectra can be merged, got {} and {}",
                self.kind, other.kind
            )));
        }
        self.mz.extend_from_slice(&other.mz);
        self.intensity.extend_from_slice(&other.intensity);
        Ok(())
    }

    /// Drops every peak whose intensity is below `min_intensity`.
    pub fn remove_intensities_below(&mut self, min_intensity: f64) -> Result<()> {
        if min_intensity.is_nan() {
            return Err(IsoError::InvalidParameter("minimum intensity is NaN".to_string()));
        }
        let keep: Vec<usize> = (0..self.len()).filter(|&i| self.intensity[i] >= min_intensity).collect();
        self.reorder(&keep);
        Ok(())
    }

    /// Detects peaks in profile data with a sliding window of `window_size` samples.
    ///
    /// Samples are taken in mass order whatever order the spectrum is currently in.
    pub fn centroids(&self, window_size: usize) -> Result<Spectrum> {
        self.require_kind(SpectrumKind::Profile, "window centroiding")?;
        if self.mz.windows(2).all(|w| w[0] <= w[1]) {
            return centroid_profile(&self.mz, &self.intensity, window_size);
        }
        let by_mass = self.sorted_by_mass();
        centroid_profile(&by_mass.mz, &by_mass.intensity, window_size)
    }

    /// Estimates the peaks visible on the given instrument by rasterizing and centroiding the envelope.
    pub fn envelope_centroids(&self, instrument: &InstrumentModel, settings: &CentroidSettings) -> Result<Spectrum> {
        envelope_centroids(self, instrument, settings)
    }

    /// The continuous envelope of this spectrum as seen by `instrument`.
    pub fn envelope<'a>(&'a self, instrument: &'a InstrumentModel) -> Result<Envelope<'a>> {
        Envelope::new(self, instrument)
    }

    pub(crate) fn require_kind(&self, kind: SpectrumKind, operation: &str) -> Result<()> {
        if self.kind != kind {
            return Err(IsoError::InvalidInput(format!(
                "{} requires a {} spectrum, got {}",
                operation, kind, self.kind
            )));
        }
        Ok(())
    }
}

fn copy_into(source: &[f64], out: &mut [f64]) -> Result<()> {
    if source.len() != out.len() {
        return Err(IsoError::InvalidInput(format!(
            "buffer holds {} values but the spectrum has {}",
            out.len(),
            source.len()
        )));
    }
    out.copy_from_slice(source);
    Ok(())
}

/// Formats the spectrum as one `mass: percent` line per peak, sorted by mass.
impl Display for Spectrum {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let sorted = self.sorted_by_mass();
        writeln!(f, "{{")?;
        let lines: Vec<String> = sorted
            .peaks()
            .map(|(mz, i)| format!("  {:>9.4}: {:>8.4}%", mz, i * 100.0))
            .collect();
        writeln!(f, "{}", lines.join(",\n"))?;
        write!(f, "}}")
    }
}

impl std::ops::Add for Spectrum {
    type Output = Result<Spectrum>;
    /// Merges two theoretical spectra by concatenating their peaks.
    ///
    /// # Example
    /// ```
    /// # use isocalc::isotope_pattern_default;
    /// let merged = (isotope_pattern_default("H").unwrap() + isotope_pattern_default("O").unwrap()).unwrap();
    /// assert_eq!(merged.len(), 2 + 3);
    /// ```
    fn add(mut self, other: Self) -> Result<Spectrum> {
        self.add_spectrum(&other)?;
        Ok(self)
    }
}

impl std::ops::Mul<f64> for Spectrum {
    type Output = Result<Spectrum>;
    fn mul(mut self, scale: f64) -> Result<Spectrum> {
        self.multiply(scale)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn centroided(mz: Vec<f64>, intensity: Vec<f64>) -> Spectrum {
        Spectrum::new(SpectrumKind::Centroided, mz, intensity).unwrap()
    }

    #[test]
    fn test_sort_is_stable() {
        let mut spectrum = centroided(vec![3.0, 1.0, 2.0, 4.0], vec![1.0, 2.0, 1.0, 0.5]);
        spectrum.sort_by_intensity();
        assert_eq!(spectrum.masses(), &[4.0, 3.0, 2.0, 1.0]);
        spectrum.sort_by_mass();
        assert_eq!(spectrum.intensities(), &[2.0, 1.0, 1.0, 0.5]);
    }

    #[test]
    fn test_trim_keeps_most_intense() {
        let spectrum = centroided(vec![1.0, 2.0, 3.0, 4.0], vec![0.1, 0.4, 0.3, 0.2]);
        let trimmed = spectrum.trimmed(2);
        assert_eq!(trimmed.masses(), &[2.0, 3.0]);
        assert_eq!(trimmed.intensities(), &[0.4, 0.3]);
        // source untouched, trimming beyond size is a no-op
        assert_eq!(spectrum.len(), 4);
        assert_eq!(spectrum.trimmed(10), spectrum);
    }

    #[test]
    fn test_add_charge_shifts_by_electron_mass() {
        let spectrum = centroided(vec![100.0, 101.0], vec![1.0, 0.5]);
        let charged = spectrum.charged(2);
        assert!((charged.masses()[0] - (100.0 - 2.0 * MASS_ELECTRON)).abs() < 1e-12);
        assert_eq!(charged.intensities(), spectrum.intensities());
        let back = charged.charged(-2);
        assert!((back.masses()[1] - 101.0).abs() < 1e-12);
    }

    #[test]
    fn test_multiply_rejects_negative_factor() {
        let mut spectrum = centroided(vec![100.0], vec![2.0]);
        let err = spectrum.multiply(-1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(spectrum.intensities(), &[2.0]);
        spectrum.multiply(3.0).unwrap();
        assert_eq!(spectrum.intensities(), &[6.0]);
    }

    #[test]
    fn test_merge_requires_theoretical() {
        let a = Spectrum::from_peaks(SpectrumKind::Theoretical, vec![(1.0, 1.0)]);
        let b = centroided(vec![2.0], vec![1.0]);
        let err = (a.clone() + b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let merged = (a.clone() + a).unwrap();
        assert_eq!(merged.masses(), &[1.0, 1.0]);
    }

    #[test]
    fn test_remove_intensities_below() {
        let mut spectrum = centroided(vec![1.0, 2.0, 3.0], vec![0.1, 0.5, 0.05]);
        spectrum.remove_intensities_below(0.1).unwrap();
        assert_eq!(spectrum.masses(), &[1.0, 2.0]);
    }

    #[test]
    fn test_abundances_normalize_to_max() {
        let spectrum = centroided(vec![1.0, 2.0], vec![0.2, 0.8]);
        assert_eq!(spectrum.abundances(), vec![0.25, 1.0]);
        assert_eq!(spectrum.normalized().max_intensity(), 1.0);
    }

    #[test]
    fn test_copy_into_checks_length() {
        let spectrum = centroided(vec![1.0, 2.0], vec![0.2, 0.8]);
        let mut buf = [0.0; 2];
        spectrum.copy_masses_into(&mut buf).unwrap();
        assert_eq!(buf, [1.0, 2.0]);
        let mut short = [0.0; 1];
        assert_eq!(spectrum.copy_intensities_into(&mut short).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_profile_rejects_negative_intensity() {
        assert!(Spectrum::profile(vec![1.0, 2.0], vec![1.0, -1.0]).is_err());
    }

    #[test]
    fn test_window_centroiding_requires_profile() {
        let spectrum = centroided(vec![1.0, 2.0, 3.0], vec![0.0, 1.0, 0.0]);
        assert_eq!(spectrum.centroids(3).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_window_centroiding_after_reordering() {
        let mz: Vec<f64> = (0..50).map(|i| 100.0 + i as f64 * 0.01).collect();
        let intensity: Vec<f64> = mz.iter().map(|m| (-(m - 100.25f64).powi(2) / 0.005).exp()).collect();
        let profile = Spectrum::profile(mz, intensity).unwrap();
        let expected = profile.centroids(5).unwrap();
        assert_eq!(expected.len(), 1);

        let mut by_intensity = profile.clone();
        by_intensity.sort_by_intensity();
        assert_eq!(by_intensity.centroids(5).unwrap(), expected);

        let mut trimmed = profile.clone();
        trimmed.trim(20);
        let from_trimmed = trimmed.centroids(5).unwrap();
        assert_eq!(from_trimmed.len(), 1);
        assert!((from_trimmed.masses()[0] - 100.25).abs() < 1e-9);
    }

    #[test]
    fn test_display_lists_peaks_by_mass() {
        let spectrum = centroided(vec![2.0, 1.0], vec![0.5, 1.0]);
        let text = spectrum.to_string();
        let first = text.find("1.0000").unwrap();
        let second = text.find("2.0000").unwrap();
        assert!(first < second);
        assert!(text.contains("100.0000%"));
    }
}
