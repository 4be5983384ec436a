use itertools::Itertools;
use log::{debug, trace};
use ordered_float::OrderedFloat;
use statrs::distribution::{Continuous, Normal};

use crate::algorithm::centroid::centroid_profile;
use crate::data::instrument::InstrumentModel;
use crate::data::spectrum::{Spectrum, SpectrumKind};
use crate::error::{IsoError, Result};
use crate::settings::CentroidSettings;

/// Half width of the window of peaks summed at a query point, in FWHM of the heaviest peak.
pub const WINDOW_FWHM: f64 = 6.0;

/// Half width of the raster region around each peak when estimating centroids, in FWHM.
pub const REGION_FWHM: f64 = 4.0;

/// Upper bound on the number of samples a single rasterization may produce.
pub const MAX_RASTER_POINTS: usize = 100_000_000;

/// Gaussian line shape of one peak, scaled so that its apex equals the peak intensity.
#[derive(Clone, Debug)]
struct Kernel {
    center: f64,
    scale: f64,
    normal: Normal,
}

impl Kernel {
    fn new(center: f64, intensity: f64, sigma: f64) -> Result<Self> {
        let normal = Normal::new(center, sigma)
            .map_err(|e| IsoError::InvalidParameter(format!("invalid peak shape at m/z {}: {}", center, e)))?;
        let scale = intensity / normal.pdf(center);
        Ok(Kernel { center, scale, normal })
    }

    fn value(&self, mz: f64) -> f64 {
        self.scale * self.normal.pdf(mz)
    }
}

/// Continuous intensity profile of a spectrum as seen by an instrument.
///
/// # Description
///
/// Every peak contributes a Gaussian whose full width at half maximum is
/// `mz / R(mz)` for the instrument's resolving power `R`. Peaks are kept sorted
/// by mass so that a query only sums the peaks within [`WINDOW_FWHM`] widths.
///
/// # Example
///
/// ```
/// use isocalc::data::instrument::{Analyzer, InstrumentModel};
/// use isocalc::isotope_pattern_default;
///
/// let pattern = isotope_pattern_default("C6H12O6").unwrap();
/// let instrument = InstrumentModel::new(Analyzer::Orbitrap, 140000.0, 200.0).unwrap();
/// let envelope = pattern.envelope(&instrument).unwrap();
///
/// let apex = pattern.masses()[0];
/// assert!((envelope.at(apex) - 1.0).abs() < 1e-3);
/// assert!(envelope.evaluate(&[apex + 1.0, apex]).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct Envelope<'a> {
    instrument: &'a InstrumentModel,
    kernels: Vec<Kernel>,
    half_window: f64,
}

impl<'a> Envelope<'a> {
    /// Builds the envelope of a theoretical or centroided spectrum.
    pub fn new(spectrum: &Spectrum, instrument: &'a InstrumentModel) -> Result<Self> {
        if spectrum.kind() == SpectrumKind::Profile {
            return Err(IsoError::InvalidInput(
                "an envelope needs discrete peaks, got a profile spectrum".to_string(),
            ));
        }
        Envelope::from_peaks(spectrum.peaks().collect(), instrument)
    }

    fn from_peaks(mut peaks: Vec<(f64, f64)>, instrument: &'a InstrumentModel) -> Result<Self> {
        peaks.sort_by_key(|p| OrderedFloat(p.0));

        let kernels = peaks
            .iter()
            .map(|&(mz, intensity)| Kernel::new(mz, intensity, instrument.sigma_at(mz)))
            .collect::<Result<Vec<_>>>()?;

        let half_window = peaks
            .last()
            .map(|&(heaviest, _)| WINDOW_FWHM * instrument.fwhm_at(heaviest))
            .unwrap_or(0.0);

        Ok(Envelope { instrument, kernels, half_window })
    }

    pub fn instrument(&self) -> &InstrumentModel {
        self.instrument
    }

    /// Intensity of the envelope at a single m/z.
    pub fn at(&self, mz: f64) -> f64 {
        let first = self.kernels.partition_point(|k| k.center < mz - self.half_window);
        self.kernels[first..]
            .iter()
            .take_while(|k| k.center <= mz + self.half_window)
            .map(|k| k.value(mz))
            .sum()
    }

    /// Evaluates the envelope at every m/z of an ascending array.
    ///
    /// Arguments:
    ///
    /// * `mzs` - query points, sorted ascending
    ///
    /// Returns:
    ///
    /// * `Result<Vec<f64>>` - intensities, `InvalidInput` if `mzs` is not sorted
    pub fn evaluate(&self, mzs: &[f64]) -> Result<Vec<f64>> {
        let mut out = vec![0.0; mzs.len()];
        self.evaluate_into(mzs, &mut out)?;
        Ok(out)
    }

    /// Evaluates the envelope into a caller-provided buffer of the same length as `mzs`.
    ///
    /// The buffer is left untouched when the input is rejected.
    pub fn evaluate_into(&self, mzs: &[f64], out: &mut [f64]) -> Result<()> {
        if mzs.len() != out.len() {
            return Err(IsoError::InvalidInput(format!(
                "buffer holds {} values but {} m/z values were given",
                out.len(),
                mzs.len()
            )));
        }
        if mzs.iter().any(|m| !m.is_finite()) {
            return Err(IsoError::InvalidInput("m/z values must be finite".to_string()));
        }
        if mzs.windows(2).any(|w| w[1] < w[0]) {
            return Err(IsoError::InvalidInput("m/z values must be sorted ascending".to_string()));
        }

        let mut first = 0;
        for (&mz, value) in mzs.iter().zip(out.iter_mut()) {
            while first < self.kernels.len() && self.kernels[first].center < mz - self.half_window {
                first += 1;
            }
            *value = self.kernels[first..]
                .iter()
                .take_while(|k| k.center <= mz + self.half_window)
                .map(|k| k.value(mz))
                .sum();
        }
        Ok(())
    }

    /// Samples the envelope on an equidistant grid from `lo` to `hi` inclusive.
    ///
    /// # Example
    ///
    /// ```
    /// use isocalc::data::instrument::{Analyzer, InstrumentModel};
    /// use isocalc::data::spectrum::SpectrumKind;
    /// use isocalc::isotope_pattern_default;
    ///
    /// let pattern = isotope_pattern_default("H2O").unwrap();
    /// let instrument = InstrumentModel::new(Analyzer::Tof, 20000.0, 200.0).unwrap();
    /// let profile = pattern.envelope(&instrument).unwrap().rasterize(17.0, 21.0, 0.001).unwrap();
    /// assert_eq!(profile.kind(), SpectrumKind::Profile);
    /// assert_eq!(profile.len(), 4001);
    /// ```
    pub fn rasterize(&self, lo: f64, hi: f64, step: f64) -> Result<Spectrum> {
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(IsoError::InvalidParameter(format!("invalid raster range [{}, {}]", lo, hi)));
        }
        if !(step.is_finite() && step > 0.0) {
            return Err(IsoError::InvalidParameter(format!("raster step must be positive, got {}", step)));
        }
        let n_points = ((hi - lo) / step + 1e-9).floor() as usize + 1;
        if n_points > MAX_RASTER_POINTS {
            return Err(IsoError::InvalidParameter(format!(
                "raster of {} points exceeds the limit of {}",
                n_points, MAX_RASTER_POINTS
            )));
        }

        let mzs: Vec<f64> = (0..n_points).map(|i| lo + i as f64 * step).collect();
        let intensities = self.evaluate(&mzs)?;
        trace!("rasterized [{:.4}, {:.4}] into {} points", lo, hi, n_points);
        Spectrum::new(SpectrumKind::Profile, mzs, intensities)
    }
}

/// raster regions of `REGION_FWHM` widths around each peak, overlapping ones merged
fn raster_regions(sorted_peaks: &[(f64, f64)], instrument: &InstrumentModel) -> Vec<(f64, f64)> {
    sorted_peaks
        .iter()
        .map(|&(mz, _)| {
            let half_width = REGION_FWHM * instrument.fwhm_at(mz);
            (mz - half_width, mz + half_width)
        })
        .coalesce(|a, b| if b.0 <= a.1 { Ok((a.0, a.1.max(b.1))) } else { Err((a, b)) })
        .collect()
}

/// estimate the peaks an instrument would report for a spectrum
///
/// Peaks weaker than `min_abundance` relative to the strongest are ignored; the
/// envelope of the rest is rasterized at `points_per_fwhm` samples per FWHM around
/// every peak and centroided, so peaks closer than the resolution merge.
///
/// Arguments:
///
/// * `spectrum` - theoretical or centroided spectrum
/// * `instrument` - instrument model giving the peak width at every m/z
/// * `settings` - `min_abundance` in [0, 1) and `points_per_fwhm` of at least 5
///
/// Returns:
///
/// * `Result<Spectrum>` - centroided spectrum sorted by descending intensity, every
///   centroid at least `min_abundance` times the strongest one
///
/// # Examples
///
/// ```
/// use isocalc::algorithm::envelope::envelope_centroids;
/// use isocalc::data::instrument::{Analyzer, InstrumentModel};
/// use isocalc::isotope_pattern_default;
/// use isocalc::settings::CentroidSettings;
///
/// let pattern = isotope_pattern_default("C6H12O6").unwrap();
/// let low_res = InstrumentModel::new(Analyzer::Tof, 5000.0, 200.0).unwrap();
/// let centroids = envelope_centroids(&pattern, &low_res, &CentroidSettings::default()).unwrap();
/// assert!(centroids.len() < pattern.len());
/// assert!((centroids.masses()[0] - pattern.masses()[0]).abs() < 1e-3);
/// ```
pub fn envelope_centroids(
    spectrum: &Spectrum,
    instrument: &InstrumentModel,
    settings: &CentroidSettings,
) -> Result<Spectrum> {
    settings.validate()?;
    if spectrum.kind() == SpectrumKind::Profile {
        return Err(IsoError::InvalidInput(
            "envelope centroids need discrete peaks, got a profile spectrum".to_string(),
        ));
    }

    let max_intensity = spectrum.max_intensity();
    if max_intensity <= 0.0 {
        return Ok(Spectrum::from_peaks(SpectrumKind::Centroided, Vec::new()));
    }

    let min_intensity = settings.min_abundance * max_intensity;
    let mut peaks: Vec<(f64, f64)> = spectrum.peaks().filter(|&(_, i)| i > 0.0 && i >= min_intensity).collect();
    peaks.sort_by_key(|p| OrderedFloat(p.0));

    let envelope = Envelope::from_peaks(peaks.clone(), instrument)?;
    let window_size = settings.points_per_fwhm | 1;

    let mut centroids: Vec<(f64, f64)> = Vec::new();
    for (lo, hi) in raster_regions(&peaks, instrument) {
        let step = instrument.fwhm_at(lo.max(f64::MIN_POSITIVE)) / settings.points_per_fwhm as f64;
        let profile = envelope.rasterize(lo, hi, step)?;
        let found = centroid_profile(profile.masses(), profile.intensities(), window_size)?;
        centroids.extend(found.peaks());
    }

    let strongest = centroids.iter().map(|p| OrderedFloat(p.1)).max().map_or(0.0, |m| m.0);
    centroids.retain(|&(_, i)| i >= settings.min_abundance * strongest);
    centroids.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.total_cmp(&b.0)));

    debug!(
        "{} of {} peaks above {} gave {} centroids on {}",
        peaks.len(),
        spectrum.len(),
        settings.min_abundance,
        centroids.len(),
        instrument.analyzer()
    );
    Ok(Spectrum::from_peaks(SpectrumKind::Centroided, centroids))
}
