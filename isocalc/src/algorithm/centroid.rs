use log::debug;

use crate::data::spectrum::{Spectrum, SpectrumKind};
use crate::error::{IsoError, Result};

/// Default number of samples per centroiding window.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// detect peaks in mass-sorted profile data with a sliding window
///
/// A sample becomes a centroid when it is positive, strictly greater than every
/// earlier sample of the window centered on it and at least as large as every
/// later one, so a flat top yields a single centroid. Only windows that fit
/// entirely inside the data are evaluated.
///
/// Arguments:
///
/// * `mz` - masses, sorted ascending
/// * `intensity` - intensities, same length as `mz`
/// * `window_size` - number of consecutive samples per window, smaller than the number of samples
///
/// Returns:
///
/// * `Result<Spectrum>` - centroided spectrum, mass = intensity-weighted mean mass of the
///   window, intensity = the local maximum; ordered by mass
///
/// # Examples
///
/// ```
/// use isocalc::algorithm::centroid::centroid_profile;
///
/// let mz = vec![99.8, 99.9, 100.0, 100.1, 100.2, 100.3, 100.4];
/// let intensity = vec![0.0, 1.0, 2.0, 1.0, 0.0, 0.0, 0.0];
/// let centroids = centroid_profile(&mz, &intensity, 3).unwrap();
/// assert_eq!(centroids.len(), 1);
/// assert!((centroids.masses()[0] - 100.0).abs() < 1e-9);
/// assert_eq!(centroids.intensities()[0], 2.0);
/// ```
pub fn centroid_profile(mz: &[f64], intensity: &[f64], window_size: usize) -> Result<Spectrum> {
    if mz.len() != intensity.len() {
        return Err(IsoError::InvalidInput(format!(
            "{} masses but {} intensities",
            mz.len(),
            intensity.len()
        )));
    }
    if window_size == 0 {
        return Err(IsoError::InvalidParameter("window size must be at least 1".to_string()));
    }
    if window_size >= mz.len() {
        return Err(IsoError::TooFewPoints { window: window_size, points: mz.len() });
    }
    if mz.windows(2).any(|w| w[1] < w[0]) {
        return Err(IsoError::InvalidInput("profile masses must be sorted ascending".to_string()));
    }

    let half = window_size / 2;
    let mut peaks: Vec<(f64, f64)> = Vec::new();

    for center in half..=(mz.len() - window_size + half) {
        let start = center - half;
        let end = start + window_size;
        let apex = intensity[center];

        if apex <= 0.0 {
            continue;
        }
        let rises = intensity[start..center].iter().all(|&i| i < apex);
        let falls = intensity[center + 1..end].iter().all(|&i| i <= apex);
        if !(rises && falls) {
            continue;
        }

        let (weighted_mz, total) = mz[start..end]
            .iter()
            .zip(&intensity[start..end])
            .fold((0.0, 0.0), |(acc_mz, acc_i), (&m, &i)| (acc_mz + m * i, acc_i + i));

        peaks.push((weighted_mz / total, apex));
    }

    debug!("centroided {} samples into {} peaks (window {})", mz.len(), peaks.len(), window_size);
    Ok(Spectrum::from_peaks(SpectrumKind::Centroided, peaks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn gaussian(center: f64, sigma: f64, height: f64, mz: &[f64]) -> Vec<f64> {
        mz.iter()
            .map(|m| height * (-(m - center).powi(2) / (2.0 * sigma * sigma)).exp())
            .collect()
    }

    #[test]
    fn test_two_separated_peaks() {
        let mz: Vec<f64> = (0..400).map(|i| 100.0 + i as f64 * 0.005).collect();
        let first = gaussian(100.5, 0.01, 1.0, &mz);
        let second = gaussian(101.5, 0.01, 0.25, &mz);
        let intensity: Vec<f64> = first.iter().zip(&second).map(|(a, b)| a + b).collect();

        let centroids = centroid_profile(&mz, &intensity, 5).unwrap();
        assert_eq!(centroids.len(), 2);
        assert!((centroids.masses()[0] - 100.5).abs() < 1e-4);
        assert!((centroids.masses()[1] - 101.5).abs() < 1e-4);
        assert!((centroids.intensities()[0] - 1.0).abs() < 1e-9);
        assert!((centroids.intensities()[1] - 0.25).abs() < 1e-9);
        assert_eq!(centroids.kind(), SpectrumKind::Centroided);
    }

    #[test]
    fn test_flat_top_yields_one_centroid() {
        let mz = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let intensity = vec![0.0, 1.0, 3.0, 3.0, 1.0, 0.0, 0.0];
        let centroids = centroid_profile(&mz, &intensity, 3).unwrap();
        assert_eq!(centroids.len(), 1);
        assert!((centroids.masses()[0] - 23.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_signal_has_no_centroids() {
        let mz = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let intensity = vec![0.0; 5];
        assert!(centroid_profile(&mz, &intensity, 3).unwrap().is_empty());
    }

    #[test]
    fn test_window_errors() {
        let mz = vec![1.0, 2.0, 3.0, 4.0];
        let intensity = vec![0.0, 1.0, 0.0, 0.0];
        assert_eq!(centroid_profile(&mz, &intensity, 4).unwrap_err().kind(), ErrorKind::TooFewPoints);
        assert_eq!(centroid_profile(&mz, &intensity, 10).unwrap_err().kind(), ErrorKind::TooFewPoints);
        assert_eq!(centroid_profile(&mz, &intensity, 0).unwrap_err().kind(), ErrorKind::InvalidParameter);
        assert_eq!(
            centroid_profile(&[2.0, 1.0, 3.0, 4.0], &intensity, 3).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }
}
