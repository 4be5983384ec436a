use log::debug;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::algorithm::isotope;
use crate::chemistry::sum_formula::{parse_formula, SumFormula};
use crate::data::spectrum::Spectrum;
use crate::error::{IsoError, Result};
use crate::settings::IsotopeSettings;

/// Theoretical isotope pattern of a formula with the largest peak scaled to 1.0.
///
/// # Arguments
///
/// * `formula` - sum formula, optionally with adducts and a trailing charge, e.g. "C6H12O6+Na+"
/// * `threshold` - peaks below this fraction of the most probable one are dropped
/// * `fft_threshold` - intermediate combinations below this probability are pruned
///
/// # Example
///
/// ```
/// use isocalc::isotope_pattern;
///
/// let pattern = isotope_pattern("C5H9NO", 1e-4, 1e-8).unwrap();
/// assert_eq!(pattern.intensities()[0], 1.0);
/// assert!(pattern.intensities().iter().all(|&i| i > 1e-4));
/// ```
pub fn isotope_pattern(formula: &str, threshold: f64, fft_threshold: f64) -> Result<Spectrum> {
    isotope_pattern_with(formula, &IsotopeSettings::with_threshold(threshold, fft_threshold))
}

/// [`isotope_pattern`] with `threshold = 1e-4` and `fft_threshold = 1e-8`.
pub fn isotope_pattern_default(formula: &str) -> Result<Spectrum> {
    isotope_pattern_with(formula, &IsotopeSettings::default())
}

pub fn isotope_pattern_with(formula: &str, settings: &IsotopeSettings) -> Result<Spectrum> {
    SumFormula::new(formula)?.isotope_pattern(settings)
}

/// Raw (mass, probability) pairs of a formula, most probable first, without any charge shift.
pub fn isotope_distribution(formula: &str, settings: &IsotopeSettings) -> Result<Vec<(f64, f64)>> {
    let composition = parse_formula(formula)?;
    isotope::isotope_distribution(&composition, &settings.selection, settings.fft_threshold)
}

/// Computes the isotope patterns of many formulas in parallel.
///
/// # Arguments
///
/// * `formulas` - sum formulas
/// * `settings` - settings shared by all formulas
/// * `num_threads` - size of the dedicated thread pool
///
/// # Returns
///
/// * One result per formula, in input order; a failing formula does not affect the others.
///
/// # Example
///
/// ```
/// use isocalc::{isotope_patterns, IsotopeSettings};
///
/// let formulas = vec!["C6H12O6".to_string(), "C2(H3O".to_string(), "H2O".to_string()];
/// let patterns = isotope_patterns(&formulas, &IsotopeSettings::default(), 2).unwrap();
/// assert_eq!(patterns.len(), 3);
/// assert!(patterns[0].is_ok());
/// assert!(patterns[1].is_err());
/// ```
pub fn isotope_patterns(
    formulas: &[String],
    settings: &IsotopeSettings,
    num_threads: usize,
) -> Result<Vec<Result<Spectrum>>> {
    settings.validate()?;
    let thread_pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| IsoError::InvalidParameter(format!("cannot build thread pool: {}", e)))?;

    debug!("computing {} isotope patterns on {} threads", formulas.len(), num_threads);
    let patterns: Vec<Result<Spectrum>> = thread_pool.install(|| {
        formulas
            .par_iter()
            .map(|formula| isotope_pattern_with(formula, settings))
            .collect()
    });
    Ok(patterns)
}

/// Profile spectrum from raw arrays, sorted by mass.
pub fn profile_spectrum(mz: Vec<f64>, intensity: Vec<f64>) -> Result<Spectrum> {
    Spectrum::profile(mz, intensity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::elements;
    use crate::error::ErrorKind;

    #[test]
    fn test_distribution_is_unshifted_and_raw() {
        let raw = isotope_distribution("C6H12O6+", &IsotopeSettings::default()).unwrap();
        let pattern = isotope_pattern_default("C6H12O6").unwrap();
        assert!((raw[0].0 - pattern.masses()[0]).abs() < 1e-12);
        assert!(raw[0].1 < 1.0);
    }

    #[test]
    fn test_settings_charge_overrides_formula() {
        let settings = IsotopeSettings { charge: Some(0), ..IsotopeSettings::default() };
        let a = isotope_pattern_with("C6H12O6+", &settings).unwrap();
        let b = isotope_pattern_default("C6H12O6").unwrap();
        assert_eq!(a.masses()[0], b.masses()[0]);
    }

    #[test]
    fn test_unnormalized_pattern_keeps_probabilities() {
        let settings = IsotopeSettings { normalize: false, ..IsotopeSettings::default() };
        let pattern = isotope_pattern_with("Cl", &settings).unwrap();
        assert_eq!(pattern.len(), 2);
        assert!((pattern.probabilities()[0] - 0.7576).abs() < 1e-12);
        assert!((pattern.abundances()[1] - 0.2424 / 0.7576).abs() < 1e-12);
    }

    #[test]
    fn test_monoisotopic_peak_for_light_molecule() {
        let pattern = isotope_pattern_default("H2O").unwrap();
        let expected = 2.0 * elements::monoisotopic_mass("H").unwrap() + elements::monoisotopic_mass("O").unwrap();
        assert!((pattern.masses()[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_batch_keeps_order() {
        let formulas: Vec<String> = ["H2O", "C6H12O6", "Fe2Cl3K5H7"].iter().map(|s| s.to_string()).collect();
        let patterns = isotope_patterns(&formulas, &IsotopeSettings::default(), 3).unwrap();
        for (formula, pattern) in formulas.iter().zip(patterns) {
            assert_eq!(pattern.unwrap(), isotope_pattern_default(formula).unwrap());
        }
    }

    #[test]
    fn test_errors_propagate() {
        assert_eq!(isotope_pattern_default("C2(H3O").unwrap_err().kind(), ErrorKind::InvalidFormula);
        assert_eq!(isotope_pattern("H2O", 2.0, 1e-8).unwrap_err().kind(), ErrorKind::InvalidParameter);
    }
}
