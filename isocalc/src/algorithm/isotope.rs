use itertools::Itertools;
use log::{debug, trace, warn};

use crate::chemistry::constants::MASS_MERGE_TOLERANCE;
use crate::chemistry::elements::isotopes;
use crate::chemistry::sum_formula::ElementComposition;
use crate::data::spectrum::{Spectrum, SpectrumKind};
use crate::error::{IsoError, Result};
use crate::settings::{validate_fft_threshold, IsotopeSettings, Selection};

/// Largest number of distinct isotopologues a single element may expand to.
pub const MAX_ELEMENT_COMBINATIONS: u64 = 100_000;

/// Largest number of peak pairs a single convolution step may combine.
pub const MAX_PAIRWISE_COMBINATIONS: u64 = 10_000_000;

/// Unmerged combinations collected before they are merged in place.
const MERGE_BATCH: usize = 1 << 20;

/// Probability mass that may be pruned away before a warning is logged.
const PRUNED_MASS_WARNING: f64 = 1e-3;

/// number of distinct isotopologues of `n` atoms of an element with `k` isotopes
///
/// Arguments:
///
/// * `n` - number of atoms
/// * `k` - number of isotopes of the element
///
/// Returns:
///
/// * `u64` - the multiset coefficient C(n + k - 1, k - 1), saturating at `u64::MAX`
///
/// # Examples
///
/// ```
/// use isocalc::algorithm::isotope::isotopologue_count;
///
/// assert_eq!(isotopologue_count(100000, 2), 100001);
/// assert_eq!(isotopologue_count(36, 7), 5245786);
/// assert_eq!(isotopologue_count(5, 1), 1);
/// ```
pub fn isotopologue_count(n: u64, k: usize) -> u64 {
    let mut count: u128 = 1;
    for j in 1..k as u128 {
        count = count * (n as u128 + j) / j;
        if count > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    count as u64
}

/// merge peaks whose masses coincide within `mass_tolerance`
///
/// Merged peaks sit at the probability-weighted mean mass and carry the summed
/// probability. The result is sorted by ascending mass.
pub fn merge_duplicate_masses(mut peaks: Vec<(f64, f64)>, mass_tolerance: f64) -> Vec<(f64, f64)> {
    peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
    peaks
        .into_iter()
        .coalesce(|a, b| {
            if (b.0 - a.0).abs() < mass_tolerance {
                let total = a.1 + b.1;
                let mass = if total > 0.0 { (a.0 * a.1 + b.0 * b.1) / total } else { a.0 };
                Ok((mass, total))
            } else {
                Err((a, b))
            }
        })
        .collect()
}

/// convolve two distributions of masses and abundances
///
/// Combinations landing on the same mass are summed before pruning, so an
/// isotopologue reached by many improbable paths survives if its total does.
///
/// Arguments:
///
/// * `dist_a` - first distribution of masses and abundances
/// * `dist_b` - second distribution of masses and abundances
/// * `abundance_threshold` - minimum merged abundance for a peak to be included in the result
///
/// Returns:
///
/// * `Vec<(f64, f64)>` - combined distribution, sorted by mass, with coinciding masses merged
///
/// # Examples
///
/// ```
/// use isocalc::algorithm::isotope::convolve;
///
/// let dist_a = vec![(100.0, 0.5), (101.0, 0.5)];
/// let dist_b = vec![(100.0, 0.5), (101.0, 0.5)];
/// let result = convolve(&dist_a, &dist_b, 1e-12);
/// assert_eq!(result, vec![(200.0, 0.25), (201.0, 0.5), (202.0, 0.25)]);
/// ```
pub fn convolve(dist_a: &[(f64, f64)], dist_b: &[(f64, f64)], abundance_threshold: f64) -> Vec<(f64, f64)> {
    let mut result: Vec<(f64, f64)> = Vec::with_capacity((dist_a.len() * dist_b.len()).min(MERGE_BATCH));

    for &(mass_a, abundance_a) in dist_a {
        for &(mass_b, abundance_b) in dist_b {
            let combined_abundance = abundance_a * abundance_b;
            if combined_abundance > 0.0 {
                result.push((mass_a + mass_b, combined_abundance));
            }
        }
        if result.len() >= MERGE_BATCH {
            result = merge_duplicate_masses(result, MASS_MERGE_TOLERANCE);
        }
    }

    trace!("convolved {} x {} peaks into {} combinations", dist_a.len(), dist_b.len(), result.len());
    let mut merged = merge_duplicate_masses(result, MASS_MERGE_TOLERANCE);
    merged.retain(|&(_, abundance)| abundance >= abundance_threshold);
    merged
}

/// convolve a distribution with itself n times
///
/// Uses repeated squaring, pruning combinations below `abundance_threshold`
/// after every step so that the intermediate distributions stay small.
///
/// Arguments:
///
/// * `dist` - distribution of masses and abundances
/// * `n` - number of times to convolve the distribution with itself
/// * `abundance_threshold` - minimum abundance kept in intermediate results
///
/// Returns:
///
/// * `Vec<(f64, f64)>` - distribution of masses and abundances
///
/// # Examples
///
/// ```
/// use isocalc::algorithm::isotope::convolve_pow;
///
/// let dist = vec![(100.0, 0.5), (101.0, 0.5)];
/// let result = convolve_pow(&dist, 2, 1e-12);
/// assert_eq!(result, vec![(200.0, 0.25), (201.0, 0.5), (202.0, 0.25)]);
/// ```
pub fn convolve_pow(dist: &[(f64, f64)], n: u32, abundance_threshold: f64) -> Vec<(f64, f64)> {
    if n == 0 {
        return vec![(0.0, 1.0)]; // Return the delta distribution
    }

    let mut base = merge_duplicate_masses(dist.to_vec(), MASS_MERGE_TOLERANCE);
    let mut result: Option<Vec<(f64, f64)>> = None;
    let mut remaining = n;

    loop {
        if remaining & 1 == 1 {
            result = Some(match result {
                Some(acc) => convolve(&acc, &base, abundance_threshold),
                None => base.clone(),
            });
        }
        remaining >>= 1;
        if remaining == 0 {
            break;
        }
        base = convolve(&base, &base, abundance_threshold);
    }

    result.unwrap_or_else(|| vec![(0.0, 1.0)])
}

/// fail before any expansion if an element would produce too many isotopologues
fn check_combinations(composition: &ElementComposition) -> Result<()> {
    for (element, count) in composition.iter() {
        let isotope_count = isotopes(element).map(|d| d.len()).unwrap_or(1);
        let combinations = isotopologue_count(count as u64, isotope_count);
        if combinations > MAX_ELEMENT_COMBINATIONS {
            return Err(IsoError::TooManyCombinations {
                element: element.to_string(),
                combinations,
                limit: MAX_ELEMENT_COMBINATIONS,
            });
        }
    }
    Ok(())
}

/// keep peaks according to the selection mode, most probable first
fn select_peaks(mut peaks: Vec<(f64, f64)>, selection: &Selection) -> Vec<(f64, f64)> {
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.total_cmp(&b.0)));

    match *selection {
        Selection::Threshold { threshold, relative } => {
            let reference = if relative { peaks.first().map(|p| p.1).unwrap_or(1.0) } else { 1.0 };
            peaks.retain(|(_, p)| p / reference > threshold);
        }
        Selection::Coverage { desired_prob } => {
            let mut cumulative = 0.0;
            let mut keep = 0;
            for (_, p) in &peaks {
                keep += 1;
                cumulative += p;
                if cumulative >= desired_prob {
                    break;
                }
            }
            peaks.truncate(keep);
        }
    }
    peaks
}

/// generate the isotope distribution for a given elemental composition
///
/// Each element's single-atom distribution is raised to its atom count, the
/// per-element results are convolved together, and the final peaks are chosen
/// by `selection`. Intermediate combinations below `fft_threshold` are pruned.
///
/// Arguments:
///
/// * `composition` - elemental composition of the molecule
/// * `selection` - threshold or coverage mode for the final peaks
/// * `fft_threshold` - minimum probability kept in intermediate results
///
/// Returns:
///
/// * `Result<Vec<(f64, f64)>>` - (mass, probability) pairs sorted by descending
///   probability, no two peaks sharing a mass
///
/// # Examples
///
/// ```
/// use isocalc::algorithm::isotope::isotope_distribution;
/// use isocalc::chemistry::sum_formula::parse_formula;
/// use isocalc::settings::Selection;
///
/// let composition = parse_formula("C5H9NO").unwrap();
/// let selection = Selection::Threshold { threshold: 1e-4, relative: true };
/// let result = isotope_distribution(&composition, &selection, 1e-8).unwrap();
/// assert!((result[0].0 - 99.068413).abs() < 1e-5);
/// ```
pub fn isotope_distribution(
    composition: &ElementComposition,
    selection: &Selection,
    fft_threshold: f64,
) -> Result<Vec<(f64, f64)>> {
    validate_fft_threshold(fft_threshold)?;
    selection.validate()?;
    check_combinations(composition)?;

    let mut cumulative_distribution: Option<Vec<(f64, f64)>> = None;

    for (element, count) in composition.iter() {
        let single_atom = isotopes(element)
            .ok_or_else(|| IsoError::InvalidFormula(format!("unknown element '{}'", element)))?
            .as_peaks();

        let element_distribution = convolve_pow(&single_atom, count as u32, fft_threshold);
        debug!("{}{}: {} peaks after pruning", element, count, element_distribution.len());

        cumulative_distribution = match cumulative_distribution {
            Some(cum_dist) => {
                let pairs = cum_dist.len() as u64 * element_distribution.len() as u64;
                if pairs > MAX_PAIRWISE_COMBINATIONS {
                    return Err(IsoError::TooManyCombinations {
                        element: element.to_string(),
                        combinations: pairs,
                        limit: MAX_PAIRWISE_COMBINATIONS,
                    });
                }
                Some(convolve(&cum_dist, &element_distribution, fft_threshold))
            }
            None => Some(element_distribution),
        };
    }

    let final_distribution = cumulative_distribution
        .ok_or_else(|| IsoError::InvalidFormula("composition contains no atoms".to_string()))?;

    let retained: f64 = final_distribution.iter().map(|(_, p)| p).sum();
    if 1.0 - retained > PRUNED_MASS_WARNING {
        warn!(
            "pruning discarded {:.4} of the probability mass for {}, consider a lower fft_threshold",
            1.0 - retained,
            composition
        );
    }

    let selected = select_peaks(final_distribution, selection);
    debug!("{}: kept {} peaks", composition, selected.len());
    Ok(selected)
}

/// theoretical spectrum of a composition, shifted by its net charge
///
/// The charge from `settings` overrides the one parsed with the composition.
/// Intensities are scaled to a largest peak of 1.0 when `settings.normalize` is set,
/// otherwise they are the raw isotopologue probabilities.
pub fn isotope_pattern_for_composition(
    composition: &ElementComposition,
    settings: &IsotopeSettings,
) -> Result<Spectrum> {
    let peaks = isotope_distribution(composition, &settings.selection, settings.fft_threshold)?;
    let mut spectrum = Spectrum::from_peaks(SpectrumKind::Theoretical, peaks);
    if settings.normalize {
        spectrum = spectrum.normalized();
    }
    spectrum.add_charge(settings.charge.unwrap_or(composition.charge()));
    Ok(spectrum)
}
