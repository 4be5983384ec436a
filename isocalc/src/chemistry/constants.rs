// Purpose: To store constants that are used in the program
pub const MASS_ELECTRON: f64 = 0.00054857990946; // Unified atomic mass unit

/// Ratio between full width at half maximum and standard deviation of a Gaussian, 2 * sqrt(2 * ln 2)
pub const FWHM_TO_SIGMA: f64 = 2.3548200450309493;

/// Peaks closer than this (in Da) are the same isotopologue
pub const MASS_MERGE_TOLERANCE: f64 = 1e-6;
