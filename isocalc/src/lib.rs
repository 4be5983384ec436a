// chemistry module
pub mod chemistry {
    pub mod constants;
    pub mod elements;
    pub mod sum_formula;
}

// algorithm module
pub mod algorithm {
    pub mod isotope;
    pub mod envelope;
    pub mod centroid;
}

// data module
pub mod data {
    pub mod spectrum;
    pub mod instrument;
}

pub mod error;
pub mod pattern;
pub mod settings;

pub use crate::chemistry::sum_formula::{parse_formula, ElementComposition, SumFormula};
pub use crate::data::instrument::{Analyzer, InstrumentModel};
pub use crate::data::spectrum::{Spectrum, SpectrumKind};
pub use crate::error::{ErrorKind, IsoError, Result};
pub use crate::pattern::{
    isotope_distribution, isotope_pattern, isotope_pattern_default, isotope_pattern_with, isotope_patterns,
    profile_spectrum,
};
pub use crate::settings::{CentroidSettings, IsotopeSettings, Selection, Settings};
