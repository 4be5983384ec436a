use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::algorithm::isotope::isotope_pattern_for_composition;
use crate::chemistry::elements::{self, is_known};
use crate::data::spectrum::Spectrum;
use crate::error::{IsoError, Result};
use crate::settings::IsotopeSettings;

/// Atom counts per element symbol together with the net charge of the ion.
///
/// Counts are never negative; a composition is only ever produced by parsing or
/// by [`ElementComposition::from_counts`], both of which validate this.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementComposition {
    counts: BTreeMap<String, i32>,
    charge: i32,
}

impl ElementComposition {
    /// Builds a composition from explicit counts.
    ///
    /// # Example
    ///
    /// ```
    /// use isocalc::chemistry::sum_formula::ElementComposition;
    ///
    /// let water = ElementComposition::from_counts(&[("H", 2), ("O", 1)], 0).unwrap();
    /// assert_eq!(water.get("H"), 2);
    /// assert!(ElementComposition::from_counts(&[("H", -1)], 0).is_err());
    /// ```
    pub fn from_counts(counts: &[(&str, i32)], charge: i32) -> Result<Self> {
        let mut merged: BTreeMap<String, i64> = BTreeMap::new();
        for (symbol, count) in counts {
            if !is_known(symbol) {
                return Err(IsoError::InvalidFormula(format!("unknown element '{}'", symbol)));
            }
            *merged.entry(symbol.to_string()).or_insert(0) += *count as i64;
        }
        Self::from_signed(merged, charge)
    }

    fn from_signed(counts: BTreeMap<String, i64>, charge: i32) -> Result<Self> {
        let mut resolved = BTreeMap::new();
        for (symbol, count) in counts {
            if count < 0 {
                return Err(IsoError::InvalidFormula(format!(
                    "element {} resolves to a negative count ({})", symbol, count
                )));
            }
            if count > i32::MAX as i64 {
                return Err(IsoError::InvalidFormula(format!("count of {} is too large", symbol)));
            }
            if count > 0 {
                resolved.insert(symbol, count as i32);
            }
        }
        if resolved.is_empty() {
            return Err(IsoError::InvalidFormula("composition contains no atoms".to_string()));
        }
        Ok(ElementComposition { counts: resolved, charge })
    }

    pub fn get(&self, symbol: &str) -> i32 {
        self.counts.get(symbol).copied().unwrap_or(0)
    }

    /// Elements with their counts, in alphabetical order of the symbol.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.counts.iter().map(|(s, c)| (s.as_str(), *c))
    }

    /// Number of distinct elements.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn charge(&self) -> i32 {
        self.charge
    }

    /// Monoisotopic mass of the neutral composition, using the most abundant isotope of each element.
    pub fn monoisotopic_mass(&self) -> f64 {
        self.counts.iter().fold(0.0, |acc, (element, count)| {
            acc + elements::monoisotopic_mass(element).unwrap_or(0.0) * *count as f64
        })
    }

    pub fn average_mass(&self) -> f64 {
        self.counts.iter().fold(0.0, |acc, (element, count)| {
            acc + elements::average_mass(element).unwrap_or(0.0) * *count as f64
        })
    }
}

impl Display for ElementComposition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (symbol, count) in &self.counts {
            if *count == 1 {
                write!(f, "{}", symbol)?;
            } else {
                write!(f, "{}{}", symbol, count)?;
            }
        }
        match self.charge {
            0 => Ok(()),
            c if c > 0 => write!(f, "+{}", c),
            c => write!(f, "{}", c),
        }
    }
}

/// A parsed sum formula, keeping the text it was parsed from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SumFormula {
    pub formula: String,
    pub composition: ElementComposition,
}

impl SumFormula {
    /// Parses a sum formula.
    ///
    /// # Example
    ///
    /// ```
    /// use isocalc::chemistry::sum_formula::SumFormula;
    ///
    /// let sum_formula = SumFormula::new("C6H12O6+H+").unwrap();
    /// assert_eq!(sum_formula.composition.get("H"), 13);
    /// assert_eq!(sum_formula.composition.charge(), 1);
    /// ```
    pub fn new(formula: &str) -> Result<Self> {
        let composition = parse_formula(formula)?;
        Ok(SumFormula { formula: formula.to_string(), composition })
    }

    pub fn monoisotopic_mass(&self) -> f64 {
        self.composition.monoisotopic_mass()
    }

    pub fn average_mass(&self) -> f64 {
        self.composition.average_mass()
    }

    /// Theoretical isotope pattern of the formula, charge-shifted by its net charge.
    pub fn isotope_pattern(&self, settings: &IsotopeSettings) -> Result<Spectrum> {
        isotope_pattern_for_composition(&self.composition, settings)
    }
}

fn charge_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\++|-+|[+-]\d+)$").expect("charge suffix pattern is valid"))
}

/// Parse a sum formula into an element composition.
///
/// The grammar accepts element symbols with optional counts, parenthesized groups
/// with optional multipliers, any number of `+<formula>` / `-<formula>` adduct
/// terms, and a trailing charge given as a run of `+`/`-` signs or a signed integer.
///
/// Arguments:
///
/// * `formula` - The chemical formula to parse.
///
/// Returns:
///
/// * `Result<ElementComposition>` - The merged composition, or `InvalidFormula`
///   for unknown symbols, malformed punctuation, or negative resolved counts.
///
/// # Example
///
/// ```
/// use isocalc::chemistry::sum_formula::parse_formula;
///
/// let composition = parse_formula("(CH3)2CO+H-O++").unwrap();
/// assert_eq!(composition.get("C"), 3);
/// assert_eq!(composition.get("H"), 7);
/// assert_eq!(composition.get("O"), 0);
/// assert_eq!(composition.charge(), 2);
///
/// assert!(parse_formula("C2(H3O").is_err());
/// assert!(parse_formula("H2O-H3").is_err());
/// ```
pub fn parse_formula(formula: &str) -> Result<ElementComposition> {
    let trimmed = formula.trim();
    if trimmed.is_empty() {
        return Err(IsoError::InvalidFormula("empty formula".to_string()));
    }

    let (body, charge) = match charge_suffix().find(trimmed) {
        Some(m) => (&trimmed[..m.start()], parse_charge(m.as_str(), formula)?),
        None => (trimmed, 0),
    };

    let mut total: BTreeMap<String, i64> = BTreeMap::new();
    for (sign, term) in split_terms(body, formula)? {
        let counts = FormulaParser::new(term, formula).parse()?;
        for (symbol, count) in counts {
            let entry = total.entry(symbol).or_insert(0);
            *entry = entry
                .checked_add(sign * count)
                .ok_or_else(|| IsoError::InvalidFormula(format!("count out of range in '{}'", formula)))?;
        }
    }

    let composition = ElementComposition::from_signed(total, charge)?;
    debug!("parsed '{}' into {}", formula, composition);
    Ok(composition)
}

fn parse_charge(suffix: &str, formula: &str) -> Result<i32> {
    let sign = if suffix.starts_with('+') { 1 } else { -1 };
    let digits = &suffix[1..];
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        let value: i32 = digits
            .parse()
            .map_err(|_| IsoError::InvalidFormula(format!("charge out of range in '{}'", formula)))?;
        return Ok(sign * value);
    }
    Ok(sign * suffix.len() as i32)
}

/// Splits a formula body at top-level `+`/`-` signs into signed terms.
fn split_terms<'a>(body: &'a str, formula: &str) -> Result<Vec<(i64, &'a str)>> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut sign = 1i64;

    for (idx, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '+' | '-' if depth == 0 => {
                terms.push((sign, &body[start..idx]));
                sign = if c == '+' { 1 } else { -1 };
                start = idx + 1;
            }
            _ => {}
        }
    }
    terms.push((sign, &body[start..]));

    if terms.iter().any(|(_, term)| term.trim().is_empty()) {
        return Err(IsoError::InvalidFormula(format!("missing formula around '+'/'-' in '{}'", formula)));
    }
    Ok(terms)
}

struct FormulaParser<'a> {
    chars: Vec<char>,
    pos: usize,
    formula: &'a str,
}

impl<'a> FormulaParser<'a> {
    fn new(term: &str, formula: &'a str) -> Self {
        FormulaParser { chars: term.trim().chars().collect(), pos: 0, formula }
    }

    fn parse(mut self) -> Result<BTreeMap<String, i64>> {
        self.parse_sequence(0)
    }

    fn error(&self, message: &str) -> IsoError {
        IsoError::InvalidFormula(format!("{} in '{}'", message, self.formula))
    }

    fn parse_sequence(&mut self, depth: usize) -> Result<BTreeMap<String, i64>> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();

        loop {
            match self.chars.get(self.pos).copied() {
                None if depth > 0 => return Err(self.error("unclosed parenthesis")),
                None => break,
                Some(')') if depth == 0 => return Err(self.error("unmatched ')'")),
                Some(')') => {
                    self.pos += 1;
                    break;
                }
                Some('(') => {
                    self.pos += 1;
                    let group = self.parse_sequence(depth + 1)?;
                    if group.is_empty() {
                        return Err(self.error("empty group"));
                    }
                    let multiplier = self.parse_count()?;
                    for (symbol, count) in group {
                        let scaled = count.checked_mul(multiplier).ok_or_else(|| self.error("count out of range"))?;
                        self.accumulate(&mut counts, symbol, scaled)?;
                    }
                }
                Some(c) if c.is_ascii_uppercase() => {
                    let symbol = self.parse_symbol();
                    if !is_known(&symbol) {
                        return Err(self.error(&format!("unknown element '{}'", symbol)));
                    }
                    let count = self.parse_count()?;
                    self.accumulate(&mut counts, symbol, count)?;
                }
                Some(c) => return Err(self.error(&format!("unexpected character '{}'", c))),
            }
        }

        Ok(counts)
    }

    fn accumulate(&self, counts: &mut BTreeMap<String, i64>, symbol: String, count: i64) -> Result<()> {
        let entry = counts.entry(symbol).or_insert(0);
        *entry = entry.checked_add(count).ok_or_else(|| self.error("count out of range"))?;
        Ok(())
    }

    fn parse_symbol(&mut self) -> String {
        let mut symbol = String::new();
        symbol.push(self.chars[self.pos]);
        self.pos += 1;
        while let Some(c) = self.chars.get(self.pos).filter(|c| c.is_ascii_lowercase()) {
            symbol.push(*c);
            self.pos += 1;
        }
        symbol
    }

    fn parse_count(&mut self) -> Result<i64> {
        let start = self.pos;
        while self.chars.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(1);
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse::<i32>()
            .map(|count| count as i64)
            .map_err(|_| self.error(&format!("count '{}' out of range", digits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_simple_formula() {
        let composition = parse_formula("C5H5N5O").unwrap();
        assert_eq!(composition.get("C"), 5);
        assert_eq!(composition.get("H"), 5);
        assert_eq!(composition.get("N"), 5);
        assert_eq!(composition.get("O"), 1);
        assert_eq!(composition.charge(), 0);
        assert_eq!(composition.len(), 4);
    }

    #[test]
    fn test_repeated_elements_are_summed() {
        let composition = parse_formula("C5H3OH").unwrap();
        assert_eq!(composition.get("H"), 4);
    }

    #[test]
    fn test_nested_groups() {
        let composition = parse_formula("Ca(C(OH)2)3").unwrap();
        assert_eq!(composition.get("Ca"), 1);
        assert_eq!(composition.get("C"), 3);
        assert_eq!(composition.get("O"), 6);
        assert_eq!(composition.get("H"), 6);
    }

    #[test]
    fn test_adducts() {
        let composition = parse_formula("C5H3OH+H-C").unwrap();
        assert_eq!(composition.get("C"), 4);
        assert_eq!(composition.get("H"), 5);
        assert_eq!(composition.charge(), 0);
    }

    #[test]
    fn test_charge_suffixes() {
        assert_eq!(parse_formula("C2H5OH+").unwrap().charge(), 1);
        assert_eq!(parse_formula("C2H5OH++").unwrap().charge(), 2);
        assert_eq!(parse_formula("C2H5OH-").unwrap().charge(), -1);
        assert_eq!(parse_formula("C2H5OH+3").unwrap().charge(), 3);
        assert_eq!(parse_formula("C2H5OH-2").unwrap().charge(), -2);
        let adduct = parse_formula("C2H5OH+Na+").unwrap();
        assert_eq!(adduct.get("Na"), 1);
        assert_eq!(adduct.charge(), 1);
    }

    #[test]
    fn test_invalid_formulas() {
        for sf in ["UnknownElements", "C2HzO3", "C5:H2", "C2(H3O", "C2H3)", "", "+H", "C2H6+", "()2", "H-"] {
            match parse_formula(sf) {
                Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidFormula, "{}", sf),
                Ok(c) if sf == "C2H6+" || sf == "H-" => assert_ne!(c.charge(), 0),
                Ok(c) => panic!("'{}' parsed into {}", sf, c),
            }
        }
    }

    #[test]
    fn test_negative_count_rejected() {
        let err = parse_formula("H2O-H3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormula);
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_huge_nested_counts_are_rejected() {
        for sf in ["((H999999999)999999999)999999999", "(((C2147483647)2147483647)2147483647)2"] {
            let err = parse_formula(sf).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormula, "{}", sf);
            assert!(err.to_string().contains("out of range"), "{}", err);
        }
        assert_eq!(parse_formula("(H999)999").unwrap().get("H"), 998001);
    }

    #[test]
    fn test_removing_everything_is_rejected() {
        assert!(parse_formula("H2O-H2O").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let composition = parse_formula("C6H12O6++").unwrap();
        assert_eq!(composition.to_string(), "C6H12O6+2");
        assert_eq!(parse_formula(&composition.to_string()).unwrap(), composition);
    }

    #[test]
    fn test_monoisotopic_mass() {
        let sum_formula = SumFormula::new("H2O").unwrap();
        assert!((sum_formula.monoisotopic_mass() - 18.0105646837).abs() < 1e-8);
    }
}
