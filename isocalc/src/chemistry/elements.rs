use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Natural isotopes of a single element as (mass, abundance) pairs.
///
/// Masses are NIST monoisotopic masses, abundances are IUPAC representative
/// isotopic compositions; they sum to one within rounding of the tabulated values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsotopeDistribution {
    pub symbol: String,
    masses: Vec<f64>,
    abundances: Vec<f64>,
}

impl IsotopeDistribution {
    fn new(symbol: &str, isotopes: &[(f64, f64)]) -> Self {
        IsotopeDistribution {
            symbol: symbol.to_string(),
            masses: isotopes.iter().map(|(m, _)| *m).collect(),
            abundances: isotopes.iter().map(|(_, a)| *a).collect(),
        }
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn abundances(&self) -> &[f64] {
        &self.abundances
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// The isotopes as (mass, probability) pairs, the single-atom distribution.
    pub fn as_peaks(&self) -> Vec<(f64, f64)> {
        self.masses.iter().copied().zip(self.abundances.iter().copied()).collect()
    }

    /// Mass of the most abundant isotope.
    pub fn monoisotopic_mass(&self) -> f64 {
        self.masses
            .iter()
            .zip(self.abundances.iter())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(m, _)| *m)
            .unwrap_or(0.0)
    }

    /// Abundance-weighted mass.
    pub fn average_mass(&self) -> f64 {
        let total: f64 = self.abundances.iter().sum();
        self.masses.iter().zip(self.abundances.iter()).map(|(m, a)| m * a).sum::<f64>() / total
    }
}

/// Look up the isotopes of an element by its symbol, e.g. "Fe".
///
/// # Example
///
/// ```
/// use isocalc::chemistry::elements::isotopes;
///
/// let carbon = isotopes("C").unwrap();
/// assert_eq!(carbon.len(), 2);
/// assert_eq!(carbon.masses()[0], 12.0);
/// assert!(isotopes("Xy").is_none());
/// ```
pub fn isotopes(symbol: &str) -> Option<&'static IsotopeDistribution> {
    element_table().get(symbol)
}

pub fn is_known(symbol: &str) -> bool {
    element_table().contains_key(symbol)
}

pub fn monoisotopic_mass(symbol: &str) -> Option<f64> {
    isotopes(symbol).map(|d| d.monoisotopic_mass())
}

pub fn average_mass(symbol: &str) -> Option<f64> {
    isotopes(symbol).map(|d| d.average_mass())
}

/// All known element symbols, sorted alphabetically.
pub fn symbols() -> Vec<&'static str> {
    let mut symbols: Vec<&'static str> = element_table().keys().copied().collect();
    symbols.sort_unstable();
    symbols
}

fn element_table() -> &'static HashMap<&'static str, IsotopeDistribution> {
    static TABLE: OnceLock<HashMap<&'static str, IsotopeDistribution>> = OnceLock::new();
    TABLE.get_or_init(build_element_table)
}

fn build_element_table() -> HashMap<&'static str, IsotopeDistribution> {
    let mut map = HashMap::new();
    let mut insert = |symbol: &'static str, isotopes: &[(f64, f64)]| {
        map.insert(symbol, IsotopeDistribution::new(symbol, isotopes));
    };

    insert("H", &[(1.00782503223, 0.999885), (2.01410177812, 0.000115)]);
    insert("He", &[(3.0160293201, 0.00000134), (4.00260325413, 0.99999866)]);
    insert("Li", &[(6.0151228874, 0.0759), (7.0160034366, 0.9241)]);
    insert("Be", &[(9.012183065, 1.0)]);
    insert("B", &[(10.01293695, 0.199), (11.00930536, 0.801)]);
    insert("C", &[(12.0, 0.9893), (13.00335483507, 0.0107)]);
    insert("N", &[(14.00307400443, 0.99636), (15.00010889888, 0.00364)]);
    insert("O", &[(15.99491461957, 0.99757), (16.99913175650, 0.00038), (17.99915961286, 0.00205)]);
    insert("F", &[(18.99840316273, 1.0)]);
    insert("Ne", &[(19.9924401762, 0.9048), (20.993846685, 0.0027), (21.991385114, 0.0925)]);
    insert("Na", &[(22.9897692820, 1.0)]);
    insert("Mg", &[(23.985041697, 0.7899), (24.985836976, 0.1000), (25.982592968, 0.1101)]);
    insert("Al", &[(26.98153853, 1.0)]);
    insert("Si", &[(27.97692653465, 0.92223), (28.97649466490, 0.04685), (29.973770136, 0.03092)]);
    insert("P", &[(30.97376199842, 1.0)]);
    insert("S", &[(31.9720711744, 0.9499), (32.9714589098, 0.0075), (33.967867004, 0.0425), (35.96708071, 0.0001)]);
    insert("Cl", &[(34.968852682, 0.7576), (36.965902602, 0.2424)]);
    insert("Ar", &[(35.967545105, 0.003336), (37.96273211, 0.000629), (39.9623831237, 0.996035)]);
    insert("K", &[(38.9637064864, 0.932581), (39.963998166, 0.000117), (40.9618252579, 0.067302)]);
    insert("Ca", &[
        (39.962590863, 0.96941), (41.95861783, 0.00647), (42.95876644, 0.00135),
        (43.95548156, 0.02086), (45.9536890, 0.00004), (47.95252276, 0.00187),
    ]);
    insert("Sc", &[(44.95590828, 1.0)]);
    insert("Ti", &[
        (45.95262772, 0.0825), (46.95175879, 0.0744), (47.94794198, 0.7372),
        (48.94786568, 0.0541), (49.94478689, 0.0518),
    ]);
    insert("V", &[(49.94715601, 0.0025), (50.94395704, 0.9975)]);
    insert("Cr", &[(49.94604183, 0.04345), (51.94050623, 0.83789), (52.94064815, 0.09501), (53.93887916, 0.02365)]);
    insert("Mn", &[(54.93804391, 1.0)]);
    insert("Fe", &[(53.93960899, 0.05845), (55.93493633, 0.91754), (56.93539284, 0.02119), (57.93327443, 0.00282)]);
    insert("Co", &[(58.93319429, 1.0)]);
    insert("Ni", &[
        (57.93534241, 0.68077), (59.93078588, 0.26223), (60.93105557, 0.011399),
        (61.92834537, 0.036346), (63.92796682, 0.009255),
    ]);
    insert("Cu", &[(62.92959772, 0.6915), (64.92778970, 0.3085)]);
    insert("Zn", &[
        (63.92914201, 0.4917), (65.92603381, 0.2773), (66.92712775, 0.0404),
        (67.92484455, 0.1845), (69.9253192, 0.0061),
    ]);
    insert("Ga", &[(68.9255735, 0.60108), (70.92470258, 0.39892)]);
    insert("Ge", &[
        (69.92424875, 0.2057), (71.922075826, 0.2745), (72.923458956, 0.0775),
        (73.921177761, 0.3650), (75.921402726, 0.0773),
    ]);
    insert("As", &[(74.92159457, 1.0)]);
    insert("Se", &[
        (73.922475934, 0.0089), (75.919213704, 0.0937), (76.919914154, 0.0763),
        (77.91730928, 0.2377), (79.9165218, 0.4961), (81.9166995, 0.0873),
    ]);
    insert("Br", &[(78.9183376, 0.5069), (80.9162897, 0.4931)]);
    insert("Kr", &[
        (77.92036494, 0.00355), (79.91637808, 0.02286), (81.91348273, 0.11593),
        (82.91412716, 0.11500), (83.9114977282, 0.56987), (85.9106106269, 0.17279),
    ]);
    insert("Rb", &[(84.9117897379, 0.7217), (86.9091805310, 0.2783)]);
    insert("Sr", &[(83.9134191, 0.0056), (85.9092606, 0.0986), (86.9088775, 0.0700), (87.9056125, 0.8258)]);
    insert("Y", &[(88.9058403, 1.0)]);
    insert("Zr", &[
        (89.9046977, 0.5145), (90.9056396, 0.1122), (91.9050347, 0.1715),
        (93.9063108, 0.1738), (95.9082714, 0.0280),
    ]);
    insert("Nb", &[(92.9063730, 1.0)]);
    insert("Mo", &[
        (91.90680796, 0.1453), (93.90508490, 0.0915), (94.90583877, 0.1584), (95.90467612, 0.1667),
        (96.90601812, 0.0960), (97.90540482, 0.2439), (99.9074718, 0.0982),
    ]);
    insert("Ru", &[
        (95.90759025, 0.0554), (97.9052868, 0.0187), (98.9059341, 0.1276), (99.9042143, 0.1260),
        (100.9055769, 0.1706), (101.9043441, 0.3155), (103.9054275, 0.1862),
    ]);
    insert("Rh", &[(102.9054980, 1.0)]);
    insert("Pd", &[
        (101.9056022, 0.0102), (103.9040305, 0.1114), (104.9050796, 0.2233),
        (105.9034804, 0.2733), (107.9038916, 0.2646), (109.9051722, 0.1172),
    ]);
    insert("Ag", &[(106.9050916, 0.51839), (108.9047553, 0.48161)]);
    insert("Cd", &[
        (105.9064599, 0.0125), (107.9041834, 0.0089), (109.90300661, 0.1249), (110.90418287, 0.1280),
        (111.90276287, 0.2413), (112.90440813, 0.1222), (113.90336509, 0.2873), (115.90476315, 0.0749),
    ]);
    insert("In", &[(112.90406184, 0.0429), (114.903878776, 0.9571)]);
    insert("Sn", &[
        (111.90482387, 0.0097), (113.9027827, 0.0066), (114.903344699, 0.0034), (115.90174280, 0.1454),
        (116.90295398, 0.0768), (117.90160657, 0.2422), (118.90331117, 0.0859), (119.90220163, 0.3258),
        (121.9034438, 0.0463), (123.9052766, 0.0579),
    ]);
    insert("Sb", &[(120.9038120, 0.5721), (122.9042132, 0.4279)]);
    insert("Te", &[
        (119.9040593, 0.0009), (121.9030435, 0.0255), (122.9042698, 0.0089), (123.9028171, 0.0474),
        (124.9044299, 0.0707), (125.9033109, 0.1884), (127.90446128, 0.3174), (129.906222748, 0.3408),
    ]);
    insert("I", &[(126.9044719, 1.0)]);
    insert("Xe", &[
        (123.9058920, 0.000952), (125.9042983, 0.000890), (127.9035310, 0.019102),
        (128.9047808611, 0.264006), (129.903509349, 0.040710), (130.90508406, 0.212324),
        (131.9041550856, 0.269086), (133.90539466, 0.104357), (135.907214484, 0.088573),
    ]);
    insert("Cs", &[(132.9054519610, 1.0)]);
    insert("Ba", &[
        (129.9063207, 0.00106), (131.9050611, 0.00101), (133.90450818, 0.02417), (134.90568838, 0.06592),
        (135.90457573, 0.07854), (136.90582714, 0.11232), (137.90524700, 0.71698),
    ]);
    insert("W", &[
        (179.9467108, 0.0012), (181.94820394, 0.2650), (182.95022275, 0.1431),
        (183.95093092, 0.3064), (185.9543628, 0.2843),
    ]);
    insert("Pt", &[
        (189.9599297, 0.00012), (191.9610387, 0.00782), (193.9626809, 0.3286),
        (194.9647917, 0.3378), (195.96495209, 0.2521), (197.9678949, 0.07356),
    ]);
    insert("Au", &[(196.96656879, 1.0)]);
    insert("Hg", &[
        (195.9658326, 0.0015), (197.96676860, 0.0997), (198.96828064, 0.1687), (199.96832659, 0.2310),
        (200.97030284, 0.1318), (201.97064340, 0.2986), (203.97349398, 0.0687),
    ]);
    insert("Tl", &[(202.9723446, 0.2952), (204.9744278, 0.7048)]);
    insert("Pb", &[(203.9730440, 0.014), (205.9744657, 0.241), (206.9758973, 0.221), (207.9766525, 0.524)]);
    insert("Bi", &[(208.9803991, 1.0)]);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abundances_sum_to_one() {
        for symbol in symbols() {
            let dist = isotopes(symbol).unwrap();
            let total: f64 = dist.abundances().iter().sum();
            assert!((total - 1.0).abs() < 1e-3, "{} sums to {}", symbol, total);
            assert_eq!(dist.masses().len(), dist.abundances().len());
        }
    }

    #[test]
    fn test_masses_ascending() {
        for symbol in symbols() {
            let masses = isotopes(symbol).unwrap().masses();
            assert!(masses.windows(2).all(|w| w[0] < w[1]), "{} masses not ascending", symbol);
        }
    }

    #[test]
    fn test_monoisotopic_and_average_mass() {
        assert_eq!(monoisotopic_mass("Fe"), Some(55.93493633));
        let cl = average_mass("Cl").unwrap();
        assert!((cl - 35.4529).abs() < 1e-3);
        assert!(monoisotopic_mass("Qq").is_none());
    }

    #[test]
    fn test_is_known() {
        assert!(is_known("Br"));
        assert!(is_known("Ru"));
        assert!(!is_known("Hz"));
        assert!(!is_known("br"));
    }
}
