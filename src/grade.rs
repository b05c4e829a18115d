use std::fmt;

use clap::ValueEnum;

/// Percentile rank of `value` within `population`: the share of population
/// values strictly below it, scaled to [0, 100). Ties are not averaged, so a
/// value tied at the bottom ranks at 0, and a single-member population always
/// ranks at 0. An empty population also ranks at 0.
///
/// `population` must already exclude No Data entries and be sorted ascending.
pub fn percentile(value: f64, population: &[f64]) -> f64 {
    if population.is_empty() {
        return 0.0;
    }
    let below = population.partition_point(|&v| v < value);
    (below as f64 / population.len() as f64) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    F,
    D,
    CMinus,
    C,
    CPlus,
    BMinus,
    B,
    BPlus,
    AMinus,
    A,
    APlus,
    SMinus,
    S,
    SPlus,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::SPlus => "S+",
            Grade::S => "S",
            Grade::SMinus => "S-",
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which boundary table maps percentiles to letter grades. The tables come
/// from different eras of the grading scheme and are not reconcilable, so
/// both are kept as named policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GradePolicy {
    /// 14 bands over the percentile-from-below, lower-inclusive.
    #[default]
    Fine,
    /// Coarser 12 bands read over the top-percent (100 - percentile).
    Legacy,
}

impl fmt::Display for GradePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GradePolicy::Fine => "fine",
            GradePolicy::Legacy => "legacy",
        })
    }
}

/// Fine-policy bands, tightest first; a percentile lands in the first band
/// whose lower bound it reaches. Upper bounds are implied by the next band.
const FINE_BANDS: [(f64, Grade); 14] = [
    (99.9, Grade::SPlus),
    (99.5, Grade::S),
    (99.0, Grade::SMinus),
    (98.0, Grade::APlus),
    (95.0, Grade::A),
    (90.0, Grade::AMinus),
    (80.0, Grade::BPlus),
    (60.0, Grade::B),
    (50.0, Grade::BMinus),
    (40.0, Grade::CPlus),
    (30.0, Grade::C),
    (20.0, Grade::CMinus),
    (10.0, Grade::D),
    (0.0, Grade::F),
];

/// Legacy bands keyed by how far from the top a record sits, tightest first:
/// the top 0.1% is S+, the next tier up to 0.5% is S, and so on.
const LEGACY_BANDS: [(f64, Grade); 11] = [
    (0.1, Grade::SPlus),
    (0.5, Grade::S),
    (1.0, Grade::SMinus),
    (2.0, Grade::APlus),
    (5.0, Grade::A),
    (10.0, Grade::AMinus),
    (20.0, Grade::BPlus),
    (40.0, Grade::B),
    (60.0, Grade::BMinus),
    (80.0, Grade::C),
    (95.0, Grade::D),
];

/// Map a percentile in [0, 100) to a letter grade. Total over the domain:
/// every input gets exactly one grade.
pub fn classify(policy: GradePolicy, percentile: f64) -> Grade {
    match policy {
        GradePolicy::Fine => {
            for (lower, grade) in FINE_BANDS {
                if percentile >= lower {
                    return grade;
                }
            }
            Grade::F
        }
        GradePolicy::Legacy => {
            let from_top = 100.0 - percentile;
            for (upper, grade) in LEGACY_BANDS {
                if from_top < upper {
                    return grade;
                }
            }
            Grade::F
        }
    }
}

/// Format an integer rank with its English ordinal suffix (1st, 2nd, 3rd,
/// 4th, with the 11th-13th exception band).
pub fn ordinal(rank: i64) -> String {
    let last_two = rank % 100;
    let suffix = if (11..=13).contains(&last_two) {
        "th"
    } else {
        match rank % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{rank}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_counts_strictly_below() {
        let population = [3.0, 4.0, 4.0, 4.5, 5.0];
        assert_eq!(percentile(4.0, &population), 20.0);
        assert_eq!(percentile(3.0, &population), 0.0);
        assert_eq!(percentile(5.0, &population), 80.0);
    }

    #[test]
    fn percentile_degenerate_populations() {
        assert_eq!(percentile(4.2, &[]), 0.0);
        // A lone member counts no values strictly below itself.
        assert_eq!(percentile(4.2, &[4.2]), 0.0);
    }

    #[test]
    fn percentile_bounds_and_monotonicity() {
        let population: Vec<f64> = (0..50).map(|i| 2.0 + i as f64 * 0.05).collect();
        let mut previous = -1.0;
        for step in 0..=60 {
            let value = 1.8 + step as f64 * 0.05;
            let p = percentile(value, &population);
            assert!((0.0..=100.0).contains(&p));
            assert!(p >= previous);
            previous = p;
        }
        // Members of the population never reach 100.
        for &value in &population {
            assert!(percentile(value, &population) < 100.0);
        }
    }

    #[test]
    fn fine_bands_at_exact_edges() {
        assert_eq!(classify(GradePolicy::Fine, 80.0), Grade::BPlus);
        assert_eq!(classify(GradePolicy::Fine, 79.999), Grade::B);
        assert_eq!(classify(GradePolicy::Fine, 0.0), Grade::F);
        assert_eq!(classify(GradePolicy::Fine, 10.0), Grade::D);
        assert_eq!(classify(GradePolicy::Fine, 50.0), Grade::BMinus);
        assert_eq!(classify(GradePolicy::Fine, 95.0), Grade::A);
        assert_eq!(classify(GradePolicy::Fine, 99.5), Grade::S);
        assert_eq!(classify(GradePolicy::Fine, 99.9), Grade::SPlus);
        assert_eq!(classify(GradePolicy::Fine, 99.899), Grade::S);
    }

    #[test]
    fn fine_policy_is_total_over_domain() {
        let mut p = 0.0;
        while p < 100.0 {
            let _ = classify(GradePolicy::Fine, p);
            p += 0.037;
        }
    }

    #[test]
    fn legacy_bands_read_from_the_top() {
        assert_eq!(classify(GradePolicy::Legacy, 99.95), Grade::SPlus);
        assert_eq!(classify(GradePolicy::Legacy, 99.2), Grade::SMinus);
        assert_eq!(classify(GradePolicy::Legacy, 92.0), Grade::AMinus);
        assert_eq!(classify(GradePolicy::Legacy, 85.0), Grade::BPlus);
        assert_eq!(classify(GradePolicy::Legacy, 0.0), Grade::F);
        assert_eq!(classify(GradePolicy::Legacy, 5.0), Grade::F);
        assert_eq!(classify(GradePolicy::Legacy, 10.0), Grade::D);
        assert_eq!(classify(GradePolicy::Legacy, 30.0), Grade::C);
    }

    #[test]
    fn policies_diverge_mid_table() {
        assert_eq!(classify(GradePolicy::Fine, 45.0), Grade::CPlus);
        assert_eq!(classify(GradePolicy::Legacy, 45.0), Grade::BMinus);
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(102), "102nd");
        assert_eq!(ordinal(111), "111th");
    }
}
