/// Population statistics backing the shrinkage prior for one
/// (aspect, population) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationStats {
    /// Mean of the finite raw means in the population. `None` when no record
    /// rates the aspect; every dependent score is then No Data.
    pub prior_mean: Option<f64>,
    /// Average response count across the whole population, acting as the
    /// prior's pseudo-sample-size C. Always non-negative.
    pub prior_strength: f64,
}

impl PopulationStats {
    pub const EMPTY: PopulationStats = PopulationStats {
        prior_mean: None,
        prior_strength: 0.0,
    };
}

/// Compute the prior for one aspect over a population of
/// (raw mean, response count) observations.
///
/// Records missing the aspect value are excluded from the mean but still
/// contribute their response count to the strength average, since C models
/// the population's typical survey sample size rather than the aspect's.
pub fn population_stats(observations: &[(Option<f64>, i64)]) -> PopulationStats {
    if observations.is_empty() {
        return PopulationStats::EMPTY;
    }

    let mut rating_sum = 0.0;
    let mut rating_count = 0usize;
    let mut response_sum = 0.0;

    for &(raw, n) in observations {
        if let Some(value) = raw {
            if value.is_finite() {
                rating_sum += value;
                rating_count += 1;
            }
        }
        response_sum += n as f64;
    }

    PopulationStats {
        prior_mean: (rating_count > 0).then(|| rating_sum / rating_count as f64),
        prior_strength: response_sum / observations.len() as f64,
    }
}

/// Empirical-Bayes shrinkage toward the population prior.
///
/// `(C*m + raw*n) / (C + n)`: a convex combination of the prior mean and the
/// raw mean, so the result stays inside the raw rating domain. `n = 0` yields
/// the prior mean exactly; large `n` approaches the raw mean. Callers must
/// guarantee `n >= 0`.
pub fn shrink(raw_mean: Option<f64>, n: i64, stats: &PopulationStats) -> Option<f64> {
    let raw = raw_mean.filter(|v| v.is_finite())?;
    let m = stats.prior_mean?;
    let c = stats.prior_strength;
    if n == 0 {
        // Returned directly rather than via the blend, which could drift an
        // ulp off the prior (and past the domain edge) through `(c*m)/c`.
        return (c > 0.0).then_some(m);
    }
    let n = n as f64;
    Some((c * m + raw * n) / (c + n))
}
