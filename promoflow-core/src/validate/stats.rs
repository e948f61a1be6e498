//! Two-sample tests used by the drift check.

use std::collections::BTreeMap;

/// Result of a two-sample hypothesis test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

impl TestOutcome {
    /// Outcome used when a sample is empty and nothing can be compared.
    pub fn inconclusive() -> Self {
        Self {
            statistic: 0.0,
            p_value: 1.0,
        }
    }
}

/// Two-sample Kolmogorov-Smirnov test with the asymptotic p-value.
pub fn ks_two_sample(reference: &[f64], current: &[f64]) -> TestOutcome {
    if reference.is_empty() || current.is_empty() {
        return TestOutcome::inconclusive();
    }
    let mut a = reference.to_vec();
    let mut b = current.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        let gap = (i as f64 / n1 - j as f64 / n2).abs();
        d = d.max(gap);
    }

    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let p_value = kolmogorov_q((en + 0.12 + 0.11 / en) * d);
    TestOutcome {
        statistic: d,
        p_value,
    }
}

/// Survival function of the Kolmogorov distribution.
fn kolmogorov_q(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut previous: f64 = 0.0;
    for j in 1..=100 {
        let j = j as f64;
        let term = fac * (a2 * j * j).exp();
        sum += term;
        if term.abs() <= 1e-3 * previous || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        previous = term.abs();
    }
    1.0
}

/// Chi-square test of homogeneity over the union of observed categories.
pub fn chi_square_homogeneity(
    reference: &BTreeMap<String, usize>,
    current: &BTreeMap<String, usize>,
) -> TestOutcome {
    let n_ref: usize = reference.values().sum();
    let n_cur: usize = current.values().sum();
    if n_ref == 0 || n_cur == 0 {
        return TestOutcome::inconclusive();
    }

    let mut categories: Vec<&String> = reference.keys().chain(current.keys()).collect();
    categories.sort();
    categories.dedup();
    if categories.len() < 2 {
        return TestOutcome::inconclusive();
    }

    let total = (n_ref + n_cur) as f64;
    let mut statistic = 0.0;
    for category in &categories {
        let o_ref = reference.get(*category).copied().unwrap_or(0) as f64;
        let o_cur = current.get(*category).copied().unwrap_or(0) as f64;
        let column_total = o_ref + o_cur;
        for (observed, row_total) in [(o_ref, n_ref as f64), (o_cur, n_cur as f64)] {
            let expected = row_total * column_total / total;
            if expected > 0.0 {
                statistic += (observed - expected).powi(2) / expected;
            }
        }
    }

    let dof = (categories.len() - 1) as f64;
    TestOutcome {
        statistic,
        p_value: chi_square_sf(statistic, dof),
    }
}

/// Upper tail of the chi-square distribution.
pub fn chi_square_sf(x: f64, dof: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    upper_regularized_gamma(dof / 2.0, x / 2.0)
}

fn ln_gamma(x: f64) -> f64 {
    const COF: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for c in COF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}

fn upper_regularized_gamma(a: f64, x: f64) -> f64 {
    if x < a + 1.0 {
        1.0 - lower_gamma_series(a, x)
    } else {
        upper_gamma_fraction(a, x)
    }
}

fn lower_gamma_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut del = sum;
    for _ in 0..500 {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * 1e-14 {
            break;
        }
    }
    (sum * (-x + a * x.ln() - ln_gamma(a)).exp()).clamp(0.0, 1.0)
}

fn upper_gamma_fraction(a: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-300;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..500 {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < 1e-14 {
            break;
        }
    }
    ((-x + a * x.ln() - ln_gamma(a)).exp() * h).clamp(0.0, 1.0)
}
