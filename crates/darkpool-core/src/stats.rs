//! Descriptive statistics and the non-parametric tests used by the analyses.
//!
//! Every function returns `None` when a statistic is undefined so that no NaN
//! or infinity ever reaches a report.

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Exact Mann-Whitney p-values are used when either sample is at most this large.
const EXACT_MWU_MAX: usize = 8;

/// Round to `places` decimals, exact halves going to the even neighbour.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Population standard deviation (divides by n).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Ranks with ties replaced by their average rank (1-based).
pub fn rank_average(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Sum of t^3 - t over groups of tied values.
fn tie_term(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut total = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[i] {
            j += 1;
        }
        let t = (j - i + 1) as f64;
        total += t * t * t - t;
        i = j + 1;
    }
    total
}

/// Test statistic with its p-value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

/// Number of arrangements giving each value of U for samples of size `m` and `n`.
fn mwu_frequencies(m: usize, n: usize) -> Vec<f64> {
    // table[i][j][u]: arrangements of i x-values and j y-values with statistic u
    let mut table: Vec<Vec<Vec<f64>>> = vec![vec![Vec::new(); n + 1]; m + 1];
    for i in 0..=m {
        for j in 0..=n {
            if i == 0 || j == 0 {
                table[i][j] = vec![1.0];
                continue;
            }
            let mut freq = vec![0.0; i * j + 1];
            for (u, slot) in freq.iter_mut().enumerate() {
                if u >= j {
                    if let Some(v) = table[i - 1][j].get(u - j) {
                        *slot += v;
                    }
                }
                if let Some(v) = table[i][j - 1].get(u) {
                    *slot += v;
                }
            }
            table[i][j] = freq;
        }
    }
    std::mem::take(&mut table[m][n])
}

/// Two-sided Mann-Whitney U test. The reported statistic is U of the first sample.
///
/// Uses the exact distribution for small samples without ties, otherwise the
/// normal approximation with tie and continuity corrections.
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> Option<TestOutcome> {
    if x.is_empty() || y.is_empty() {
        return None;
    }
    let (n1, n2) = (x.len() as f64, y.len() as f64);

    let combined: Vec<f64> = x.iter().chain(y.iter()).copied().collect();
    let ranks = rank_average(&combined);
    let r1: f64 = ranks[..x.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u2 = n1 * n2 - u1;
    let u = u1.max(u2);

    let ties = tie_term(&combined);
    let exact = (x.len() <= EXACT_MWU_MAX || y.len() <= EXACT_MWU_MAX) && ties == 0.0;

    let p_value = if exact {
        let freq = mwu_frequencies(x.len(), y.len());
        let total: f64 = freq.iter().sum();
        let k = u.round() as usize;
        let upper: f64 = freq.iter().skip(k).sum();
        2.0 * upper / total
    } else {
        let n = n1 + n2;
        let mu = n1 * n2 / 2.0;
        let var = n1 * n2 / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)));
        if var <= 0.0 {
            1.0
        } else {
            let z = (u - mu - 0.5) / var.sqrt();
            let normal = Normal::new(0.0, 1.0).ok()?;
            2.0 * normal.sf(z)
        }
    };

    Some(TestOutcome {
        statistic: u1,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

/// Kruskal-Wallis H test across `groups`, tie-corrected.
///
/// Needs at least two non-empty groups. All-tied data yields H = 0, p = 1.
pub fn kruskal_wallis(groups: &[&[f64]]) -> Option<TestOutcome> {
    if groups.len() < 2 || groups.iter().any(|g| g.is_empty()) {
        return None;
    }

    let combined: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = combined.len() as f64;
    let ranks = rank_average(&combined);

    let mut offset = 0;
    let mut sum = 0.0;
    for group in groups {
        let r: f64 = ranks[offset..offset + group.len()].iter().sum();
        sum += r * r / group.len() as f64;
        offset += group.len();
    }
    let h = 12.0 / (n * (n + 1.0)) * sum - 3.0 * (n + 1.0);

    let correction = 1.0 - tie_term(&combined) / (n * n * n - n);
    if correction <= 0.0 {
        return Some(TestOutcome {
            statistic: 0.0,
            p_value: 1.0,
        });
    }
    let h = h / correction;

    let dist = ChiSquared::new((groups.len() - 1) as f64).ok()?;
    Some(TestOutcome {
        statistic: h,
        p_value: dist.sf(h).clamp(0.0, 1.0),
    })
}

/// Pearson chi-squared test of independence on a contingency table.
///
/// All-zero rows and columns are dropped first; `None` if fewer than two rows
/// or columns remain. Yates' correction is applied when one degree of freedom
/// is left.
pub fn chi_squared_independence(table: &[Vec<f64>]) -> Option<(TestOutcome, usize)> {
    let width = table.first().map(|r| r.len()).unwrap_or(0);
    let keep_cols: Vec<usize> = (0..width)
        .filter(|&c| table.iter().map(|r| r[c]).sum::<f64>() > 0.0)
        .collect();
    let reduced: Vec<Vec<f64>> = table
        .iter()
        .filter(|r| r.iter().sum::<f64>() > 0.0)
        .map(|r| keep_cols.iter().map(|&c| r[c]).collect())
        .collect();

    let rows = reduced.len();
    let cols = keep_cols.len();
    if rows < 2 || cols < 2 {
        return None;
    }

    let row_sums: Vec<f64> = reduced.iter().map(|r| r.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..cols)
        .map(|c| reduced.iter().map(|r| r[c]).sum())
        .collect();
    let total: f64 = row_sums.iter().sum();
    let dof = (rows - 1) * (cols - 1);

    let mut chi2 = 0.0;
    for (i, row) in reduced.iter().enumerate() {
        for (j, &observed) in row.iter().enumerate() {
            let expected = row_sums[i] * col_sums[j] / total;
            let mut diff = (observed - expected).abs();
            if dof == 1 {
                diff = (diff - 0.5).max(0.0);
            }
            chi2 += diff * diff / expected;
        }
    }

    let dist = ChiSquared::new(dof as f64).ok()?;
    Some((
        TestOutcome {
            statistic: chi2,
            p_value: dist.sf(chi2).clamp(0.0, 1.0),
        },
        dof,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_descriptive() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean(&v), Some(2.5));
        assert_eq!(median(&v), Some(2.5));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert!(close(std_dev(&v).unwrap(), 1.118_033_988, 1e-6));
        assert_eq!(mean(&[]), None);
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(33.333_333, 2), 33.33);
        assert_eq!(round_to(66.666_666, 1), 66.7);
    }

    #[test]
    fn test_round_to_halves_go_to_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.25, 1), 0.2);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
    }

    #[test]
    fn test_rank_average_with_ties() {
        let ranks = rank_average(&[10.0, 20.0, 10.0, 30.0]);
        assert_eq!(ranks, vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_mann_whitney_exact_small_samples() {
        // Complete separation of two samples of three: U1 = 0, p = 2/20.
        let out = mann_whitney_u(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(out.statistic, 0.0);
        assert!(close(out.p_value, 0.1, 1e-12));
    }

    #[test]
    fn test_mann_whitney_identical_samples_not_significant() {
        let out = mann_whitney_u(&[5.0; 12], &[5.0; 10]).unwrap();
        assert_eq!(out.p_value, 1.0);
        assert_eq!(out.statistic, 60.0);
    }

    #[test]
    fn test_mann_whitney_asymptotic_with_ties() {
        let x: Vec<f64> = (0..12).map(|i| (i % 4) as f64).collect();
        let y: Vec<f64> = (0..12).map(|i| 10.0 + (i % 3) as f64).collect();
        let out = mann_whitney_u(&x, &y).unwrap();
        assert_eq!(out.statistic, 0.0);
        assert!(close(out.p_value, 3.046_468_48e-5, 1e-10));
    }

    #[test]
    fn test_mann_whitney_asymptotic_without_ties() {
        // Nine observations per side is past the exact branch.
        let x: Vec<f64> = (1..=9).map(f64::from).collect();
        let y: Vec<f64> = (10..=18).map(f64::from).collect();
        let out = mann_whitney_u(&x, &y).unwrap();
        assert_eq!(out.statistic, 0.0);
        assert!(close(out.p_value, 0.000_412_294_802, 1e-10));

        let swapped = mann_whitney_u(&y, &x).unwrap();
        assert_eq!(swapped.statistic, 81.0);
        assert!(close(swapped.p_value, out.p_value, 1e-15));
    }

    #[test]
    fn test_mann_whitney_empty_sample() {
        assert!(mann_whitney_u(&[], &[1.0]).is_none());
    }

    #[test]
    fn test_kruskal_wallis_separated_groups() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [6.0, 7.0, 8.0, 9.0, 10.0];
        let c = [11.0, 12.0, 13.0, 14.0, 15.0];
        let out = kruskal_wallis(&[&a[..], &b[..], &c[..]]).unwrap();
        assert!(close(out.statistic, 12.5, 1e-9));
        assert!(close(out.p_value, 0.001_930_454, 1e-6));
    }

    #[test]
    fn test_kruskal_wallis_all_tied() {
        let a = [2.0, 2.0];
        let out = kruskal_wallis(&[&a[..], &a[..], &a[..]]).unwrap();
        assert_eq!(out.statistic, 0.0);
        assert_eq!(out.p_value, 1.0);
    }

    #[test]
    fn test_kruskal_wallis_requires_all_groups() {
        let a = [1.0, 2.0];
        let empty: [f64; 0] = [];
        assert!(kruskal_wallis(&[&a[..], &empty[..], &a[..]]).is_none());
    }

    #[test]
    fn test_chi_squared_independent_table() {
        let table = vec![vec![10.0, 10.0], vec![20.0, 20.0], vec![5.0, 5.0]];
        let (out, dof) = chi_squared_independence(&table).unwrap();
        assert_eq!(dof, 2);
        assert!(close(out.statistic, 0.0, 1e-12));
        assert!(close(out.p_value, 1.0, 1e-12));
    }

    #[test]
    fn test_chi_squared_drops_empty_columns() {
        let table = vec![
            vec![8.0, 0.0, 0.0],
            vec![0.0, 0.0, 8.0],
            vec![0.0, 0.0, 0.0],
        ];
        let (out, dof) = chi_squared_independence(&table).unwrap();
        // 2x2 after reduction, Yates-corrected: 4 * (4 - 0.5)^2 / 4 = 12.25
        assert_eq!(dof, 1);
        assert!(close(out.statistic, 12.25, 1e-9));
        assert!(out.p_value < 0.001);
    }

    #[test]
    fn test_chi_squared_degenerate() {
        let table = vec![vec![3.0, 4.0], vec![0.0, 0.0]];
        assert!(chi_squared_independence(&table).is_none());
    }
}
