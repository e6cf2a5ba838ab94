//! Similarity coefficients.
//!
//! Both coefficients use the population variance. A constant series has no
//! defined correlation and yields NaN rather than an error.

use ndarray::{Array2, ArrayView1, Axis, Zip};

/// Pearson and concordance coefficients of one comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub concordance: f64,
    pub pearson: f64,
}

impl Coefficients {
    pub const NAN: Coefficients = Coefficients {
        concordance: f64::NAN,
        pearson: f64::NAN,
    };
}

fn mean(x: ArrayView1<'_, f64>) -> f64 {
    x.sum() / x.len() as f64
}

fn population_variance(x: ArrayView1<'_, f64>, mean: f64) -> f64 {
    x.fold(0.0, |acc, v| acc + (v - mean).powi(2)) / x.len() as f64
}

fn is_constant(x: ArrayView1<'_, f64>) -> bool {
    match x.first() {
        Some(first) => x.iter().all(|v| v == first),
        None => true,
    }
}

/// Coefficients of two equally long series.
///
/// The expression is symmetric in its arguments down to the last bit, so
/// swapping `x` and `y` gives identical results.
pub fn series_coefficients(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Coefficients {
    debug_assert_eq!(x.len(), y.len());
    if is_constant(x) || is_constant(y) {
        return Coefficients::NAN;
    }

    let (mx, my) = (mean(x), mean(y));
    let (vx, vy) = (population_variance(x, mx), population_variance(y, my));
    let (sx, sy) = (vx.sqrt(), vy.sqrt());

    let product_sum = Zip::from(&x)
        .and(&y)
        .fold(0.0, |acc, a, b| acc + ((a - mx) / sx) * ((b - my) / sy));
    let pearson = product_sum / x.len() as f64;
    let concordance = 2.0 * pearson * (sx * sy) / ((vx + vy) + (mx - my).powi(2));

    Coefficients {
        concordance,
        pearson,
    }
}

/// Mean of the non-NaN values, NaN when there are none.
pub fn nanmean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Correlate every column of `a` with the same column of `b` along the rows,
/// reducing the per-column coefficients with [`nanmean`].
///
/// Returns `None` when the two matrices do not have the same shape.
pub fn batch_correlate(a: &Array2<f64>, b: &Array2<f64>) -> Option<Coefficients> {
    if a.dim() != b.dim() {
        return None;
    }
    let per_column: Vec<Coefficients> = a
        .axis_iter(Axis(1))
        .zip(b.axis_iter(Axis(1)))
        .map(|(x, y)| series_coefficients(x, y))
        .collect();
    Some(Coefficients {
        concordance: nanmean(per_column.iter().map(|c| c.concordance)),
        pearson: nanmean(per_column.iter().map(|c| c.pearson)),
    })
}
