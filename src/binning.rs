//! Histogram bin edges and the digitization rule shared by every histogram in the crate.

use ndarray::{Array1, ArrayBase, ArrayView1, Data, Dimension};

/// `n_bins` evenly spaced edges from the smallest to the largest value, both inclusive
///
/// NaN values are ignored. If every value is identical the edges collapse onto that value.
pub fn create_bins<S, D>(values: &ArrayBase<S, D>, n_bins: usize) -> Array1<f64>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let min = values.iter().copied().fold(f64::NAN, f64::min);
    let max = values.iter().copied().fold(f64::NAN, f64::max);
    let mut edges = Array1::linspace(min, max, n_bins);
    // linspace can step past max by an ulp; the last edge must be max itself
    if n_bins > 1 {
        edges[n_bins - 1] = max;
    }
    edges
}

/// Index of the bin that `value` falls into, if any
///
/// Bin `b` is the half-open interval `[edges[b], edges[b + 1])`, so a value equal to the first
/// edge lands in bin 0 and a value equal to the last edge is outside every bin. Values outside
/// the edges, and NaN, return `None`. When all the edges coincide, a value equal to them lands in
/// bin 0.
pub fn digitize(value: f64, edges: ArrayView1<'_, f64>) -> Option<usize> {
    let (first, last) = match (edges.iter().next(), edges.iter().last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return None,
    };

    let at_or_below = edges.iter().take_while(|&&edge| edge <= value).count();
    match at_or_below.checked_sub(1) {
        Some(bin) if bin + 1 < edges.len() => Some(bin),
        Some(_) if first == last && value == first => Some(0),
        _ => None,
    }
}
