use crate::config::IsClose;

/// `|calculated - reported| <= atol + rtol * |reported|`. Nulls are never close.
#[inline]
pub fn is_close(calculated: Option<f64>, reported: Option<f64>, tol: IsClose) -> bool {
    match (calculated, reported) {
        (Some(a), Some(b)) => (a - b).abs() <= tol.atol + tol.rtol * b.abs(),
        _ => false,
    }
}

/// Sum of the non-null terms, or `None` when fewer than `min_count` are non-null.
pub fn weighted_sum<I>(terms: I, min_count: usize) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = terms
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), x| (sum + x, count + 1));
    (count >= min_count).then_some(sum)
}
