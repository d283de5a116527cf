pub fn smaller_of_two<T: PartialOrd>(a: T, b: T) -> T {
    if a < b {
        a
    } else {
        b
    }
}

pub fn greater_of_two<T: PartialOrd>(a: T, b: T) -> T {
    if b < a {
        a
    } else {
        b
    }
}

/// Force a probability back into the unit interval.
///
/// ```rust
/// use model::util::clamp_probability;
/// assert_eq!(clamp_probability(1.2), 1.0);
/// assert_eq!(clamp_probability(-0.1), 0.0);
/// assert_eq!(clamp_probability(0.25), 0.25);
/// ```
pub fn clamp_probability(p: f64) -> f64 {
    greater_of_two(0.0, smaller_of_two(1.0, p))
}

/// Arithmetic mean and population variance (divisor `n`).
pub fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}
