//! Residual statistics used for model selection and reporting.

/// Sum of squared residuals `Σ (y_i − ŷ_i)²`.
///
/// # Panics
/// Panics in debug builds if the slices differ in length.
pub fn sse(observed: &[f64], fitted: &[f64]) -> f64 {
    debug_assert_eq!(observed.len(), fitted.len());
    observed
        .iter()
        .zip(fitted.iter())
        .map(|(&y, &f)| {
            let r = y - f;
            r * r
        })
        .sum()
}

/// Root-mean-square residual; zero for an empty sample.
pub fn rmse(sse: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    (sse / n as f64).sqrt()
}

/// Round `value` to `digits` significant digits and render it with exactly
/// that many, e.g. `0.5 -> "0.50"`, `123.4 -> "120"`, `-0.01234 -> "-0.012"`.
pub fn format_significant(value: f64, digits: usize) -> String {
    let digits = digits.max(1) as i32;
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }

    let magnitude = value.abs().log10().floor() as i32;
    let exponent = digits - 1 - magnitude;
    let rounded = if exponent >= 0 {
        let scale = 10f64.powi(exponent);
        (value * scale).round() / scale
    } else {
        let scale = 10f64.powi(-exponent);
        (value / scale).round() * scale
    };

    // Rounding may carry into the next decade (9.96 -> 10).
    let magnitude = rounded.abs().log10().floor() as i32;
    let decimals = (digits - 1 - magnitude).max(0) as usize;
    format!("{rounded:.decimals$}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_and_rmse_basic() {
        let s = sse(&[1.0, 2.0, 3.0], &[1.0, 1.0, 5.0]);
        assert_eq!(s, 5.0);
        assert!((rmse(s, 3) - (5.0f64 / 3.0).sqrt()).abs() < 1e-15);
        assert_eq!(rmse(0.0, 0), 0.0);
    }

    #[test]
    fn significant_digits() {
        assert_eq!(format_significant(0.5, 2), "0.50");
        assert_eq!(format_significant(0.3, 2), "0.30");
        assert_eq!(format_significant(10.0, 2), "10");
        assert_eq!(format_significant(123.4, 2), "120");
        assert_eq!(format_significant(-0.01234, 2), "-0.012");
        assert_eq!(format_significant(0.00012345, 3), "0.000123");
        assert_eq!(format_significant(0.0, 2), "0");
    }

    #[test]
    fn significant_digits_after_carry() {
        assert_eq!(format_significant(9.96, 2), "10");
        assert_eq!(format_significant(0.0996, 2), "0.10");
        assert_eq!(format_significant(0.996, 2), "1.0");
        assert_eq!(format_significant(-9.97, 2), "-10");
        assert_eq!(format_significant(99.5, 3), "99.5");
        assert_eq!(format_significant(999.7, 3), "1000");
    }
}
