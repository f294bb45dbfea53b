//! # Variance spectrum utilities
//!
//! Converts raw decomposition spectra (eigenvalues of a covariance matrix or
//! singular values of a data matrix) into explained-variance percentages and
//! answers the question "how many components do I need to keep `p` of the
//! variance?".

use num_traits::Float;
use thiserror::Error;

/// Failure modes of the variance spectrum transform.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpectrumError {
    #[error("spectrum is empty")]
    Empty,
    #[error("spectrum has zero total variance, percentages are undefined")]
    ZeroTotalVariance,
}

/// Explained-variance view of a decomposition spectrum.
///
/// `percents` is sorted by descending absolute magnitude and L1-normalized, so
/// its entries are non-negative and sum to one. `cumulative` holds the running
/// prefix sums of `percents`; its last entry is one up to rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceSpectrum<T> {
    pub percents: Vec<T>,
    pub cumulative: Vec<T>,
}

impl<T: Float> VarianceSpectrum<T> {
    /// Number of components needed to reach the target variance fraction.
    ///
    /// See [`components_for_target`].
    pub fn components_for_target(&self, target: T) -> usize {
        components_for_target(&self.cumulative, target)
    }
}

/// Computes explained-variance percentages and their cumulative sums.
///
/// The input carries no ordering guarantee; entries are sorted by descending
/// absolute value before normalization. Negative entries are tolerated by
/// taking absolute values, since eigensolvers can return small negative
/// eigenvalues for a covariance matrix that is non-negative in exact
/// arithmetic.
///
/// Fails with [`SpectrumError::Empty`] on an empty input and with
/// [`SpectrumError::ZeroTotalVariance`] when every entry is zero, in which
/// case percentages would require dividing by a zero sum.
pub fn variance_spectrum<T: Float>(values: &[T]) -> Result<VarianceSpectrum<T>, SpectrumError> {
    if values.is_empty() {
        return Err(SpectrumError::Empty);
    }

    let mut magnitudes: Vec<T> = values.iter().map(|v| v.abs()).collect();
    magnitudes.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let total = magnitudes
        .iter()
        .fold(T::zero(), |acc, &m| acc + m);
    if total == T::zero() {
        return Err(SpectrumError::ZeroTotalVariance);
    }

    let percents: Vec<T> = magnitudes.iter().map(|&m| m / total).collect();

    let mut cumulative = Vec::with_capacity(percents.len());
    let mut running = T::zero();
    for &p in &percents {
        running = running + p;
        cumulative.push(running);
    }

    Ok(VarianceSpectrum {
        percents,
        cumulative,
    })
}

/// Smallest 1-based component count whose cumulative variance reaches `target`.
///
/// The bound is inclusive: the first index with `cumulative[k-1] >= target`
/// wins. When no index qualifies (`target > 1`, or rounding leaves the final
/// cumulative entry just under the target) the full spectrum length is
/// returned instead of an error. Callers asking for an unreachable target get
/// every component back rather than a failure signal, so an out-of-range
/// request is masked; check `target <= 1.0` beforehand if that matters.
pub fn components_for_target<T: Float>(cumulative: &[T], target: T) -> usize {
    cumulative
        .iter()
        .position(|&c| c >= target)
        .map(|i| i + 1)
        .unwrap_or(cumulative.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Covariance eigenvalues from the 13-feature wine example.
    const WINE_EIGENVALUES: [f64; 13] = [
        4.73, 2.51, 1.45, 0.92, 0.86, 0.65, 0.55, 0.10, 0.35, 0.17, 0.29, 0.23, 0.25,
    ];

    #[test]
    fn percents_sorted_and_normalized() {
        let spectrum = variance_spectrum(&WINE_EIGENVALUES).unwrap();

        let sum: f64 = spectrum.percents.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-12);

        for pair in spectrum.percents.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert!(spectrum.percents.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn cumulative_is_monotone_and_ends_at_one() {
        let spectrum = variance_spectrum(&WINE_EIGENVALUES).unwrap();

        for pair in spectrum.cumulative.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_relative_eq!(*spectrum.cumulative.last().unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn wine_example_dimension_counts() {
        let spectrum = variance_spectrum(&WINE_EIGENVALUES).unwrap();

        assert_eq!(spectrum.components_for_target(0.80), 5);
        assert_eq!(spectrum.components_for_target(0.95), 10);
    }

    #[test]
    fn target_bounds() {
        let spectrum = variance_spectrum(&WINE_EIGENVALUES).unwrap();
        let n = WINE_EIGENVALUES.len();

        assert_eq!(spectrum.components_for_target(0.0), 1);
        assert_eq!(spectrum.components_for_target(1.0), n);
        // Unreachable target falls back to the full length.
        assert_eq!(spectrum.components_for_target(1.5), n);
    }

    #[test]
    fn transform_is_idempotent() {
        let first = variance_spectrum(&WINE_EIGENVALUES).unwrap();
        let second = variance_spectrum(&first.percents).unwrap();

        for (a, b) in first.percents.iter().zip(&second.percents) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn scale_invariance() {
        let base = variance_spectrum(&WINE_EIGENVALUES).unwrap();

        for scale in [0.001, -1.0, 7.5e6] {
            let scaled: Vec<f64> = WINE_EIGENVALUES.iter().map(|v| v * scale).collect();
            let spectrum = variance_spectrum(&scaled).unwrap();
            for (a, b) in base.percents.iter().zip(&spectrum.percents) {
                assert_relative_eq!(*a, *b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn negative_entries_use_absolute_value() {
        let spectrum = variance_spectrum(&[-4.0, 1.0, -3.0, 2.0]).unwrap();
        assert_relative_eq!(spectrum.percents[0], 0.4, epsilon = 1e-12);
        assert_relative_eq!(spectrum.percents[1], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            variance_spectrum::<f64>(&[]).unwrap_err(),
            SpectrumError::Empty
        );
    }

    #[test]
    fn all_zero_input_is_rejected() {
        assert_eq!(
            variance_spectrum(&[0.0, 0.0, 0.0]).unwrap_err(),
            SpectrumError::ZeroTotalVariance
        );
    }

    #[test]
    fn works_for_f32() {
        let values: [f32; 3] = [3.0, 1.0, 6.0];
        let spectrum = variance_spectrum(&values).unwrap();
        assert_eq!(spectrum.components_for_target(0.6), 1);
        assert_eq!(spectrum.components_for_target(0.9), 2);
    }
}
