/*!
Closed-form results for selfish mining in longest-chain protocols.

These serve as reference curves for results tables and as checks on the
exact analysis of the environments.
*/

/// Revenue of the selfish mining strategy from Eyal and Sirer's paper, for
/// an attacker with mining power `alpha`.
///
/// Mining power of one half or more wins every block. A vanishing
/// denominator falls back to `alpha`.
pub fn selfish_revenue(alpha: f64, gamma: f64) -> f64 {
    if alpha >= 0.5 {
        return 1.0;
    }

    let a = alpha;
    let num = a * (1.0 - a).powi(2) * (4.0 * a + gamma * (1.0 - 2.0 * a))
        - a.powi(3);
    let den = 1.0 - a * (1.0 + a * (2.0 - a));
    if den.abs() < f64::EPSILON {
        return alpha;
    }

    num / den
}

/// Revenue of a rational attacker choosing between honest and selfish
/// mining.
pub fn rational_revenue(alpha: f64, gamma: f64) -> f64 {
    selfish_revenue(alpha, gamma).max(alpha)
}

/// Smallest mining power for which selfish mining outperforms honest
/// mining, `(1 - gamma) / (3 - 2 gamma)`.
pub fn profitability_threshold(gamma: f64) -> f64 {
    (1.0 - gamma) / (3.0 - 2.0 * gamma)
}

/// Returns the selfish revenue curve for a fixed `gamma`, which can be used
/// as a theoretical column of a results table.
pub fn selfish_revenue_curve(gamma: f64) -> impl Fn(f64) -> f64 {
    move |alpha| selfish_revenue(alpha, gamma)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn known_values() {
        assert!((selfish_revenue(0.35, 0.5) - 0.416034).abs() < 1e-6);
        assert!((selfish_revenue(0.35, 0.0) - 0.366509).abs() < 1e-6);
        assert!((selfish_revenue(0.35, 1.0) - 0.465560).abs() < 1e-6);
        assert_eq!(selfish_revenue(0.5, 0.3), 1.0);
        assert_eq!(rational_revenue(0.25, 0.0), 0.25);
    }

    #[test]
    fn threshold() {
        assert!((profitability_threshold(0.0) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(profitability_threshold(1.0), 0.0);

        let t = profitability_threshold(0.5);
        assert!(selfish_revenue(t - 0.01, 0.5) < t - 0.01);
        assert!(selfish_revenue(t + 0.01, 0.5) > t + 0.01);
    }

    proptest! {
        #[test]
        fn no_gain_below_one_third(alpha in 0.0..(1.0 / 3.0)) {
            prop_assert_eq!(rational_revenue(alpha, 0.0), alpha);
        }

        #[test]
        fn gain_above_one_third(
            alpha in (1.0 / 3.0 + 1e-9)..0.5,
            gamma in 0.0..=1.0,
        ) {
            prop_assert!(rational_revenue(alpha, gamma) > alpha);
        }

        #[test]
        fn increasing_in_alpha(
            alpha in (1.0 / 3.0 + 1e-9)..0.495,
            gamma in 0.0..=1.0,
        ) {
            prop_assert!(
                rational_revenue(alpha + 0.005, gamma)
                    > rational_revenue(alpha, gamma)
            );
        }

        #[test]
        fn non_decreasing_in_gamma(alpha in 0.0..0.5, gamma in 0.0..0.99) {
            prop_assert!(
                rational_revenue(alpha, gamma + 0.01)
                    >= rational_revenue(alpha, gamma)
            );
        }
    }
}
