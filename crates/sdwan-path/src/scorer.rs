//! Path quality scoring

/// Latency at which the latency component reaches zero.
const LATENCY_ZERO_MS: f64 = 200.0;

/// Loss percentage at which the loss component reaches zero.
const LOSS_ZERO_PCT: f64 = 10.0;

const LATENCY_WEIGHT: f64 = 0.6;
const LOSS_WEIGHT: f64 = 0.4;

/// Score a path from its latency and loss (0 = unusable, 100 = perfect).
///
/// The latency component falls linearly from 100 at 0ms to 0 at 200ms.
/// The loss component falls linearly from 100 at 0% to 0 at 10%.
/// Total loss always scores 0 regardless of latency.
#[inline]
pub fn quality_score(latency_ms: f64, loss_pct: f64) -> f64 {
    if loss_pct >= 100.0 {
        return 0.0;
    }

    let latency_score = (100.0 - latency_ms * (100.0 / LATENCY_ZERO_MS)).max(0.0);
    let loss_score = (100.0 - loss_pct * (100.0 / LOSS_ZERO_PCT)).clamp(0.0, 100.0);

    (LATENCY_WEIGHT * latency_score + LOSS_WEIGHT * loss_score).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_healthy_path() {
        // 20ms, no loss: 0.6 * 90 + 0.4 * 100
        let score = quality_score(20.0, 0.0);
        assert!((score - 94.0).abs() < 1e-9);
    }

    #[test]
    fn test_total_loss_scores_zero() {
        assert_eq!(quality_score(0.0, 100.0), 0.0);
        assert_eq!(quality_score(5.0, 100.0), 0.0);
        assert_eq!(quality_score(999.0, 100.0), 0.0);
    }

    #[test]
    fn test_components_saturate() {
        // Latency component bottoms out at 200ms
        assert_eq!(quality_score(200.0, 0.0), quality_score(450.0, 0.0));
        assert!((quality_score(200.0, 0.0) - 40.0).abs() < 1e-9);

        // Loss component bottoms out at 10%
        assert_eq!(quality_score(0.0, 10.0), quality_score(0.0, 60.0));
        assert!((quality_score(0.0, 10.0) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(quality_score(37.5, 2.5), quality_score(37.5, 2.5));
    }

    proptest! {
        #[test]
        fn prop_score_bounded(latency in 0.0f64..2000.0, loss in 0.0f64..=100.0) {
            let score = quality_score(latency, loss);
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn prop_non_increasing_in_latency(
            latency in 0.0f64..1000.0,
            delta in 0.0f64..500.0,
            loss in 0.0f64..100.0,
        ) {
            prop_assert!(quality_score(latency + delta, loss) <= quality_score(latency, loss));
        }

        #[test]
        fn prop_non_increasing_in_loss(
            latency in 0.0f64..1000.0,
            loss in 0.0f64..100.0,
            delta in 0.0f64..100.0,
        ) {
            let worse = (loss + delta).min(100.0);
            prop_assert!(quality_score(latency, worse) <= quality_score(latency, loss));
        }
    }
}
