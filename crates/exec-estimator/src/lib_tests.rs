use super::*;

fn config() -> EstimatorConfig {
    EstimatorConfig {
        history_max: 50,
        min_samples_high: 5,
        min_timeout_s: 5,
        max_timeout_s: 86_400,
        default_idle_s: 300,
    }
}

#[tokio::test]
async fn no_history_falls_back_to_heuristic() {
    let estimator = Estimator::new(config());
    let hints = CommandHints::from_command("ls");
    let estimate = estimator.estimate("fp-unseen", &hints).await;
    assert!(estimate.confidence < 0.5);
    assert!(estimate.absolute_s >= config().min_timeout_s);
}

#[tokio::test]
async fn single_sample_uses_max_observed_times_1_5() {
    let estimator = Estimator::new(config());
    estimator.record("fp", 10_000, Outcome::Success).await.unwrap();
    let estimate = estimator.estimate("fp", &CommandHints::from_command("x")).await;
    assert_eq!(estimate.absolute_s, 15);
    assert_eq!(estimate.confidence, 0.5);
}

#[tokio::test]
async fn enough_samples_uses_p90_times_1_2() {
    let estimator = Estimator::new(config());
    for ms in [1000, 2000, 3000, 4000, 10_000] {
        estimator.record("fp", ms, Outcome::Success).await.unwrap();
    }
    let estimate = estimator.estimate("fp", &CommandHints::from_command("x")).await;
    assert!(estimate.confidence > 0.0);
    assert!(estimate.absolute_s >= config().min_timeout_s);
}

#[tokio::test]
async fn failures_and_timeouts_do_not_feed_the_history() {
    let estimator = Estimator::new(config());
    estimator.record("fp", 50_000, Outcome::Failure).await.unwrap();
    estimator.record("fp", 60_000, Outcome::Timeout).await.unwrap();
    let estimate = estimator.estimate("fp", &CommandHints::from_command("x")).await;
    // No successful samples recorded, so this still falls back to the heuristic.
    assert!(estimate.confidence < 0.5);
}

#[tokio::test]
async fn adding_a_sample_at_or_below_p90_never_raises_the_estimate() {
    let estimator = Estimator::new(config());
    for ms in [1000, 2000, 3000, 4000, 10_000] {
        estimator.record("fp", ms, Outcome::Success).await.unwrap();
    }
    let before = estimator.estimate("fp", &CommandHints::from_command("x")).await;

    estimator.record("fp", 1500, Outcome::Success).await.unwrap();
    let after = estimator.estimate("fp", &CommandHints::from_command("x")).await;

    assert!(after.absolute_s <= before.absolute_s);
}

#[tokio::test]
async fn idle_is_never_larger_than_absolute() {
    let estimator = Estimator::new(EstimatorConfig {
        default_idle_s: 10_000,
        ..config()
    });
    estimator.record("fp", 1_000, Outcome::Success).await.unwrap();
    let estimate = estimator.estimate("fp", &CommandHints::from_command("x")).await;
    assert!(estimate.idle_s <= estimate.absolute_s);
}

#[tokio::test]
async fn estimate_is_always_clamped_to_configured_bounds() {
    let estimator = Estimator::new(EstimatorConfig {
        min_timeout_s: 20,
        max_timeout_s: 40,
        ..config()
    });
    let estimate = estimator.estimate("fp-unseen", &CommandHints::from_command("curl http://x")).await;
    assert!(estimate.absolute_s >= 20 && estimate.absolute_s <= 40);
}

#[tokio::test]
async fn sidecar_round_trips_across_estimator_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timing.jsonl");

    let first = Estimator::new(config()).with_sidecar(&path).await.unwrap();
    first.record("fp", 10_000, Outcome::Success).await.unwrap();

    let second = Estimator::new(config()).with_sidecar(&path).await.unwrap();
    let estimate = second.estimate("fp", &CommandHints::from_command("x")).await;
    assert_eq!(estimate.confidence, 0.5);
}
