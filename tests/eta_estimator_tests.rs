//! Scenario-level ETA estimator behavior on a manually advanced clock.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sublingo::core::worker::eta::{Clock, EtaProvider, SimpleEta, StatisticalEta};

struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    fn advance(&self, d: Duration) {
        *self.now.lock().unwrap() += d;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

#[test]
fn ten_of_two_hundred_in_ten_seconds() {
    let clock = ManualClock::new();
    let mut eta = StatisticalEta::with_clock(clock.clone());
    eta.start(200);
    for i in 1..=10 {
        clock.advance(Duration::from_secs(1));
        eta.update(i);
    }
    let result = eta.update(10).unwrap();
    assert!(result.estimate >= Duration::from_secs(150));
    assert!(result.estimate <= Duration::from_secs(250));
}

#[test]
fn quarter_done_trusts_cross_multiplication() {
    let clock = ManualClock::new();
    let mut eta = StatisticalEta::with_clock(clock.clone());
    eta.start(200);
    for i in 1..=50 {
        clock.advance(Duration::from_millis(600));
        eta.update(i);
    }
    let result = eta.update(50).unwrap();
    assert!(result.cross_weight >= 0.7);
}

#[test]
fn late_steady_run_is_stable() {
    let clock = ManualClock::new();
    let mut eta = StatisticalEta::with_clock(clock.clone());
    eta.start(200);
    let mut previous: Option<Duration> = None;
    for i in 1..=100 {
        clock.advance(Duration::from_millis(600));
        let result = eta.update(i).unwrap();
        if i >= 95 {
            if let Some(prev) = previous {
                let delta = (result.estimate.as_secs_f64() - prev.as_secs_f64()).abs();
                assert!(
                    delta / prev.as_secs_f64().max(1.0) <= 0.05,
                    "late estimate jitter above 5%"
                );
            }
            previous = Some(result.estimate);
        }
    }
}

#[test]
fn bounds_satisfy_invariants_throughout() {
    let clock = ManualClock::new();
    let mut eta = StatisticalEta::with_clock(clock.clone());
    eta.start(500);
    for i in 1..=200 {
        clock.advance(Duration::from_millis(400));
        if let Some(result) = eta.update(i) {
            assert!(result.lower <= result.estimate);
            assert!(result.estimate <= result.upper);
            let spread = (result.upper - result.lower).as_secs_f64();
            let floor = (result.estimate.as_secs_f64() * 0.10).max(1.0);
            assert!(spread >= floor * 0.999, "spread collapsed at step {}", i);
        }
    }
}

#[test]
fn retarget_after_already_done_discovery_preserves_rates() {
    let clock = ManualClock::new();
    let mut eta = StatisticalEta::with_clock(clock.clone());
    eta.start(400);
    for i in 1..=40 {
        clock.advance(Duration::from_millis(500));
        eta.update(i);
    }
    let before = eta.update(40).unwrap();

    // a third of the job turns out to be already done
    eta.retarget(260);
    let after = eta.update(40).unwrap();
    assert_eq!(after.samples, before.samples);
    assert!((after.cumulative_rate - before.cumulative_rate).abs() < 1e-9);
    assert!(after.percent_done > before.percent_done);
}

#[test]
fn simple_estimator_matches_interface() {
    let clock = ManualClock::new();
    let mut eta = SimpleEta::with_clock(clock.clone());
    eta.start(100);
    clock.advance(Duration::from_secs(10));
    let result = eta.update(10).unwrap();
    // 90 items remaining at 1/s, times the pessimism factor
    assert!(result.estimate >= Duration::from_secs(85));
    assert!(result.estimate <= Duration::from_secs(115));
    assert!(result.lower <= result.estimate && result.estimate <= result.upper);
}
