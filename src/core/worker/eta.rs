//! ETA estimation for the worker pool.
//!
//! Two implementations share the [`EtaProvider`] interface and are chosen at
//! pool construction: [`SimpleEta`] cross-multiplies elapsed time by the
//! fraction complete, [`StatisticalEta`] maintains a weighted history of
//! completion rates and blends a rate-based estimate with the
//! cross-multiplication one, trusting cross-multiplication more as samples
//! accumulate and the job advances.
//!
//! Contract highlights: updates are idempotent when the completed count does
//! not advance; samples are gated at 300 ms / 5 items; bounds never collapse
//! onto the estimate; re-targeting the total preserves history.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum wall time between recorded samples.
const SAMPLE_MIN_INTERVAL: Duration = Duration::from_millis(300);
/// Minimum item progress that forces a sample regardless of interval.
const SAMPLE_MIN_ITEMS: usize = 5;
/// Cross-multiplication weight cap.
const CROSS_WEIGHT_MAX: f64 = 0.95;
/// Sample count at which cross-multiplication reaches its cap.
const CROSS_FULL_SAMPLES: usize = 100;
/// Fraction complete at which cross-multiplication reaches its cap.
const CROSS_FULL_FRACTION: f64 = 0.25;
/// Recency decay applied per step back into the sample history.
const RATE_DECAY: f64 = 0.9;
/// Jobs at or above this many items report `is_large_job`.
const LARGE_JOB_ITEMS: usize = 1000;

/// Time source, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock time source.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A full estimate with confidence bounds and diagnostics.
#[derive(Debug, Clone)]
pub struct EtaResult {
    /// Point estimate of remaining time.
    pub estimate: Duration,
    /// Lower confidence bound.
    pub lower: Duration,
    /// Upper confidence bound.
    pub upper: Duration,
    /// Reliability score in `[0, 1]`.
    pub reliability: f64,
    /// Number of recorded samples.
    pub samples: usize,
    /// Fraction complete in `[0, 1]`.
    pub percent_done: f64,
    /// Most recent weighted completion rate (items/sec).
    pub last_rate: f64,
    /// Cumulative rate since start (items/sec).
    pub cumulative_rate: f64,
    /// Weighted coefficient of variation of the rate history.
    pub variability: f64,
    /// Pure cross-multiplication estimate.
    pub cross_eta: Duration,
    /// Weight given to the cross-multiplication estimate.
    pub cross_weight: f64,
    /// Whether the job is large enough for high-confidence statistics.
    pub is_large_job: bool,
}

/// Estimator interface consulted by the worker pool's writer.
pub trait EtaProvider: Send {
    /// Begin tracking a job of `total` items.
    fn start(&mut self, total: usize);

    /// Report progress. Returns the current estimate once enough data
    /// exists. Idempotent when `completed` does not advance.
    fn update(&mut self, completed: usize) -> Option<EtaResult>;

    /// Change the total without resetting history (e.g. after already-done
    /// items are discovered).
    fn retarget(&mut self, new_total: usize);
}

/// Cross-multiplication estimator with a modest pessimism factor and a
/// fixed ±10% band.
pub struct SimpleEta {
    clock: Arc<dyn Clock>,
    started: Option<Instant>,
    total: usize,
    completed: usize,
}

impl SimpleEta {
    /// Create a simple estimator on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a simple estimator on an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            started: None,
            total: 0,
            completed: 0,
        }
    }
}

impl Default for SimpleEta {
    fn default() -> Self {
        Self::new()
    }
}

impl EtaProvider for SimpleEta {
    fn start(&mut self, total: usize) {
        self.started = Some(self.clock.now());
        self.total = total;
        self.completed = 0;
    }

    fn update(&mut self, completed: usize) -> Option<EtaResult> {
        let started = self.started?;
        if completed > self.completed {
            self.completed = completed;
        }
        let completed = self.completed;
        if completed == 0 || self.total == 0 {
            return None;
        }

        let elapsed = self.clock.now().duration_since(started);
        let fraction = completed as f64 / self.total as f64;
        let remaining_secs =
            (elapsed.as_secs_f64() / fraction - elapsed.as_secs_f64()).max(0.0) * 1.1;
        let estimate = Duration::from_secs_f64(remaining_secs);
        let (lower, upper) = banded(estimate, 0.10);

        Some(EtaResult {
            estimate,
            lower,
            upper,
            reliability: fraction.min(1.0),
            samples: completed,
            percent_done: fraction,
            last_rate: completed as f64 / elapsed.as_secs_f64().max(1e-9),
            cumulative_rate: completed as f64 / elapsed.as_secs_f64().max(1e-9),
            variability: 0.0,
            cross_eta: estimate,
            cross_weight: 1.0,
            is_large_job: self.total >= LARGE_JOB_ITEMS,
        })
    }

    fn retarget(&mut self, new_total: usize) {
        self.total = new_total;
    }
}

#[derive(Debug, Clone, Copy)]
struct RateSample {
    rate: f64,
}

/// Weighted-history estimator blending rate statistics with
/// cross-multiplication.
pub struct StatisticalEta {
    clock: Arc<dyn Clock>,
    started: Option<Instant>,
    total: usize,
    completed: usize,
    last_sample_at: Option<Instant>,
    last_sample_completed: usize,
    samples: Vec<RateSample>,
    previous_estimate: Option<Duration>,
}

impl StatisticalEta {
    /// Create a statistical estimator on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a statistical estimator on an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            started: None,
            total: 0,
            completed: 0,
            last_sample_at: None,
            last_sample_completed: 0,
            samples: Vec::new(),
            previous_estimate: None,
        }
    }

    fn weighted_rate_stats(&self) -> (f64, f64) {
        if self.samples.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.samples.len();
        let mut weight_sum = 0.0;
        let mut mean = 0.0;
        for (i, s) in self.samples.iter().enumerate() {
            let w = RATE_DECAY.powi((n - 1 - i) as i32);
            weight_sum += w;
            mean += w * s.rate;
        }
        mean /= weight_sum;

        let mut var = 0.0;
        for (i, s) in self.samples.iter().enumerate() {
            let w = RATE_DECAY.powi((n - 1 - i) as i32);
            var += w * (s.rate - mean).powi(2);
        }
        var /= weight_sum;
        let cv = if mean > 0.0 { var.sqrt() / mean } else { 0.0 };
        (mean, cv)
    }

    fn cross_weight(&self, fraction: f64) -> f64 {
        if self.samples.len() >= CROSS_FULL_SAMPLES || fraction >= CROSS_FULL_FRACTION {
            return CROSS_WEIGHT_MAX;
        }
        let by_samples = self.samples.len() as f64 / CROSS_FULL_SAMPLES as f64;
        let by_fraction = fraction / CROSS_FULL_FRACTION;
        CROSS_WEIGHT_MAX * by_samples.max(by_fraction)
    }
}

impl Default for StatisticalEta {
    fn default() -> Self {
        Self::new()
    }
}

impl EtaProvider for StatisticalEta {
    fn start(&mut self, total: usize) {
        let now = self.clock.now();
        self.started = Some(now);
        self.total = total;
        self.completed = 0;
        self.last_sample_at = Some(now);
        self.last_sample_completed = 0;
        self.samples.clear();
        self.previous_estimate = None;
    }

    fn update(&mut self, completed: usize) -> Option<EtaResult> {
        let started = self.started?;
        if completed > self.completed {
            self.completed = completed;
        }
        let completed = self.completed;
        if completed == 0 || self.total == 0 {
            return None;
        }

        let now = self.clock.now();
        let elapsed = now.duration_since(started);
        let fraction = (completed as f64 / self.total as f64).min(1.0);

        // Sample gating: at least 300 ms or 5 items since the last sample.
        let since_last = self
            .last_sample_at
            .map(|t| now.duration_since(t))
            .unwrap_or(elapsed);
        let item_delta = completed.saturating_sub(self.last_sample_completed);
        if item_delta > 0
            && (since_last >= SAMPLE_MIN_INTERVAL || item_delta >= SAMPLE_MIN_ITEMS)
        {
            let dt = since_last.as_secs_f64().max(1e-9);
            self.samples.push(RateSample {
                rate: item_delta as f64 / dt,
            });
            self.last_sample_at = Some(now);
            self.last_sample_completed = completed;
        }

        let (weighted_rate, variability) = self.weighted_rate_stats();
        let cumulative_rate = completed as f64 / elapsed.as_secs_f64().max(1e-9);
        let remaining = (self.total - completed.min(self.total)) as f64;

        let cross_secs = remaining / cumulative_rate.max(1e-9);
        let cross_eta = Duration::from_secs_f64(cross_secs);
        let rate_secs = if weighted_rate > 0.0 {
            remaining / weighted_rate
        } else {
            cross_secs
        };

        let cross_weight = self.cross_weight(fraction);
        let blended_secs = cross_weight * cross_secs + (1.0 - cross_weight) * rate_secs;

        // Smooth against the previous stable estimate. The smoothing weight
        // decays as samples accumulate but rises when the rate is volatile.
        let alpha = {
            let by_samples = 1.0 / (1.0 + self.samples.len() as f64 / 10.0);
            (by_samples + variability * 0.3).clamp(0.0, 0.85)
        };
        let smoothed_secs = match self.previous_estimate {
            Some(prev) => alpha * prev.as_secs_f64() + (1.0 - alpha) * blended_secs,
            None => blended_secs,
        };
        let estimate = Duration::from_secs_f64(smoothed_secs.max(0.0));
        self.previous_estimate = Some(estimate);

        let spread_fraction = (0.10 + variability * 0.5).min(1.0);
        let (lower, upper) = banded(estimate, spread_fraction);

        let reliability = {
            let sample_part = (self.samples.len() as f64 / CROSS_FULL_SAMPLES as f64).min(1.0);
            let stability_part = 1.0 / (1.0 + variability);
            (0.5 * sample_part + 0.5 * stability_part).min(1.0)
        };

        Some(EtaResult {
            estimate,
            lower,
            upper,
            reliability,
            samples: self.samples.len(),
            percent_done: fraction,
            last_rate: weighted_rate,
            cumulative_rate,
            variability,
            cross_eta,
            cross_weight,
            is_large_job: self.total >= LARGE_JOB_ITEMS,
        })
    }

    fn retarget(&mut self, new_total: usize) {
        // History stays; only the goalposts move.
        self.total = new_total;
    }
}

/// Compute `(lower, upper)` around the estimate. The band never collapses:
/// the spread is at least 10% of the estimate or 1 second, whichever is
/// larger.
fn banded(estimate: Duration, spread_fraction: f64) -> (Duration, Duration) {
    let est = estimate.as_secs_f64();
    let spread = (est * spread_fraction).max(est * 0.10).max(1.0);
    let lower = Duration::from_secs_f64((est - spread / 2.0).max(0.0));
    let upper = Duration::from_secs_f64(est + spread / 2.0);
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Manually advanced clock for deterministic estimator tests.
    pub struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Instant::now()),
            })
        }

        pub fn advance(&self, d: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    #[test]
    fn test_simple_eta_cross_multiplication() {
        let clock = ManualClock::new();
        let mut eta = SimpleEta::with_clock(clock.clone());
        eta.start(200);
        clock.advance(Duration::from_secs(10));
        let result = eta.update(10).unwrap();
        // 10/200 in 10s -> 190s remaining, times pessimism 1.1
        assert!(result.estimate >= Duration::from_secs(150));
        assert!(result.estimate <= Duration::from_secs(250));
        assert!(result.lower <= result.estimate);
        assert!(result.upper >= result.estimate);
    }

    #[test]
    fn test_statistical_eta_early_estimate_in_range() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(200);
        for i in 1..=10 {
            clock.advance(Duration::from_secs(1));
            eta.update(i);
        }
        let result = eta.update(10).unwrap();
        assert!(
            result.estimate >= Duration::from_secs(150)
                && result.estimate <= Duration::from_secs(250),
            "estimate {:?} outside [150s, 250s]",
            result.estimate
        );
    }

    #[test]
    fn test_cross_weight_grows_with_fraction() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(200);
        for i in 1..=50 {
            clock.advance(Duration::from_millis(600));
            eta.update(i);
        }
        let result = eta.update(50).unwrap();
        // 25% done -> full cross-multiplication confidence
        assert!(result.cross_weight >= 0.7);
    }

    #[test]
    fn test_cross_weight_capped() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(200);
        for i in 1..=150 {
            clock.advance(Duration::from_millis(400));
            eta.update(i.min(200));
        }
        let result = eta.update(150).unwrap();
        assert!(result.cross_weight <= CROSS_WEIGHT_MAX + 1e-9);
    }

    #[test]
    fn test_bounds_never_collapse() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(100);
        for i in 1..=60 {
            clock.advance(Duration::from_millis(500));
            let result = eta.update(i).unwrap();
            let spread = result.upper - result.lower;
            let min_spread = Duration::from_secs_f64(
                (result.estimate.as_secs_f64() * 0.10).max(1.0) * 0.999,
            );
            assert!(spread >= min_spread, "spread {:?} collapsed", spread);
            assert!(result.lower <= result.estimate);
            assert!(result.estimate <= result.upper);
        }
    }

    #[test]
    fn test_update_is_idempotent_without_progress() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(100);
        for i in 1..=20 {
            clock.advance(Duration::from_millis(500));
            eta.update(i);
        }
        let before = eta.update(20).unwrap();
        // a stale update with a lower count must not disturb the state
        let after = eta.update(15).unwrap();
        assert_eq!(before.samples, after.samples);
        assert_eq!(after.percent_done, before.percent_done);
    }

    #[test]
    fn test_sample_gating() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(1000);
        // rapid single-item updates inside the 300ms window record nothing
        for i in 1..=3 {
            clock.advance(Duration::from_millis(50));
            eta.update(i);
        }
        let result = eta.update(3).unwrap();
        assert_eq!(result.samples, 0);
        // a 5-item jump forces a sample regardless of interval
        clock.advance(Duration::from_millis(50));
        let result = eta.update(8).unwrap();
        assert_eq!(result.samples, 1);
    }

    #[test]
    fn test_retarget_preserves_history() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(200);
        for i in 1..=30 {
            clock.advance(Duration::from_millis(500));
            eta.update(i);
        }
        let before = eta.update(30).unwrap();
        eta.retarget(150);
        let after = eta.update(30).unwrap();
        assert_eq!(after.samples, before.samples);
        assert!(after.percent_done > before.percent_done);
    }

    #[test]
    fn test_late_run_stability() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(200);
        let mut last: Option<Duration> = None;
        for i in 1..=100 {
            clock.advance(Duration::from_millis(600));
            let result = eta.update(i).unwrap();
            if i >= 95 {
                if let Some(prev) = last {
                    let delta = (result.estimate.as_secs_f64() - prev.as_secs_f64()).abs();
                    let rel = delta / prev.as_secs_f64().max(1.0);
                    assert!(rel <= 0.05, "estimate jumped {:.1}% late in the run", rel * 100.0);
                }
                last = Some(result.estimate);
            }
        }
    }

    #[test]
    fn test_large_job_flag() {
        let clock = ManualClock::new();
        let mut eta = StatisticalEta::with_clock(clock.clone());
        eta.start(5000);
        clock.advance(Duration::from_secs(1));
        let result = eta.update(10).unwrap();
        assert!(result.is_large_job);
    }
}
