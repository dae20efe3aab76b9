//! Counter and histogram instruments.
//!
//! Both are lock-free on the hot path: a counter is a single atomic, and a
//! histogram keeps one atomic per bucket plus atomic sum/count, so
//! concurrent observations from in-flight tasks never contend on a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonically increasing counter.
///
/// Cloning is cheap and clones share the same underlying value.
#[derive(Clone, Debug)]
pub struct Counter {
    core: Arc<CounterCore>,
}

#[derive(Debug, Default)]
pub(crate) struct CounterCore {
    value: AtomicU64,
}

impl Counter {
    pub(crate) fn from_core(core: Arc<CounterCore>) -> Self {
        Counter { core }
    }

    /// Increment the counter by one.
    pub fn inc(&self) {
        self.inc_by(1);
    }

    /// Increment the counter by `n`.
    pub fn inc_by(&self, n: u64) {
        self.core.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    pub fn value(&self) -> u64 {
        self.core.value.load(Ordering::Relaxed)
    }
}

impl PartialEq for Counter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

/// Records a distribution of observed values into fixed buckets.
///
/// Cloning is cheap and clones share the same underlying series.
#[derive(Clone, Debug)]
pub struct Histogram {
    core: Arc<HistogramCore>,
}

#[derive(Debug)]
pub(crate) struct HistogramCore {
    /// Sorted, deduplicated, finite upper bounds. The implicit `+Inf`
    /// bucket is `bucket_counts.last()`.
    bounds: Vec<f64>,
    bucket_counts: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl HistogramCore {
    pub(crate) fn new(bounds: Vec<f64>) -> Self {
        let bucket_counts = (0..bounds.len() + 1).map(|_| AtomicU64::new(0)).collect();
        HistogramCore {
            bounds,
            bucket_counts,
            sum_bits: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    pub(crate) fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Per-bucket counts, non-cumulative, `+Inf` last.
    pub(crate) fn bucket_counts(&self) -> Vec<u64> {
        self.bucket_counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

impl Histogram {
    pub(crate) fn from_core(core: Arc<HistogramCore>) -> Self {
        Histogram { core }
    }

    /// Record one observed value (e.g. a duration in seconds).
    ///
    /// `NaN` observations are ignored.
    pub fn observe(&self, value: f64) {
        if value.is_nan() {
            tracing::debug!("ignoring NaN histogram observation");
            return;
        }
        // Index of the first bound >= value; values above every bound land
        // in the +Inf bucket at bounds.len().
        let index = self.core.bounds.partition_point(|&bound| bound < value);
        self.core.bucket_counts[index].fetch_add(1, Ordering::Relaxed);
        self.core.count.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .core
            .sum_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
    }

    /// Start a timer that observes the elapsed seconds when finished.
    ///
    /// The observation also happens if the timer is simply dropped, so a
    /// scope exit on any path records a duration.
    pub fn start_timer(&self) -> HistogramTimer {
        HistogramTimer {
            histogram: self.clone(),
            start: Instant::now(),
            observed: false,
        }
    }

    /// Total number of observations.
    pub fn count(&self) -> u64 {
        self.core.count.load(Ordering::Relaxed)
    }

    /// Sum of all observed values.
    pub fn sum(&self) -> f64 {
        f64::from_bits(self.core.sum_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn core(&self) -> &HistogramCore {
        &self.core
    }
}

impl PartialEq for Histogram {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

/// Observes elapsed seconds into a [`Histogram`] on completion or drop.
#[derive(Debug)]
pub struct HistogramTimer {
    histogram: Histogram,
    start: Instant,
    observed: bool,
}

impl HistogramTimer {
    /// Observe the elapsed time now and consume the timer.
    pub fn observe_duration(mut self) {
        self.record();
    }

    fn record(&mut self) {
        if self.observed {
            return;
        }
        self.observed = true;
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.record();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(bounds: &[f64]) -> Histogram {
        Histogram::from_core(Arc::new(HistogramCore::new(bounds.to_vec())))
    }

    #[test]
    fn counter_clones_share_state() {
        let counter = Counter::from_core(Arc::new(CounterCore::default()));
        let clone = counter.clone();
        counter.inc();
        clone.inc_by(2);
        assert_eq!(counter.value(), 3);
    }

    #[test]
    fn observations_land_in_the_right_buckets() {
        let h = histogram(&[0.1, 0.5, 1.0]);
        h.observe(0.05); // <= 0.1
        h.observe(0.1); // boundary is inclusive
        h.observe(0.3); // <= 0.5
        h.observe(2.0); // +Inf
        assert_eq!(h.core().bucket_counts(), vec![2, 1, 0, 1]);
        assert_eq!(h.count(), 4);
        assert!((h.sum() - 2.45).abs() < 1e-9);
    }

    #[test]
    fn nan_observations_are_ignored() {
        let h = histogram(&[1.0]);
        h.observe(f64::NAN);
        assert_eq!(h.count(), 0);
    }

    #[test]
    fn timer_observes_on_drop() {
        let h = histogram(&[10.0]);
        {
            let _timer = h.start_timer();
        }
        assert_eq!(h.count(), 1);
    }

    #[test]
    fn timer_observes_exactly_once() {
        let h = histogram(&[10.0]);
        let timer = h.start_timer();
        timer.observe_duration();
        assert_eq!(h.count(), 1);
    }

    #[test]
    fn concurrent_increments_lose_no_updates() {
        let counter = Counter::from_core(Arc::new(CounterCore::default()));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.inc();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("incrementer panicked");
        }
        assert_eq!(counter.value(), 2000);
    }

    #[test]
    fn concurrent_observations_keep_exact_counts() {
        let h = histogram(&[0.5]);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let h = h.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        h.observe(if i % 2 == 0 { 0.1 } else { 1.0 });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("observer panicked");
        }
        assert_eq!(h.count(), 2000);
        assert_eq!(h.core().bucket_counts(), vec![1000, 1000]);
    }
}
