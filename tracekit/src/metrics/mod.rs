//! Metric instruments and the registry that owns them.
//!
//! A [`Registry`] is explicitly constructed, process-wide shared state:
//! build one at startup and pass it by reference to every component that
//! records metrics. There is no hidden global. A metric name maps to a
//! *family* of one kind (counter or histogram); each distinct label set
//! within a family is its own series. Registration is a lookup-or-create:
//! asking twice for the same name, help, and labels yields handles to the
//! same underlying series, while asking for the same name with a different
//! definition is an error and should abort startup.
//!
//! ```
//! use tracekit::metrics::Registry;
//!
//! # fn main() -> Result<(), tracekit::metrics::MetricError> {
//! let registry = Registry::new();
//! let attempts = registry.counter("signup_attempts_total", "Total signup attempts")?;
//! attempts.inc();
//! assert!(registry.render().contains("signup_attempts_total 1"));
//! # Ok(())
//! # }
//! ```

mod exposition;
mod instruments;

pub use instruments::{Counter, Histogram, HistogramTimer};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use exposition::{format_value, sanitize, write_header, write_sample};
use instruments::{CounterCore, HistogramCore};

/// Default duration buckets, in seconds.
pub const DEFAULT_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Errors raised on metric registration.
///
/// All of these mean two call sites disagree about a metric's identity,
/// which is fatal by policy: the process should not continue with an
/// ambiguous metric definition.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum MetricError {
    /// The name is taken by a metric of a different kind.
    #[error("metric `{name}` is already registered as a {existing}")]
    KindMismatch {
        /// Conflicting metric name.
        name: String,
        /// Kind of the existing registration.
        existing: &'static str,
    },
    /// The name is taken with different help text.
    #[error("metric `{name}` is already registered with different help text")]
    HelpMismatch {
        /// Conflicting metric name.
        name: String,
    },
    /// The histogram name is taken with different bucket bounds.
    #[error("histogram `{name}` is already registered with different buckets")]
    BucketMismatch {
        /// Conflicting metric name.
        name: String,
    },
}

type LabelSet = Vec<(String, String)>;

#[derive(Debug)]
enum Series {
    Counter(Arc<CounterCore>),
    Histogram(Arc<HistogramCore>),
}

#[derive(Debug, PartialEq)]
enum FamilyKind {
    Counter,
    Histogram { bounds: Vec<f64> },
}

impl FamilyKind {
    fn type_name(&self) -> &'static str {
        match self {
            FamilyKind::Counter => "counter",
            FamilyKind::Histogram { .. } => "histogram",
        }
    }
}

#[derive(Debug)]
struct Family {
    help: String,
    kind: FamilyKind,
    series: BTreeMap<LabelSet, Series>,
}

/// Owner of all metric families in a process.
///
/// Registration takes a short lock; recording through the returned
/// [`Counter`] / [`Histogram`] handles is lock-free, and [`Registry::render`]
/// is safe to call concurrently with recording.
#[derive(Debug, Default)]
pub struct Registry {
    families: Mutex<BTreeMap<String, Family>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create an unlabeled counter.
    pub fn counter(&self, name: &str, help: &str) -> Result<Counter, MetricError> {
        self.counter_with_labels(name, help, &[])
    }

    /// Look up or create a counter series with the given constant labels.
    pub fn counter_with_labels(
        &self,
        name: &str,
        help: &str,
        labels: &[(&str, &str)],
    ) -> Result<Counter, MetricError> {
        let name = sanitize(name);
        let labels = normalize_labels(labels);
        let mut families = self.lock_families();
        let family = families.entry(name.clone()).or_insert_with(|| Family {
            help: help.to_string(),
            kind: FamilyKind::Counter,
            series: BTreeMap::new(),
        });
        check_family(&name, family, help, &FamilyKind::Counter)?;

        let series = family.series.entry(labels).or_insert_with(|| {
            Series::Counter(Arc::new(CounterCore::default()))
        });
        match series {
            Series::Counter(core) => Ok(Counter::from_core(core.clone())),
            // Unreachable once check_family passed; keep the error total.
            Series::Histogram(_) => Err(MetricError::KindMismatch {
                name,
                existing: "histogram",
            }),
        }
    }

    /// Look up or create an unlabeled histogram with the given bucket
    /// upper bounds.
    pub fn histogram(
        &self,
        name: &str,
        help: &str,
        buckets: &[f64],
    ) -> Result<Histogram, MetricError> {
        self.histogram_with_labels(name, help, buckets, &[])
    }

    /// Look up or create a histogram series with the given constant labels.
    pub fn histogram_with_labels(
        &self,
        name: &str,
        help: &str,
        buckets: &[f64],
        labels: &[(&str, &str)],
    ) -> Result<Histogram, MetricError> {
        let name = sanitize(name);
        let labels = normalize_labels(labels);
        let bounds = normalize_bounds(buckets);
        let mut families = self.lock_families();
        let family = families.entry(name.clone()).or_insert_with(|| Family {
            help: help.to_string(),
            kind: FamilyKind::Histogram {
                bounds: bounds.clone(),
            },
            series: BTreeMap::new(),
        });
        let kind = FamilyKind::Histogram { bounds };
        check_family(&name, family, help, &kind)?;

        let series = family.series.entry(labels).or_insert_with(|| {
            let bounds = match &kind {
                FamilyKind::Histogram { bounds } => bounds.clone(),
                FamilyKind::Counter => unreachable!("kind checked above"),
            };
            Series::Histogram(Arc::new(HistogramCore::new(bounds)))
        });
        match series {
            Series::Histogram(core) => Ok(Histogram::from_core(core.clone())),
            Series::Counter(_) => Err(MetricError::KindMismatch {
                name,
                existing: "counter",
            }),
        }
    }

    /// Render the aggregated snapshot in the Prometheus exposition text
    /// format: `# HELP` / `# TYPE` headers, counter totals, and histogram
    /// cumulative buckets with `_sum` and `_count`.
    pub fn render(&self) -> String {
        let families = self.lock_families();
        let mut out = String::new();
        for (name, family) in families.iter() {
            write_header(&mut out, name, &family.help, family.kind.type_name());
            for (labels, series) in family.series.iter() {
                match series {
                    Series::Counter(core) => {
                        let counter = Counter::from_core(core.clone());
                        write_sample(&mut out, name, labels, &counter.value().to_string());
                    }
                    Series::Histogram(core) => {
                        render_histogram(&mut out, name, labels, core);
                    }
                }
            }
        }
        out
    }

    fn lock_families(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Family>> {
        self.families.lock().unwrap_or_else(|err| err.into_inner())
    }
}

fn render_histogram(out: &mut String, name: &str, labels: &LabelSet, core: &Arc<HistogramCore>) {
    let histogram = Histogram::from_core(core.clone());
    let counts = core.bucket_counts();
    let mut cumulative = 0u64;
    let bucket_name = format!("{name}_bucket");
    for (i, count) in counts.iter().enumerate() {
        cumulative += count;
        let le = core
            .bounds()
            .get(i)
            .copied()
            .map(format_value)
            .unwrap_or_else(|| "+Inf".to_string());
        let mut bucket_labels = labels.clone();
        bucket_labels.push(("le".to_string(), le));
        write_sample(out, &bucket_name, &bucket_labels, &cumulative.to_string());
    }
    write_sample(
        out,
        &format!("{name}_sum"),
        labels,
        &format_value(histogram.sum()),
    );
    write_sample(
        out,
        &format!("{name}_count"),
        labels,
        &histogram.count().to_string(),
    );
}

fn check_family(
    name: &str,
    family: &Family,
    help: &str,
    kind: &FamilyKind,
) -> Result<(), MetricError> {
    if family.kind.type_name() != kind.type_name() {
        return Err(MetricError::KindMismatch {
            name: name.to_string(),
            existing: family.kind.type_name(),
        });
    }
    if family.help != help {
        return Err(MetricError::HelpMismatch {
            name: name.to_string(),
        });
    }
    if family.kind != *kind {
        // Same type, so the kinds can only differ in histogram bounds.
        return Err(MetricError::BucketMismatch {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn normalize_labels(labels: &[(&str, &str)]) -> LabelSet {
    let mut labels: LabelSet = labels
        .iter()
        .map(|(k, v)| (sanitize(k), v.to_string()))
        .collect();
    labels.sort();
    labels
}

fn normalize_bounds(buckets: &[f64]) -> Vec<f64> {
    let mut bounds: Vec<f64> = buckets.iter().copied().filter(|b| b.is_finite()).collect();
    bounds.sort_by(|a, b| a.partial_cmp(b).expect("NaNs filtered out"));
    bounds.dedup();
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        let registry = Registry::new();
        let a = registry.counter("requests_total", "Total requests").unwrap();
        let b = registry.counter("requests_total", "Total requests").unwrap();
        a.inc();
        b.inc_by(2);
        assert_eq!(a.value(), 3);
    }

    #[test]
    fn help_conflict_is_an_error() {
        let registry = Registry::new();
        registry.counter("requests_total", "Total requests").unwrap();
        assert_eq!(
            registry.counter("requests_total", "Something else"),
            Err(MetricError::HelpMismatch {
                name: "requests_total".to_string()
            })
        );
    }

    #[test]
    fn kind_conflict_is_an_error() {
        let registry = Registry::new();
        registry.counter("latency", "Latency").unwrap();
        assert_eq!(
            registry.histogram("latency", "Latency", DEFAULT_DURATION_BUCKETS),
            Err(MetricError::KindMismatch {
                name: "latency".to_string(),
                existing: "counter",
            })
        );
    }

    #[test]
    fn bucket_conflict_is_an_error() {
        let registry = Registry::new();
        registry
            .histogram("duration_seconds", "Duration", &[0.1, 1.0])
            .unwrap();
        assert_eq!(
            registry.histogram("duration_seconds", "Duration", &[0.5, 1.0]),
            Err(MetricError::BucketMismatch {
                name: "duration_seconds".to_string()
            })
        );
    }

    #[test]
    fn label_sets_are_distinct_series() {
        let registry = Registry::new();
        let create = registry
            .counter_with_labels("ops_total", "Ops", &[("operation", "create")])
            .unwrap();
        let delete = registry
            .counter_with_labels("ops_total", "Ops", &[("operation", "delete")])
            .unwrap();
        create.inc();
        create.inc();
        delete.inc();
        assert_eq!(create.value(), 2);
        assert_eq!(delete.value(), 1);
    }

    #[test]
    fn label_order_does_not_change_identity() {
        let registry = Registry::new();
        let a = registry
            .counter_with_labels("ops_total", "Ops", &[("a", "1"), ("b", "2")])
            .unwrap();
        let b = registry
            .counter_with_labels("ops_total", "Ops", &[("b", "2"), ("a", "1")])
            .unwrap();
        a.inc();
        assert_eq!(b.value(), 1);
    }

    #[test]
    fn names_are_sanitized() {
        let registry = Registry::new();
        registry.counter("service/requests-total", "Requests").unwrap();
        assert!(registry.render().contains("service_requests_total 0"));
    }

    #[test]
    fn render_counter_exposition() {
        let registry = Registry::new();
        let c = registry.counter("requests_total", "Total requests").unwrap();
        c.inc_by(3);
        assert_eq!(
            registry.render(),
            "# HELP requests_total Total requests\n\
             # TYPE requests_total counter\n\
             requests_total 3\n"
        );
    }

    #[test]
    fn render_histogram_exposition() {
        let registry = Registry::new();
        let h = registry
            .histogram_with_labels(
                "op_duration_seconds",
                "Operation duration",
                &[0.5, 1.0],
                &[("operation", "create")],
            )
            .unwrap();
        h.observe(0.25);
        h.observe(0.5);
        assert_eq!(
            registry.render(),
            "# HELP op_duration_seconds Operation duration\n\
             # TYPE op_duration_seconds histogram\n\
             op_duration_seconds_bucket{operation=\"create\",le=\"0.5\"} 2\n\
             op_duration_seconds_bucket{operation=\"create\",le=\"1\"} 2\n\
             op_duration_seconds_bucket{operation=\"create\",le=\"+Inf\"} 2\n\
             op_duration_seconds_sum{operation=\"create\"} 0.75\n\
             op_duration_seconds_count{operation=\"create\"} 2\n"
        );
    }

    #[test]
    fn render_is_safe_during_concurrent_updates() {
        let registry = Arc::new(Registry::new());
        let counter = registry.counter("ticks_total", "Ticks").unwrap();
        let writer = {
            let counter = counter.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    counter.inc();
                }
            })
        };
        for _ in 0..50 {
            let _ = registry.render();
        }
        writer.join().expect("writer panicked");
        assert_eq!(counter.value(), 1000);
    }

    #[test]
    fn bounds_are_sorted_and_deduplicated() {
        assert_eq!(
            normalize_bounds(&[1.0, 0.1, 1.0, f64::INFINITY, f64::NAN]),
            vec![0.1, 1.0]
        );
    }
}
