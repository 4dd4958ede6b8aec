//! Summary instrument.
//!
//! The `prometheus` crate ships counters, gauges and histograms but no
//! summary. [`Summary`] fills the gap as a [`Collector`]: it keeps an exact
//! running count and sum plus a bounded window of the most recent
//! observations, and exports configured quantiles over that window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto;

/// Quantiles exported when none are configured.
pub const DEFAULT_QUANTILES: [f64; 3] = [0.5, 0.9, 0.99];

/// Observations kept for quantile estimation when no window is configured.
pub const DEFAULT_MAX_SAMPLES: usize = 1024;

/// Options for building a [`Summary`].
#[derive(Clone, Debug)]
pub struct SummaryOpts {
    pub name: String,
    pub help: String,
    pub quantiles: Vec<f64>,
    pub max_samples: usize,
}

impl SummaryOpts {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            quantiles: DEFAULT_QUANTILES.to_vec(),
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    pub fn quantiles(mut self, quantiles: &[f64]) -> Self {
        self.quantiles = quantiles.to_vec();
        self
    }

    pub fn max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }
}

#[derive(Debug)]
struct Window {
    count: u64,
    sum: f64,
    samples: VecDeque<f64>,
    capacity: usize,
}

/// A distribution of observed values, exported as a Prometheus summary.
///
/// Cloning is cheap and clones share state, the same as the crate's other
/// metric handles. Safe to observe from many threads at once.
#[derive(Clone, Debug)]
pub struct Summary {
    desc: Desc,
    quantiles: Arc<[f64]>,
    window: Arc<Mutex<Window>>,
}

impl Summary {
    /// Builds a summary. Fails if the name is not a valid metric name or a
    /// quantile lies outside `[0, 1]`.
    pub fn with_opts(opts: SummaryOpts) -> prometheus::Result<Self> {
        if let Some(q) = opts.quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
            return Err(prometheus::Error::Msg(format!(
                "quantile {q} is outside [0, 1]"
            )));
        }
        let desc = Desc::new(opts.name, opts.help, Vec::new(), HashMap::new())?;
        let capacity = opts.max_samples.max(1);
        Ok(Self {
            desc,
            quantiles: opts.quantiles.into(),
            window: Arc::new(Mutex::new(Window {
                count: 0,
                sum: 0.0,
                samples: VecDeque::with_capacity(capacity),
                capacity,
            })),
        })
    }

    pub fn observe(&self, v: f64) {
        let mut window = self.window.lock();
        window.count += 1;
        window.sum += v;
        if window.samples.len() == window.capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(v);
    }

    pub fn sample_count(&self) -> u64 {
        self.window.lock().count
    }

    pub fn sample_sum(&self) -> f64 {
        self.window.lock().sum
    }

    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }
}

impl Collector for Summary {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let (count, sum, mut sorted) = {
            let window = self.window.lock();
            (window.count, window.sum, window.samples.iter().copied().collect::<Vec<_>>())
        };
        sorted.sort_by(f64::total_cmp);

        let mut summary = proto::Summary::default();
        summary.set_sample_count(count);
        summary.set_sample_sum(sum);
        for &q in self.quantiles.iter() {
            let mut quantile = proto::Quantile::default();
            quantile.set_quantile(q);
            quantile.set_value(rank(&sorted, q));
            summary.mut_quantile().push(quantile);
        }

        let mut metric = proto::Metric::default();
        metric.set_summary(summary);

        let mut family = proto::MetricFamily::default();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(proto::MetricType::SUMMARY);
        family.mut_metric().push(metric);
        vec![family]
    }
}

/// Nearest-rank quantile of an ascending slice. NaN when empty.
fn rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = (q * sorted.len() as f64).ceil() as usize;
    sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
}
