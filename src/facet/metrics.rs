//! Opt-in timing hooks for the faceting pipeline.
//!
//! Timing is only collected when the `facet_metrics` feature is enabled. With
//! the feature off every call compiles down to running the closure.

use serde::Serialize;

/// Pipeline phases that accumulate time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Curvature profiles (closed form or sampled).
    Curvature,
    /// Ruling setup for both directions.
    Ruling,
    /// Shared-boundary and in-face reconciliation.
    Reconciliation,
    /// Grid assembly and trimming.
    Grid,
    /// Post-check subdivision.
    PostCheck,
    /// Node merge and degenerate culling.
    NodeMerge,
}

/// Cumulative nanoseconds per bucket.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FacetTimingReport {
    pub curvature_ns: u64,
    pub ruling_ns: u64,
    pub reconciliation_ns: u64,
    pub grid_ns: u64,
    pub post_check_ns: u64,
    pub node_merge_ns: u64,
}

impl FacetTimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.curvature_ns
            .saturating_add(self.ruling_ns)
            .saturating_add(self.reconciliation_ns)
            .saturating_add(self.grid_ns)
            .saturating_add(self.post_check_ns)
            .saturating_add(self.node_merge_ns)
    }

    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    /// Adds another report bucket by bucket.
    pub fn merge(&mut self, other: &Self) {
        for bucket in ALL_BUCKETS {
            self.add(bucket, other.get(bucket));
        }
    }

    #[must_use]
    pub fn get(&self, bucket: TimingBucket) -> u64 {
        match bucket {
            TimingBucket::Curvature => self.curvature_ns,
            TimingBucket::Ruling => self.ruling_ns,
            TimingBucket::Reconciliation => self.reconciliation_ns,
            TimingBucket::Grid => self.grid_ns,
            TimingBucket::PostCheck => self.post_check_ns,
            TimingBucket::NodeMerge => self.node_merge_ns,
        }
    }

    fn slot(&mut self, bucket: TimingBucket) -> &mut u64 {
        match bucket {
            TimingBucket::Curvature => &mut self.curvature_ns,
            TimingBucket::Ruling => &mut self.ruling_ns,
            TimingBucket::Reconciliation => &mut self.reconciliation_ns,
            TimingBucket::Grid => &mut self.grid_ns,
            TimingBucket::PostCheck => &mut self.post_check_ns,
            TimingBucket::NodeMerge => &mut self.node_merge_ns,
        }
    }

    fn add(&mut self, bucket: TimingBucket, nanos: u64) {
        let slot = self.slot(bucket);
        *slot = slot.saturating_add(nanos);
    }
}

const ALL_BUCKETS: [TimingBucket; 6] = [
    TimingBucket::Curvature,
    TimingBucket::Ruling,
    TimingBucket::Reconciliation,
    TimingBucket::Grid,
    TimingBucket::PostCheck,
    TimingBucket::NodeMerge,
];

/// Timing accumulator. One per face, so faces can run in parallel.
#[derive(Debug, Default)]
pub struct FacetMetrics {
    #[cfg(feature = "facet_metrics")]
    report: FacetTimingReport,
}

impl FacetMetrics {
    pub fn begin(&mut self) {
        #[cfg(feature = "facet_metrics")]
        {
            self.report = FacetTimingReport::default();
        }
    }

    /// The accumulated report, or `None` when metrics are compiled out.
    #[must_use]
    pub fn end(&self) -> Option<FacetTimingReport> {
        #[cfg(feature = "facet_metrics")]
        {
            Some(self.report.clone())
        }
        #[cfg(not(feature = "facet_metrics"))]
        {
            None
        }
    }

    /// Runs `f`, charging its wall time to `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(feature = "facet_metrics")]
        {
            let start = std::time::Instant::now();
            let result = f();
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            self.report.add(bucket, nanos);
            result
        }

        #[cfg(not(feature = "facet_metrics"))]
        {
            let _ = bucket;
            f()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_total_and_merge() {
        let mut a = FacetTimingReport {
            ruling_ns: 1000,
            grid_ns: 2000,
            ..Default::default()
        };
        let b = FacetTimingReport {
            ruling_ns: 500,
            post_check_ns: 2500,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.ruling_ns, 1500);
        assert_eq!(a.total_ns(), 6000);
        assert!((a.total_ms() - 0.006).abs() < 1e-12);
    }

    #[test]
    fn time_returns_closure_result() {
        let mut metrics = FacetMetrics::default();
        metrics.begin();
        assert_eq!(metrics.time(TimingBucket::Ruling, || 42), 42);
        let report = metrics.end();
        assert_eq!(report.is_some(), cfg!(feature = "facet_metrics"));
    }
}
