// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Custom `prometheus::core::Collector` that reads raw atomics at scrape time.
//!
//! External labels (e.g. `instance_id`, `executor_id`) are appended at collection time,
//! not baked in at metric creation time.

use std::sync::{Arc, RwLock};

use prometheus::core::{Collector, Desc};
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};

use super::lock_metrics::LockMetrics;

/// Metric definitions: (name, help).
const COUNTER_DEFS: &[(&str, &str)] = &[
    (
        "block_locks_read_locks_total",
        "Total read lock acquisitions",
    ),
    (
        "block_locks_write_locks_total",
        "Total write lock acquisitions",
    ),
    (
        "block_locks_lock_waits_total",
        "Total blocking acquisitions that had to wait",
    ),
    (
        "block_locks_new_blocks_total",
        "Total new blocks installed by race winners",
    ),
    (
        "block_locks_write_races_lost_total",
        "Total new-block races lost and degraded to read locks",
    ),
    ("block_locks_unlocks_total", "Total single-lock releases"),
    (
        "block_locks_blocks_removed_total",
        "Total blocks removed from the metadata table",
    ),
    (
        "block_locks_tasks_released_total",
        "Total bulk lock releases at task completion",
    ),
];

const GAUGE_DEFS: &[(&str, &str)] = &[
    (
        "block_locks_blocks_tracked",
        "Current blocks in the metadata table",
    ),
    (
        "block_locks_registered_tasks",
        "Current registered task attempts",
    ),
];

/// Aggregates metrics from multiple [`LockMetrics`] sources and exports
/// them as Prometheus `MetricFamily` protos with per-manager labels.
#[derive(Clone)]
pub struct MetricsAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    sources: RwLock<Vec<Arc<LockMetrics>>>,
    external_labels: RwLock<Vec<(String, String)>>,
    descs: Vec<Desc>,
}

impl MetricsAggregator {
    /// Create a new `MetricsAggregator`.
    pub fn new() -> Self {
        let mut descs = Vec::with_capacity(COUNTER_DEFS.len() + GAUGE_DEFS.len());
        for (name, help) in COUNTER_DEFS {
            descs.push(
                Desc::new(
                    name.to_string(),
                    help.to_string(),
                    vec!["manager".to_string()],
                    Default::default(),
                )
                .expect("valid desc"),
            );
        }
        for (name, help) in GAUGE_DEFS {
            descs.push(
                Desc::new(
                    name.to_string(),
                    help.to_string(),
                    vec!["manager".to_string()],
                    Default::default(),
                )
                .expect("valid desc"),
            );
        }

        Self {
            inner: Arc::new(Inner {
                sources: RwLock::new(Vec::new()),
                external_labels: RwLock::new(Vec::new()),
                descs,
            }),
        }
    }

    /// Register a `LockMetrics` source (called by the manager builder).
    pub fn register_source(&self, source: Arc<LockMetrics>) {
        self.inner
            .sources
            .write()
            .expect("sources lock poisoned")
            .push(source);
    }

    /// Set external labels appended at scrape time (e.g. `instance_id`, `executor_id`).
    pub fn set_external_labels(&self, labels: Vec<(String, String)>) {
        *self
            .inner
            .external_labels
            .write()
            .expect("external_labels lock poisoned") = labels;
    }

    /// Register this collector with a `prometheus::Registry`.
    pub fn register_with(&self, registry: &prometheus::Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.clone()))
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MetricsAggregator {
    fn desc(&self) -> Vec<&Desc> {
        self.inner.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let sources = self.inner.sources.read().expect("sources lock poisoned");
        let ext_labels = self
            .inner
            .external_labels
            .read()
            .expect("external_labels lock poisoned");

        let mut families: Vec<MetricFamily> = Vec::new();

        for source in sources.iter() {
            let snap = source.snapshot();
            let manager_label = source.manager_label();

            let mut base_labels: Vec<LabelPair> = Vec::with_capacity(1 + ext_labels.len());
            let mut manager_lp = LabelPair::default();
            manager_lp.set_name("manager".to_string());
            manager_lp.set_value(manager_label.to_string());
            base_labels.push(manager_lp);
            for (k, v) in ext_labels.iter() {
                let mut lp = LabelPair::default();
                lp.set_name(k.clone());
                lp.set_value(v.clone());
                base_labels.push(lp);
            }

            // Counter values in order matching COUNTER_DEFS
            let counter_values: [u64; 8] = [
                snap.read_locks,
                snap.write_locks,
                snap.lock_waits,
                snap.new_blocks,
                snap.write_races_lost,
                snap.unlocks,
                snap.blocks_removed,
                snap.tasks_released,
            ];

            for (i, (name, help)) in COUNTER_DEFS.iter().enumerate() {
                let mut m = Metric::default();
                m.set_label(base_labels.clone());
                let mut c = prometheus::proto::Counter::default();
                c.set_value(counter_values[i] as f64);
                m.set_counter(c);

                let mut mf = MetricFamily::default();
                mf.set_name(name.to_string());
                mf.set_help(help.to_string());
                mf.set_field_type(MetricType::COUNTER);
                mf.set_metric(vec![m]);
                families.push(mf);
            }

            // Gauge values in order matching GAUGE_DEFS
            let gauge_values: [i64; 2] = [snap.blocks_tracked, snap.registered_tasks];

            for (i, (name, help)) in GAUGE_DEFS.iter().enumerate() {
                let mut m = Metric::default();
                m.set_label(base_labels.clone());
                let mut g = Gauge::default();
                g.set_value(gauge_values[i] as f64);
                m.set_gauge(g);

                let mut mf = MetricFamily::default();
                mf.set_name(name.to_string());
                mf.set_help(help.to_string());
                mf.set_field_type(MetricType::GAUGE);
                mf.set_metric(vec![m]);
                families.push(mf);
            }
        }

        // Merge families with the same name (when multiple sources)
        if sources.len() > 1 {
            let mut merged: Vec<MetricFamily> = Vec::new();
            for mut family in families {
                if let Some(existing) = merged.iter_mut().find(|f| f.name() == family.name()) {
                    existing.mut_metric().extend(family.take_metric());
                } else {
                    merged.push(family);
                }
            }
            merged
        } else {
            families
        }
    }
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_empty_aggregator_collects_nothing() {
        let agg = MetricsAggregator::new();
        let families = agg.collect();
        assert!(families.is_empty());
    }

    #[test]
    fn test_single_source_collect() {
        let agg = MetricsAggregator::new();
        let metrics = Arc::new(LockMetrics::new("Manager".to_string()));

        metrics.inc_read_locks();
        metrics.inc_read_locks();
        metrics.inc_write_locks();
        metrics.set_blocks_tracked(7);

        agg.register_source(metrics);

        let families = agg.collect();
        assert_eq!(families.len(), COUNTER_DEFS.len() + GAUGE_DEFS.len());

        // Find read-locks counter
        let read_family = families
            .iter()
            .find(|f| f.get_name() == "block_locks_read_locks_total")
            .expect("should have read locks family");
        assert_eq!(read_family.get_field_type(), MetricType::COUNTER);
        let m = &read_family.get_metric()[0];
        assert_eq!(m.get_counter().value(), 2.0);
        assert_eq!(m.get_label()[0].get_name(), "manager");
        assert_eq!(m.get_label()[0].get_value(), "Manager");

        // Find blocks-tracked gauge
        let tracked_family = families
            .iter()
            .find(|f| f.get_name() == "block_locks_blocks_tracked")
            .expect("should have blocks tracked family");
        assert_eq!(tracked_family.get_field_type(), MetricType::GAUGE);
        assert_eq!(tracked_family.get_metric()[0].get_gauge().value(), 7.0);
    }

    #[test]
    fn test_external_labels() {
        let agg = MetricsAggregator::new();
        let metrics = Arc::new(LockMetrics::new("Manager".to_string()));
        agg.register_source(metrics);

        agg.set_external_labels(vec![
            ("instance_id".to_string(), "node-1".to_string()),
            ("executor_id".to_string(), "e0".to_string()),
        ]);

        let families = agg.collect();
        let read_family = families
            .iter()
            .find(|f| f.get_name() == "block_locks_read_locks_total")
            .unwrap();
        let labels = read_family.get_metric()[0].get_label();
        assert_eq!(labels.len(), 3); // manager + 2 external
        assert_eq!(labels[1].get_name(), "instance_id");
        assert_eq!(labels[1].get_value(), "node-1");
        assert_eq!(labels[2].get_name(), "executor_id");
        assert_eq!(labels[2].get_value(), "e0");
    }

    #[test]
    fn test_multiple_sources_merged() {
        let agg = MetricsAggregator::new();

        let m1 = Arc::new(LockMetrics::new("A".to_string()));
        let m2 = Arc::new(LockMetrics::new("B".to_string()));

        m1.inc_unlocks();
        m2.inc_unlocks();
        m2.inc_unlocks();

        agg.register_source(m1);
        agg.register_source(m2);

        let families = agg.collect();

        // Families should be merged by name
        let unlock_family = families
            .iter()
            .find(|f| f.get_name() == "block_locks_unlocks_total")
            .expect("should have unlocks family");
        assert_eq!(unlock_family.get_metric().len(), 2);

        let values: Vec<f64> = unlock_family
            .get_metric()
            .iter()
            .map(|m| m.get_counter().value())
            .collect();
        assert!(values.contains(&1.0));
        assert!(values.contains(&2.0));
    }

    #[test]
    fn test_register_with_prometheus_registry() {
        let agg = MetricsAggregator::new();
        let metrics = Arc::new(LockMetrics::new("Manager".to_string()));
        metrics.inc_new_blocks();
        agg.register_source(metrics);

        let registry = prometheus::Registry::new();
        agg.register_with(&registry)
            .expect("should register successfully");

        let gathered = registry.gather();
        assert!(!gathered.is_empty());

        let new_family = gathered
            .iter()
            .find(|f| f.get_name() == "block_locks_new_blocks_total")
            .expect("should find new blocks in gathered metrics");
        assert_eq!(new_family.get_metric()[0].get_counter().value(), 1.0);
    }

    #[test]
    fn test_descs_match_definitions() {
        let agg = MetricsAggregator::new();
        let descs = agg.desc();
        assert_eq!(descs.len(), COUNTER_DEFS.len() + GAUGE_DEFS.len());
    }
}
