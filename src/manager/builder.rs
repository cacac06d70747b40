// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Builder for [`BlockInfoManager`](super::BlockInfoManager).

use std::marker::PhantomData;
use std::sync::Arc;

use crate::metrics::{LockMetrics, MetricsAggregator, short_type_name};
use crate::{BlockKey, StorageLevel};

use super::BlockInfoManager;

/// Builder wiring a [`BlockInfoManager`] into the metrics pipeline.
///
/// # Example
/// ```ignore
/// let aggregator = MetricsAggregator::new();
/// let manager: BlockInfoManager<BlockId, Level> = BlockInfoManager::builder()
///     .label("shuffle")
///     .aggregator(aggregator.clone())
///     .build();
/// ```
pub struct BlockInfoManagerBuilder<K: BlockKey, L: StorageLevel> {
    /// Label for this manager's exported metrics.
    /// Default: short name of the block key type.
    label: Option<String>,

    /// Optional metrics aggregator for prometheus export.
    aggregator: Option<MetricsAggregator>,

    _marker: PhantomData<(K, L)>,
}

impl<K: BlockKey, L: StorageLevel> Default for BlockInfoManagerBuilder<K, L> {
    fn default() -> Self {
        Self {
            label: None,
            aggregator: None,
            _marker: PhantomData,
        }
    }
}

impl<K: BlockKey, L: StorageLevel> BlockInfoManagerBuilder<K, L> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metrics label for this manager.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set a metrics aggregator for prometheus export.
    ///
    /// The aggregator will automatically receive this manager's metrics source.
    pub fn aggregator(mut self, aggregator: MetricsAggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Build the [`BlockInfoManager`].
    pub fn build(self) -> BlockInfoManager<K, L> {
        let label = self
            .label
            .unwrap_or_else(|| short_type_name::<K>().to_string());
        let metrics = Arc::new(LockMetrics::new(label));
        if let Some(ref aggregator) = self.aggregator {
            aggregator.register_source(Arc::clone(&metrics));
        }
        BlockInfoManager::with_metrics(metrics)
    }
}
