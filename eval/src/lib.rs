// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Experiment utilities for FNC-1 stance detection
//!
//! This crate provides:
//! - Stance/article-body dataset loading with related/unrelated views
//! - Stratified, seeded train/test splitting
//! - Per-epoch streaming metrics (per-class accuracy, loss, precision,
//!   recall, F1 and macro F1) with an exportable history table
//! - A reproducible split pipeline with JSON and markdown reports

pub mod datasets;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod split;

pub use datasets::{ArticleBody, BodyId, HeadlineBodyPair, Stance, StanceArticleStore, StanceRecord};
pub use error::{EvalError, Result};
pub use metrics::{
    ClassCounts, ClassMetrics, EpochMetricsAccumulator, EpochPhase, EpochRecord, MetricsTable,
    UndefinedMetricPolicy,
};
pub use pipeline::{ExperimentConfig, PartitionInfo, SplitPipeline, SplitResults};
pub use split::{stratified_split, Partition};
