// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible dataset splitting pipeline
//!
//! Orchestrates:
//! - Dataset loading (FNC-1 CSV files or synthetic)
//! - Stratified train/test splitting
//! - Partition statistics
//! - Results and split serialization

use crate::datasets::{Stance, StanceArticleStore};
use crate::error::{EvalError, Result};
use crate::metrics::MetricsTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration for the split pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Random seed; `None` gives a non-reproducible split
    pub seed: Option<u64>,
    /// Fraction of stance rows assigned to the test partition
    pub test_fraction: f64,
    /// Dataset to load ("fnc1" or "synthetic")
    pub dataset_id: String,
    /// FNC-1 stances CSV
    pub stances_path: Option<PathBuf>,
    /// FNC-1 article bodies CSV
    pub bodies_path: Option<PathBuf>,
    /// Synthetic dataset size
    pub synthetic_bodies: usize,
    pub synthetic_stances: usize,
    /// Output directory for results
    pub output_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: Some(42),
            test_fraction: 0.2,
            dataset_id: "synthetic".to_string(),
            stances_path: None,
            bodies_path: None,
            synthetic_bodies: 100,
            synthetic_stances: 1000,
            output_dir: PathBuf::from("eval/results"),
        }
    }
}

impl ExperimentConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EvalError::io(format!("failed to read config {}", path.display()), e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Shape of one dataset partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub stances: usize,
    pub bodies: usize,
    pub related_stances: usize,
    pub unrelated_stances: usize,
    pub unique_related_bodies: usize,
    pub unique_unrelated_bodies: usize,
    pub label_distribution: BTreeMap<String, usize>,
}

impl PartitionInfo {
    pub fn from_store(store: &StanceArticleStore) -> Self {
        Self {
            stances: store.len(),
            bodies: store.articles().len(),
            related_stances: store.related_stances().len(),
            unrelated_stances: store.unrelated_stances().len(),
            unique_related_bodies: store.unique_related_bodies().len(),
            unique_unrelated_bodies: store.unique_unrelated_bodies().len(),
            label_distribution: store
                .label_distribution()
                .into_iter()
                .map(|(stance, count)| (stance.to_string(), count))
                .collect(),
        }
    }

    /// Share of a label in this partition
    pub fn label_share(&self, stance: Stance) -> f64 {
        if self.stances == 0 {
            return 0.0;
        }
        *self.label_distribution.get(stance.as_str()).unwrap_or(&0) as f64 / self.stances as f64
    }
}

/// Complete split results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitResults {
    pub config: ExperimentConfig,
    pub dataset: PartitionInfo,
    pub train: PartitionInfo,
    pub test: PartitionInfo,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Main split pipeline
pub struct SplitPipeline {
    config: ExperimentConfig,
    store: Option<StanceArticleStore>,
    partitions: Option<(StanceArticleStore, StanceArticleStore)>,
}

impl SplitPipeline {
    pub fn new(config: ExperimentConfig) -> Self {
        Self {
            config,
            store: None,
            partitions: None,
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Load dataset based on configuration
    pub fn load_dataset(&mut self) -> Result<&StanceArticleStore> {
        let store = match self.config.dataset_id.as_str() {
            "synthetic" => {
                tracing::info!(
                    "Generating synthetic dataset ({} stances over {} bodies)",
                    self.config.synthetic_stances,
                    self.config.synthetic_bodies
                );
                StanceArticleStore::synthetic(
                    self.config.synthetic_bodies,
                    self.config.synthetic_stances,
                    self.config.seed.unwrap_or_default(),
                )?
            }
            "fnc1" => {
                let paths = (&self.config.stances_path, &self.config.bodies_path);
                let (stances, bodies) = match paths {
                    (Some(stances), Some(bodies)) => (stances, bodies),
                    _ => {
                        return Err(EvalError::InvalidArgument(
                            "the fnc1 dataset needs both a stances and a bodies path".to_string(),
                        ))
                    }
                };
                tracing::info!("Loading FNC-1 dataset from {}", stances.display());
                StanceArticleStore::load_csv(stances, bodies)?
            }
            other => {
                return Err(EvalError::InvalidArgument(format!(
                    "unknown dataset '{}' (expected fnc1 or synthetic)",
                    other
                )))
            }
        };

        tracing::info!(
            "Dataset loaded: {} stances (related={}, unrelated={}), {} bodies",
            store.len(),
            store.related_stances().len(),
            store.unrelated_stances().len(),
            store.articles().len()
        );

        self.partitions = None;
        Ok(self.store.insert(store))
    }

    /// Run load and split, returning partition statistics
    pub fn run(&mut self) -> Result<SplitResults> {
        if self.store.is_none() {
            self.load_dataset()?;
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| EvalError::InvalidState("dataset not loaded".to_string()))?;

        let (train, test) = store.split(self.config.test_fraction, self.config.seed)?;

        let results = SplitResults {
            config: self.config.clone(),
            dataset: PartitionInfo::from_store(store),
            train: PartitionInfo::from_store(&train),
            test: PartitionInfo::from_store(&test),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        for stance in Stance::ALL {
            tracing::info!(
                "  {:<10} dataset={:.3} train={:.3} test={:.3}",
                stance,
                results.dataset.label_share(stance),
                results.train.label_share(stance),
                results.test.label_share(stance)
            );
        }

        self.partitions = Some((train, test));
        Ok(results)
    }

    /// Train and test stores from the last `run`
    pub fn partitions(&self) -> Option<(&StanceArticleStore, &StanceArticleStore)> {
        self.partitions.as_ref().map(|(train, test)| (train, test))
    }

    /// Write the train/test partitions as FNC-1 style CSV files
    pub fn save_splits(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let (train, test) = self
            .partitions()
            .ok_or_else(|| {
                EvalError::InvalidState("run the pipeline before saving splits".to_string())
            })?;

        std::fs::create_dir_all(output_dir)
            .map_err(|e| EvalError::io(format!("failed to create {}", output_dir.display()), e))?;

        let mut saved = Vec::new();
        for (name, store) in [("train", train), ("test", test)] {
            let stances_path = output_dir.join(format!("{}_stances.csv", name));
            let bodies_path = output_dir.join(format!("{}_bodies.csv", name));
            store.save_csv(&stances_path, &bodies_path)?;
            tracing::info!("Saved {} split to {}", name, stances_path.display());
            saved.push(stances_path);
            saved.push(bodies_path);
        }

        Ok(saved)
    }

    /// Save results to JSON file
    pub fn save_results(results: &SplitResults, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EvalError::io(format!("failed to create {}", parent.display()), e))?;
        }
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(output_path, json)
            .map_err(|e| EvalError::io(format!("failed to write {}", output_path.display()), e))?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }

    /// Generate a markdown report
    pub fn generate_report(results: &SplitResults) -> String {
        let mut report = String::new();

        report.push_str("# FNC-1 Dataset Split Report\n\n");
        report.push_str(&format!(
            "**Generated:** {}\n\n",
            results.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        report.push_str(&format!("**Version:** {}\n\n", results.version));

        report.push_str("## Configuration\n\n");
        report.push_str(&format!("- **Dataset:** {}\n", results.config.dataset_id));
        report.push_str(&format!("- **Test Fraction:** {}\n", results.config.test_fraction));
        report.push_str(&format!(
            "- **Seed:** {}\n\n",
            results.config.seed.map_or("none".to_string(), |s| s.to_string())
        ));

        report.push_str("## Partitions\n\n");
        report.push_str("| Partition | Stances | Bodies | Related | Unrelated | Unique Related Bodies | Unique Unrelated Bodies |\n");
        report.push_str("|-----------|---------|--------|---------|-----------|-----------------------|-------------------------|\n");
        let partitions = [
            ("dataset", &results.dataset),
            ("train", &results.train),
            ("test", &results.test),
        ];
        for (name, info) in partitions {
            report.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                name,
                info.stances,
                info.bodies,
                info.related_stances,
                info.unrelated_stances,
                info.unique_related_bodies,
                info.unique_unrelated_bodies
            ));
        }

        report.push_str("\n## Label Distribution\n\n");
        report.push_str("| Stance | Dataset | Train | Test |\n");
        report.push_str("|--------|---------|-------|------|\n");
        for stance in Stance::ALL {
            report.push_str(&format!(
                "| {} | {:.2}% | {:.2}% | {:.2}% |\n",
                stance,
                results.dataset.label_share(stance) * 100.0,
                results.train.label_share(stance) * 100.0,
                results.test.label_share(stance) * 100.0
            ));
        }

        report
    }
}

/// Render an accumulator history as a markdown report
pub fn metrics_report(title: &str, table: &MetricsTable) -> String {
    let mut report = format!("# {}\n\n", title);

    if table.is_empty() {
        report.push_str("No finalized epochs.\n");
        return report;
    }

    if let Some(f1) = table.column("f1Score") {
        let (best_idx, best_f1) = f1
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .fold((0, f64::NEG_INFINITY), |best, (idx, &v)| {
                if v > best.1 {
                    (idx, v)
                } else {
                    best
                }
            });
        if best_f1.is_finite() {
            report.push_str(&format!(
                "**Best Epoch:** {} (F1={:.4})\n\n",
                table.rows[best_idx].epoch, best_f1
            ));
        }
    }

    report.push_str(&table.to_markdown());
    report
}
