// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset split CLI for FNC-1 stance detection experiments
//!
//! Usage:
//!   fnc-split --dataset synthetic --seed 42
//!   fnc-split --dataset fnc1 --path ./datasets/fnc1 --test-fraction 0.2 --save-splits

use anyhow::{Context, Result};
use clap::Parser;
use fnc_eval::datasets::Stance;
use fnc_eval::pipeline::{ExperimentConfig, SplitPipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fnc-split")]
#[command(about = "Split FNC-1 stance data into stratified train/test partitions")]
#[command(version)]
struct Args {
    /// JSON configuration file; flags given on the command line override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset to split (fnc1, synthetic)
    #[arg(short, long)]
    dataset: Option<String>,

    /// Directory holding train_stances.csv and train_bodies.csv
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Stances CSV (overrides --path)
    #[arg(long)]
    stances: Option<PathBuf>,

    /// Article bodies CSV (overrides --path)
    #[arg(long)]
    bodies: Option<PathBuf>,

    /// Fraction of stance rows placed in the test partition
    #[arg(short, long)]
    test_fraction: Option<f64>,

    /// Random seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Draw a fresh, non-reproducible split
    #[arg(long, conflicts_with = "seed")]
    unseeded: bool,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (json, markdown, both)
    #[arg(short, long, default_value = "both")]
    format: String,

    /// Write the train/test partitions as CSV files
    #[arg(long, default_value_t = false)]
    save_splits: bool,
}

impl Args {
    fn into_config(self) -> Result<(ExperimentConfig, String, bool)> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ExperimentConfig::default(),
        };

        if let Some(dataset) = self.dataset {
            config.dataset_id = dataset;
        }
        if let Some(dir) = self.path {
            config.stances_path = Some(dir.join("train_stances.csv"));
            config.bodies_path = Some(dir.join("train_bodies.csv"));
            if config.dataset_id == "synthetic" {
                config.dataset_id = "fnc1".to_string();
            }
        }
        if let Some(stances) = self.stances {
            config.stances_path = Some(stances);
        }
        if let Some(bodies) = self.bodies {
            config.bodies_path = Some(bodies);
        }
        if let Some(fraction) = self.test_fraction {
            config.test_fraction = fraction;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if self.unseeded {
            config.seed = None;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }

        Ok((config, self.format, self.save_splits))
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config, format, save_splits) = Args::parse().into_config()?;

    if !matches!(format.as_str(), "json" | "markdown" | "both") {
        anyhow::bail!("Unknown output format '{}' (expected json, markdown or both)", format);
    }

    tracing::info!("FNC-1 Dataset Split");
    tracing::info!("===================");
    tracing::info!("Dataset: {}", config.dataset_id);
    tracing::info!("Test fraction: {}", config.test_fraction);
    tracing::info!("Seed: {:?}", config.seed);

    let output_dir = config.output_dir.clone();
    let dataset_id = config.dataset_id.clone();

    let mut pipeline = SplitPipeline::new(config);
    let results = pipeline.run().context("Split pipeline failed")?;

    // Print summary to console
    println!("\n{}", "=".repeat(60));
    println!("SPLIT SUMMARY");
    println!("{}", "=".repeat(60));
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10}",
        "Stance", "Dataset", "Train", "Test", "Test %"
    );
    println!("{:-<60}", "");
    for stance in Stance::ALL {
        let key = stance.as_str();
        let count = |dist: &std::collections::BTreeMap<String, usize>| *dist.get(key).unwrap_or(&0);
        println!(
            "{:<12} {:>10} {:>10} {:>10} {:>9.1}%",
            stance,
            count(&results.dataset.label_distribution),
            count(&results.train.label_distribution),
            count(&results.test.label_distribution),
            results.test.label_share(stance) * 100.0
        );
    }
    println!("{:-<60}", "");
    println!(
        "{:<12} {:>10} {:>10} {:>10}",
        "Total", results.dataset.stances, results.train.stances, results.test.stances
    );
    println!(
        "{:<12} {:>10} {:>10} {:>10}",
        "Bodies", results.dataset.bodies, results.train.bodies, results.test.bodies
    );

    // Save outputs
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let timestamp = results.timestamp.format("%Y%m%d_%H%M%S");

    if format == "json" || format == "both" {
        let json_path = output_dir.join(format!("split_{}_{}.json", dataset_id, timestamp));
        SplitPipeline::save_results(&results, &json_path)?;
        println!("\nJSON results saved to: {}", json_path.display());
    }

    if format == "markdown" || format == "both" {
        let report = SplitPipeline::generate_report(&results);
        let md_path = output_dir.join(format!("split_{}_{}.md", dataset_id, timestamp));
        std::fs::write(&md_path, report)
            .with_context(|| format!("Failed to write {}", md_path.display()))?;
        println!("Markdown report saved to: {}", md_path.display());
    }

    if save_splits {
        let splits_dir = output_dir.join("splits");
        let saved = pipeline.save_splits(&splits_dir)?;
        println!("Splits saved to: {} ({} files)", splits_dir.display(), saved.len());
    }

    println!("\nSplit complete!");

    Ok(())
}
