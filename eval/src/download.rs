// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! FNC-1 dataset download utility
//!
//! Fetches the stance and body CSV files from the public FNC-1 repository:
//! - train: train_stances.csv + train_bodies.csv
//! - competition: competition_test_stances.csv + competition_test_bodies.csv

use anyhow::{Context, Result};
use clap::Parser;
use fnc_eval::datasets::StanceArticleStore;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const FNC1_BASE_URL: &str = "https://raw.githubusercontent.com/FakeNewsChallenge/fnc-1/master";
const CHECKSUM_FILE: &str = "SHA256SUMS";

#[derive(Parser, Debug)]
#[command(name = "download-fnc")]
#[command(about = "Download the FNC-1 stance detection dataset")]
#[command(version)]
struct Args {
    /// Splits to download (comma-separated: train,competition or 'all')
    #[arg(short, long, default_value = "all")]
    splits: String,

    /// Output directory
    #[arg(short, long, default_value = "eval/datasets/fnc1")]
    output: PathBuf,

    /// Skip comparison against a previously recorded SHA256SUMS file
    #[arg(long)]
    skip_verify: bool,

    /// Force re-download even if files exist
    #[arg(short, long)]
    force: bool,
}

struct SplitDownload {
    id: &'static str,
    name: &'static str,
    stances: &'static str,
    bodies: &'static str,
}

const SPLITS: &[SplitDownload] = &[
    SplitDownload {
        id: "train",
        name: "FNC-1 training set",
        stances: "train_stances.csv",
        bodies: "train_bodies.csv",
    },
    SplitDownload {
        id: "competition",
        name: "FNC-1 competition test set",
        stances: "competition_test_stances.csv",
        bodies: "competition_test_bodies.csv",
    },
];

fn download_file(url: &str, output_path: &Path) -> Result<()> {
    tracing::info!("Downloading from: {}", url);

    let response = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(600))
        .build()?
        .get(url)
        .send()
        .context("Failed to send request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status: {}", response.status());
    }

    let pb = ProgressBar::new(response.content_length().unwrap_or(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let partial_path = output_path.with_extension("csv.part");
    let mut file = File::create(&partial_path)
        .with_context(|| format!("Failed to create {}", partial_path.display()))?;
    std::io::copy(&mut pb.wrap_read(response), &mut file).context("Failed to read response")?;
    file.flush()?;
    std::fs::rename(&partial_path, output_path)?;

    pb.finish_with_message("Downloaded");
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Read a `<digest>  <filename>` manifest written by an earlier run
fn read_checksums(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut sums = BTreeMap::new();
    if !path.exists() {
        return Ok(sums);
    }

    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if let Some((digest, name)) = line.split_once("  ") {
            sums.insert(name.trim().to_string(), digest.trim().to_string());
        }
    }
    Ok(sums)
}

fn write_checksums(path: &Path, sums: &BTreeMap<String, String>) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for (name, digest) in sums {
        writeln!(file, "{}  {}", digest, name)?;
    }
    Ok(())
}

fn download_split(
    split: &SplitDownload,
    output_dir: &Path,
    checksums: &mut BTreeMap<String, String>,
    skip_verify: bool,
    force: bool,
) -> Result<()> {
    tracing::info!("Processing split: {} ({})", split.name, split.id);

    for filename in [split.stances, split.bodies] {
        let path = output_dir.join(filename);

        if path.exists() && !force {
            tracing::info!("File already exists: {} (use --force to re-download)", path.display());
        } else {
            download_file(&format!("{}/{}", FNC1_BASE_URL, filename), &path)?;
        }

        let digest = sha256_file(&path)?;
        match checksums.get(filename) {
            Some(expected) if !skip_verify && *expected != digest => {
                anyhow::bail!(
                    "Checksum mismatch for {}: recorded {}, got {}",
                    filename,
                    expected,
                    digest
                );
            }
            Some(_) if !skip_verify => tracing::info!("Checksum verified: {} {}", filename, digest),
            _ => tracing::info!("SHA-256 {}: {}", filename, digest),
        }
        checksums.insert(filename.to_string(), digest);
    }

    // Parse both tables to make sure the pair is usable
    let stances_path = output_dir.join(split.stances);
    let bodies_path = output_dir.join(split.bodies);
    let store = StanceArticleStore::load_csv(&stances_path, &bodies_path)
        .with_context(|| format!("Downloaded {} split failed validation", split.id))?;

    tracing::info!(
        "Split ready: {} stances ({} related), {} bodies",
        store.len(),
        store.related_stances().len(),
        store.articles().len()
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("FNC-1 Download Utility");
    tracing::info!("======================");

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let requested: Vec<&str> = if args.splits == "all" {
        SPLITS.iter().map(|s| s.id).collect()
    } else {
        args.splits.split(',').map(|s| s.trim()).collect()
    };

    for name in &requested {
        if !SPLITS.iter().any(|s| s.id == *name) {
            tracing::warn!("Unknown split '{}', skipping", name);
        }
    }

    let checksum_path = args.output.join(CHECKSUM_FILE);
    let mut checksums = read_checksums(&checksum_path)?;
    let mut failures = 0;

    for split in SPLITS {
        if !requested.contains(&split.id) {
            continue;
        }
        let outcome = download_split(
            split,
            &args.output,
            &mut checksums,
            args.skip_verify,
            args.force,
        );
        if let Err(e) = outcome {
            tracing::error!("Failed to prepare {}: {:#}", split.id, e);
            tracing::info!("Manual download instructions:");
            tracing::info!("  1. Visit: https://github.com/FakeNewsChallenge/fnc-1");
            tracing::info!(
                "  2. Save {} and {} to: {}",
                split.stances,
                split.bodies,
                args.output.display()
            );
            failures += 1;
        }
    }

    write_checksums(&checksum_path, &checksums)?;

    println!("\n{}", "=".repeat(60));
    println!("FNC-1 Download Complete");
    println!("{}", "=".repeat(60));
    println!("\nFiles in {}:", args.output.display());
    for (name, digest) in &checksums {
        println!("  - {} ({})", name, &digest[..12.min(digest.len())]);
    }

    if failures > 0 {
        anyhow::bail!("{} split(s) could not be prepared", failures);
    }

    Ok(())
}
