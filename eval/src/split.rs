// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Stratified train/test partitioning over row indices
//!
//! Rows are grouped by a label key, each group is shuffled with a seeded
//! ChaCha8 RNG and cut so that the test partition receives a proportional
//! share of every label.

use crate::error::{EvalError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Row indices of a two-way partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Seeded RNG when a seed is given, entropy-seeded otherwise
pub fn rng_for(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Split `keys.len()` rows into train/test, stratified on `keys`.
///
/// The test partition holds `ceil(test_fraction * n)` rows. Each label gets the
/// floor of its proportional share, and the leftover slots go to the labels
/// with the largest fractional remainders.
pub fn stratified_split<K>(keys: &[K], test_fraction: f64, seed: Option<u64>) -> Result<Partition>
where
    K: Ord + Copy + Debug,
{
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(EvalError::InvalidArgument(format!(
            "test fraction must lie in (0, 1), got {}",
            test_fraction
        )));
    }

    let n = keys.len();
    let mut groups: BTreeMap<K, Vec<usize>> = BTreeMap::new();
    for (idx, key) in keys.iter().enumerate() {
        groups.entry(*key).or_default().push(idx);
    }

    // 0.3 * 100 is 30.000000000000004 in f64; snap float noise before ceil
    let scaled = test_fraction * n as f64;
    let n_test = if (scaled - scaled.round()).abs() < 1e-9 {
        scaled.round() as usize
    } else {
        scaled.ceil() as usize
    };
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(EvalError::DegenerateSplit(format!(
            "{} rows cannot be split with test fraction {} (train={}, test={})",
            n, test_fraction, n_train, n_test
        )));
    }

    if let Some((key, members)) = groups.iter().find(|(_, members)| members.len() < 2) {
        return Err(EvalError::DegenerateSplit(format!(
            "label {:?} has {} member(s), at least 2 are required for stratification",
            key,
            members.len()
        )));
    }

    let classes = groups.len();
    if n_test < classes || n_train < classes {
        return Err(EvalError::DegenerateSplit(format!(
            "train={} and test={} must each be at least the number of labels ({})",
            n_train, n_test, classes
        )));
    }

    let sizes: Vec<usize> = groups.values().map(Vec::len).collect();
    let test_counts = allocate(&sizes, n_test);

    let mut rng = rng_for(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);

    for ((key, mut members), take) in groups.into_iter().zip(test_counts) {
        members.shuffle(&mut rng);
        tracing::debug!(
            "label {:?}: {} train, {} test",
            key,
            members.len() - take,
            take
        );
        test.extend_from_slice(&members[..take]);
        train.extend_from_slice(&members[take..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(Partition { train, test })
}

/// Largest-remainder apportionment of `total` slots over groups of `sizes`.
///
/// Each group of two or more gets between 1 and `size - 1` slots, so every
/// label lands in both partitions whenever `groups <= total <= n - groups`.
fn allocate(sizes: &[usize], total: usize) -> Vec<usize> {
    let n: u64 = sizes.iter().map(|&s| s as u64).sum();
    if n == 0 {
        return vec![0; sizes.len()];
    }

    let bounds = |size: usize| if size >= 2 { (1, size - 1) } else { (0, size) };

    let mut alloc = Vec::with_capacity(sizes.len());
    let mut remainders = Vec::with_capacity(sizes.len());
    for (idx, &size) in sizes.iter().enumerate() {
        let exact = size as u64 * total as u64;
        let (lo, hi) = bounds(size);
        alloc.push(((exact / n) as usize).clamp(lo, hi));
        remainders.push((idx, exact % n));
    }

    // Largest remainder first; ties go to the larger group, then the earlier one
    remainders.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| sizes[b.0].cmp(&sizes[a.0]))
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut assigned: usize = alloc.iter().sum();
    while assigned < total {
        let before = assigned;
        for &(idx, _) in &remainders {
            if assigned == total {
                break;
            }
            if alloc[idx] < bounds(sizes[idx]).1 {
                alloc[idx] += 1;
                assigned += 1;
            }
        }
        if assigned == before {
            break;
        }
    }
    while assigned > total {
        let before = assigned;
        for &(idx, _) in remainders.iter().rev() {
            if assigned == total {
                break;
            }
            if alloc[idx] > bounds(sizes[idx]).0 {
                alloc[idx] -= 1;
                assigned -= 1;
            }
        }
        if assigned == before {
            break;
        }
    }

    alloc
}
