// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Streaming per-epoch classification metrics
//!
//! An `EpochMetricsAccumulator` folds batches of (true, predicted) label
//! indices into per-class confusion counts, then freezes them into an
//! `EpochRecord` at the end of every epoch:
//! - per-class accuracy, apportioned loss, precision, recall, F1
//! - macro-averaged F1
//! - overall accuracy and loss
//!
//! Each accumulator owns its counters, so train and validation trackers can
//! run side by side.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// How `finish_epoch` treats metrics whose denominator is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UndefinedMetricPolicy {
    /// Fail the epoch with `EvalError::UndefinedMetric`
    Strict,
    /// Report NaN for undefined per-class values; F1 is taken from counts
    /// and only a class absent from both truth and predictions is left out
    /// of the macro F1 average
    #[default]
    Exclude,
}

/// Where the accumulator is in its per-epoch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochPhase {
    /// Fresh counters, no batch seen yet
    Idle,
    /// At least one batch recorded
    Accumulating,
    /// Record emitted; `reset_epoch` required before the next batch
    Finalized,
}

/// Confusion counts and apportioned loss for one class
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassCounts {
    /// Samples of this class predicted as this class
    pub correct: u64,
    /// Samples whose true label is this class (support)
    pub total: u64,
    /// Batch loss apportioned by this class's share of each batch
    pub loss: f64,
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
}

impl ClassCounts {
    pub fn accuracy(&self) -> Option<f64> {
        ratio(self.correct, self.total)
    }

    pub fn avg_loss(&self) -> Option<f64> {
        (self.total > 0).then(|| self.loss / self.total as f64)
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall: TP / (TP + FN)
    pub fn recall(&self) -> Option<f64> {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// F1 from counts: 2TP / (2TP + FP + FN).
    ///
    /// Zero for a class that was missed or only mispredicted; undefined only
    /// when the class never occurred in either the truth or the predictions.
    pub fn f1(&self) -> Option<f64> {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Finalized metrics for one class in one epoch (NaN where undefined)
#[derive(Debug, Clone, Serialize)]
pub struct ClassMetrics {
    pub label: usize,
    pub support: u64,
    pub accuracy: f64,
    pub avg_loss: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Metrics frozen at the end of an epoch
#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    pub epoch: u32,
    pub overall_accuracy: f64,
    /// Sum of per-batch mean losses divided by the sample count
    pub overall_loss: f64,
    /// Sum of per-batch mean losses divided by the batch count
    pub mean_batch_loss: f64,
    /// Macro-averaged F1 over the classes with a defined F1
    pub f1_score: f64,
    pub samples: u64,
    pub batches: u64,
    pub per_class: Vec<ClassMetrics>,
}

impl EpochRecord {
    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let mut output = format!(
            r#"Epoch {} Metrics
================
Overall Accuracy:  {:.4} ({:.2}%)
Overall Loss:      {:.6}
Mean Batch Loss:   {:.6}
Macro F1:          {:.4}
Samples:           {} ({} batches)

Per-Class Metrics:
"#,
            self.epoch,
            self.overall_accuracy,
            self.overall_accuracy * 100.0,
            self.overall_loss,
            self.mean_batch_loss,
            self.f1_score,
            self.samples,
            self.batches,
        );

        for class in &self.per_class {
            output.push_str(&format!(
                "  {}: Acc={:.4} Loss={:.4} P={:.4} R={:.4} F1={:.4} (n={})\n",
                class.label,
                class.accuracy,
                class.avg_loss,
                class.precision,
                class.recall,
                class.f1_score,
                class.support
            ));
        }

        output
    }
}

/// Accumulates per-batch confusion statistics over an epoch
#[derive(Debug, Clone)]
pub struct EpochMetricsAccumulator {
    num_labels: usize,
    policy: UndefinedMetricPolicy,
    counts: Vec<ClassCounts>,
    total_loss: f64,
    batches: u64,
    phase: EpochPhase,
    history: Vec<EpochRecord>,
}

impl EpochMetricsAccumulator {
    /// Create an accumulator for `num_labels` classes with the default policy
    pub fn new(num_labels: usize) -> Result<Self> {
        Self::with_policy(num_labels, UndefinedMetricPolicy::default())
    }

    pub fn with_policy(num_labels: usize, policy: UndefinedMetricPolicy) -> Result<Self> {
        if num_labels == 0 {
            return Err(EvalError::InvalidArgument(
                "an accumulator needs at least one label".to_string(),
            ));
        }

        Ok(Self {
            num_labels,
            policy,
            counts: vec![ClassCounts::default(); num_labels],
            total_loss: 0.0,
            batches: 0,
            phase: EpochPhase::Idle,
            history: Vec::new(),
        })
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn policy(&self) -> UndefinedMetricPolicy {
        self.policy
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    /// Counters for the epoch in progress
    pub fn class_counts(&self) -> &[ClassCounts] {
        &self.counts
    }

    /// Unweighted sum of batch losses in the epoch in progress
    pub fn total_loss(&self) -> f64 {
        self.total_loss
    }

    /// Zero every counter for a new epoch. History is kept.
    pub fn reset_epoch(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = ClassCounts::default());
        self.total_loss = 0.0;
        self.batches = 0;
        self.phase = EpochPhase::Idle;
    }

    /// Fold one batch into the epoch counters.
    ///
    /// `batch_loss` is the mean loss over the batch; each class is charged
    /// `batch_loss * (its share of the batch)`. Inputs are validated before any
    /// counter changes.
    pub fn update_batch(
        &mut self,
        true_labels: &[usize],
        predicted_labels: &[usize],
        batch_loss: f64,
        batch_size: usize,
    ) -> Result<()> {
        if self.phase == EpochPhase::Finalized {
            return Err(EvalError::InvalidState(
                "epoch already finished; call reset_epoch before the next batch".to_string(),
            ));
        }
        if true_labels.len() != predicted_labels.len() {
            return Err(EvalError::InvalidArgument(format!(
                "{} true labels but {} predictions",
                true_labels.len(),
                predicted_labels.len()
            )));
        }
        if batch_size == 0 || batch_size != true_labels.len() {
            return Err(EvalError::InvalidArgument(format!(
                "batch size {} does not match {} labels",
                batch_size,
                true_labels.len()
            )));
        }
        if !batch_loss.is_finite() || batch_loss < 0.0 {
            return Err(EvalError::InvalidArgument(format!(
                "batch loss must be finite and non-negative, got {}",
                batch_loss
            )));
        }
        if let Some((pos, label)) = true_labels
            .iter()
            .chain(predicted_labels)
            .enumerate()
            .find(|(_, label)| **label >= self.num_labels)
        {
            return Err(EvalError::InvalidArgument(format!(
                "label {} at position {} is outside [0, {})",
                label,
                pos % batch_size,
                self.num_labels
            )));
        }

        let mut batch = vec![ClassCounts::default(); self.num_labels];
        for (&truth, &pred) in true_labels.iter().zip(predicted_labels) {
            batch[truth].total += 1;
            if truth == pred {
                batch[truth].correct += 1;
                batch[truth].tp += 1;
            } else {
                batch[pred].fp += 1;
                batch[truth].fn_ += 1;
            }
        }

        for (counts, delta) in self.counts.iter_mut().zip(&batch) {
            counts.correct += delta.correct;
            counts.total += delta.total;
            counts.loss += batch_loss * delta.total as f64 / batch_size as f64;
            counts.tp += delta.tp;
            counts.fp += delta.fp;
            counts.fn_ += delta.fn_;
        }

        self.total_loss += batch_loss;
        self.batches += 1;
        self.phase = EpochPhase::Accumulating;

        Ok(())
    }

    /// Compute the epoch's metrics and append them to the history.
    ///
    /// Counters are left as they are; call `reset_epoch` before the next epoch.
    pub fn finish_epoch(&mut self, epoch: u32) -> Result<&EpochRecord> {
        match self.phase {
            EpochPhase::Idle => {
                return Err(EvalError::InvalidState(
                    "no batches recorded since the last reset".to_string(),
                ))
            }
            EpochPhase::Finalized => {
                return Err(EvalError::InvalidState(format!(
                    "epoch already finished; call reset_epoch before finishing epoch {}",
                    epoch
                )))
            }
            EpochPhase::Accumulating => {}
        }

        let per_class = self
            .counts
            .iter()
            .enumerate()
            .map(|(label, counts)| self.class_metrics(label, counts))
            .collect::<Result<Vec<_>>>()?;

        let defined: Vec<f64> = per_class
            .iter()
            .map(|class| class.f1_score)
            .filter(|f1| !f1.is_nan())
            .collect();
        if defined.is_empty() {
            return Err(EvalError::UndefinedMetric {
                metric: format!("macro F1 for epoch {}", epoch),
                reason: "no class has a defined F1 score",
            });
        }
        let f1_score = defined.iter().sum::<f64>() / defined.len() as f64;

        let correct: u64 = self.counts.iter().map(|c| c.correct).sum();
        let samples: u64 = self.counts.iter().map(|c| c.total).sum();

        let record = EpochRecord {
            epoch,
            overall_accuracy: correct as f64 / samples as f64,
            overall_loss: self.total_loss / samples as f64,
            mean_batch_loss: self.total_loss / self.batches as f64,
            f1_score,
            samples,
            batches: self.batches,
            per_class,
        };

        tracing::info!(
            "Epoch {}: accuracy={:.4} loss={:.6} f1={:.4} ({} samples, {} batches)",
            record.epoch,
            record.overall_accuracy,
            record.overall_loss,
            record.f1_score,
            record.samples,
            record.batches
        );

        self.phase = EpochPhase::Finalized;
        self.history.push(record);
        Ok(&self.history[self.history.len() - 1])
    }

    fn class_metrics(&self, label: usize, counts: &ClassCounts) -> Result<ClassMetrics> {
        const NO_SUPPORT: &str = "class has no true samples";

        let accuracy = self.resolve(counts.accuracy(), "accuracy", label, NO_SUPPORT)?;
        let avg_loss = self.resolve(counts.avg_loss(), "average loss", label, NO_SUPPORT)?;
        let precision =
            self.resolve(counts.precision(), "precision", label, "class was never predicted")?;
        let recall = self.resolve(counts.recall(), "recall", label, NO_SUPPORT)?;

        let f1 = match self.policy {
            UndefinedMetricPolicy::Strict if precision + recall > 0.0 => counts.f1(),
            UndefinedMetricPolicy::Strict => None,
            UndefinedMetricPolicy::Exclude => counts.f1(),
        };
        let f1_score = self.resolve(f1, "F1", label, "precision and recall are both zero")?;

        Ok(ClassMetrics {
            label,
            support: counts.total,
            accuracy,
            avg_loss,
            precision,
            recall,
            f1_score,
        })
    }

    fn resolve(
        &self,
        value: Option<f64>,
        metric: &str,
        label: usize,
        reason: &'static str,
    ) -> Result<f64> {
        match (value, self.policy) {
            (Some(value), _) => Ok(value),
            (None, UndefinedMetricPolicy::Exclude) => Ok(f64::NAN),
            (None, UndefinedMetricPolicy::Strict) => Err(EvalError::UndefinedMetric {
                metric: format!("{} for class {}", metric, label),
                reason,
            }),
        }
    }

    /// Every finalized epoch, in the order `finish_epoch` was called
    pub fn metrics_history(&self) -> &[EpochRecord] {
        &self.history
    }

    /// Flatten the history into a column table
    pub fn metrics_table(&self) -> MetricsTable {
        MetricsTable::from_records(&self.history, self.num_labels)
    }
}

/// One flattened epoch; `values` line up with `MetricsTable::columns[1..]`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRow {
    pub epoch: u32,
    pub values: Vec<f64>,
}

/// Epoch history as a flat table for downstream reporting.
///
/// Columns are `epoch`, `overallAccuracy`, `overallLoss`, `f1Score`, then
/// `classAccuracy_<i>` and `classLoss_<i>` for every label.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsTable {
    pub columns: Vec<String>,
    pub rows: Vec<MetricsRow>,
}

impl MetricsTable {
    pub fn from_records(records: &[EpochRecord], num_labels: usize) -> Self {
        let mut columns: Vec<String> = ["epoch", "overallAccuracy", "overallLoss", "f1Score"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        for label in 0..num_labels {
            columns.push(format!("classAccuracy_{}", label));
            columns.push(format!("classLoss_{}", label));
        }

        let rows = records
            .iter()
            .map(|record| {
                let mut values =
                    vec![record.overall_accuracy, record.overall_loss, record.f1_score];
                for label in 0..num_labels {
                    match record.per_class.get(label) {
                        Some(class) => values.extend([class.accuracy, class.avg_loss]),
                        None => values.extend([f64::NAN, f64::NAN]),
                    }
                }
                MetricsRow {
                    epoch: record.epoch,
                    values,
                }
            })
            .collect();

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn epochs(&self) -> Vec<u32> {
        self.rows.iter().map(|row| row.epoch).collect()
    }

    /// Values of a metric column by name; `epoch` is served by `epochs()`
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().skip(1).position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row.values[idx]).collect())
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            let mut fields = vec![row.epoch.to_string()];
            fields.extend(row.values.iter().map(|v| v.to_string()));
            writer.write_record(&fields)?;
        }
        writer
            .flush()
            .map_err(|e| EvalError::io("failed to flush metrics CSV", e))
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| EvalError::malformed("metrics CSV", e.to_string()))
    }

    /// JSON array of objects keyed by column name; undefined values become null
    pub fn to_json(&self) -> Result<String> {
        let objects: Vec<serde_json::Map<String, serde_json::Value>> = self
            .rows
            .iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                object.insert("epoch".to_string(), row.epoch.into());
                for (column, value) in self.columns.iter().skip(1).zip(&row.values) {
                    object.insert(column.clone(), (*value).into());
                }
                object
            })
            .collect();
        Ok(serde_json::to_string_pretty(&objects)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("| {} |\n", self.columns.join(" | ")));
        output.push_str(&format!(
            "|{}\n",
            self.columns.iter().map(|c| format!("{:-<1$}|", "", c.len() + 2)).collect::<String>()
        ));
        for row in &self.rows {
            let values: Vec<String> = row.values.iter().map(|v| format!("{:.4}", v)).collect();
            output.push_str(&format!("| {} | {} |\n", row.epoch, values.join(" | ")));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_two_class_example() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();
        acc.update_batch(&[0, 0, 1, 1], &[0, 1, 1, 0], 0.5, 4).unwrap();

        let counts = acc.class_counts()[0];
        assert_eq!(counts.correct, 1);
        assert_eq!(counts.total, 2);
        assert_eq!((counts.tp, counts.fp, counts.fn_), (1, 1, 1));

        let record = acc.finish_epoch(0).unwrap();
        for class in &record.per_class {
            assert!(close(class.precision, 0.5));
            assert!(close(class.recall, 0.5));
            assert!(close(class.f1_score, 0.5));
            assert!(close(class.accuracy, 0.5));
            assert!(close(class.avg_loss, 0.125));
        }
        assert!(close(record.f1_score, 0.5));
        assert!(close(record.overall_accuracy, 0.5));
        assert!(close(record.overall_loss, 0.125));
        assert!(close(record.mean_batch_loss, 0.5));
    }

    #[test]
    fn test_perfect_predictions() {
        let mut acc = EpochMetricsAccumulator::new(4).unwrap();
        let labels = [0, 2, 2, 3, 3, 3];
        acc.update_batch(&labels, &labels, 0.1, labels.len()).unwrap();

        let record = acc.finish_epoch(1).unwrap();
        assert!(close(record.overall_accuracy, 1.0));
        for class in record.per_class.iter().filter(|c| c.support > 0) {
            assert!(close(class.precision, 1.0));
            assert!(close(class.recall, 1.0));
            assert!(close(class.f1_score, 1.0));
        }
        // class 1 has no support and is left out of the macro average
        assert!(record.per_class[1].f1_score.is_nan());
        assert!(close(record.f1_score, 1.0));
    }

    #[test]
    fn test_strict_policy_fails_on_zero_support() {
        let mut acc =
            EpochMetricsAccumulator::with_policy(3, UndefinedMetricPolicy::Strict).unwrap();
        acc.update_batch(&[0, 1], &[0, 1], 0.2, 2).unwrap();

        let err = acc.finish_epoch(0).unwrap_err();
        match err {
            EvalError::UndefinedMetric { metric, .. } => assert!(metric.contains("class 2")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(acc.metrics_history().is_empty());
    }

    #[test]
    fn test_strict_policy_fails_when_precision_and_recall_are_zero() {
        let mut acc =
            EpochMetricsAccumulator::with_policy(2, UndefinedMetricPolicy::Strict).unwrap();
        acc.update_batch(&[0, 0, 1], &[1, 0, 0], 1.0, 3).unwrap();

        let err = acc.finish_epoch(0).unwrap_err();
        assert!(matches!(err, EvalError::UndefinedMetric { .. }));
    }

    #[test]
    fn test_exclude_policy_scores_zero_f1() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();
        acc.update_batch(&[0, 0, 1], &[1, 0, 0], 1.0, 3).unwrap();

        let record = acc.finish_epoch(0).unwrap();
        assert!(close(record.per_class[1].precision, 0.0));
        assert!(close(record.per_class[1].recall, 0.0));
        assert!(close(record.per_class[1].f1_score, 0.0));
        // class 0: P = 1/2, R = 1/2
        assert!(close(record.f1_score, 0.25));
    }

    #[test]
    fn test_missed_class_counts_as_zero_f1() {
        // collapsed onto class 0: class 1 is never predicted
        let mut collapsed = EpochMetricsAccumulator::new(2).unwrap();
        collapsed.update_batch(&[0, 0, 0, 1], &[0, 0, 0, 0], 0.4, 4).unwrap();
        let collapsed = collapsed.finish_epoch(0).unwrap().clone();

        assert!(collapsed.per_class[1].precision.is_nan());
        assert!(close(collapsed.per_class[1].recall, 0.0));
        assert!(close(collapsed.per_class[1].f1_score, 0.0));
        assert!(close(collapsed.per_class[0].f1_score, 6.0 / 7.0));
        assert!(close(collapsed.f1_score, 3.0 / 7.0));

        // one more mistake, this time a wrong prediction of class 1
        let mut worse = EpochMetricsAccumulator::new(2).unwrap();
        worse.update_batch(&[0, 0, 0, 1, 0], &[0, 0, 0, 0, 1], 0.4, 5).unwrap();
        let worse = worse.finish_epoch(0).unwrap();

        assert!(close(worse.per_class[1].f1_score, 0.0));
        assert!(close(worse.per_class[0].f1_score, 0.75));
        assert!(close(worse.f1_score, 0.375));
        assert!(worse.f1_score < collapsed.f1_score);
    }

    #[test]
    fn test_class_counts_f1() {
        let counts = ClassCounts {
            tp: 2,
            fp: 1,
            fn_: 3,
            ..ClassCounts::default()
        };
        assert!(close(counts.f1().unwrap(), 0.5));
        assert!(ClassCounts::default().f1().is_none());
    }

    #[test]
    fn test_loss_is_apportioned_by_class_share() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();
        acc.update_batch(&[0, 0, 0, 1], &[0, 0, 0, 1], 0.8, 4).unwrap();
        acc.update_batch(&[1, 1], &[1, 1], 0.4, 2).unwrap();

        let counts = acc.class_counts();
        assert!(close(counts[0].loss, 0.6));
        assert!(close(counts[1].loss, 0.2 + 0.4));
        assert!(close(acc.total_loss(), 1.2));

        let record = acc.finish_epoch(0).unwrap();
        assert!(close(record.per_class[0].avg_loss, 0.2));
        assert!(close(record.per_class[1].avg_loss, 0.2));
        assert!(close(record.overall_loss, 1.2 / 6.0));
        assert!(close(record.mean_batch_loss, 0.6));
    }

    #[test]
    fn test_epochs_are_isolated_by_reset() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();

        acc.reset_epoch();
        acc.update_batch(&[0, 1], &[0, 1], 0.3, 2).unwrap();
        acc.finish_epoch(1).unwrap();

        acc.reset_epoch();
        acc.update_batch(&[0, 1, 1], &[1, 1, 0], 0.9, 3).unwrap();
        acc.finish_epoch(2).unwrap();

        let history = acc.metrics_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].epoch, 1);
        assert_eq!(history[1].epoch, 2);
        assert!(close(history[0].overall_accuracy, 1.0));
        assert_eq!(history[0].samples, 2);
        assert!(close(history[1].overall_accuracy, 1.0 / 3.0));
        assert_eq!(history[1].samples, 3);
    }

    #[test]
    fn test_state_machine_guards() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();
        assert_eq!(acc.phase(), EpochPhase::Idle);
        assert!(matches!(acc.finish_epoch(0), Err(EvalError::InvalidState(_))));

        acc.update_batch(&[0], &[0], 0.1, 1).unwrap();
        assert_eq!(acc.phase(), EpochPhase::Accumulating);
        acc.update_batch(&[1], &[1], 0.1, 1).unwrap();
        acc.finish_epoch(0).unwrap();
        assert_eq!(acc.phase(), EpochPhase::Finalized);

        assert!(matches!(acc.finish_epoch(0), Err(EvalError::InvalidState(_))));
        assert!(matches!(
            acc.update_batch(&[0], &[0], 0.1, 1),
            Err(EvalError::InvalidState(_))
        ));

        acc.reset_epoch();
        assert_eq!(acc.phase(), EpochPhase::Idle);
        assert!(acc.class_counts().iter().all(|c| *c == ClassCounts::default()));
        assert_eq!(acc.metrics_history().len(), 1);
    }

    #[test]
    fn test_update_batch_validation_leaves_counters_untouched() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();

        let cases: Vec<(Vec<usize>, Vec<usize>, f64, usize)> = vec![
            (vec![0, 1], vec![0], 0.1, 2),
            (vec![0, 1], vec![0, 1], 0.1, 3),
            (vec![], vec![], 0.1, 0),
            (vec![0, 2], vec![0, 1], 0.1, 2),
            (vec![0, 1], vec![0, 5], 0.1, 2),
            (vec![0, 1], vec![0, 1], f64::NAN, 2),
            (vec![0, 1], vec![0, 1], -0.5, 2),
        ];
        for (truth, pred, loss, size) in cases {
            let err = acc.update_batch(&truth, &pred, loss, size).unwrap_err();
            assert!(matches!(err, EvalError::InvalidArgument(_)));
        }

        assert_eq!(acc.phase(), EpochPhase::Idle);
        assert!(acc.class_counts().iter().all(|c| *c == ClassCounts::default()));
    }

    #[test]
    fn test_zero_labels_rejected() {
        assert!(matches!(
            EpochMetricsAccumulator::new(0),
            Err(EvalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_independent_accumulators() {
        let mut train = EpochMetricsAccumulator::new(2).unwrap();
        let mut validation = EpochMetricsAccumulator::new(2).unwrap();

        train.update_batch(&[0, 1], &[0, 1], 0.2, 2).unwrap();
        validation.update_batch(&[0, 1], &[1, 0], 0.7, 2).unwrap();

        assert!(close(train.finish_epoch(0).unwrap().overall_accuracy, 1.0));
        assert!(close(validation.finish_epoch(0).unwrap().overall_accuracy, 0.0));
    }

    #[test]
    fn test_metrics_table_layout() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();
        for epoch in 0..3 {
            acc.reset_epoch();
            acc.update_batch(&[0, 0, 1, 1], &[0, 1, 1, 1], 0.4, 4).unwrap();
            acc.finish_epoch(epoch).unwrap();
        }

        let table = acc.metrics_table();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.columns,
            vec![
                "epoch",
                "overallAccuracy",
                "overallLoss",
                "f1Score",
                "classAccuracy_0",
                "classLoss_0",
                "classAccuracy_1",
                "classLoss_1"
            ]
        );
        assert_eq!(table.epochs(), vec![0, 1, 2]);

        let class0 = table.column("classAccuracy_0").unwrap();
        assert!(class0.iter().all(|&v| close(v, 0.5)));
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_metrics_table_exports() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();
        acc.update_batch(&[0, 1], &[0, 1], 0.5, 2).unwrap();
        acc.finish_epoch(7).unwrap();
        let table = acc.metrics_table();

        let csv = table.to_csv_string().unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("epoch,overallAccuracy,overallLoss,f1Score,classAccuracy_0,classLoss_0,classAccuracy_1,classLoss_1")
        );
        assert!(lines.next().unwrap().starts_with("7,1,0.25,1,"));

        let json: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["epoch"], serde_json::json!(7));
        assert!(json[0]["epoch"].is_u64());
        assert_eq!(json[0]["overallAccuracy"], serde_json::json!(1.0));

        let markdown = table.to_markdown();
        assert!(markdown.starts_with("| epoch | overallAccuracy"));
        assert!(markdown.contains("| 7 | 1.0000"));
    }

    #[test]
    fn test_epoch_record_format() {
        let mut acc = EpochMetricsAccumulator::new(2).unwrap();
        acc.update_batch(&[0, 1], &[0, 1], 0.5, 2).unwrap();
        let formatted = acc.finish_epoch(3).unwrap().format();

        assert!(formatted.contains("Epoch 3 Metrics"));
        assert!(formatted.contains("Macro F1"));
        assert!(formatted.contains("Per-Class Metrics"));
    }
}
