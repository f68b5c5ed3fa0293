use crate::dataset::EvaluationRecord;
use crate::evaluation::{RewardScorer, ScoreOutcome};
use crate::models::{AggregateReport, BatchReport, RewardAttribute, ScoredRecord};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Scores a dataset against the reward model and aggregates the results
pub struct Runner {
    scorer: Arc<dyn RewardScorer>,
    max_concurrency: Option<usize>,
}

impl Runner {
    /// With `max_concurrency` unset every request of a batch is in flight at once
    pub fn new(scorer: Arc<dyn RewardScorer>, max_concurrency: Option<usize>) -> Self {
        Self {
            scorer,
            max_concurrency,
        }
    }

    /// Score every record and attach the outcome to its row.
    ///
    /// Waits for all requests; failed rows carry an absence reason instead of
    /// aborting the batch. Results keep the input order.
    pub async fn score_records(&self, records: Vec<EvaluationRecord>) -> BatchReport {
        tracing::info!(records = records.len(), "Scoring batch");

        let outcomes = self.dispatch_all(&records).await;
        let results: Vec<ScoredRecord> = records
            .into_iter()
            .zip(outcomes)
            .map(|(record, outcome)| scored_record(record, outcome))
            .collect();

        let statistics = calculate_statistics(&results);
        tracing::info!(
            scored = results.len() - statistics.failed,
            failed = statistics.failed,
            "Batch complete"
        );

        BatchReport {
            statistics,
            results,
        }
    }

    /// Run one dispatch per record, writing each completion into the slot of its record
    async fn dispatch_all(&self, records: &[EvaluationRecord]) -> Vec<ScoreOutcome> {
        let limit = self.max_concurrency.unwrap_or(records.len()).max(1);
        let mut slots: Vec<Option<ScoreOutcome>> =
            std::iter::repeat_with(|| None).take(records.len()).collect();

        let mut completions = stream::iter(records.iter().enumerate())
            .map(|(index, record)| async move {
                let outcome = self.scorer.dispatch(&record.question, &record.answer).await;
                (index, outcome)
            })
            .buffer_unordered(limit);

        while let Some((index, outcome)) = completions.next().await {
            tracing::debug!(
                index,
                scored = matches!(outcome, ScoreOutcome::Scored(_)),
                "Request finished"
            );
            slots[index] = Some(outcome);
        }

        let outcomes: Vec<ScoreOutcome> = slots.into_iter().flatten().collect();
        debug_assert_eq!(outcomes.len(), records.len(), "a record was left without an outcome");
        outcomes
    }
}

fn scored_record(record: EvaluationRecord, outcome: ScoreOutcome) -> ScoredRecord {
    match outcome {
        ScoreOutcome::Scored(scores) => ScoredRecord {
            record,
            scores: Some(scores),
            error: None,
        },
        ScoreOutcome::Absent(err) => ScoredRecord {
            record,
            scores: None,
            error: Some(err.to_string()),
        },
    }
}

/// Per-attribute means over the rows that produced scores.
///
/// Absent rows are skipped rather than counted as zero; an attribute with no
/// scores at all gets a `None` mean.
pub fn calculate_statistics(results: &[ScoredRecord]) -> AggregateReport {
    let mut report = AggregateReport {
        failed: results.iter().filter(|r| r.scores.is_none()).count(),
        ..AggregateReport::default()
    };

    for attribute in RewardAttribute::ALL {
        let scores: Vec<f64> = results
            .iter()
            .filter_map(|r| r.scores.as_ref())
            .map(|scores| scores.get(attribute))
            .collect();

        report.mean.insert(attribute, calculate_mean(&scores));
        report.count.insert(attribute, scores.len());
    }

    report
}

fn calculate_mean(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let sum: f64 = scores.iter().sum();
    Some(sum / scores.len() as f64)
}

/// Store the batch report to a JSON file
pub fn store_results(report: &BatchReport, path: &Path) -> Result<()> {
    write_json(report, path, "results")?;
    tracing::info!(path = %path.display(), "Results stored");
    Ok(())
}

/// Write `value` as pretty JSON, creating missing parent directories
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path, what: &str) -> Result<()> {
    let json_content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {} to JSON", what))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, json_content)
        .with_context(|| format!("Failed to write {} to: {}", what, path.display()))
}
