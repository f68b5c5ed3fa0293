use crate::runner::write_json;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One question/answer row of the input CSV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub question: String,
    pub answer: String,
    pub retrieved_context: Vec<String>,
    pub reference_answer: String,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    question: String,
    answer: String,
    #[serde(default)]
    gt_context: String,
    #[serde(default)]
    gt_answer: String,
}

impl From<CsvRow> for EvaluationRecord {
    fn from(row: CsvRow) -> Self {
        Self {
            retrieved_context: parse_context(&row.gt_context),
            question: row.question,
            answer: row.answer,
            reference_answer: row.gt_answer,
        }
    }
}

/// Load records from a CSV file with `question`, `answer`, `gt_context` and `gt_answer` columns
pub fn load_csv(path: &Path, limit: Option<usize>) -> Result<Vec<EvaluationRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV at {}", path.display()))?;

    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<CsvRow>().enumerate() {
        if limit.is_some_and(|limit| idx >= limit) {
            break;
        }
        let row = row.with_context(|| format!("CSV parse error at row {}", idx + 1))?;
        records.push(row.into());
    }

    tracing::info!(path = %path.display(), rows = records.len(), "Loaded dataset");
    Ok(records)
}

/// Split a `gt_context` cell into passages.
///
/// Accepts a JSON list of strings, a Python list literal (`['a', "b"]`) or a
/// plain string. Anything that looks like a list but does not parse is kept
/// as a single passage.
pub fn parse_context(cell: &str) -> Vec<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items;
        }
        if let Ok(items) = serde_json::from_str::<Vec<String>>(&python_list_to_json(trimmed)) {
            return items;
        }
    }
    vec![trimmed.to_string()]
}

/// Rewrite a Python list literal as JSON: single-quoted strings become
/// double-quoted, `\'` is unescaped and a trailing comma before `]` is dropped.
/// Other escapes are passed through for serde_json to decode.
fn python_list_to_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                while let Some(sc) = chars.next() {
                    match sc {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(next) => {
                                out.push('\\');
                                out.push(next);
                            }
                            None => out.push('\\'),
                        },
                        sc if sc == c => {
                            out.push('"');
                            break;
                        }
                        '"' => out.push_str("\\\""),
                        sc => out.push(sc),
                    }
                }
            }
            ']' => {
                let kept = out.trim_end().len();
                if out[..kept].ends_with(',') {
                    out.truncate(kept - 1);
                }
                out.push(']');
            }
            c => out.push(c),
        }
    }

    out
}

/// Metrics understood by the external RAG evaluation library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    AnswerRelevancy,
    ContextPrecision,
    Faithfulness,
    ContextRecall,
}

impl Metric {
    pub const DEFAULT: [Metric; 2] = [Metric::AnswerRelevancy, Metric::ContextPrecision];

    pub fn name(self) -> &'static str {
        match self {
            Metric::AnswerRelevancy => "answer_relevancy",
            Metric::ContextPrecision => "context_precision",
            Metric::Faithfulness => "faithfulness",
            Metric::ContextRecall => "context_recall",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A record in the column layout the evaluation library ingests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagasSample {
    pub user_input: String,
    pub response: String,
    pub retrieved_contexts: Vec<String>,
    pub reference: String,
}

impl From<&EvaluationRecord> for RagasSample {
    fn from(record: &EvaluationRecord) -> Self {
        Self {
            user_input: record.question.clone(),
            response: record.answer.clone(),
            retrieved_contexts: record.retrieved_context.clone(),
            reference: record.reference_answer.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RagasDataset {
    pub metrics: Vec<Metric>,
    pub samples: Vec<RagasSample>,
}

impl RagasDataset {
    pub fn new(records: &[EvaluationRecord], metrics: &[Metric]) -> Self {
        Self {
            metrics: metrics.to_vec(),
            samples: records.iter().map(RagasSample::from).collect(),
        }
    }
}

/// Write the record set for handoff to the external evaluation library
pub fn export_ragas(records: &[EvaluationRecord], metrics: &[Metric], path: &Path) -> Result<()> {
    let dataset = RagasDataset::new(records, metrics);
    write_json(&dataset, path, "record set")?;

    tracing::info!(
        path = %path.display(),
        samples = dataset.samples.len(),
        metrics = ?dataset.metrics,
        "Exported record set"
    );
    Ok(())
}
