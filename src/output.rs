use crate::models::{AggregateReport, BatchReport, RewardAttribute};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print the batch report in the specified format
pub fn print_report(report: &BatchReport, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_plain(report)),
        OutputFormat::Json => match render_json(report) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::error!("Error serializing results to JSON: {}", e),
        },
    }
}

fn render_plain(report: &BatchReport) -> String {
    let mut out = String::new();

    out.push_str("📊 STATISTICS\n");
    out.push_str("-------------\n");
    out.push_str(&render_statistics(&report.statistics));
    out.push('\n');

    out.push_str("📝 DETAILED RESULTS\n");
    out.push_str("-------------------\n");
    for (i, result) in report.results.iter().enumerate() {
        out.push_str(&format!("Result #{}\n", i + 1));
        out.push_str(&format!("Question: {}\n", result.record.question));
        out.push_str(&format!("Answer: {}\n", result.record.answer));
        match (&result.scores, &result.error) {
            (Some(scores), _) => {
                out.push_str("Reward Scores:\n");
                for (attribute, score) in scores.iter() {
                    out.push_str(&format!("  • {}: {:.3}\n", attribute, score));
                }
            }
            (None, Some(error)) => out.push_str(&format!("No scores: {}\n", error)),
            (None, None) => out.push_str("No scores\n"),
        }
        out.push('\n');
    }

    out
}

fn render_statistics(stats: &AggregateReport) -> String {
    let mut out = String::new();

    if stats.mean.is_empty() {
        out.push_str("No statistics available.\n");
        return out;
    }

    out.push_str(&format!("{:<15} {:<8} {:<8}\n", "Attribute", "Mean", "Count"));
    out.push_str(&format!("{}\n", "-".repeat(33)));

    for attribute in RewardAttribute::ALL {
        let mean = match stats.mean.get(&attribute).copied().flatten() {
            Some(mean) => format!("{:.3}", mean),
            None => "n/a".to_string(),
        };
        let count = stats.count.get(&attribute).copied().unwrap_or(0);
        out.push_str(&format!("{:<15} {:<8} {:<8}\n", attribute.name(), mean, count));
    }

    if stats.failed > 0 {
        out.push_str(&format!("Records without scores: {}\n", stats.failed));
    }

    out
}

fn render_json(report: &BatchReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::EvaluationRecord;
    use crate::models::{RewardScoreSet, ScoredRecord};
    use crate::runner::calculate_statistics;

    fn create_test_report() -> BatchReport {
        let results = vec![
            ScoredRecord {
                record: EvaluationRecord {
                    question: "What is artificial intelligence?".to_string(),
                    answer: "The study of intelligent agents.".to_string(),
                    retrieved_context: vec!["AI textbook".to_string()],
                    reference_answer: "Machines that think".to_string(),
                },
                scores: Some(RewardScoreSet::new([3.25, 3.5, 3.75, 1.0, 1.25])),
                error: None,
            },
            ScoredRecord {
                record: EvaluationRecord {
                    question: "Second question".to_string(),
                    answer: "Second answer".to_string(),
                    retrieved_context: vec![],
                    reference_answer: String::new(),
                },
                scores: None,
                error: Some("reward response had no content".to_string()),
            },
        ];

        BatchReport {
            statistics: calculate_statistics(&results),
            results,
        }
    }

    #[test]
    fn test_plain_output() {
        let plain = render_plain(&create_test_report());

        assert!(plain.contains("STATISTICS"));
        assert!(plain.contains("Helpfulness     3.250"));
        assert!(plain.contains("Question: What is artificial intelligence?"));
        assert!(plain.contains("  • Coherence: 3.750"));
        assert!(plain.contains("No scores: reward response had no content"));
        assert!(plain.contains("Records without scores: 1"));
    }

    #[test]
    fn test_statistics_absent_mean_printed_as_na() {
        let results = vec![ScoredRecord {
            record: EvaluationRecord {
                question: "q".to_string(),
                answer: "a".to_string(),
                retrieved_context: vec![],
                reference_answer: String::new(),
            },
            scores: None,
            error: None,
        }];

        let table = render_statistics(&calculate_statistics(&results));
        assert!(table.contains("Verbosity       n/a"));
        assert!(!table.contains("0.000"));
    }

    #[test]
    fn test_print_statistics_empty() {
        let table = render_statistics(&AggregateReport::default());
        assert_eq!(table, "No statistics available.\n");
    }

    #[test]
    fn test_json_output() {
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&create_test_report()).unwrap()).unwrap();

        assert_eq!(json["statistics"]["mean"]["Helpfulness"], 3.25);
        assert_eq!(json["statistics"]["count"]["Verbosity"], 1);
        assert_eq!(json["statistics"]["failed"], 1);
        assert_eq!(
            json["results"][0]["record"]["question"],
            "What is artificial intelligence?"
        );
        assert_eq!(json["results"][0]["scores"]["Verbosity"], 1.25);
        assert!(json["results"][1]["scores"].is_null());
        assert_eq!(
            json["results"][1]["error"],
            "reward response had no content"
        );
    }
}
