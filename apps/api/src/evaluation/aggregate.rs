//! Aggregator — folds per-record metrics into `resume_match_score` and the
//! overall score. Pure functions only.

use serde::Serialize;

use crate::evaluation::{EvaluationRecord, MetricScores};

/// One row of the results table: the evaluated record, its metrics and its
/// percentage score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRow {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub reference: String,
    pub answer_relevancy: Option<f64>,
    pub answer_similarity: Option<f64>,
    pub resume_match_score: f64,
}

/// `mean(valid metrics) * 100`, rounded to 2 decimals; `0.0` when every
/// metric is missing.
pub fn record_score(scores: &MetricScores) -> f64 {
    let values = scores.valid_values();
    if values.is_empty() {
        return 0.0;
    }
    round2(mean(&values) * 100.0)
}

/// Mean of the per-record scores, rounded to 2 decimals; `0.0` for no records.
pub fn final_score(record_scores: &[f64]) -> f64 {
    if record_scores.is_empty() {
        return 0.0;
    }
    round2(mean(record_scores))
}

/// Zips records with their metrics into score rows and computes the overall
/// score. Records without a matching metrics entry score as all-missing.
pub fn aggregate(records: Vec<EvaluationRecord>, scores: Vec<MetricScores>) -> (Vec<ScoreRow>, f64) {
    let mut scores = scores.into_iter();
    let rows: Vec<ScoreRow> = records
        .into_iter()
        .map(|record| {
            let metrics = scores.next().unwrap_or_default();
            ScoreRow {
                resume_match_score: record_score(&metrics),
                question: record.question,
                answer: record.answer,
                contexts: record.contexts,
                reference: record.reference,
                answer_relevancy: metrics.answer_relevancy,
                answer_similarity: metrics.answer_similarity,
            }
        })
        .collect();

    let per_record: Vec<f64> = rows.iter().map(|r| r.resume_match_score).collect();
    let overall = final_score(&per_record);
    (rows, overall)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(relevancy: Option<f64>, similarity: Option<f64>) -> MetricScores {
        MetricScores {
            answer_relevancy: relevancy,
            answer_similarity: similarity,
        }
    }

    fn record(question: &str) -> EvaluationRecord {
        EvaluationRecord {
            question: question.to_string(),
            answer: "No — not mentioned".to_string(),
            contexts: vec!["ctx".to_string()],
            reference: "ref".to_string(),
        }
    }

    #[test]
    fn test_record_score_is_mean_times_100() {
        assert_eq!(record_score(&scores(Some(0.8), Some(0.6))), 70.0);
    }

    #[test]
    fn test_record_score_rounds_to_two_decimals() {
        assert_eq!(record_score(&scores(Some(0.123456), None)), 12.35);
    }

    #[test]
    fn test_record_score_ignores_single_missing_metric() {
        assert_eq!(record_score(&scores(None, Some(0.9))), 90.0);
    }

    #[test]
    fn test_all_missing_scores_exactly_zero() {
        let score = record_score(&scores(None, None));
        assert_eq!(score, 0.0);
        assert!(score.is_finite());
    }

    #[test]
    fn test_nan_counts_as_missing() {
        assert_eq!(record_score(&scores(Some(f64::NAN), None)), 0.0);
    }

    #[test]
    fn test_recomputation_is_identical() {
        let input = vec![scores(Some(0.91), Some(0.37)), scores(None, Some(0.5))];
        let first: Vec<f64> = input.iter().map(record_score).collect();
        let second: Vec<f64> = input.iter().map(record_score).collect();
        assert_eq!(first, second);
        assert_eq!(final_score(&first), final_score(&second));
    }

    #[test]
    fn test_final_score_is_order_independent() {
        let a = final_score(&[70.0, 50.0, 0.0]);
        let b = final_score(&[0.0, 70.0, 50.0]);
        assert_eq!(a, b);
        assert_eq!(a, 40.0);
    }

    #[test]
    fn test_final_score_empty_is_zero() {
        assert_eq!(final_score(&[]), 0.0);
    }

    #[test]
    fn test_aggregate_pairs_rows_with_metrics() {
        let (rows, overall) = aggregate(
            vec![record("q1"), record("q2")],
            vec![scores(Some(1.0), Some(0.5)), scores(None, None)],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].question, "q1");
        assert_eq!(rows[0].resume_match_score, 75.0);
        assert_eq!(rows[1].resume_match_score, 0.0);
        assert_eq!(overall, 37.5);
    }

    #[test]
    fn test_aggregate_missing_metrics_entry_scores_zero() {
        let (rows, overall) = aggregate(vec![record("q1")], Vec::new());
        assert_eq!(rows[0].answer_relevancy, None);
        assert_eq!(rows[0].resume_match_score, 0.0);
        assert_eq!(overall, 0.0);
    }
}
