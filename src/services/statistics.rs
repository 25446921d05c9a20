//! Aggregate statistics over scored sheets for an exam.

use serde::Serialize;

use crate::services::evaluation::EvaluationResult;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DistributionBucket {
    pub(crate) label: String,
    pub(crate) count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubjectAverage {
    pub(crate) subject: String,
    pub(crate) average_percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExamStatistics {
    pub(crate) scored_sheets: usize,
    pub(crate) average_percentage: f64,
    pub(crate) highest_percentage: f64,
    pub(crate) lowest_percentage: f64,
    pub(crate) score_distribution: Vec<DistributionBucket>,
    pub(crate) subject_averages: Vec<SubjectAverage>,
}

const BUCKETS: [(&str, f64, f64); 5] = [
    ("0-20", 0.0, 20.0),
    ("20-40", 20.0, 40.0),
    ("40-60", 40.0, 60.0),
    ("60-80", 60.0, 80.0),
    ("80-100", 80.0, 100.0),
];

/// Summarizes scored evaluations. Subject averages follow the subject order
/// of the first evaluation, which matches the exam's configured segments.
pub(crate) fn summarize(evaluations: &[EvaluationResult]) -> ExamStatistics {
    let scored = evaluations.len();

    let mut distribution: Vec<DistributionBucket> = BUCKETS
        .iter()
        .map(|(label, _, _)| DistributionBucket { label: (*label).to_string(), count: 0 })
        .collect();

    let mut sum = 0.0;
    let mut highest = f64::NEG_INFINITY;
    let mut lowest = f64::INFINITY;

    let mut subject_order: Vec<String> = Vec::new();
    let mut subject_sums: std::collections::HashMap<String, (f64, usize)> =
        std::collections::HashMap::new();

    for evaluation in evaluations {
        sum += evaluation.percentage;
        highest = highest.max(evaluation.percentage);
        lowest = lowest.min(evaluation.percentage);

        let bucket = BUCKETS
            .iter()
            .position(|(_, low, high)| {
                evaluation.percentage >= *low
                    && (evaluation.percentage < *high || *high == 100.0)
            })
            .unwrap_or(BUCKETS.len() - 1);
        distribution[bucket].count += 1;

        for score in &evaluation.subject_scores {
            let entry = subject_sums.entry(score.subject.clone()).or_insert_with(|| {
                subject_order.push(score.subject.clone());
                (0.0, 0)
            });
            entry.0 += score.percentage;
            entry.1 += 1;
        }
    }

    let subject_averages = subject_order
        .into_iter()
        .map(|subject| {
            let (total, count) = subject_sums[&subject];
            SubjectAverage {
                average_percentage: round2(total / count as f64),
                subject,
            }
        })
        .collect();

    if scored == 0 {
        return ExamStatistics {
            scored_sheets: 0,
            average_percentage: 0.0,
            highest_percentage: 0.0,
            lowest_percentage: 0.0,
            score_distribution: distribution,
            subject_averages: Vec::new(),
        };
    }

    ExamStatistics {
        scored_sheets: scored,
        average_percentage: round2(sum / scored as f64),
        highest_percentage: round2(highest),
        lowest_percentage: round2(lowest),
        score_distribution: distribution,
        subject_averages,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::evaluation::{evaluate, ExamConfig, SubjectSegment};

    fn evaluation_with_score(correct: usize) -> EvaluationResult {
        let config = ExamConfig::new(
            vec!["a".to_string(); 10],
            vec![
                SubjectSegment { name: "Math".to_string(), start: 1, end: 5 },
                SubjectSegment { name: "Logic".to_string(), start: 6, end: 10 },
            ],
            Default::default(),
        )
        .expect("config");

        let responses: Vec<String> = (0..10)
            .map(|i| if i < correct { "a".to_string() } else { "b".to_string() })
            .collect();
        evaluate(&responses, &config).expect("evaluate")
    }

    #[test]
    fn empty_input_yields_zeroed_statistics() {
        let stats = summarize(&[]);
        assert_eq!(stats.scored_sheets, 0);
        assert_eq!(stats.average_percentage, 0.0);
        assert_eq!(stats.score_distribution.len(), 5);
        assert!(stats.score_distribution.iter().all(|bucket| bucket.count == 0));
        assert!(stats.subject_averages.is_empty());
    }

    #[test]
    fn summarize_computes_average_and_extremes() {
        let evaluations =
            vec![evaluation_with_score(10), evaluation_with_score(5), evaluation_with_score(3)];
        let stats = summarize(&evaluations);

        assert_eq!(stats.scored_sheets, 3);
        assert_eq!(stats.average_percentage, 60.0);
        assert_eq!(stats.highest_percentage, 100.0);
        assert_eq!(stats.lowest_percentage, 30.0);
    }

    #[test]
    fn distribution_buckets_cover_boundaries() {
        // 0%, 20%, 100% land in the first, second, and last bucket.
        let evaluations =
            vec![evaluation_with_score(0), evaluation_with_score(2), evaluation_with_score(10)];
        let stats = summarize(&evaluations);

        let counts: Vec<usize> =
            stats.score_distribution.iter().map(|bucket| bucket.count).collect();
        assert_eq!(counts, vec![1, 1, 0, 0, 1]);
    }

    #[test]
    fn subject_averages_keep_segment_order() {
        let evaluations = vec![evaluation_with_score(10), evaluation_with_score(5)];
        let stats = summarize(&evaluations);

        let subjects: Vec<&str> =
            stats.subject_averages.iter().map(|avg| avg.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Math", "Logic"]);

        // First sheet: 100/100, second: Math 100, Logic 0.
        assert_eq!(stats.subject_averages[0].average_percentage, 100.0);
        assert_eq!(stats.subject_averages[1].average_percentage, 50.0);
    }
}
