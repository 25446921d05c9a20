//! Answer-sheet evaluation engine.
//!
//! Pure scoring over detected response tokens: no IO, no clock, no database.
//! An [`ExamConfig`] describes the answer key, the subject segments that
//! partition the question range, and per-question special cases whose accepted
//! set fully overrides the key. Comparison is trimmed and case-insensitive,
//! and a blank token is "unanswered" rather than incorrect.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ConfigurationError {
    #[error("answer key must contain at least one entry")]
    EmptyAnswerKey,
    #[error("answer key entry for question {question} is blank")]
    BlankKeyEntry { question: usize },
    #[error("subject '{subject}' has invalid bounds {start}..={end}")]
    InvalidSegmentBounds { subject: String, start: usize, end: usize },
    #[error("subject '{subject}' extends past the answer key ({total} questions)")]
    SegmentOutOfRange { subject: String, total: usize },
    #[error("question {question} is claimed by more than one subject")]
    SegmentOverlap { question: usize },
    #[error("question {question} is not covered by any subject")]
    CoverageGap { question: usize },
    #[error("special case for question {question} is outside the answer key ({total} questions)")]
    SpecialCaseOutOfRange { question: usize, total: usize },
    #[error("special case for question {question} accepts no answers")]
    SpecialCaseEmpty { question: usize },
}

/// A contiguous 1-based inclusive question range belonging to one subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct SubjectSegment {
    pub(crate) name: String,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct ExamConfig {
    /// One keyed answer per question, index 0 = question 1.
    pub(crate) answer_key: Vec<String>,
    /// Segments in reporting order; together they must cover every question
    /// exactly once.
    pub(crate) subjects: Vec<SubjectSegment>,
    /// Question number -> full set of accepted answers, overriding the key.
    pub(crate) special_cases: BTreeMap<usize, BTreeSet<String>>,
}

impl ExamConfig {
    pub(crate) fn new(
        answer_key: Vec<String>,
        subjects: Vec<SubjectSegment>,
        special_cases: BTreeMap<usize, BTreeSet<String>>,
    ) -> Result<Self, ConfigurationError> {
        let answer_key =
            answer_key.into_iter().map(|entry| normalize(&entry)).collect::<Vec<_>>();
        let special_cases = special_cases
            .into_iter()
            .map(|(question, accepted)| {
                let accepted = accepted
                    .iter()
                    .map(|entry| normalize(entry))
                    .filter(|entry| !entry.is_empty())
                    .collect::<BTreeSet<_>>();
                (question, accepted)
            })
            .collect::<BTreeMap<_, _>>();

        let config = Self { answer_key, subjects, special_cases };
        config.validate()?;
        Ok(config)
    }

    /// Re-checks every structural invariant. Construction through [`new`]
    /// already validates; this exists because configs also arrive through
    /// deserialization of stored JSON.
    ///
    /// [`new`]: ExamConfig::new
    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        let total = self.answer_key.len();
        if total == 0 {
            return Err(ConfigurationError::EmptyAnswerKey);
        }
        for (index, entry) in self.answer_key.iter().enumerate() {
            if entry.trim().is_empty() {
                return Err(ConfigurationError::BlankKeyEntry { question: index + 1 });
            }
        }

        let mut covered = vec![false; total];
        for segment in &self.subjects {
            if segment.start == 0 || segment.start > segment.end {
                return Err(ConfigurationError::InvalidSegmentBounds {
                    subject: segment.name.clone(),
                    start: segment.start,
                    end: segment.end,
                });
            }
            if segment.end > total {
                return Err(ConfigurationError::SegmentOutOfRange {
                    subject: segment.name.clone(),
                    total,
                });
            }
            for question in segment.start..=segment.end {
                if covered[question - 1] {
                    return Err(ConfigurationError::SegmentOverlap { question });
                }
                covered[question - 1] = true;
            }
        }
        if let Some(index) = covered.iter().position(|flag| !flag) {
            return Err(ConfigurationError::CoverageGap { question: index + 1 });
        }

        for (question, accepted) in &self.special_cases {
            if *question == 0 || *question > total {
                return Err(ConfigurationError::SpecialCaseOutOfRange {
                    question: *question,
                    total,
                });
            }
            if accepted.iter().all(|entry| entry.trim().is_empty()) {
                return Err(ConfigurationError::SpecialCaseEmpty { question: *question });
            }
        }

        Ok(())
    }

    pub(crate) fn question_count(&self) -> usize {
        self.answer_key.len()
    }

    fn subject_for(&self, question: usize) -> Option<&SubjectSegment> {
        self.subjects
            .iter()
            .find(|segment| question >= segment.start && question <= segment.end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AnswerStatus {
    Correct,
    Incorrect,
    Unanswered,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionResult {
    pub(crate) question_number: usize,
    pub(crate) subject: String,
    pub(crate) student_answer: String,
    pub(crate) correct_answer: String,
    pub(crate) is_correct: bool,
    pub(crate) status: AnswerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubjectQuestion {
    pub(crate) question: usize,
    pub(crate) status: AnswerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubjectScore {
    pub(crate) subject: String,
    pub(crate) correct: usize,
    pub(crate) total: usize,
    pub(crate) percentage: f64,
    pub(crate) questions: Vec<SubjectQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Summary {
    pub(crate) correct: usize,
    pub(crate) incorrect: usize,
    pub(crate) unanswered: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EvaluationResult {
    pub(crate) total_questions: usize,
    pub(crate) total_score: usize,
    pub(crate) percentage: f64,
    pub(crate) subject_scores: Vec<SubjectScore>,
    pub(crate) detailed_results: Vec<QuestionResult>,
    pub(crate) summary: Summary,
}

/// Scores one response array against an exam config.
///
/// Responses shorter than the key are padded with unanswered entries; extra
/// trailing entries are ignored.
pub(crate) fn evaluate(
    responses: &[String],
    config: &ExamConfig,
) -> Result<EvaluationResult, ConfigurationError> {
    config.validate()?;

    let total = config.question_count();
    let mut detailed = Vec::with_capacity(total);
    let mut summary = Summary { correct: 0, incorrect: 0, unanswered: 0 };

    for (index, keyed) in config.answer_key.iter().enumerate() {
        let question = index + 1;
        let subject = config
            .subject_for(question)
            .ok_or(ConfigurationError::CoverageGap { question })?;

        let answer = responses.get(index).map(|raw| normalize(raw)).unwrap_or_default();

        let status = if answer.is_empty() {
            AnswerStatus::Unanswered
        } else if let Some(accepted) = config.special_cases.get(&question) {
            if accepted.iter().any(|entry| entry.trim().eq_ignore_ascii_case(&answer)) {
                AnswerStatus::Correct
            } else {
                AnswerStatus::Incorrect
            }
        } else if keyed.trim().eq_ignore_ascii_case(&answer) {
            AnswerStatus::Correct
        } else {
            AnswerStatus::Incorrect
        };

        match status {
            AnswerStatus::Correct => summary.correct += 1,
            AnswerStatus::Incorrect => summary.incorrect += 1,
            AnswerStatus::Unanswered => summary.unanswered += 1,
        }

        detailed.push(QuestionResult {
            question_number: question,
            subject: subject.name.clone(),
            student_answer: answer,
            correct_answer: keyed.clone(),
            is_correct: status == AnswerStatus::Correct,
            status,
        });
    }

    let subject_scores = config
        .subjects
        .iter()
        .map(|segment| {
            let questions: Vec<SubjectQuestion> = detailed
                [segment.start - 1..segment.end]
                .iter()
                .map(|result| SubjectQuestion { question: result.question_number, status: result.status })
                .collect();
            let correct = questions
                .iter()
                .filter(|entry| entry.status == AnswerStatus::Correct)
                .count();
            let subject_total = segment.end - segment.start + 1;
            SubjectScore {
                subject: segment.name.clone(),
                correct,
                total: subject_total,
                percentage: percentage_of(correct, subject_total),
                questions,
            }
        })
        .collect();

    Ok(EvaluationResult {
        total_questions: total,
        total_score: summary.correct,
        percentage: percentage_of(summary.correct, total),
        subject_scores,
        detailed_results: detailed,
        summary,
    })
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn percentage_of(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = correct as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, start: usize, end: usize) -> SubjectSegment {
        SubjectSegment { name: name.to_string(), start, end }
    }

    fn cycled_key(total: usize) -> Vec<String> {
        (0..total)
            .map(|i| ["a", "b", "c", "d"][i % 4].to_string())
            .collect()
    }

    /// Five 20-question subjects over a 100-question key, with the accept-any
    /// override on question 16 and a two-answer override on question 59.
    fn standard_config() -> ExamConfig {
        let mut special_cases = BTreeMap::new();
        special_cases.insert(
            16,
            BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()]),
        );
        special_cases.insert(59, BTreeSet::from(["a".to_string(), "b".to_string()]));

        ExamConfig::new(
            cycled_key(100),
            vec![
                segment("Python", 1, 20),
                segment("EDA", 21, 40),
                segment("SQL", 41, 60),
                segment("PowerBI", 61, 80),
                segment("Statistics", 81, 100),
            ],
            special_cases,
        )
        .expect("config")
    }

    fn keyed_responses(config: &ExamConfig) -> Vec<String> {
        config.answer_key.clone()
    }

    #[test]
    fn all_correct_scores_hundred_percent() {
        let config = standard_config();
        let result = evaluate(&keyed_responses(&config), &config).expect("evaluate");

        assert_eq!(result.total_questions, 100);
        assert_eq!(result.total_score, 100);
        assert_eq!(result.percentage, 100.0);
        assert_eq!(result.summary, Summary { correct: 100, incorrect: 0, unanswered: 0 });
        assert_eq!(result.subject_scores.len(), 5);
        for score in &result.subject_scores {
            assert_eq!(score.correct, 20);
            assert_eq!(score.total, 20);
            assert_eq!(score.percentage, 100.0);
            assert_eq!(score.questions.len(), 20);
        }
    }

    #[test]
    fn summary_partitions_every_question() {
        let config = standard_config();
        let mut responses = keyed_responses(&config);
        responses[0] = "b".to_string(); // wrong
        responses[1] = String::new(); // unanswered
        responses[2] = "   ".to_string(); // whitespace counts as unanswered

        let result = evaluate(&responses, &config).expect("evaluate");
        let summary = &result.summary;
        assert_eq!(summary.correct + summary.incorrect + summary.unanswered, 100);
        assert_eq!(summary.incorrect, 1);
        assert_eq!(summary.unanswered, 2);
        assert_eq!(result.total_score, summary.correct);
    }

    #[test]
    fn subject_totals_sum_to_overall() {
        let config = standard_config();
        let mut responses = keyed_responses(&config);
        for index in [3, 17, 45, 88] {
            responses[index] = "x".to_string();
        }

        let result = evaluate(&responses, &config).expect("evaluate");
        let subject_correct: usize =
            result.subject_scores.iter().map(|score| score.correct).sum();
        let subject_total: usize = result.subject_scores.iter().map(|score| score.total).sum();
        assert_eq!(subject_correct, result.total_score);
        assert_eq!(subject_total, result.total_questions);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let config = standard_config();
        let mut responses = keyed_responses(&config);
        responses[10] = String::new();
        responses[42] = "D".to_string();

        let first = evaluate(&responses, &config).expect("evaluate");
        let second = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(
            serde_json::to_value(&first).expect("json"),
            serde_json::to_value(&second).expect("json")
        );
    }

    #[test]
    fn special_case_accepts_any_listed_answer() {
        let config = standard_config();
        for answer in ["a", "b", "c", "d", " C ", "D"] {
            let mut responses = keyed_responses(&config);
            responses[15] = answer.to_string();
            let result = evaluate(&responses, &config).expect("evaluate");
            assert_eq!(result.detailed_results[15].status, AnswerStatus::Correct, "{answer}");
        }
    }

    #[test]
    fn special_case_overrides_the_key_entirely() {
        // Question 59 accepts only a/b; its keyed answer is c, which the
        // override must now reject.
        let config = standard_config();
        assert_eq!(config.answer_key[58], "c");

        let mut responses = keyed_responses(&config);
        let result = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(result.detailed_results[58].status, AnswerStatus::Incorrect);

        responses[58] = "b".to_string();
        let result = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(result.detailed_results[58].status, AnswerStatus::Correct);
    }

    #[test]
    fn blank_special_case_answer_stays_unanswered() {
        let config = standard_config();
        let mut responses = keyed_responses(&config);
        responses[15] = "  ".to_string();

        let result = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(result.detailed_results[15].status, AnswerStatus::Unanswered);
    }

    #[test]
    fn comparison_ignores_case_and_whitespace() {
        let config = standard_config();
        let mut responses = keyed_responses(&config);
        responses[0] = "  A ".to_string();
        responses[1] = "B".to_string();

        let result = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(result.detailed_results[0].status, AnswerStatus::Correct);
        assert_eq!(result.detailed_results[1].status, AnswerStatus::Correct);
    }

    #[test]
    fn unknown_letter_is_incorrect_not_unanswered() {
        let config = standard_config();
        let mut responses = keyed_responses(&config);
        responses[0] = "e".to_string();

        let result = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(result.detailed_results[0].status, AnswerStatus::Incorrect);
        assert_eq!(result.summary.incorrect, 1);
    }

    #[test]
    fn short_response_array_pads_as_unanswered() {
        let config = standard_config();
        let responses: Vec<String> = keyed_responses(&config).into_iter().take(95).collect();

        let result = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(result.total_questions, 100);
        assert_eq!(result.summary.unanswered, 5);
        for entry in &result.detailed_results[95..] {
            assert_eq!(entry.status, AnswerStatus::Unanswered);
            assert_eq!(entry.student_answer, "");
        }
    }

    #[test]
    fn extra_responses_are_ignored() {
        let config = standard_config();
        let mut responses = keyed_responses(&config);
        responses.extend(["a".to_string(), "b".to_string()]);

        let result = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(result.total_questions, 100);
        assert_eq!(result.detailed_results.len(), 100);
        assert_eq!(result.total_score, 100);
    }

    #[test]
    fn subject_scores_follow_segment_order() {
        let config = standard_config();
        let result = evaluate(&keyed_responses(&config), &config).expect("evaluate");

        let names: Vec<&str> =
            result.subject_scores.iter().map(|score| score.subject.as_str()).collect();
        assert_eq!(names, vec!["Python", "EDA", "SQL", "PowerBI", "Statistics"]);
        assert_eq!(result.subject_scores[1].questions[0].question, 21);
    }

    #[test]
    fn percentages_round_to_two_decimals() {
        let config = ExamConfig::new(
            vec!["a".to_string(), "a".to_string(), "a".to_string()],
            vec![segment("Only", 1, 3)],
            BTreeMap::new(),
        )
        .expect("config");

        let responses = vec!["a".to_string(), "b".to_string(), "b".to_string()];
        let result = evaluate(&responses, &config).expect("evaluate");
        assert_eq!(result.percentage, 33.33);
        assert_eq!(result.subject_scores[0].percentage, 33.33);
    }

    #[test]
    fn empty_answer_key_is_rejected() {
        let err = ExamConfig::new(Vec::new(), Vec::new(), BTreeMap::new()).unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyAnswerKey);
    }

    #[test]
    fn blank_key_entry_is_rejected() {
        let err = ExamConfig::new(
            vec!["a".to_string(), "  ".to_string()],
            vec![segment("Only", 1, 2)],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigurationError::BlankKeyEntry { question: 2 });
    }

    #[test]
    fn inverted_segment_bounds_are_rejected() {
        let err = ExamConfig::new(
            cycled_key(4),
            vec![segment("Only", 3, 2)],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::InvalidSegmentBounds {
                subject: "Only".to_string(),
                start: 3,
                end: 2
            }
        );
    }

    #[test]
    fn segment_past_the_key_is_rejected() {
        let err = ExamConfig::new(
            cycled_key(4),
            vec![segment("Only", 1, 5)],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::SegmentOutOfRange { subject: "Only".to_string(), total: 4 }
        );
    }

    #[test]
    fn overlapping_segments_are_rejected() {
        let err = ExamConfig::new(
            cycled_key(4),
            vec![segment("First", 1, 3), segment("Second", 3, 4)],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigurationError::SegmentOverlap { question: 3 });
    }

    #[test]
    fn coverage_gap_is_rejected() {
        let err = ExamConfig::new(
            cycled_key(4),
            vec![segment("First", 1, 2), segment("Second", 4, 4)],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigurationError::CoverageGap { question: 3 });
    }

    #[test]
    fn special_case_outside_the_key_is_rejected() {
        let mut special_cases = BTreeMap::new();
        special_cases.insert(9, BTreeSet::from(["a".to_string()]));
        let err = ExamConfig::new(cycled_key(4), vec![segment("Only", 1, 4)], special_cases)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::SpecialCaseOutOfRange { question: 9, total: 4 });
    }

    #[test]
    fn special_case_with_no_accepted_answers_is_rejected() {
        let mut special_cases = BTreeMap::new();
        special_cases.insert(2, BTreeSet::from(["  ".to_string()]));
        let err = ExamConfig::new(cycled_key(4), vec![segment("Only", 1, 4)], special_cases)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::SpecialCaseEmpty { question: 2 });
    }

    #[test]
    fn evaluate_revalidates_deserialized_configs() {
        // Deserialization bypasses `new`, so a stored config with a coverage
        // gap must still fail at evaluation time.
        let config: ExamConfig = serde_json::from_value(serde_json::json!({
            "answer_key": ["a", "b", "c", "d"],
            "subjects": [{"name": "Only", "start": 1, "end": 3}],
            "special_cases": {}
        }))
        .expect("deserialize");

        let err = evaluate(&[], &config).unwrap_err();
        assert_eq!(err, ConfigurationError::CoverageGap { question: 4 });
    }

    #[test]
    fn result_serializes_with_camel_case_keys() {
        let config = ExamConfig::new(
            vec!["a".to_string(), "b".to_string()],
            vec![segment("Only", 1, 2)],
            BTreeMap::new(),
        )
        .expect("config");

        let result =
            evaluate(&["a".to_string(), String::new()], &config).expect("evaluate");
        let value = serde_json::to_value(&result).expect("json");

        assert_eq!(value["totalQuestions"], 2);
        assert_eq!(value["totalScore"], 1);
        assert_eq!(value["percentage"], 50.0);
        assert_eq!(value["summary"]["unanswered"], 1);
        assert_eq!(value["subjectScores"][0]["subject"], "Only");
        assert_eq!(value["detailedResults"][0]["questionNumber"], 1);
        assert_eq!(value["detailedResults"][0]["studentAnswer"], "a");
        assert_eq!(value["detailedResults"][0]["isCorrect"], true);
        assert_eq!(value["detailedResults"][0]["correctAnswer"], "a");
        assert_eq!(value["detailedResults"][1]["status"], "unanswered");
    }

    #[test]
    fn config_normalizes_key_and_special_cases() {
        let mut special_cases = BTreeMap::new();
        special_cases.insert(1, BTreeSet::from([" A ".to_string(), "".to_string()]));

        let config = ExamConfig::new(
            vec![" B ".to_string()],
            vec![segment("Only", 1, 1)],
            special_cases,
        )
        .expect("config");

        assert_eq!(config.answer_key, vec!["b"]);
        assert_eq!(config.special_cases[&1], BTreeSet::from(["a".to_string()]));
    }
}
