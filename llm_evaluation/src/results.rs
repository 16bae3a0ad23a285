use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::dataset::Document;
use crate::error::EvalError;
use crate::util::render_template;

/// One generation for one document, as persisted per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub inference_result: String,
    pub gold_standard_result: Vec<String>,
    pub doc_id: String,
    pub document: String,
    pub prompt: String,
}

impl InferenceResult {
    pub fn new(document: Document, prompt: String, generation: String) -> Self {
        Self {
            inference_result: generation,
            gold_standard_result: vec![document.gold_standard],
            doc_id: document.id,
            document: document.context,
            prompt,
        }
    }

    /// The single reference answer. More than one is not supported.
    pub fn single_gold_standard(&self) -> Result<&str, EvalError> {
        match self.gold_standard_result.as_slice() {
            [answer] => Ok(answer),
            [] => Err(EvalError::EmptyGoldStandard {
                doc_id: self.doc_id.clone(),
            }),
            answers => Err(EvalError::MultipleCorrectAnswers {
                doc_id: self.doc_id.clone(),
                count: answers.len(),
            }),
        }
    }
}

/// A judge grade on the 1-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

impl Grade {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Grade {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Grade(value))
        } else {
            Err(format!("grade {} outside [{}, {}]", value, Self::MIN, Self::MAX))
        }
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> u8 {
        grade.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub context_document: String,
    pub context_document_id: String,
    pub gold_standard_result: Vec<String>,
    pub llm_inference: String,
    pub judge_explanation: String,
    pub judge_grade: Grade,
}

/// Judge results of one run keyed by document id, plus run metadata.
///
/// The average grade is always derived from the stored results.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedJudgeResults {
    pub judge_results: BTreeMap<String, JudgeResult>,
    pub total_candidate_judgments: usize,
    pub judge_prompt_step1_template: String,
    pub judge_prompt_step2_template: String,
    pub evaluation_dataset_name: String,
    pub evaluation_dataset_version: String,
    pub llm_name: String,
    pub judge_name: String,
}

impl AggregatedJudgeResults {
    pub fn insert(&mut self, result: JudgeResult) {
        self.judge_results
            .insert(result.context_document_id.clone(), result);
    }

    pub fn average_grade(&self) -> Option<f64> {
        if self.judge_results.is_empty() {
            return None;
        }
        let total: u32 = self
            .judge_results
            .values()
            .map(|r| u32::from(r.judge_grade.value()))
            .sum();
        Some(f64::from(total) / self.judge_results.len() as f64)
    }

    pub fn grades(&self) -> BTreeMap<&str, u8> {
        self.judge_results
            .iter()
            .map(|(id, r)| (id.as_str(), r.judge_grade.value()))
            .collect()
    }

    pub fn generations(&self) -> BTreeMap<&str, &str> {
        self.judge_results
            .iter()
            .map(|(id, r)| (id.as_str(), r.llm_inference.as_str()))
            .collect()
    }

    pub fn judgments(&self) -> BTreeMap<&str, &str> {
        self.judge_results
            .iter()
            .map(|(id, r)| (id.as_str(), r.judge_explanation.as_str()))
            .collect()
    }

    /// The step-1 prompt each document was judged with.
    pub fn full_prompts(&self) -> Result<BTreeMap<&str, String>, EvalError> {
        self.judge_results
            .iter()
            .map(|(id, r)| {
                let prompt = render_template(
                    &self.judge_prompt_step1_template,
                    &[("context", &r.context_document), ("answer", &r.llm_inference)],
                )?;
                Ok((id.as_str(), prompt))
            })
            .collect()
    }
}

impl Serialize for AggregatedJudgeResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AggregatedJudgeResults", 9)?;
        state.serialize_field("judge_results", &self.judge_results)?;
        state.serialize_field("average_grade", &self.average_grade())?;
        state.serialize_field("total_candidate_judgments", &self.total_candidate_judgments)?;
        state.serialize_field("judge_prompt_step1_template", &self.judge_prompt_step1_template)?;
        state.serialize_field("judge_prompt_step2_template", &self.judge_prompt_step2_template)?;
        state.serialize_field("evaluation_dataset_name", &self.evaluation_dataset_name)?;
        state.serialize_field("evaluation_dataset_version", &self.evaluation_dataset_version)?;
        state.serialize_field("llm_name", &self.llm_name)?;
        state.serialize_field("judge_name", &self.judge_name)?;
        state.end()
    }
}

impl fmt::Display for AggregatedJudgeResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let average = self
            .average_grade()
            .map_or_else(|| "n/a".to_string(), |g| format!("{:.4}", g));
        writeln!(f, "Evaluation results:")?;
        writeln!(
            f,
            "\tPerformance of {} on {} v{} as judged by {}",
            self.llm_name, self.evaluation_dataset_name, self.evaluation_dataset_version, self.judge_name
        )?;
        writeln!(f, "\tAverage grade: {}", average)?;
        writeln!(f, "\tNumber of inferences for judging: {}", self.total_candidate_judgments)?;
        write!(f, "\tNumber of judgments: {}", self.judge_results.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationScores {
    pub precision_avg_bert: f64,
    pub recall_avg_bert: f64,
    pub f1_avg_bert: f64,
    pub precision_list_bert: Vec<f64>,
    pub recall_list_bert: Vec<f64>,
    pub f1_list_bert: Vec<f64>,
    pub bleu_score: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResults {
    pub full_prompts: Vec<String>,
    pub generations: Vec<String>,
    pub scores: EvaluationScores,
}

impl EvaluationResults {
    pub fn summary_scores(&self) -> BTreeMap<&'static str, f64> {
        let mut summary = BTreeMap::new();
        summary.insert("mean_precision", self.scores.precision_avg_bert);
        summary.insert("mean_recall", self.scores.recall_avg_bert);
        summary.insert("mean_f1", self.scores.f1_avg_bert);
        summary.insert("bleu_score", self.scores.bleu_score);
        summary.insert("accuracy", self.scores.accuracy);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn judge_result(id: &str, grade: u8) -> JudgeResult {
        JudgeResult {
            context_document: format!("context of {}", id),
            context_document_id: id.to_string(),
            gold_standard_result: vec!["gold".to_string()],
            llm_inference: format!("summary of {}", id),
            judge_explanation: "fine".to_string(),
            judge_grade: Grade::try_from(grade).unwrap(),
        }
    }

    fn aggregate() -> AggregatedJudgeResults {
        AggregatedJudgeResults {
            judge_results: BTreeMap::new(),
            total_candidate_judgments: 3,
            judge_prompt_step1_template: "C={context} A={answer}".to_string(),
            judge_prompt_step2_template: "Grade it".to_string(),
            evaluation_dataset_name: "abisee/cnn_dailymail".to_string(),
            evaluation_dataset_version: "3.0.0".to_string(),
            llm_name: "llm".to_string(),
            judge_name: "judge".to_string(),
        }
    }

    #[test]
    fn test_grade_bounds() {
        assert!(Grade::try_from(0).is_err());
        assert!(Grade::try_from(11).is_err());
        assert_eq!(Grade::try_from(10).unwrap().value(), 10);
        assert!(serde_json::from_value::<Grade>(json!(12)).is_err());
    }

    #[test]
    fn test_inference_result_json_fields() {
        let result = InferenceResult::new(
            Document {
                id: "doc1".into(),
                context: "A".into(),
                gold_standard: "B".into(),
            },
            "Summarize: A".into(),
            "gen".into(),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "inference_result": "gen",
                "gold_standard_result": ["B"],
                "doc_id": "doc1",
                "document": "A",
                "prompt": "Summarize: A"
            })
        );
    }

    #[test]
    fn test_single_gold_standard_rejects_multiple() {
        let mut result: InferenceResult = serde_json::from_value(json!({
            "inference_result": "x", "gold_standard_result": ["a", "b"],
            "doc_id": "d", "document": "c", "prompt": "p"
        }))
        .unwrap();
        assert!(matches!(
            result.single_gold_standard(),
            Err(EvalError::MultipleCorrectAnswers { count: 2, .. })
        ));

        result.gold_standard_result.clear();
        assert!(matches!(result.single_gold_standard(), Err(EvalError::EmptyGoldStandard { .. })));
    }

    #[test]
    fn test_average_grade_is_derived() {
        let mut results = aggregate();
        assert_eq!(results.average_grade(), None);

        results.insert(judge_result("a", 6));
        results.insert(judge_result("b", 9));
        assert_eq!(results.average_grade(), Some(7.5));

        results.insert(judge_result("b", 3));
        assert_eq!(results.judge_results.len(), 2);
        assert_eq!(results.average_grade(), Some(4.5));
    }

    #[test]
    fn test_serialized_report_carries_average() {
        let mut results = aggregate();
        results.insert(judge_result("a", 8));
        let value = serde_json::to_value(&results).unwrap();

        assert_eq!(value["average_grade"], json!(8.0));
        assert_eq!(value["judge_results"]["a"]["judge_grade"], json!(8));
        assert_eq!(value["total_candidate_judgments"], json!(3));
    }

    #[test]
    fn test_views() {
        let mut results = aggregate();
        results.insert(judge_result("a", 8));

        assert_eq!(results.grades()["a"], 8);
        assert_eq!(results.generations()["a"], "summary of a");
        assert_eq!(results.judgments()["a"], "fine");
        assert_eq!(results.full_prompts().unwrap()["a"], "C=context of a A=summary of a");
        assert!(results.to_string().contains("Average grade: 8.0000"));
    }
}
