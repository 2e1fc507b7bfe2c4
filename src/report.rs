//! Score aggregation and the exam report

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::content::Section;
use crate::grading::GradeResult;
use crate::session::RecordingMap;

/// Maximum score of every question. Sums to 10.0.
pub const POINT_WEIGHTS: [(&str, f64); 12] = [
    ("q1_1", 0.5),
    ("q1_2", 0.5),
    ("q2_1", 1.0),
    ("q3_1", 1.0),
    ("q3_2", 1.0),
    ("q4_1", 1.5),
    ("q5_1", 0.5),
    ("q5_2", 0.5),
    ("q5_3", 0.5),
    ("q5_4", 0.5),
    ("q6_1", 1.0),
    ("q6_2", 1.5),
];

/// Used when a question id has no weight
pub const FALLBACK_MAX_SCORE: f64 = 10.0;

pub fn point_weight(question_id: &str) -> Option<f64> {
    POINT_WEIGHTS
        .iter()
        .find(|(id, _)| *id == question_id)
        .map(|(_, weight)| *weight)
}

pub fn max_score(question_id: &str) -> f64 {
    point_weight(question_id).unwrap_or(FALLBACK_MAX_SCORE)
}

/// Score categories shown on the report
pub const CATEGORIES: [(&str, &[&str], f64); 5] = [
    ("pronunciation", &["q1_1", "q1_2"], 1.0),
    ("fluency", &["q2_1"], 1.0),
    ("interaction", &["q3_1", "q3_2", "q5_1", "q5_2", "q5_3", "q5_4"], 4.0),
    ("narration", &["q4_1"], 1.5),
    ("comprehension", &["q6_1", "q6_2"], 2.5),
];

/// Sum of all graded scores, or `None` when nothing is graded yet.
///
/// Scores are summed as returned by the grader, without clipping.
pub fn total_score(results: &HashMap<String, GradeResult>) -> Option<f64> {
    let graded: Vec<f64> = results.values().filter(|r| !r.loading).map(|r| r.score).collect();
    if graded.is_empty() {
        None
    } else {
        Some(graded.iter().sum())
    }
}

/// Two-decimal display form of a total
pub fn format_score(score: f64) -> String {
    format!("{:.2}", score)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScore {
    pub name: &'static str,
    pub score: f64,
    pub max: f64,
}

pub fn category_scores(results: &HashMap<String, GradeResult>) -> Vec<CategoryScore> {
    CATEGORIES
        .iter()
        .map(|(name, ids, max)| CategoryScore {
            name: *name,
            score: ids
                .iter()
                .filter_map(|id| results.get(*id))
                .filter(|r| !r.loading)
                .map(|r| r.score)
                .sum(),
            max: *max,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRow {
    pub question_id: String,
    pub section_id: String,
    pub label: String,
    pub max_score: f64,
    pub recorded: bool,
    pub score: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamReport {
    pub exam_id: String,
    pub generated_at: DateTime<Utc>,
    pub questions: Vec<QuestionRow>,
    pub total_score: Option<f64>,
    /// `total_score` to two decimals, "--" before any grading
    pub total_display: String,
    pub max_total: f64,
    pub categories: Vec<CategoryScore>,
}

impl ExamReport {
    pub fn build(
        exam_id: &str,
        sections: &[Section],
        recordings: &RecordingMap,
        results: &HashMap<String, GradeResult>,
    ) -> Self {
        let questions = sections
            .iter()
            .flat_map(|section| section.questions.iter().map(move |q| (section, q)))
            .map(|(section, question)| {
                let result = results.get(&question.id).filter(|r| !r.loading);
                QuestionRow {
                    question_id: question.id.clone(),
                    section_id: section.id.clone(),
                    label: question.label.clone(),
                    max_score: max_score(&question.id),
                    recorded: recordings.contains_key(&question.id),
                    score: result.map(|r| r.score),
                    feedback: result.map(|r| r.feedback.clone()),
                }
            })
            .collect();

        let total = total_score(results);

        Self {
            exam_id: exam_id.to_string(),
            generated_at: Utc::now(),
            questions,
            total_score: total,
            total_display: total.map(format_score).unwrap_or_else(|| "--".to_string()),
            max_total: POINT_WEIGHTS.iter().map(|(_, w)| w).sum(),
            categories: category_scores(results),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report: {:?}", path))?;
        info!("Report written to {:?}", path);
        Ok(())
    }
}

/// Write every recording to `dir` as `<question_id>.wav`
pub fn export_recordings(recordings: &RecordingMap, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create export directory: {:?}", dir))?;

    let mut ids: Vec<&String> = recordings.keys().collect();
    ids.sort();

    let mut written = Vec::with_capacity(ids.len());
    for id in ids {
        let path = dir.join(format!("{}.wav", id));
        std::fs::write(&path, &recordings[id].data)
            .with_context(|| format!("Failed to write recording: {:?}", path))?;
        written.push(path);
    }

    info!("Exported {} recordings to {:?}", written.len(), dir);
    Ok(written)
}
