//! Static exam loading from the on-disk content bundle
//!
//! Layout: `<root>/<exam_id>/<part>/content2.json` for parts 1..=7, with media
//! under `<root>/<exam_id>/<part>/material/`. Media URLs are emitted relative
//! to the configured URL prefix so the HTTP layer can serve them as-is.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::catalog::find_exam_set;
use super::model::{AnswerType, ExamContent, GradingContext, MediaType, Question, Section};
use super::text::strip_paragraph_tags;

/// Where exam bundles live on disk and how their media is addressed by URL
#[derive(Debug, Clone)]
pub struct ContentSource {
    pub root: PathBuf,
    /// Prefix for media URLs (e.g. "" yields `/test_1/...`, "/content" yields `/content/test_1/...`)
    pub url_prefix: String,
}

impl ContentSource {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into(),
        }
    }

    fn url(&self, exam_id: &str, rel: &str) -> String {
        format!("{}/{}/{}", self.url_prefix.trim_end_matches('/'), exam_id, rel)
    }

    /// Map a media URL produced by this source back to a file on disk
    pub fn resolve_url(&self, url: &str) -> Option<PathBuf> {
        let prefix = self.url_prefix.trim_end_matches('/');
        let rel = url.strip_prefix(prefix)?.trim_start_matches('/');
        if rel.is_empty() || rel.split('/').any(|part| part == "..") {
            return None;
        }
        Some(self.root.join(rel))
    }
}

/// Parsed `content2.json` for one exam part, or the reason it is unavailable
struct Part {
    path: PathBuf,
    json: Result<Value, PartError>,
}

enum PartError {
    Missing,
    Invalid,
}

impl Part {
    async fn read(dir: &Path, number: u32) -> Self {
        let path = dir.join(number.to_string()).join("content2.json");

        let json = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Value>(&bytes).map_err(|e| {
                error!("Error parsing {}: {}", path.display(), e);
                PartError::Invalid
            }),
            Err(e) => {
                warn!("File not found or failed to load: {} ({})", path.display(), e);
                Err(PartError::Missing)
            }
        };

        Self { path, json }
    }

    /// Display text at `pointer`, or a visible placeholder when the part is unusable
    fn text(&self, pointer: &str) -> String {
        match &self.json {
            Ok(json) => json
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Err(PartError::Missing) => {
                format!("[Error loading content from {}]", self.path.display())
            }
            Err(PartError::Invalid) => {
                format!("[Error parsing content from {}]", self.path.display())
            }
        }
    }

    /// Optional string at `pointer`; empty when the part is unusable
    fn opt_text(&self, pointer: &str) -> Option<String> {
        self.json
            .as_ref()
            .ok()
            .and_then(|json| json.pointer(pointer))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// The `value` fields of an array of `{ "value": ... }` items
    fn values(&self, pointer: &str) -> Vec<String> {
        self.json
            .as_ref()
            .ok()
            .and_then(|json| json.pointer(pointer))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("value").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn joined(&self, pointer: &str) -> String {
        self.values(pointer).join("\n")
    }
}

fn question(
    id: &str,
    label: &str,
    prompt_text: String,
    media_type: MediaType,
    prep_duration: u32,
    answer_duration: u32,
    media_urls: Vec<String>,
    answer_type: AnswerType,
    answer_content: String,
) -> Question {
    Question {
        id: id.to_string(),
        label: label.to_string(),
        prompt_text,
        media_urls,
        media_type,
        prep_duration,
        answer_duration,
        answer_type,
        answer_content,
        grading_context: None,
    }
}

fn section(number: u32, title: &str, description: &str, questions: Vec<Question>) -> Section {
    Section {
        id: format!("sec_{}", number),
        title: title.to_string(),
        description: description.to_string(),
        direction_video_url: Some(format!("/assets/template/{}.mp4", number)),
        questions,
    }
}

/// Load one practice exam from the content bundle.
///
/// Individual unreadable parts degrade to placeholder text; a missing exam
/// directory is an essential failure and aborts the load.
pub async fn load_exam(source: &ContentSource, exam_id: &str) -> Result<ExamContent> {
    let dir = source.root.join(exam_id);
    let meta = tokio::fs::metadata(&dir)
        .await
        .with_context(|| format!("Exam content not found: {}", dir.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("Exam content is not a directory: {}", dir.display());
    }

    info!("Loading exam {} from {}", exam_id, dir.display());

    let mut parts = Vec::with_capacity(7);
    for number in 1..=7 {
        parts.push(Part::read(&dir, number).await);
    }
    let url = |rel: &str| source.url(exam_id, rel);

    // Section 1: read sentences
    let sec1 = section(
        1,
        "第一部分：朗读句子",
        "请朗读屏幕上的句子。",
        vec![
            question(
                "q1_1", "第一题", parts[0].text("/info/value"), MediaType::None, 30, 15,
                vec![], AnswerType::Audio, url("1/material/content.mp3"),
            ),
            question(
                "q1_2", "第二题", parts[1].text("/info/value"), MediaType::None, 30, 15,
                vec![], AnswerType::Audio, url("2/material/content.mp3"),
            ),
        ],
    );

    // Section 2: read a paragraph
    let sec2 = section(
        2,
        "第二部分：朗读段落",
        "请朗读屏幕上的段落。",
        vec![question(
            "q2_1", "段落朗读", strip_paragraph_tags(&parts[2].text("/info/value")),
            MediaType::None, 60, 30, vec![], AnswerType::Audio, url("3/material/content.mp3"),
        )],
    );

    // Section 3: situational questions
    let p4 = &parts[3];
    let s3q1_refs = p4.values("/info/question/0/std");
    let s3q2_ans = p4.joined("/info/question/1/std");
    let mut s3q1 = question(
        "q3_1", "第一题",
        p4.opt_text("/info/question/0/ask").unwrap_or_else(|| "Question 1".to_string()),
        MediaType::Audio, 0, 20, vec![url("4/material/ques1askaudio.mp3")],
        AnswerType::Text, s3q1_refs.join("\n"),
    );
    s3q1.grading_context = Some(GradingContext {
        ref_answers: s3q1_refs,
        ..Default::default()
    });
    let mut s3q2 = question(
        "q3_2", "第二题",
        p4.opt_text("/info/question/1/ask").unwrap_or_else(|| "Question 2".to_string()),
        MediaType::Audio, 0, 20, vec![url("4/material/ques2askaudio.mp3")],
        AnswerType::Text, s3q2_ans.clone(),
    );
    s3q2.grading_context = Some(GradingContext {
        ref_answers: vec![s3q2_ans],
        ..Default::default()
    });
    let sec3 = section(3, "第三部分：情景提问", "根据信息进行提问。", vec![s3q1, s3q2]);

    // Section 4: picture description
    let sec4 = section(
        4,
        "第四部分：图片描述",
        "请描述屏幕上的图片。",
        vec![question(
            "q4_1", "图片描述", "Describe the picture below in detail.".to_string(),
            MediaType::Image, 60, 60, vec![url("5/material/content.jpg")],
            AnswerType::Text, strip_paragraph_tags(&parts[4].joined("/info/std")),
        )],
    );

    // Section 5: fast response
    let p6 = &parts[5];
    let fast = (0..4)
        .map(|i| {
            let labels = ["第一题", "第二题", "第三题", "第四题"];
            let mut q = question(
                &format!("q5_{}", i + 1), labels[i], "Listen and answer.".to_string(),
                MediaType::Video, 0, 5, vec![url(&format!("6/material/ques{}askvideo.mp4", i + 1))],
                AnswerType::Text, p6.joined(&format!("/info/question/{}/std", i)),
            );
            q.grading_context = Some(GradingContext {
                actual_question: Some(
                    p6.opt_text(&format!("/info/question/{}/ask", i)).unwrap_or_default(),
                ),
                ..Default::default()
            });
            q
        })
        .collect();
    let sec5 = section(5, "第五部分：快速应答", "观看视频并快速回答问题。", fast);

    // Section 6: summary and Q&A
    let p7 = &parts[6];
    let article = p7.opt_text("/info/value").unwrap_or_default();
    let mut s6q1 = question(
        "q6_1", "简述", p7.opt_text("/info/question/0/ask").unwrap_or_default(),
        MediaType::Audio, 30, 30,
        vec![url("7/material/content.mp3"), url("7/material/ques1askaudio.mp3")],
        AnswerType::Text, p7.joined("/info/question/0/std"),
    );
    s6q1.grading_context = Some(GradingContext {
        original_text: Some(article.clone()),
        keywords: p7.values("/info/question/0/keywords"),
        ..Default::default()
    });
    let mut s6q2 = question(
        "q6_2", "问答", p7.opt_text("/info/question/1/ask").unwrap_or_default(),
        MediaType::Audio, 60, 60, vec![url("7/material/ques2askaudio.mp3")],
        AnswerType::Text, p7.joined("/info/question/1/std"),
    );
    s6q2.grading_context = Some(GradingContext {
        original_text: Some(article),
        keywords: p7.values("/info/question/1/keywords"),
        ..Default::default()
    });
    let sec6 = section(6, "第六部分：简述和问答", "阅读文本并回答相关问题。", vec![s6q1, s6q2]);

    let name = find_exam_set(exam_id)
        .map(|set| set.name.to_string())
        .unwrap_or_else(|| exam_id.to_string());

    let content = ExamContent::new(exam_id, name, vec![sec1, sec2, sec3, sec4, sec5, sec6]);
    info!(
        "Exam {} loaded: {} sections, {} questions",
        exam_id,
        content.sections.len(),
        content.questions().count()
    );

    Ok(content)
}

/// The six-section outline with every `questions` list empty, for content
/// that is generated section by section.
pub fn lazy_outline(exam_id: &str) -> ExamContent {
    let titles = [
        ("第一部分：朗读句子", "请朗读屏幕上的句子。"),
        ("第二部分：朗读段落", "请朗读屏幕上的段落。"),
        ("第三部分：情景提问", "根据信息进行提问。"),
        ("第四部分：图片描述", "请描述屏幕上的图片。"),
        ("第五部分：快速应答", "听录音并快速回答问题。"),
        ("第六部分：简述和问答", "阅读文本并回答相关问题。"),
    ];

    let sections = titles
        .iter()
        .zip(1u32..)
        .map(|((title, description), number)| section(number, title, description, Vec::new()))
        .collect();

    ExamContent::new(exam_id, "AI 生成模拟试题", sections)
}
