use serde::{Deserialize, Serialize};

/// How a question's media is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    None,
    Audio,
    Video,
    Image,
}

/// Shape of the reference answer shown in the review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerType {
    /// Reference recording URL
    Audio,
    /// Reference text
    Text,
}

/// Section-specific inputs for the grading collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingContext {
    /// Original article (summary & Q&A section)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,

    /// Reference keywords (summary & Q&A section)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// The question actually asked in the prompt media (fast response section)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_question: Option<String>,

    /// All accepted answers (situational questions section)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ref_answers: Vec<String>,

    /// Sentence the picture description must open with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_sentence: Option<String>,
}

/// A single exam question. `id` is unique across the whole exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub label: String,
    pub prompt_text: String,
    pub media_urls: Vec<String>,
    pub media_type: MediaType,
    /// Seconds of preparation; 0 skips preparation entirely
    pub prep_duration: u32,
    /// Seconds of recording
    pub answer_duration: u32,
    pub answer_type: AnswerType,
    pub answer_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading_context: Option<GradingContext>,
}

impl Question {
    /// Whether the question has media that must play before preparation.
    ///
    /// Images are displayed alongside the prompt, never played.
    pub fn has_playable_media(&self) -> bool {
        matches!(self.media_type, MediaType::Audio | MediaType::Video) && !self.media_urls.is_empty()
    }

    /// Media URL at `index`, if any
    pub fn media_at(&self, index: usize) -> Option<&str> {
        self.media_urls.get(index).map(String::as_str)
    }
}

/// A graded part of the exam. Order in the exam is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction_video_url: Option<String>,
    pub questions: Vec<Question>,
}

impl Section {
    /// Lazily generated sections start out empty
    pub fn is_pending(&self) -> bool {
        self.questions.is_empty()
    }
}

/// A loaded exam: the ordered section tree plus its identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamContent {
    pub exam_id: String,
    pub name: String,
    pub sections: Vec<Section>,
}

impl ExamContent {
    pub fn new(exam_id: impl Into<String>, name: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            exam_id: exam_id.into(),
            name: name.into(),
            sections,
        }
    }

    /// Find a question and the id of the section holding it
    pub fn find_question(&self, question_id: &str) -> Option<(&Section, &Question)> {
        self.sections.iter().find_map(|section| {
            section
                .questions
                .iter()
                .find(|q| q.id == question_id)
                .map(|q| (section, q))
        })
    }

    /// Every question in exam order, paired with its section id
    pub fn questions(&self) -> impl Iterator<Item = (&str, &Question)> {
        self.sections
            .iter()
            .flat_map(|s| s.questions.iter().map(move |q| (s.id.as_str(), q)))
    }

    /// De-duplicated list of assets the browser should warm up before the exam
    ///
    /// Order is stable: cue audio first, then media in exam order.
    pub fn asset_urls(&self, cue_urls: &[&str]) -> Vec<String> {
        let mut assets: Vec<String> = Vec::new();
        let mut push = |url: &str| {
            if !url.is_empty() && !assets.iter().any(|a| a == url) {
                assets.push(url.to_string());
            }
        };

        for cue in cue_urls {
            push(cue);
        }

        for (_, question) in self.questions() {
            for url in &question.media_urls {
                push(url);
            }
            if question.answer_type == AnswerType::Audio {
                push(&question.answer_content);
            }
        }

        assets
    }
}
