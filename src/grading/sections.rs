//! Per-section grading instructions
//!
//! Each exam section grades differently. `SectionKind` maps a section id to
//! its instruction template and to the media parts that accompany the
//! recorded answer.

use crate::content::text::clean_html;
use crate::content::Question;

const EXAMINER_PREFIX: &str =
    "You are an expert English oral test examiner for the Chinese Shanghai Gaokao. ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// sec_1: sentence read aloud
    ReadAloud,
    /// sec_2: passage read aloud; running out of time is not penalized
    PassageReading,
    /// sec_3: the student asks questions about a situation
    SituationQuestions,
    /// sec_4: four-panel picture description
    PictureDescription,
    /// sec_5: fast response to a spoken prompt
    FastResponse,
    /// sec_6: questions about a listened article
    SummaryQuestions,
}

impl SectionKind {
    pub fn from_section_id(section_id: &str) -> Option<Self> {
        match section_id {
            "sec_1" => Some(Self::ReadAloud),
            "sec_2" => Some(Self::PassageReading),
            "sec_3" => Some(Self::SituationQuestions),
            "sec_4" => Some(Self::PictureDescription),
            "sec_5" => Some(Self::FastResponse),
            "sec_6" => Some(Self::SummaryQuestions),
            _ => None,
        }
    }

    /// Whether the question's first media URL is sent along as an image
    pub fn attaches_image(self) -> bool {
        self == Self::PictureDescription
    }

    /// Full grading instructions for `question`, bounded by `max_score`
    pub fn instructions(self, question: &Question, max_score: f64) -> String {
        let context = question.grading_context.clone().unwrap_or_default();
        let prompt_text = clean_html(&question.prompt_text);

        let task = match self {
            Self::ReadAloud | Self::PassageReading => {
                let completeness = if self == Self::PassageReading {
                    "\n4. Completeness: If the student does not finish reading the whole paragraph due to time limit, DO NOT deduct points for the unread part."
                } else {
                    ""
                };
                format!(
                    "Task: Read Aloud.\n\
                     Original Text: \"{prompt_text}\"\n\n\
                     Grading Criteria:\n\
                     1. Pronunciation: Check accuracy. NOTE: If the student corrects themselves (repeats a word), grade based on the *corrected* version.\n\
                     2. Intonation & Stress.\n\
                     3. Fluency.{completeness}"
                )
            }
            Self::SituationQuestions => {
                let reference = context
                    .ref_answers
                    .first()
                    .map(String::as_str)
                    .unwrap_or(question.answer_content.as_str());
                let reference = clean_html(reference);
                format!(
                    "Task: Situation Q&A. The student asks questions based on a prompt.\n\
                     Prompt Info: \"{prompt_text}\"\n\
                     Reference Answer (First valid option): \"{reference}\"\n\n\
                     Grading Criteria:\n\
                     1. Grammar: Check for grammatical correctness in forming questions.\n\
                     2. Content: The question must be relevant to the prompt context.\n\
                     3. SPECIAL RULE: There are two questions in this section. At least ONE of the questions (across the whole section) must be a Special Question (Wh- question). If the student only asks General Questions (Yes/No) for both, deduct points significantly.\n\
                     4. If the student corrects themselves, grade the final version."
                )
            }
            Self::PictureDescription => {
                let opening = context
                    .start_sentence
                    .as_deref()
                    .map(clean_html)
                    .unwrap_or(prompt_text);
                format!(
                    "Task: Picture Description.\n\n\
                     Requirements:\n\
                     1. Start with the sentence: \"{opening}\" (The student must say this or connect to it).\n\
                     2. Describe ALL 4 panels of the comic strip provided in the image. Cover: Time, Place, Main Characters, Event Development.\n\
                     3. Tense: Check for accurate use of tenses (usually past tense for narrative).\n\
                     4. Grammar & Expression: Meaning must be clear and accurate."
                )
            }
            Self::FastResponse => {
                let asked = clean_html(context.actual_question.as_deref().unwrap_or("Unknown Question"));
                let reference = clean_html(&question.answer_content);
                format!(
                    "Task: Fast Response.\n\
                     Question asked to student: \"{asked}\"\n\
                     Reference Answer: \"{reference}\"\n\n\
                     Grading Criteria:\n\
                     1. Appropriateness: Is the language polite and suitable for the situation?\n\
                     2. Emotion/Attitude: Does it convey the right emotion?\n\
                     3. Communicative Function: Identify explicitly what communicative function is being tested (e.g., Requesting, Refusing, Greeting) in the feedback."
                )
            }
            Self::SummaryQuestions => {
                let article = clean_html(context.original_text.as_deref().unwrap_or(""));
                let keywords = context.keywords.join(", ");
                let detail_question = question.id.ends_with('1');
                let (number, rule) = if detail_question {
                    (
                        1,
                        "This is a DETAIL question. The answer must be faithful to the original text content. It doesn't need to cover everything, but what is said must be accurate based on the text.",
                    )
                } else {
                    (
                        2,
                        "This is an OPEN question. The answer must NOT be less than 3 sentences. It must NOT completely copy the original text. Check for grammar and expression.",
                    )
                };
                format!(
                    "Task: Summary & Q&A.\n\
                     Original Article: \"{article}\"\n\
                     Question: \"{prompt_text}\"\n\
                     Keywords (Reference Only): [{keywords}]\n\n\
                     Specific Criteria for Question {number}:\n\
                     {rule}"
                )
            }
        };

        format!("{EXAMINER_PREFIX}\n{task}\n\n{}", score_bounds(max_score))
    }
}

fn score_bounds(max_score: f64) -> String {
    format!(
        "IMPORTANT: The maximum score for this question is {max_score} points.\n\
         Provide a score strictly between 0 and {max_score} (e.g., 0.5, 1.2, {max_score}).\n\
         Provide concise feedback in Chinese."
    )
}
