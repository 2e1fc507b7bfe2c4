//! Exam content: the section/question tree that drives a session

pub mod catalog;
pub mod generator;
pub mod loader;
pub mod model;
pub mod text;

pub use catalog::{find_exam_set, ExamSet, EXAM_SETS};
pub use generator::{
    ContentGenerator, FixedConfirmation, GenerationCoordinator, GenerationEvent, ImageConfirmation,
};
pub use loader::{lazy_outline, load_exam, ContentSource};
pub use model::{AnswerType, ExamContent, GradingContext, MediaType, Question, Section};
