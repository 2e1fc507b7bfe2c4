// Integration tests for exam content loading and lazy generation

mod common;

use anyhow::{bail, Result};
use async_trait::async_trait;
use common::question;
use oral_exam::content::{
    find_exam_set, lazy_outline, load_exam, AnswerType, ContentGenerator, ContentSource, FixedConfirmation,
    GenerationCoordinator, GenerationEvent, ImageConfirmation, MediaType, Question,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn write_part(exam_dir: &Path, part: u32, value: serde_json::Value) -> Result<()> {
    let dir = exam_dir.join(part.to_string());
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("content2.json"), serde_json::to_vec(&value)?)?;
    Ok(())
}

/// A complete seven-part bundle for `test_1`
fn bundle() -> Result<TempDir> {
    let root = TempDir::new()?;
    let exam = root.path().join("test_1");

    write_part(&exam, 1, json!({ "info": { "value": "The early bird catches the worm." } }))?;
    write_part(&exam, 2, json!({ "info": { "value": "Practice makes perfect." } }))?;
    write_part(&exam, 3, json!({ "info": { "value": "<p>First line.</p><p>Second line.<br/></p>" } }))?;
    write_part(
        &exam,
        4,
        json!({ "info": { "question": [
            { "ask": "Ask about the opening hours.", "std": [
                { "value": "When does the museum open?" },
                { "value": "What time does it open?" }
            ] },
            { "ask": "Ask about the ticket price.", "std": [ { "value": "How much is a ticket?" } ] }
        ] } }),
    )?;
    write_part(&exam, 5, json!({ "info": { "std": [ { "value": "<p>A family goes camping.</p>" } ] } }))?;
    write_part(
        &exam,
        6,
        json!({ "info": { "question": [
            { "ask": "What's your favourite season?", "std": [ { "value": "Autumn." } ] },
            { "ask": "How do you go to school?", "std": [ { "value": "By bus." } ] },
            { "ask": "Do you like music?", "std": [ { "value": "Yes, I do." } ] },
            { "ask": "Where do you live?", "std": [ { "value": "In Shanghai." } ] }
        ] } }),
    )?;
    write_part(
        &exam,
        7,
        json!({ "info": {
            "value": "Bees are important to farming.",
            "question": [
                { "ask": "Summarize the passage.", "std": [ { "value": "Bees pollinate crops." } ],
                  "keywords": [ { "value": "pollinate" }, { "value": "crops" } ] },
                { "ask": "Why are bees in danger?", "std": [ { "value": "Pesticides." } ] }
            ]
        } }),
    )?;

    Ok(root)
}

#[tokio::test]
async fn test_load_exam_builds_six_sections() -> Result<()> {
    let root = bundle()?;
    let source = ContentSource::new(root.path(), "/assets");

    let exam = load_exam(&source, "test_1").await?;

    assert_eq!(exam.exam_id, "test_1");
    assert_eq!(exam.name, "上海新高考模拟试题1");

    let ids: Vec<&str> = exam.questions().map(|(_, q)| q.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["q1_1", "q1_2", "q2_1", "q3_1", "q3_2", "q4_1", "q5_1", "q5_2", "q5_3", "q5_4", "q6_1", "q6_2"]
    );

    let sections: Vec<&str> = exam.sections.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(sections, vec!["sec_1", "sec_2", "sec_3", "sec_4", "sec_5", "sec_6"]);
    assert!(exam.sections.iter().all(|s| s.direction_video_url.is_some()));

    let (_, q1) = exam.find_question("q1_1").expect("q1_1");
    assert_eq!(q1.prompt_text, "The early bird catches the worm.");
    assert_eq!((q1.prep_duration, q1.answer_duration), (30, 15));
    assert_eq!(q1.answer_type, AnswerType::Audio);
    assert_eq!(q1.answer_content, "/assets/test_1/1/material/content.mp3");

    let (_, q2) = exam.find_question("q2_1").expect("q2_1");
    assert_eq!(q2.prompt_text, "First line.Second line.");

    let (section, q3) = exam.find_question("q3_1").expect("q3_1");
    assert_eq!(section.id, "sec_3");
    assert_eq!(q3.prompt_text, "Ask about the opening hours.");
    assert_eq!(q3.media_urls, vec!["/assets/test_1/4/material/ques1askaudio.mp3"]);
    assert_eq!(
        q3.grading_context.as_ref().map(|c| c.ref_answers.len()),
        Some(2)
    );

    let (_, q4) = exam.find_question("q4_1").expect("q4_1");
    assert_eq!(q4.media_type, MediaType::Image);
    assert!(!q4.has_playable_media());
    assert_eq!(q4.answer_content, "A family goes camping.");

    let (_, q5) = exam.find_question("q5_3").expect("q5_3");
    assert_eq!(q5.media_type, MediaType::Video);
    assert_eq!(q5.answer_duration, 5);
    assert_eq!(
        q5.grading_context.as_ref().and_then(|c| c.actual_question.as_deref()),
        Some("Do you like music?")
    );

    let (_, q6) = exam.find_question("q6_1").expect("q6_1");
    assert_eq!(q6.media_urls.len(), 2);
    let context = q6.grading_context.as_ref().expect("context");
    assert_eq!(context.original_text.as_deref(), Some("Bees are important to farming."));
    assert_eq!(context.keywords, vec!["pollinate", "crops"]);

    Ok(())
}

#[tokio::test]
async fn test_unreadable_parts_become_placeholders() -> Result<()> {
    let root = bundle()?;
    let exam_dir = root.path().join("test_1");
    std::fs::remove_file(exam_dir.join("1").join("content2.json"))?;
    std::fs::write(exam_dir.join("2").join("content2.json"), "{ not json")?;

    let exam = load_exam(&ContentSource::new(root.path(), "/assets"), "test_1").await?;

    let (_, q1) = exam.find_question("q1_1").expect("q1_1");
    assert!(q1.prompt_text.starts_with("[Error loading content from"));
    let (_, q2) = exam.find_question("q1_2").expect("q1_2");
    assert!(q2.prompt_text.starts_with("[Error parsing content from"));

    // The rest of the exam is unaffected
    let (_, q3) = exam.find_question("q2_1").expect("q2_1");
    assert_eq!(q3.prompt_text, "First line.Second line.");

    Ok(())
}

#[tokio::test]
async fn test_missing_exam_directory_fails() -> Result<()> {
    let root = TempDir::new()?;
    let result = load_exam(&ContentSource::new(root.path(), "/assets"), "test_3").await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_asset_urls_are_unique_and_ordered() -> Result<()> {
    let root = bundle()?;
    let exam = load_exam(&ContentSource::new(root.path(), "/assets"), "test_1").await?;

    let cues = ["/assets/audio/start.mp3", "/assets/audio/stop.mp3", "/assets/audio/start.mp3"];
    let assets = exam.asset_urls(&cues);

    assert_eq!(assets[0], "/assets/audio/start.mp3");
    assert_eq!(assets[1], "/assets/audio/stop.mp3");
    assert_eq!(assets[2], "/assets/test_1/1/material/content.mp3");

    let mut unique = assets.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), assets.len());
    assert!(assets.contains(&"/assets/test_1/7/material/content.mp3".to_string()));

    Ok(())
}

#[test]
fn test_resolve_url_stays_inside_root() {
    let source = ContentSource::new("/srv/content", "/assets");

    assert_eq!(
        source.resolve_url("/assets/test_1/5/material/content.jpg"),
        Some(Path::new("/srv/content/test_1/5/material/content.jpg").to_path_buf())
    );
    assert_eq!(source.resolve_url("/assets/../secret"), None);
    assert_eq!(source.resolve_url("/other/test_1/x.jpg"), None);
}

#[test]
fn test_catalog_and_outline() {
    assert_eq!(find_exam_set("test_10").map(|s| s.name), Some("上海新高考模拟试题10"));
    assert!(find_exam_set("test_11").is_none());

    let outline = lazy_outline("ai_1");
    assert_eq!(outline.sections.len(), 6);
    assert!(outline.sections.iter().all(|s| s.is_pending()));
    assert_eq!(outline.sections[3].id, "sec_4");
}

struct ScriptedGenerator;

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate_section(
        &self,
        section_id: &str,
        confirm: Arc<dyn ImageConfirmation>,
    ) -> Result<Vec<Question>> {
        match section_id {
            "sec_1" => Ok(vec![question("q1_1", 30, 15), question("q1_2", 30, 15)]),
            "sec_2" => bail!("model unavailable"),
            "sec_4" => {
                if confirm.confirm_image_generation().await {
                    Ok(vec![question("q4_1", 60, 60)])
                } else {
                    Ok(vec![])
                }
            }
            _ => Ok(vec![question("qx", 0, 10)]),
        }
    }
}

#[tokio::test]
async fn test_generation_reports_each_section_in_order() -> Result<()> {
    let coordinator = GenerationCoordinator::new(Arc::new(ScriptedGenerator), Arc::new(FixedConfirmation(false)));
    let (tx, mut rx) = mpsc::channel(8);

    let task = coordinator.spawn(
        vec!["sec_1".to_string(), "sec_2".to_string(), "sec_4".to_string()],
        tx,
    );

    match rx.recv().await {
        Some(GenerationEvent::Ready { section_id, questions }) => {
            assert_eq!(section_id, "sec_1");
            assert_eq!(questions.len(), 2);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    match rx.recv().await {
        Some(GenerationEvent::Failed { section_id, error }) => {
            assert_eq!(section_id, "sec_2");
            assert!(error.contains("model unavailable"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Image generation declined: nothing to show for the picture section
    match rx.recv().await {
        Some(GenerationEvent::Failed { section_id, .. }) => assert_eq!(section_id, "sec_4"),
        other => panic!("unexpected event: {:?}", other),
    }

    task.await?;
    assert!(rx.recv().await.is_none());

    Ok(())
}
