// Integration tests for the exam session state machine
//
// These tests drive an isolated ExamSession with fake media and capture,
// feeding ticks and media completion messages by hand.

mod common;

use anyhow::Result;
use common::{audio_question, question, section, FakePlayer, FakeRecorder};
use oral_exam::content::Section;
use oral_exam::session::{
    ExamSession, JumpOutcome, Phase, PlaybackKind, Position, SessionConfig, SessionError, TimerKind,
};

fn session(sections: Vec<Section>, recorder: FakeRecorder, player: FakePlayer) -> ExamSession {
    ExamSession::new(sections, SessionConfig::default(), Box::new(recorder), Box::new(player))
}

async fn started(sections: Vec<Section>, recorder: FakeRecorder, player: FakePlayer) -> Result<ExamSession> {
    let mut session = session(sections, recorder, player);
    session.acquire_microphone().await?;
    session.start()?;
    Ok(session)
}

fn tick(session: &mut ExamSession, seconds: u32) {
    for _ in 0..seconds {
        session.tick();
    }
}

#[tokio::test]
async fn test_two_section_exam_runs_to_completion() -> Result<()> {
    let sections = vec![
        section("sec_1", None, vec![question("q1_1", 0, 5)]),
        section("sec_2", None, vec![question("q2_1", 0, 5)]),
    ];
    let recorder = FakeRecorder::default();
    let mut session = started(sections, recorder.clone(), FakePlayer::silent()).await?;

    // No direction video, no prompt media, no preparation: straight to recording
    assert_eq!(session.phase(), Phase::Recording);
    assert_eq!(session.position(), Position::new(0, 0));

    tick(&mut session, 4);
    assert_eq!(session.phase(), Phase::Recording);
    tick(&mut session, 1);
    assert_eq!(session.phase(), Phase::Finishing);

    tick(&mut session, 2);
    assert_eq!(session.phase(), Phase::SectionBreak);
    assert_eq!(session.countdown().kind(), Some(TimerKind::SectionBreak));

    tick(&mut session, 9);
    assert_eq!(session.phase(), Phase::SectionBreak);
    tick(&mut session, 1);
    assert_eq!(session.phase(), Phase::Recording);
    assert_eq!(session.position(), Position::new(1, 0));

    tick(&mut session, 5);
    assert_eq!(session.phase(), Phase::Finishing);
    tick(&mut session, 2);
    assert_eq!(session.phase(), Phase::Completed);
    assert!(!session.countdown().is_running());

    assert_eq!(recorder.finalized(), 2);
    assert!(session.recordings().contains_key("q1_1"));
    assert!(session.recordings().contains_key("q2_1"));

    Ok(())
}

#[tokio::test]
async fn test_zero_preparation_skips_preparation_phase() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 10)])];
    let player = FakePlayer::default();
    let mut session = started(sections, FakeRecorder::default(), player.clone()).await?;

    assert_eq!(session.phase(), Phase::StartingBeep);
    assert!(!session.countdown().is_running());

    let beep = player.last();
    assert_eq!(beep.kind, PlaybackKind::StartCue);
    assert!(beep.awaited);

    assert!(session.media_ended(beep.id));
    assert_eq!(session.phase(), Phase::Recording);
    assert_eq!(session.countdown().kind(), Some(TimerKind::Answer));

    Ok(())
}

#[tokio::test]
async fn test_preparation_counts_down_into_recording() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 3, 10)])];
    let player = FakePlayer::rejecting(&[PlaybackKind::StartCue]);
    let mut session = started(sections, FakeRecorder::default(), player).await?;

    assert_eq!(session.phase(), Phase::Preparation);
    assert_eq!(session.countdown().state().map(|s| s.remaining_secs), Some(3));

    tick(&mut session, 2);
    assert_eq!(session.phase(), Phase::Preparation);
    tick(&mut session, 1);
    assert_eq!(session.phase(), Phase::Recording);

    Ok(())
}

#[tokio::test]
async fn test_start_now_short_circuits_preparation() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 30, 10)])];
    let player = FakePlayer::default();
    let mut session = started(sections, FakeRecorder::default(), player.clone()).await?;
    assert_eq!(session.phase(), Phase::Preparation);

    assert!(session.start_now());
    assert_eq!(session.phase(), Phase::StartingBeep);
    assert!(!session.countdown().is_running());

    // A second press does nothing
    assert!(!session.start_now());

    // The cancelled preparation timer never fires
    tick(&mut session, 40);
    assert_eq!(session.phase(), Phase::StartingBeep);

    session.media_ended(player.last().id);
    assert_eq!(session.phase(), Phase::Recording);

    Ok(())
}

#[tokio::test]
async fn test_stop_recording_twice_saves_once() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 30), question("q1_2", 0, 30)])];
    let recorder = FakeRecorder::default();
    let mut session = started(sections, recorder.clone(), FakePlayer::silent()).await?;
    assert_eq!(session.phase(), Phase::Recording);

    assert!(session.stop_recording());
    assert!(!session.stop_recording());

    assert_eq!(session.phase(), Phase::Finishing);
    assert_eq!(session.countdown().kind(), Some(TimerKind::Finishing));
    assert_eq!(recorder.finalized(), 1);
    assert_eq!(session.recordings().len(), 1);

    tick(&mut session, 2);
    assert_eq!(session.position(), Position::new(0, 1));
    assert_eq!(session.phase(), Phase::Recording);

    Ok(())
}

#[tokio::test]
async fn test_stop_cue_does_not_gate_finishing() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 30)])];
    let player = FakePlayer::rejecting(&[PlaybackKind::StartCue]);
    let mut session = started(sections, FakeRecorder::default(), player.clone()).await?;

    session.stop_recording();
    let stop = player.last();
    assert_eq!(stop.kind, PlaybackKind::StopCue);
    assert!(!stop.awaited);

    // Ending the stop cue is not awaited by anything
    assert!(!session.media_ended(stop.id));
    assert_eq!(session.phase(), Phase::Finishing);

    Ok(())
}

#[tokio::test]
async fn test_jump_attaches_open_segment_to_previous_question() -> Result<()> {
    let sections = vec![
        section("sec_1", None, vec![question("q1_1", 0, 30)]),
        section("sec_2", None, vec![question("q2_1", 20, 30)]),
    ];
    let recorder = FakeRecorder::default();
    let mut session = started(sections, recorder.clone(), FakePlayer::silent()).await?;
    assert_eq!(session.phase(), Phase::Recording);
    tick(&mut session, 3);

    let outcome = session.jump(1, 0)?;
    assert_eq!(outcome, JumpOutcome::Entered);

    assert_eq!(recorder.finalized(), 1);
    assert!(session.recordings().contains_key("q1_1"));
    assert!(!session.recordings().contains_key("q2_1"));

    assert_eq!(session.position(), Position::new(1, 0));
    assert_eq!(session.phase(), Phase::Preparation);
    assert_eq!(session.countdown().state().map(|s| s.remaining_secs), Some(20));

    Ok(())
}

#[tokio::test]
async fn test_jump_without_recording_leaves_recordings_untouched() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 10, 30), question("q1_2", 10, 30)])];
    let recorder = FakeRecorder::default();
    let mut session = started(sections, recorder.clone(), FakePlayer::silent()).await?;
    assert_eq!(session.phase(), Phase::Preparation);

    session.jump(0, 1)?;
    session.jump(0, 0)?;

    assert_eq!(recorder.finalized(), 0);
    assert!(session.recordings().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_stale_media_end_is_ignored_after_jump() -> Result<()> {
    let sections = vec![section(
        "sec_1",
        Some("/assets/template/1.mp4"),
        vec![
            audio_question("q1_1", 10, 30, &["/a.mp3"]),
            audio_question("q1_2", 10, 30, &["/b.mp3"]),
        ],
    )];
    let player = FakePlayer::default();
    let mut session = started(sections, FakeRecorder::default(), player.clone()).await?;

    assert_eq!(session.phase(), Phase::Direction);
    let direction = player.last();
    assert_eq!(direction.kind, PlaybackKind::Direction);

    session.jump(0, 1)?;
    assert_eq!(session.phase(), Phase::QuestionMedia);
    let media = player.last();
    assert_eq!(media.url, "/b.mp3");

    // The direction video ends late: nothing happens
    assert!(!session.media_ended(direction.id));
    assert_eq!(session.phase(), Phase::QuestionMedia);
    assert_eq!(session.position(), Position::new(0, 1));

    assert!(session.media_ended(media.id));
    assert_eq!(session.phase(), Phase::Preparation);

    Ok(())
}

#[tokio::test]
async fn test_question_media_plays_in_order() -> Result<()> {
    let sections = vec![section(
        "sec_1",
        None,
        vec![audio_question("q6_1", 30, 30, &["/article.mp3", "/question.mp3"])],
    )];
    let player = FakePlayer::default();
    let mut session = started(sections, FakeRecorder::default(), player.clone()).await?;

    assert_eq!(session.phase(), Phase::QuestionMedia);
    assert_eq!(session.media_index(), 0);
    session.media_ended(player.last().id);

    assert_eq!(session.phase(), Phase::QuestionMedia);
    assert_eq!(session.media_index(), 1);
    assert_eq!(player.last().url, "/question.mp3");
    session.media_ended(player.last().id);

    assert_eq!(session.phase(), Phase::Preparation);

    Ok(())
}

#[tokio::test]
async fn test_failed_media_counts_as_finished() -> Result<()> {
    let sections = vec![section(
        "sec_1",
        Some("/assets/template/1.mp4"),
        vec![audio_question("q3_1", 0, 20, &["/ask.mp3"])],
    )];
    let player = FakePlayer::default();
    let mut session = started(sections, FakeRecorder::default(), player.clone()).await?;

    assert!(session.media_failed(player.last().id));
    assert_eq!(session.phase(), Phase::QuestionMedia);

    assert!(session.media_failed(player.last().id));
    assert_eq!(session.phase(), Phase::StartingBeep);

    // The start cue errors: recording must still begin
    assert!(session.media_failed(player.last().id));
    assert_eq!(session.phase(), Phase::Recording);

    Ok(())
}

#[tokio::test]
async fn test_rejected_start_cue_begins_recording() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 15)])];
    let recorder = FakeRecorder::default();
    let player = FakePlayer::rejecting(&[PlaybackKind::StartCue]);
    let session = started(sections, recorder.clone(), player).await?;

    assert_eq!(session.phase(), Phase::Recording);
    assert!(session.snapshot().is_recording);
    assert_eq!(session.awaited_playback(), None);

    Ok(())
}

#[tokio::test]
async fn test_finish_early_saves_and_completes() -> Result<()> {
    let sections = vec![
        section("sec_1", None, vec![question("q1_1", 0, 30)]),
        section("sec_2", None, vec![question("q2_1", 0, 30)]),
    ];
    let recorder = FakeRecorder::default();
    let mut session = started(sections, recorder.clone(), FakePlayer::silent()).await?;

    session.finish_early()?;
    assert_eq!(session.phase(), Phase::Completed);
    assert!(!session.countdown().is_running());
    assert!(session.recordings().contains_key("q1_1"));

    assert_eq!(session.jump(1, 0), Err(SessionError::Completed));
    assert_eq!(session.finish_early(), Err(SessionError::Completed));

    tick(&mut session, 60);
    assert_eq!(session.phase(), Phase::Completed);

    Ok(())
}

#[tokio::test]
async fn test_finish_early_requires_started_exam() {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 30)])];
    let mut session = session(sections, FakeRecorder::default(), FakePlayer::silent());

    assert_eq!(session.finish_early(), Err(SessionError::NotStarted));
    assert_eq!(session.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_restart_clears_recordings_and_keeps_microphone() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 30), question("q1_2", 0, 30)])];
    let recorder = FakeRecorder::default();
    let mut session = started(sections, recorder.clone(), FakePlayer::silent()).await?;

    session.stop_recording();
    tick(&mut session, 2);
    assert_eq!(session.position(), Position::new(0, 1));

    session.restart();
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(session.position(), Position::new(0, 0));
    assert!(session.recordings().is_empty());
    assert!(!session.countdown().is_running());
    // The segment open at restart was discarded with the rest
    assert!(!session.snapshot().is_recording);

    session.acquire_microphone().await?;
    session.start()?;
    assert_eq!(recorder.acquired(), 1);
    assert_eq!(session.phase(), Phase::Recording);

    Ok(())
}

#[tokio::test]
async fn test_start_requires_microphone() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 30)])];

    let mut session = session(sections.clone(), FakeRecorder::default(), FakePlayer::silent());
    assert!(matches!(session.start(), Err(SessionError::MicrophoneUnavailable(_))));

    let mut denied = self::session(sections, FakeRecorder::denied(), FakePlayer::silent());
    assert!(matches!(
        denied.acquire_microphone().await,
        Err(SessionError::MicrophoneUnavailable(_))
    ));
    assert_eq!(denied.phase(), Phase::Idle);

    session.acquire_microphone().await?;
    session.start()?;
    assert_eq!(session.start(), Err(SessionError::AlreadyStarted));

    Ok(())
}

#[tokio::test]
async fn test_jump_from_idle_requires_microphone() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 30)])];
    let recorder = FakeRecorder::default();
    let mut session = session(sections, recorder.clone(), FakePlayer::silent());

    assert!(matches!(session.jump(0, 0), Err(SessionError::MicrophoneUnavailable(_))));
    assert_eq!(session.phase(), Phase::Idle);
    assert!(!session.snapshot().is_recording);
    assert_eq!(recorder.log.lock().unwrap().started, 0, "No segment without a microphone");

    session.acquire_microphone().await?;
    assert_eq!(session.jump(0, 0)?, JumpOutcome::Entered);
    assert_eq!(session.phase(), Phase::Recording);
    assert!(session.snapshot().is_recording);

    Ok(())
}

#[tokio::test]
async fn test_finished_cue_is_no_longer_advertised() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 0, 10), question("q1_2", 0, 10)])];
    let player = FakePlayer::default();
    let mut session = started(sections, FakeRecorder::default(), player.clone()).await?;

    let beep = player.last();
    assert_eq!(session.now_playing().map(|p| p.id), Some(beep.id));

    session.media_ended(beep.id);
    assert_eq!(session.phase(), Phase::Recording);
    assert!(session.now_playing().is_none());
    assert!(session.snapshot().now_playing.is_none());

    // The stop cue is advertised until the browser reports it done
    session.stop_recording();
    let stop = player.last();
    assert_eq!(stop.kind, PlaybackKind::StopCue);
    assert_eq!(session.now_playing().map(|p| p.id), Some(stop.id));
    assert!(!session.media_ended(stop.id));
    assert!(session.now_playing().is_none());
    assert_eq!(session.phase(), Phase::Finishing);

    Ok(())
}

#[tokio::test]
async fn test_jump_out_of_range_is_rejected() -> Result<()> {
    let sections = vec![section("sec_1", None, vec![question("q1_1", 10, 30)])];
    let mut session = started(sections, FakeRecorder::default(), FakePlayer::silent()).await?;

    assert_eq!(session.jump(3, 0), Err(SessionError::SectionOutOfRange(3)));
    assert_eq!(
        session.jump(0, 4),
        Err(SessionError::QuestionOutOfRange { section: 0, question: 4 })
    );
    assert_eq!(session.phase(), Phase::Preparation);
    assert!(session.countdown().is_running());

    Ok(())
}

#[tokio::test]
async fn test_jump_into_pending_section_waits_for_content() -> Result<()> {
    let sections = vec![
        section("sec_1", None, vec![question("q1_1", 10, 30)]),
        section("sec_2", Some("/assets/template/2.mp4"), vec![]),
    ];
    let mut session = started(sections, FakeRecorder::default(), FakePlayer::silent()).await?;
    assert_eq!(session.phase(), Phase::Preparation);

    assert_eq!(session.jump(1, 1)?, JumpOutcome::Deferred);
    assert_eq!(session.phase(), Phase::Preparation);
    assert_eq!(session.position(), Position::new(0, 0));
    assert_eq!(session.pending_jump(), Some(Position::new(1, 1)));

    session.content_ready("sec_2", vec![question("q2_1", 5, 30), question("q2_2", 5, 30)])?;

    assert_eq!(session.pending_jump(), None);
    assert_eq!(session.position(), Position::new(1, 1));
    assert_eq!(session.phase(), Phase::Preparation);

    Ok(())
}

#[tokio::test]
async fn test_advancing_into_pending_section_waits_in_direction() -> Result<()> {
    let sections = vec![
        section("sec_1", None, vec![question("q1_1", 0, 5)]),
        section("sec_2", None, vec![]),
    ];
    let mut session = started(sections, FakeRecorder::default(), FakePlayer::silent()).await?;

    tick(&mut session, 5 + 2 + 10);
    assert_eq!(session.phase(), Phase::Direction);
    assert!(session.is_awaiting_content());
    assert_eq!(session.position(), Position::new(1, 0));

    // Nothing moves while the content is missing
    tick(&mut session, 30);
    assert_eq!(session.phase(), Phase::Direction);

    session.content_failed("sec_2", "model unavailable");
    assert_eq!(session.phase(), Phase::Direction);

    session.content_ready("sec_2", vec![question("q2_1", 0, 5)])?;
    assert!(!session.is_awaiting_content());
    assert_eq!(session.phase(), Phase::Recording);

    Ok(())
}

#[tokio::test]
async fn test_direction_end_before_content_keeps_waiting() -> Result<()> {
    let sections = vec![section("sec_1", Some("/assets/template/1.mp4"), vec![])];
    let player = FakePlayer::default();
    let mut session = started(sections, FakeRecorder::default(), player.clone()).await?;

    assert_eq!(session.phase(), Phase::Direction);
    session.media_ended(player.last().id);
    assert_eq!(session.phase(), Phase::Direction);
    assert!(session.is_awaiting_content());

    session.content_ready("sec_1", vec![question("q1_1", 10, 5)])?;
    assert_eq!(session.phase(), Phase::Preparation);

    // Content is filled once
    session.content_ready("sec_1", vec![question("other", 1, 1)])?;
    assert_eq!(session.sections()[0].questions[0].id, "q1_1");

    assert_eq!(
        session.content_ready("sec_9", vec![question("x", 1, 1)]),
        Err(SessionError::UnknownSection("sec_9".to_string()))
    );

    Ok(())
}

#[tokio::test]
async fn test_at_most_one_countdown_through_exam() -> Result<()> {
    let sections = vec![
        section("sec_1", None, vec![question("q1_1", 2, 3), question("q1_2", 0, 3)]),
        section("sec_2", None, vec![question("q2_1", 1, 2)]),
    ];
    let mut session = started(sections, FakeRecorder::default(), FakePlayer::silent()).await?;

    let mut fired = Vec::new();
    for _ in 0..60 {
        if session.phase() == Phase::Completed {
            break;
        }
        if let Some(kind) = session.tick() {
            fired.push(kind);
        }
    }

    assert_eq!(session.phase(), Phase::Completed);
    assert_eq!(
        fired,
        vec![
            TimerKind::Preparation,
            TimerKind::Answer,
            TimerKind::Finishing,
            TimerKind::Answer,
            TimerKind::Finishing,
            TimerKind::SectionBreak,
            TimerKind::Preparation,
            TimerKind::Answer,
            TimerKind::Finishing,
        ]
    );
    assert_eq!(session.recordings().len(), 3);

    Ok(())
}
