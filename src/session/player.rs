use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Identifies one playback request; completion messages must echo it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackKind {
    Direction,
    QuestionMedia,
    StartCue,
    StopCue,
    BreakCue,
}

/// Something the browser (or another player) should play now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRequest {
    pub id: PlaybackId,
    pub kind: PlaybackKind,
    pub url: String,
    /// Whether the session waits for this playback to end before advancing
    pub awaited: bool,
}

/// Plays media on behalf of the session.
///
/// `play` only starts playback; completion is reported back to the session as
/// a `media_ended`/`media_failed` message carrying the request id. Returning
/// an error means the media was rejected and counts as already finished.
pub trait MediaPlayer: Send {
    fn play(&mut self, request: &PlaybackRequest) -> Result<()>;

    /// Abandon whatever is playing (jump, early finish, restart)
    fn stop(&mut self) {}
}

/// Player for a browser front-end: requests are published in the session
/// snapshot and the browser reports completion over HTTP.
#[derive(Debug, Default)]
pub struct RemotePlayer;

impl MediaPlayer for RemotePlayer {
    fn play(&mut self, request: &PlaybackRequest) -> Result<()> {
        info!("Playback {} requested: {:?} {}", request.id, request.kind, request.url);
        Ok(())
    }

    fn stop(&mut self) {
        debug!("Playback abandoned");
    }
}
